//! Gemini `generateContent` with function calling.

use super::oracle::{
    ActionCall, Decision, DecisionOracle, OracleError, OracleRequest, Part, Role, Turn,
};
use crate::config::AgentConfig;
use crate::tools::CapabilitySpec;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<CapabilitySpec>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Decision oracle backed by the Gemini API
pub struct GeminiOracle {
    client: Client,
    api_base: String,
    model: String,
    api_key: String,
    temperature: f64,
}

impl GeminiOracle {
    pub fn new(config: &AgentConfig, timeout: Duration) -> Result<Self, OracleError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(OracleError::MissingApiKey)?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Http(e.to_string()))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
        })
    }

    fn endpoint(&self) -> String {
        let model = self.model.strip_prefix("models/").unwrap_or(&self.model);
        format!("{}/models/{}:generateContent", self.api_base, model)
    }

    fn build_request(&self, request: &OracleRequest<'_>) -> GenerateContentRequest {
        let tools = if request.capabilities.is_empty() {
            Vec::new()
        } else {
            vec![GeminiTool {
                function_declarations: request.capabilities.to_vec(),
            }]
        };

        GenerateContentRequest {
            contents: request.turns.iter().map(to_content).collect(),
            system_instruction: Some(Content {
                role: None,
                parts: vec![GeminiPart {
                    text: Some(request.system.to_string()),
                    ..Default::default()
                }],
            }),
            tools,
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        }
    }
}

fn to_content(turn: &Turn) -> Content {
    let role = match turn.role {
        Role::User => "user",
        Role::Model => "model",
    };

    let parts = turn
        .parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => GeminiPart {
                text: Some(text.clone()),
                ..Default::default()
            },
            Part::Call(call) => GeminiPart {
                function_call: Some(FunctionCall {
                    name: call.name.clone(),
                    args: call.args.clone(),
                    id: None,
                }),
                ..Default::default()
            },
            Part::Result {
                name,
                output,
                success,
                ..
            } => {
                let key = if *success { "result" } else { "error" };
                GeminiPart {
                    function_response: Some(FunctionResponse {
                        name: name.clone(),
                        response: json!({ key: output }),
                    }),
                    ..Default::default()
                }
            }
        })
        .collect();

    Content {
        role: Some(role.to_string()),
        parts,
    }
}

fn parse_decision(response: GenerateContentResponse) -> Result<Decision, OracleError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response.prompt_feedback.and_then(|f| f.block_reason);
        return Err(OracleError::Empty(reason));
    };

    let mut texts = Vec::new();
    let mut calls = Vec::new();

    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if let Some(text) = part.text.filter(|t| !t.trim().is_empty()) {
            texts.push(text);
        }
        if let Some(call) = part.function_call {
            let args = match call.args {
                Value::Object(_) => call.args,
                Value::Null => Value::Object(Map::new()),
                other => json!({ "input": other }),
            };
            let id = call
                .id
                .unwrap_or_else(|| format!("gemini_call_{}", calls.len() + 1));
            calls.push(ActionCall {
                id,
                name: call.name,
                args,
            });
        }
    }

    let text = texts.join("\n");
    if !calls.is_empty() {
        let note = (!text.is_empty()).then_some(text);
        return Ok(Decision::Act { note, calls });
    }
    if !text.is_empty() {
        return Ok(Decision::Finish { text });
    }
    Err(OracleError::Empty(candidate.finish_reason))
}

#[async_trait]
impl DecisionOracle for GeminiOracle {
    async fn decide(&self, request: &OracleRequest<'_>) -> Result<Decision, OracleError> {
        let body = self.build_request(request);

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Http(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(text);
            return Err(OracleError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Malformed(e.without_url().to_string()))?;

        parse_decision(parsed)
    }
}
