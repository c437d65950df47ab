//! The narrow interface between the decision loop and a language model.

use crate::tools::CapabilitySpec;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// One capability call requested by the oracle
#[derive(Debug, Clone, PartialEq)]
pub struct ActionCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    Call(ActionCall),
    Result {
        call_id: String,
        name: String,
        output: String,
        success: bool,
    },
}

/// One message of the per-email conversation
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        }
    }
}

/// What the oracle wants to happen next
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Invoke these capabilities, in order
    Act {
        note: Option<String>,
        calls: Vec<ActionCall>,
    },
    /// Stop without further calls
    Finish { text: String },
}

impl Decision {
    /// The turn to append to the conversation for this decision
    pub fn as_turn(&self) -> Turn {
        let parts = match self {
            Decision::Act { note, calls } => note
                .iter()
                .map(|n| Part::Text(n.clone()))
                .chain(calls.iter().cloned().map(Part::Call))
                .collect(),
            Decision::Finish { text } => vec![Part::Text(text.clone())],
        };
        Turn {
            role: Role::Model,
            parts,
        }
    }
}

pub struct OracleRequest<'a> {
    pub system: &'a str,
    pub turns: &'a [Turn],
    pub capabilities: &'a [CapabilitySpec],
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("no API key configured; set GEMINI_API_KEY or agent.api_key")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Http(String),

    #[error("model API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Malformed(String),

    /// The model returned neither text nor calls
    #[error("empty response{}", .0.as_deref().map(|r| format!(" ({})", r)).unwrap_or_default())]
    Empty(Option<String>),
}

#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn decide(&self, request: &OracleRequest<'_>) -> Result<Decision, OracleError>;
}
