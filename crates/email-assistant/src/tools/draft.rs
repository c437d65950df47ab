use super::{non_blank, parse_args, Capability, CapabilityResult, Observation, CREATE_DRAFT};
use crate::gateways::DraftGateway;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use shared_types::DraftEmail;
use std::sync::Arc;

const ACTION: &str = "creating draft";

#[derive(Debug, Deserialize)]
struct CreateDraftArgs {
    body: String,
    sender: String,
    subject: String,
    #[serde(default)]
    thread_id: Option<String>,
    #[serde(default)]
    original_message_id: Option<String>,
}

/// Reply draft in the mailbox, threaded onto the original message
pub struct CreateDraftCapability {
    drafts: Arc<dyn DraftGateway>,
}

impl CreateDraftCapability {
    pub fn new(drafts: Arc<dyn DraftGateway>) -> Self {
        Self { drafts }
    }
}

#[async_trait]
impl Capability for CreateDraftCapability {
    fn name(&self) -> &str {
        CREATE_DRAFT
    }

    fn description(&self) -> &str {
        "Create a reply draft in Gmail for the incoming email. The subject is prefixed \
         with 'Re: ' automatically. Call this exactly once, as the final action."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "body": {
                    "type": "string",
                    "description": "Plain-text body of the reply"
                },
                "sender": {
                    "type": "string",
                    "description": "Sender of the original email; the reply goes to this address"
                },
                "subject": {
                    "type": "string",
                    "description": "Subject of the original email"
                },
                "thread_id": {
                    "type": "string",
                    "description": "Gmail thread id of the original email"
                },
                "original_message_id": {
                    "type": "string",
                    "description": "Gmail message id of the original email, used for reply headers"
                }
            },
            "required": ["body", "sender", "subject", "thread_id", "original_message_id"]
        })
    }

    async fn invoke(&self, args: Value) -> CapabilityResult {
        let args: CreateDraftArgs = match parse_args(args, ACTION) {
            Ok(args) => args,
            Err(failure) => return failure,
        };

        if args.body.trim().is_empty() {
            return CapabilityResult::failure(format!("Error {}: body is empty", ACTION));
        }
        if args.sender.trim().is_empty() {
            return CapabilityResult::failure(format!("Error {}: sender is empty", ACTION));
        }

        let draft = DraftEmail::reply(
            &args.body,
            &args.sender,
            &args.subject,
            &non_blank(args.thread_id).unwrap_or_default(),
            &non_blank(args.original_message_id).unwrap_or_default(),
        );

        match self.drafts.create_draft(&draft).await {
            Ok(draft_id) => CapabilityResult::success(
                "draft created",
                Observation::DraftCreated { draft_id },
            ),
            Err(e) => {
                tracing::error!(error = %e, to = %draft.to, "draft_creation_error");
                CapabilityResult::failure(format!("Error {}: {}", ACTION, e))
            }
        }
    }
}
