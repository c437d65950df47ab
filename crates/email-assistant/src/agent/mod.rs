//! Per-email decision loop.
//!
//! The oracle proposes capability calls; the loop executes them and feeds
//! the results back until a draft has been created. The loop itself holds
//! the hard rules: no event creation without a prior calendar check, no
//! duplicate events, and nothing at all after a successful draft.

use crate::config::AssistantMode;
use crate::tools::{
    prepare_new_event, CapabilityRegistry, CapabilityResult, CREATE_CALENDAR_EVENT, CREATE_DRAFT,
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use shared_types::{ActionInvocation, Email};
use std::sync::Arc;
use thiserror::Error;

pub mod gemini;
pub mod guard;
pub mod matching;
pub mod oracle;
pub mod policy;

pub use gemini::GeminiOracle;
pub use guard::CalendarLedger;
pub use oracle::{ActionCall, Decision, DecisionOracle, OracleError, OracleRequest, Part, Role, Turn};

pub const DRAFT_CREATED: &str = "draft created";

/// Successful end of one invocation
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub status: String,
    pub trace: Vec<ActionInvocation>,
    pub steps: u32,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("decision oracle failed at step {step}: {source}")]
    Oracle {
        step: u32,
        #[source]
        source: OracleError,
        trace: Vec<ActionInvocation>,
    },

    #[error("no draft created within {max_steps} steps")]
    StepBudgetExhausted {
        max_steps: u32,
        trace: Vec<ActionInvocation>,
    },

    #[error("model stopped without creating a draft: {text}")]
    FinishedWithoutDraft {
        text: String,
        trace: Vec<ActionInvocation>,
    },
}

impl AgentError {
    /// Calls executed before the invocation failed
    pub fn trace(&self) -> &[ActionInvocation] {
        match self {
            AgentError::Oracle { trace, .. }
            | AgentError::StepBudgetExhausted { trace, .. }
            | AgentError::FinishedWithoutDraft { trace, .. } => trace,
        }
    }
}

pub struct DecisionLoop {
    oracle: Arc<dyn DecisionOracle>,
    capabilities: CapabilityRegistry,
    mode: AssistantMode,
    tz: Tz,
    max_steps: u32,
}

impl DecisionLoop {
    pub fn new(
        oracle: Arc<dyn DecisionOracle>,
        capabilities: CapabilityRegistry,
        mode: AssistantMode,
        tz: Tz,
        max_steps: u32,
    ) -> Self {
        Self {
            oracle,
            capabilities,
            mode,
            tz,
            max_steps: max_steps.max(1),
        }
    }

    pub async fn run(&self, email: &Email) -> Result<AgentOutcome, AgentError> {
        self.run_at(email, Utc::now()).await
    }

    /// Process `email` as if the current time were `now`.
    pub async fn run_at(&self, email: &Email, now: DateTime<Utc>) -> Result<AgentOutcome, AgentError> {
        let system = policy::system_prompt(self.mode, now, self.tz);
        let specs = self.capabilities.specs();
        let mut turns = vec![Turn::user(policy::email_message(email))];
        let mut ledger = CalendarLedger::default();
        let mut trace: Vec<ActionInvocation> = Vec::new();

        for step in 1..=self.max_steps {
            let request = OracleRequest {
                system: &system,
                turns: &turns,
                capabilities: &specs,
            };
            let decision = match self.oracle.decide(&request).await {
                Ok(decision) => decision,
                Err(source) => return Err(AgentError::Oracle { step, source, trace }),
            };
            turns.push(decision.as_turn());

            let (note, calls) = match decision {
                Decision::Act { note, calls } if !calls.is_empty() => (note, calls),
                Decision::Act { note, .. } => {
                    let text = note.unwrap_or_default();
                    tracing::info!(email_id = %email.id, step, output = %text, "ai_step");
                    return Err(AgentError::FinishedWithoutDraft { text, trace });
                }
                Decision::Finish { text } => {
                    tracing::info!(email_id = %email.id, step, output = %text, "ai_step");
                    return Err(AgentError::FinishedWithoutDraft { text, trace });
                }
            };

            let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
            tracing::info!(
                email_id = %email.id,
                step,
                output = note.as_deref().unwrap_or(""),
                calls = ?names,
                "ai_step"
            );

            let mut results = Vec::with_capacity(calls.len());
            let mut pending = calls.into_iter();

            while let Some(call) = pending.next() {
                let result = self.execute(&call, &mut ledger).await;
                tracing::info!(
                    email_id = %email.id,
                    step,
                    capability = %call.name,
                    success = result.success,
                    result = %result.output,
                    "capability_invoked"
                );

                let drafted = result.success && call.name == CREATE_DRAFT;
                trace.push(ActionInvocation {
                    capability: call.name.clone(),
                    arguments: call.args.clone(),
                    result: result.output.clone(),
                    success: result.success,
                    step,
                });

                if drafted {
                    let dropped: Vec<String> = pending.map(|c| c.name).collect();
                    if !dropped.is_empty() {
                        tracing::warn!(email_id = %email.id, step, dropped = ?dropped, "calls_after_draft_dropped");
                    }
                    return Ok(AgentOutcome {
                        status: DRAFT_CREATED.to_string(),
                        trace,
                        steps: step,
                    });
                }

                results.push(Part::Result {
                    call_id: call.id,
                    name: call.name,
                    output: result.output,
                    success: result.success,
                });
            }

            turns.push(Turn {
                role: Role::User,
                parts: results,
            });
        }

        tracing::warn!(email_id = %email.id, max_steps = self.max_steps, "step_budget_exhausted");
        Err(AgentError::StepBudgetExhausted {
            max_steps: self.max_steps,
            trace,
        })
    }

    async fn execute(&self, call: &ActionCall, ledger: &mut CalendarLedger) -> CapabilityResult {
        if call.name == CREATE_CALENDAR_EVENT && self.capabilities.contains(CREATE_CALENDAR_EVENT) {
            // Arguments that fail to parse are left for the capability to report
            if let Ok(event) = prepare_new_event(call.args.clone(), self.tz) {
                if let Some(refusal) = ledger.refuse_create(&event) {
                    tracing::warn!(summary = %event.summary, reason = %refusal, "calendar_create_refused");
                    return CapabilityResult::failure(refusal);
                }
            }
        }

        let result = self.capabilities.invoke(&call.name, call.args.clone()).await;
        if result.success {
            if let Some(observation) = &result.observation {
                ledger.record(observation);
            }
        }
        result
    }
}
