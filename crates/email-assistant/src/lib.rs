//! Inbox assistant: polls Gmail and lets a model draft replies and keep the
//! calendar in step with what the email says.

pub mod agent;
pub mod auth;
pub mod config;
pub mod error;
pub mod gateways;
pub mod poller;
pub mod tools;

pub use agent::{AgentError, AgentOutcome, DecisionLoop};
pub use config::{AssistantMode, Config};
pub use error::GatewayError;
pub use poller::{Poller, TickReport};
