//! Capabilities the decision loop may invoke.
//!
//! Every capability returns prose in [`CapabilityResult::output`]; that is
//! all the model ever sees. The typed [`Observation`] next to it feeds the
//! loop's own bookkeeping.

use crate::gateways::{CalendarGateway, DraftGateway};
use async_trait::async_trait;
use chrono_tz::Tz;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{CalendarEvent, TimeWindow};
use std::sync::Arc;

pub mod calendar;
pub mod draft;

pub use calendar::{
    prepare_new_event, CreateEventCapability, DeleteEventCapability, GetEventsCapability,
    UpdateEventCapability,
};
pub use draft::CreateDraftCapability;

pub const CREATE_DRAFT: &str = "create_draft";
pub const CREATE_CALENDAR_EVENT: &str = "create_calendar_event";
pub const GET_CALENDAR_EVENTS: &str = "get_calendar_events";
pub const UPDATE_CALENDAR_EVENT: &str = "update_calendar_event";
pub const DELETE_CALENDAR_EVENT: &str = "delete_calendar_event";

/// What a capability call did, in a form the decision loop can check
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Events found in a queried window. `complete` is false when the
    /// listing stopped at `max_results`, so later events went unseen.
    Window {
        window: TimeWindow,
        events: Vec<CalendarEvent>,
        max_results: u32,
        complete: bool,
    },
    Created(CalendarEvent),
    Updated(CalendarEvent),
    Deleted(String),
    DraftCreated { draft_id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityResult {
    pub success: bool,
    pub output: String,
    pub observation: Option<Observation>,
}

impl CapabilityResult {
    pub fn success(output: impl Into<String>, observation: Observation) -> Self {
        Self {
            success: true,
            output: output.into(),
            observation: Some(observation),
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            observation: None,
        }
    }
}

/// Declaration handed to the oracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[async_trait]
pub trait Capability: Send + Sync {
    /// Name used in function calls
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema for the arguments
    fn parameters_schema(&self) -> Value;

    /// Run the capability. Failures are reported in the result, never raised.
    async fn invoke(&self, args: Value) -> CapabilityResult;

    fn spec(&self) -> CapabilitySpec {
        CapabilitySpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Ordered set of capabilities exposed to one decision loop
#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: Vec<Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability, replacing any existing one with the same name.
    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        self.capabilities.retain(|c| c.name() != capability.name());
        self.capabilities.push(capability);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Capability>> {
        self.capabilities.iter().find(|c| c.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.capabilities.iter().map(|c| c.name()).collect()
    }

    pub fn specs(&self) -> Vec<CapabilitySpec> {
        self.capabilities.iter().map(|c| c.spec()).collect()
    }

    pub async fn invoke(&self, name: &str, args: Value) -> CapabilityResult {
        match self.get(name) {
            Some(capability) => capability.invoke(args).await,
            None => CapabilityResult::failure(format!(
                "Error: unknown capability '{}'. Available: {}",
                name,
                self.names().join(", ")
            )),
        }
    }

    /// Drafting plus full calendar management
    pub fn scheduling(
        calendar: Arc<dyn CalendarGateway>,
        drafts: Arc<dyn DraftGateway>,
        default_zone: Tz,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CreateDraftCapability::new(drafts)));
        registry.register(Arc::new(CreateEventCapability::new(calendar.clone(), default_zone)));
        registry.register(Arc::new(UpdateEventCapability::new(calendar.clone(), default_zone)));
        registry.register(Arc::new(GetEventsCapability::new(calendar.clone(), default_zone)));
        registry.register(Arc::new(DeleteEventCapability::new(calendar)));
        registry
    }

    pub fn draft_only(drafts: Arc<dyn DraftGateway>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CreateDraftCapability::new(drafts)));
        registry
    }
}

/// Decode `args` into the capability's argument struct, producing the
/// failure result the model sees when they don't fit.
pub(crate) fn parse_args<T: DeserializeOwned>(args: Value, action: &str) -> Result<T, CapabilityResult> {
    let args = if args.is_null() { Value::Object(Default::default()) } else { args };
    serde_json::from_value(args)
        .map_err(|e| CapabilityResult::failure(format!("Error {}: invalid arguments: {}", action, e)))
}

/// Text argument that is absent or blank counts as not given
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
