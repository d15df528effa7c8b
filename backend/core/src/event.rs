//! Event model shared by the setup and execution plugin domains.
//!
//! Each domain has its own closed tag enum and its own event type, so a
//! setup tag can never be looked up against an execution registry.

use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::payload::{ContainerHeartbeat, MasterEvent};
use crate::window::WindowId;

/// A discriminated tag that plugins subscribe to.
pub trait EventType:
    Copy + Eq + Hash + Ord + fmt::Debug + fmt::Display + Send + Sync + 'static
{
}

/// An immutable notification carrying exactly one tag of its domain.
pub trait Event: fmt::Debug + Send + Sync + 'static {
    type Kind: EventType;

    fn event_type(&self) -> Self::Kind;
}

fn display_via_serde<T: Serialize + fmt::Debug>(value: &T, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| format!("{:?}", value));
    write!(f, "{}", s)
}

// ---------------------------------------------------------------------------
// DAG setup domain
// ---------------------------------------------------------------------------

/// The six DAG preparation stages, declared in the order they fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SetupEventType {
    /// Before operators and streams are added to the DAG.
    PrePopulateDag,
    /// After operators and streams are added to the DAG.
    PostPopulateDag,
    /// Before operator and application properties are injected.
    PreConfigureDag,
    /// After operator and application properties are injected.
    PostConfigureDag,
    /// Just before the DAG is validated for submission.
    PreValidateDag,
    /// After validation. Incompatible DAG changes made here may break the launch.
    PostValidateDag,
}

impl SetupEventType {
    /// Every stage in firing order.
    pub const ALL: [SetupEventType; 6] = [
        SetupEventType::PrePopulateDag,
        SetupEventType::PostPopulateDag,
        SetupEventType::PreConfigureDag,
        SetupEventType::PostConfigureDag,
        SetupEventType::PreValidateDag,
        SetupEventType::PostValidateDag,
    ];

    /// The stage that must follow this one, if any.
    pub fn next(self) -> Option<SetupEventType> {
        let idx = Self::ALL.iter().position(|s| *s == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    pub fn is_pre(self) -> bool {
        matches!(
            self,
            Self::PrePopulateDag | Self::PreConfigureDag | Self::PreValidateDag
        )
    }
}

impl EventType for SetupEventType {}

impl fmt::Display for SetupEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        display_via_serde(self, f)
    }
}

/// A DAG preparation stage notification. Carries only its tag; the DAG and
/// configuration are reached through the plugin's context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupEvent {
    event_type: SetupEventType,
}

impl SetupEvent {
    pub fn new(event_type: SetupEventType) -> Self {
        Self { event_type }
    }
}

impl From<SetupEventType> for SetupEvent {
    fn from(event_type: SetupEventType) -> Self {
        Self::new(event_type)
    }
}

impl Event for SetupEvent {
    type Kind = SetupEventType;

    fn event_type(&self) -> SetupEventType {
        self.event_type
    }
}

// ---------------------------------------------------------------------------
// Execution domain
// ---------------------------------------------------------------------------

/// Tags of the notifications raised by the master's control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionEventType {
    /// A worker container heartbeat was processed.
    Heartbeat,
    /// The master recognised an engine lifecycle condition.
    MasterEvent,
    /// The committed window advanced.
    Commit,
}

impl EventType for ExecutionEventType {}

impl fmt::Display for ExecutionEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        display_via_serde(self, f)
    }
}

/// A runtime notification with its typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    Heartbeat(ContainerHeartbeat),
    Master(MasterEvent),
    Commit(WindowId),
}

impl ExecutionEvent {
    pub fn heartbeat(heartbeat: ContainerHeartbeat) -> Self {
        Self::Heartbeat(heartbeat)
    }

    pub fn master(event: MasterEvent) -> Self {
        Self::Master(event)
    }

    pub fn commit(window: impl Into<WindowId>) -> Self {
        Self::Commit(window.into())
    }

    pub fn as_heartbeat(&self) -> Option<&ContainerHeartbeat> {
        match self {
            Self::Heartbeat(hb) => Some(hb),
            _ => None,
        }
    }

    pub fn as_master(&self) -> Option<&MasterEvent> {
        match self {
            Self::Master(ev) => Some(ev),
            _ => None,
        }
    }

    pub fn commit_window(&self) -> Option<WindowId> {
        match self {
            Self::Commit(window) => Some(*window),
            _ => None,
        }
    }
}

impl Event for ExecutionEvent {
    type Kind = ExecutionEventType;

    fn event_type(&self) -> ExecutionEventType {
        match self {
            Self::Heartbeat(_) => ExecutionEventType::Heartbeat,
            Self::Master(_) => ExecutionEventType::MasterEvent,
            Self::Commit(_) => ExecutionEventType::Commit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::MasterEventKind;

    #[test]
    fn stage_display_matches_wire_names() {
        assert_eq!(SetupEventType::PrePopulateDag.to_string(), "PRE_POPULATE_DAG");
        assert_eq!(SetupEventType::PostValidateDag.to_string(), "POST_VALIDATE_DAG");
        assert_eq!(ExecutionEventType::MasterEvent.to_string(), "MASTER_EVENT");
    }

    #[test]
    fn stages_chain_in_order() {
        let mut chain = vec![SetupEventType::ALL[0]];
        while let Some(next) = chain.last().and_then(|s| s.next()) {
            chain.push(next);
        }
        assert_eq!(chain, SetupEventType::ALL.to_vec());
        assert_eq!(SetupEventType::PostValidateDag.next(), None);
        assert!(SetupEventType::PreConfigureDag.is_pre());
        assert!(!SetupEventType::PostConfigureDag.is_pre());
    }

    #[test]
    fn setup_event_reports_its_tag() {
        let event = SetupEvent::from(SetupEventType::PreValidateDag);
        assert_eq!(event.event_type(), SetupEventType::PreValidateDag);
    }

    #[test]
    fn execution_event_tags_follow_payload() {
        let commit = ExecutionEvent::commit(42u64);
        assert_eq!(commit.event_type(), ExecutionEventType::Commit);
        assert_eq!(commit.commit_window(), Some(WindowId::new(42)));
        assert!(commit.as_heartbeat().is_none());

        let hb = ExecutionEvent::heartbeat(ContainerHeartbeat::new("container_01"));
        assert_eq!(hb.event_type(), ExecutionEventType::Heartbeat);
        assert_eq!(hb.as_heartbeat().map(|h| h.container_id.as_str()), Some("container_01"));

        let master = ExecutionEvent::master(MasterEvent::new(MasterEventKind::ContainerStarted {
            container_id: "container_02".into(),
        }));
        assert_eq!(master.event_type(), ExecutionEventType::MasterEvent);
    }
}
