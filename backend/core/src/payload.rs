//! Payload records carried by execution events.
//!
//! These are boundary snapshots produced by the engine; the fabric only
//! moves them from the control loop to plugin handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::window::WindowId;

/// Processing state an operator reports in a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperatorState {
    #[default]
    Pending,
    Active,
    Idle,
    Failed,
}

/// Per-operator section of a container heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorHeartbeat {
    pub operator_id: i32,
    pub current_window: WindowId,
    pub state: OperatorState,
}

/// One status report sent by a worker container to the master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerHeartbeat {
    pub container_id: String,
    pub sent_at_millis: i64,
    pub memory_mb_free: u32,
    pub gc_collection_millis: u64,
    #[serde(default)]
    pub operators: Vec<OperatorHeartbeat>,
}

impl ContainerHeartbeat {
    pub fn new(container_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            sent_at_millis: Utc::now().timestamp_millis(),
            memory_mb_free: 0,
            gc_collection_millis: 0,
            operators: Vec::new(),
        }
    }

    pub fn with_operator(mut self, operator: OperatorHeartbeat) -> Self {
        self.operators.push(operator);
        self
    }
}

/// Engine lifecycle conditions recognised by the master's main loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MasterEventKind {
    ContainerStarted { container_id: String },
    ContainerStopped { container_id: String, exit_status: Option<i32> },
    OperatorStarted { operator_id: i32, container_id: String },
    OperatorStopped { operator_id: i32 },
    OperatorFailed { operator_id: i32, reason: String },
    Repartitioned { operator_name: String, old_partitions: u32, new_partitions: u32 },
    ApplicationStateChanged { from: String, to: String },
}

/// An opaque engine lifecycle record. Delivered once, never replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: MasterEventKind,
    #[serde(default)]
    pub detail: serde_json::Value,
}

impl MasterEvent {
    pub fn new(kind: MasterEventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            detail: serde_json::Value::Null,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}
