//! Read-only statistics snapshots handed to execution plugins.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::window::WindowId;

/// Identity and launch metadata of the running application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppContext {
    pub app_id: String,
    pub name: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Where the application's files live, e.g. its checkpoint directory root.
    pub app_path: String,
}

/// Application-level counters at the time the snapshot was taken.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppStats {
    pub planned_containers: u32,
    pub allocated_containers: u32,
    pub total_tuples_processed: u64,
    pub total_tuples_emitted: u64,
    pub current_window: WindowId,
    pub recovery_window: WindowId,
    pub failed_operators: u32,
    pub latency_millis: u64,
}

/// Physical operator counters, as batched by the heartbeat processor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorStats {
    pub operator_id: i32,
    pub container_id: String,
    pub current_window: WindowId,
    pub checkpointed_window: WindowId,
    pub tuples_processed_per_sec: u64,
    pub tuples_emitted_per_sec: u64,
    pub cpu_percentage: f64,
    pub latency_millis: u64,
}

/// Summary of one logical operator across its partitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalOperatorInfo {
    pub name: String,
    pub class_name: String,
    pub partitions: Vec<i32>,
    pub status: BTreeMap<String, u32>,
}

/// Metrics an operator published for one window.
pub type WindowMetrics = (WindowId, BTreeMap<String, serde_json::Value>);
