pub mod error;
pub mod event;
pub mod payload;
pub mod stats;
pub mod window;

pub use error::{PluginError, Result};
pub use event::{Event, EventType, ExecutionEvent, ExecutionEventType, SetupEvent, SetupEventType};
pub use payload::{ContainerHeartbeat, MasterEvent, MasterEventKind, OperatorHeartbeat, OperatorState};
pub use stats::{AppContext, AppStats, LogicalOperatorInfo, OperatorStats, WindowMetrics};
pub use window::{WindowClock, WindowId, DEFAULT_WINDOW_WIDTH_MILLIS};
