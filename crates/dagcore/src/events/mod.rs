mod base;

pub use base::{EventBus, EventBusRecorder, EventEmitter, ExecutionEvent, NodeEvent};
