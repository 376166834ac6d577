//! Domain types for WhaleFlow

pub mod bar;
pub mod position;
pub mod signal;
pub mod whale;

pub use bar::{check_bar_order, DataOrderingViolation, PriceBar};
pub use position::{ClosedTrade, ExitReason, Position, PositionStatus};
pub use signal::{Signal, SignalKind};
pub use whale::{check_event_order, CounterpartyKind, FlowDirection, WhaleEvent};
