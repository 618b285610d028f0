//! Routing Core: domain types, trigger and action descriptors, and the
//! routing-engine and database contracts of the audio routing controller.

#[macro_use]
mod macros;

pub mod clock;
pub mod descriptor;
pub mod error;
pub mod handle;
pub mod memory;
pub mod traits;
pub mod trigger;
pub mod types;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use descriptor::{param, ActionDescriptor, ActionType, ConnectionOrder, ListKind, PolicySend};
pub use error::{ControlError, ControlResult};
pub use handle::{Handle, RequestKind};
pub use memory::{FaultInjector, InMemoryDatabase};
pub use traits::{Database, MainConnectionRecord, RouteHop, RoutingControl};
pub use trigger::{Trigger, TriggerType};
pub use types::Value;

