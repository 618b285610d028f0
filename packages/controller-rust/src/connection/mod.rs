//! Connection model: route segments, main connections and their observers.

pub mod main_connection;
pub mod observer;
pub mod segment;

pub use main_connection::{aggregate_state, MainConnection, StateChange};
pub use observer::{CompositeConnectionObserver, ConnectionObserver};
pub use segment::RouteSegment;
