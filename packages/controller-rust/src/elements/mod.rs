//! Registered routing endpoints, classes and the registry that owns them.

pub mod class;
pub mod endpoint;
pub mod registry;

pub use class::Class;
pub use endpoint::{Domain, Endpoint, Gateway, Sink, Source};
pub use registry::ElementRegistry;
