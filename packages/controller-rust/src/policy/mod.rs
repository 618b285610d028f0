//! Policy engine: configuration, the expression language, rule conditions
//! and selection of the connections an action applies to.

pub mod condition;
pub mod config;
pub mod engine;
pub mod expr;
pub mod selection;
pub mod state;

pub use config::PolicyConfig;
pub use engine::PolicyEngine;
pub use selection::{select, ConnectionFilter};
pub use state::StateView;
