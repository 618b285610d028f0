//! Routing Controller: turns triggers into policy decisions and drives the
//! routing engine through asynchronous action trees.

pub mod action;
pub mod config;
pub mod connection;
pub mod controller;
pub mod elements;
pub mod factory;
pub mod handles;
pub mod logging;
pub mod policy;
pub mod routing;
pub mod volume_store;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::{ControllerConfig, Settings};
pub use controller::{Controller, JobOutcome, JobReport, Ticket};
pub use worker::{spawn, ControllerEvent, ControllerHandle};
