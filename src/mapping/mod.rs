//! Binding physical controls to trim functions
//!
//! [`binding`] holds the data model, [`strategy`] what each function does to
//! the trim actuator, and [`engine`] the bind/run state machine that sits on
//! top of the input monitor.

pub mod binding;
pub mod engine;
pub mod error;
pub mod strategy;

pub use binding::{Binding, BindingTable, Control, TrimFunction};
pub use engine::{BindingEngine, EngineEvent, EngineMode, EngineSettings, EngineStatus};
pub use error::MappingError;
pub use strategy::{ActionContext, TrimAction};
