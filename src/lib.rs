//! Joystick and yoke bindings for the trim functions of a control loading
//! device driven over UDP.
//!
//! ```text
//! registry ──► event_monitor ──► BindingEngine ──► TrimClient ──► codec ──► UDP
//! ```

pub mod config;
pub mod controller;
pub mod mapping;
pub mod persistence;
pub mod protocol;
pub mod trim;
