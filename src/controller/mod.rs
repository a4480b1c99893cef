//! Joystick and yoke input
//!
//! 1. [`backend`] - Seam over the input subsystem, plus an in-memory backend
//! 2. [`event_monitor`] - Polls devices and turns state changes into edges
//! 3. [`listeners`] - Callbacks the monitor dispatches edges to
//! 4. [`monitor_handle`] - Runs the monitor on its own thread
//! 5. [`registry`] - Device names and runtime ids
//!
//! # Architecture
//!
//! ```text
//! gilrs ──► InputBackend ──► InputMonitor ──► ListenerRegistry ──► callbacks
//!                           (edge detection)
//! ```

pub mod backend;
pub mod event_monitor;
pub mod gilrs_backend;
pub mod listeners;
pub mod monitor_handle;
pub mod registry;

pub use backend::{DeviceInfo, HatDirection, InputBackend, RuntimeId, VirtualBackend};
pub use event_monitor::{EventKind, InputMonitor, MonitorSettings, RawInputEvent};
pub use gilrs_backend::GilrsBackend;
pub use listeners::{ListenerDisposition, ListenerRegistry, ListenerResult};
pub use monitor_handle::MonitorHandle;
pub use registry::{enumerate_devices, reconcile, DeviceIdentity, ReconcileReport};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Failed to initialize the input subsystem: {0}")]
    Initialization(String),

    #[error("Failed to spawn the monitor thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Monitor thread panicked")]
    ThreadPanicked,
}
