//! Monitor Handle - owns the polling thread
//!
//! The monitor runs on a dedicated OS thread rather than a tokio task:
//! listener callbacks perform blocking UDP exchanges and must not stall
//! the async runtime.

use super::event_monitor::{InputMonitor, Opened};
use super::listeners::ListenerRegistry;
use super::registry::DeviceIdentity;
use super::MonitorError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

pub struct MonitorHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    listeners: ListenerRegistry,
    devices: Vec<DeviceIdentity>,
}

impl MonitorHandle {
    /// Starts polling `monitor` on its own thread.
    ///
    /// # Errors
    ///
    /// [`MonitorError::Spawn`] if the OS refuses to create the thread.
    pub fn spawn(monitor: InputMonitor<Opened>) -> Result<Self, MonitorError> {
        let stop = Arc::new(AtomicBool::new(false));
        let listeners = monitor.listeners();
        let devices = monitor.devices();

        let thread_stop = stop.clone();
        let thread = thread::Builder::new()
            .name("input-monitor".to_string())
            .spawn(move || {
                let mut polling = monitor.start();
                polling.run_until_stopped(&thread_stop);
            })?;
        info!("Input monitor thread started");

        Ok(Self {
            stop,
            thread: Some(thread),
            listeners,
            devices,
        })
    }

    pub fn listeners(&self) -> ListenerRegistry {
        self.listeners.clone()
    }

    /// Devices the monitor opened at start-up
    pub fn devices(&self) -> &[DeviceIdentity] {
        &self.devices
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Requests the loop to end after the current tick and joins the thread.
    pub fn stop(mut self) -> Result<(), MonitorError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), MonitorError> {
        self.stop.store(true, Ordering::SeqCst);
        let Some(thread) = self.thread.take() else {
            debug!("Input monitor already stopped");
            return Ok(());
        };
        match thread.join() {
            Ok(()) => {
                info!("Input monitor thread joined");
                Ok(())
            }
            Err(_) => {
                error!("Input monitor thread panicked");
                Err(MonitorError::ThreadPanicked)
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Input monitor did not shut down cleanly: {}", e);
        }
    }
}
