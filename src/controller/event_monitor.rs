use super::backend::{DeviceInfo, HatDirection, InputBackend, RuntimeId};
use super::listeners::ListenerRegistry;
use super::registry::DeviceIdentity;
use statum::{machine, state};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Edge-triggered input event, produced once per physical transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawInputEvent {
    ButtonEdge {
        device_id: Option<RuntimeId>,
        device_name: String,
        button: u8,
        pressed: bool,
    },
    HatChange {
        device_id: Option<RuntimeId>,
        device_name: String,
        hat: u8,
        direction: HatDirection,
    },
}

/// Listener categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ButtonDown,
    ButtonUp,
    HatMotion,
}

impl RawInputEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            RawInputEvent::ButtonEdge { pressed: true, .. } => EventKind::ButtonDown,
            RawInputEvent::ButtonEdge { pressed: false, .. } => EventKind::ButtonUp,
            RawInputEvent::HatChange { .. } => EventKind::HatMotion,
        }
    }

    pub fn device_id(&self) -> Option<RuntimeId> {
        match self {
            RawInputEvent::ButtonEdge { device_id, .. }
            | RawInputEvent::HatChange { device_id, .. } => *device_id,
        }
    }

    pub fn device_name(&self) -> &str {
        match self {
            RawInputEvent::ButtonEdge { device_name, .. }
            | RawInputEvent::HatChange { device_name, .. } => device_name,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MonitorSettings {
    /// Idle time between ticks once the backend queue is drained
    pub poll_interval: Duration,
    pub stats_interval: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_micros(1000),
            stats_interval: Duration::from_secs(10),
        }
    }
}

// Previous-state tables, sized once when the device is opened.
#[derive(Debug)]
struct DeviceSlot {
    info: DeviceInfo,
    buttons: Vec<bool>,
    hats: Vec<HatDirection>,
    reachable: bool,
}

impl DeviceSlot {
    fn open(info: DeviceInfo) -> Self {
        let buttons = info.buttons.min(usize::from(u8::MAX) + 1);
        let hats = info.hats.min(usize::from(u8::MAX) + 1);
        Self {
            buttons: vec![false; buttons],
            hats: vec![HatDirection::CENTERED; hats],
            reachable: true,
            info,
        }
    }

    fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::from(&self.info)
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum MonitorState {
    Opened,
    Polling,
}

#[machine]
pub struct InputMonitor<S: MonitorState> {
    backend: Box<dyn InputBackend>,
    devices: Vec<DeviceSlot>,
    listeners: ListenerRegistry,
    tap: Option<mpsc::UnboundedSender<RawInputEvent>>,
    settings: MonitorSettings,
}

impl<S: MonitorState> InputMonitor<S> {
    pub fn listeners(&self) -> ListenerRegistry {
        self.listeners.clone()
    }

    /// Devices opened by this monitor, with their runtime ids
    pub fn devices(&self) -> Vec<DeviceIdentity> {
        self.devices.iter().map(DeviceSlot::identity).collect()
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }
}

impl InputMonitor<Opened> {
    /// Opens every device the backend currently reports.
    pub fn open(
        mut backend: Box<dyn InputBackend>,
        listeners: ListenerRegistry,
        settings: MonitorSettings,
    ) -> Self {
        backend.pump();
        let devices: Vec<DeviceSlot> = backend.devices().into_iter().map(DeviceSlot::open).collect();

        if devices.is_empty() {
            warn!("No input devices connected, monitor will idle");
        } else {
            info!("Opened {} input devices:", devices.len());
            for slot in &devices {
                info!(
                    "  [{}] {} ({} buttons, {} hats)",
                    slot.info.runtime_id,
                    slot.info.name,
                    slot.buttons.len(),
                    slot.hats.len()
                );
            }
        }

        Self::new(backend, devices, listeners, None, settings)
    }

    /// Forwards a copy of every emitted event to `tap`.
    pub fn with_event_tap(mut self, tap: mpsc::UnboundedSender<RawInputEvent>) -> Self {
        self.tap = Some(tap);
        self
    }

    pub fn start(self) -> InputMonitor<Polling> {
        info!("Input monitor transitioning to Polling state");
        self.transition()
    }
}

impl InputMonitor<Polling> {
    /// One tick: drain the backend, diff every device, dispatch the edges.
    /// Returns the number of events emitted.
    pub fn poll_once(&mut self) -> usize {
        self.backend.pump();

        let mut events = Vec::new();
        for slot in self.devices.iter_mut() {
            let id = slot.info.runtime_id;
            let mut reachable = true;

            for (index, previous) in slot.buttons.iter_mut().enumerate() {
                let Ok(index) = u8::try_from(index) else { break };
                match self.backend.button(id, index) {
                    Some(pressed) if pressed != *previous => {
                        *previous = pressed;
                        events.push(RawInputEvent::ButtonEdge {
                            device_id: Some(id),
                            device_name: slot.info.name.clone(),
                            button: index,
                            pressed,
                        });
                    }
                    Some(_) => {}
                    None => {
                        reachable = false;
                        break;
                    }
                }
            }

            if reachable {
                for (index, previous) in slot.hats.iter_mut().enumerate() {
                    let Ok(index) = u8::try_from(index) else { break };
                    match self.backend.hat(id, index) {
                        Some(direction) if direction != *previous => {
                            *previous = direction;
                            events.push(RawInputEvent::HatChange {
                                device_id: Some(id),
                                device_name: slot.info.name.clone(),
                                hat: index,
                                direction,
                            });
                        }
                        Some(_) => {}
                        None => {
                            reachable = false;
                            break;
                        }
                    }
                }
            }

            if reachable != slot.reachable {
                if reachable {
                    info!("Device {} ({}) answering again", slot.info.name, id);
                } else {
                    warn!("Device {} ({}) stopped answering", slot.info.name, id);
                }
                slot.reachable = reachable;
            }
        }

        for event in &events {
            debug!("Input event: {:?}", event);
            let tap_closed = self
                .tap
                .as_ref()
                .is_some_and(|tap| tap.send(event.clone()).is_err());
            if tap_closed {
                debug!("Event tap closed, dropping it");
                self.tap = None;
            }
            self.listeners.dispatch(event);
        }
        events.len()
    }

    /// Polls until `stop` is set. The flag is checked at the top of each tick.
    pub fn run_until_stopped(&mut self, stop: &AtomicBool) {
        info!("Starting input monitor loop");

        let mut event_count = 0usize;
        let mut last_log_time = Instant::now();

        while !stop.load(Ordering::SeqCst) {
            event_count += self.poll_once();

            if last_log_time.elapsed() >= self.settings.stats_interval {
                info!(
                    "Input monitor stats: {} events in last {} seconds",
                    event_count,
                    self.settings.stats_interval.as_secs()
                );
                event_count = 0;
                last_log_time = Instant::now();
            }

            std::thread::sleep(self.settings.poll_interval);
        }

        info!("Input monitor loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::backend::VirtualBackend;
    use crate::controller::listeners::ListenerDisposition;
    use std::sync::{Arc, Mutex};

    fn polling(backend: &VirtualBackend) -> InputMonitor<Polling> {
        InputMonitor::open(
            Box::new(backend.clone()),
            ListenerRegistry::new(),
            MonitorSettings::default(),
        )
        .start()
    }

    fn collect(monitor: &InputMonitor<Polling>, kind: EventKind) -> Arc<Mutex<Vec<RawInputEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        monitor.listeners().add_listener(kind, move |event| {
            sink.lock().unwrap().push(event.clone());
            Ok(ListenerDisposition::Retain)
        });
        seen
    }

    #[test]
    fn steady_state_emits_nothing() {
        let backend = VirtualBackend::new();
        let stick = backend.add_device(7, "Stick1", 8, 1);
        let mut monitor = polling(&backend);

        stick.press(5);
        assert_eq!(monitor.poll_once(), 1);
        assert_eq!(monitor.poll_once(), 0, "held button is not an edge");
    }

    #[test]
    fn press_and_release_are_separate_edges() {
        let backend = VirtualBackend::new();
        let stick = backend.add_device(7, "Stick1", 8, 1);
        let mut monitor = polling(&backend);
        let downs = collect(&monitor, EventKind::ButtonDown);
        let ups = collect(&monitor, EventKind::ButtonUp);

        stick.press(5);
        monitor.poll_once();
        stick.release(5);
        monitor.poll_once();

        assert_eq!(
            *downs.lock().unwrap(),
            vec![RawInputEvent::ButtonEdge {
                device_id: Some(7),
                device_name: "Stick1".to_string(),
                button: 5,
                pressed: true,
            }]
        );
        assert_eq!(ups.lock().unwrap().len(), 1);
    }

    #[test]
    fn devices_are_diffed_independently() {
        let backend = VirtualBackend::new();
        let stick = backend.add_device(1, "Stick", 4, 0);
        let yoke = backend.add_device(2, "Yoke", 4, 1);
        let mut monitor = polling(&backend);
        let hats = collect(&monitor, EventKind::HatMotion);
        let downs = collect(&monitor, EventKind::ButtonDown);

        stick.press(2);
        yoke.press(2);
        yoke.set_hat(0, HatDirection::LEFT);
        assert_eq!(monitor.poll_once(), 3);

        let ids: Vec<_> = downs.lock().unwrap().iter().map(|e| e.device_id()).collect();
        assert_eq!(ids, vec![Some(1), Some(2)]);

        yoke.set_hat(0, HatDirection::CENTERED);
        monitor.poll_once();
        let directions: Vec<_> = hats
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                RawInputEvent::HatChange { direction, .. } => Some(*direction),
                _ => None,
            })
            .collect();
        assert_eq!(directions, vec![HatDirection::LEFT, HatDirection::CENTERED]);
    }

    #[test]
    fn disconnected_device_keeps_its_previous_state() {
        let backend = VirtualBackend::new();
        let stick = backend.add_device(1, "Stick", 4, 0);
        let mut monitor = polling(&backend);

        stick.press(1);
        monitor.poll_once();
        stick.disconnect();
        assert_eq!(monitor.poll_once(), 0);
        assert_eq!(monitor.devices().len(), 1, "handles are kept for the process lifetime");
    }

    #[test]
    fn tap_receives_every_event() {
        let backend = VirtualBackend::new();
        let stick = backend.add_device(1, "Stick", 4, 1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut monitor = InputMonitor::open(
            Box::new(backend.clone()),
            ListenerRegistry::new(),
            MonitorSettings::default(),
        )
        .with_event_tap(tx)
        .start();

        stick.press(3);
        stick.set_hat(0, HatDirection::UP);
        monitor.poll_once();

        assert_eq!(rx.try_recv().unwrap().kind(), EventKind::ButtonDown);
        assert_eq!(rx.try_recv().unwrap().kind(), EventKind::HatMotion);
        assert!(rx.try_recv().is_err());
    }
}
