//! Binding engine: learns bindings and dispatches bound input to trim actions
//!
//! # Modes
//!
//! ```text
//!          start_bind(F)               capture / cancel_bind
//!   Idle ──────────────► Binding(F) ─────────────────────► Idle
//!     │                                                      ▲
//!     └──────── start_run ──────► Running ──── stop_run ─────┘
//! ```
//!
//! Every mode change replaces the monitor's listeners. The engine never owns
//! the monitor thread; its callbacks run on it.
//!
//! # Locking
//!
//! The engine state lock is taken before the listener registry lock, never
//! the other way round. Trim exchanges run without the engine lock held.

use super::binding::{Binding, BindingTable, Control, TrimFunction};
use super::strategy::{ActionContext, TrimAction};
use super::MappingError;
use crate::controller::event_monitor::{EventKind, RawInputEvent};
use crate::controller::listeners::{ListenerDisposition, ListenerRegistry, ListenerResult};
use crate::controller::registry::{reconcile, DeviceIdentity, ReconcileReport};
use crate::persistence::BindingStore;
use crate::protocol::AxisId;
use crate::trim::TrimActuator;
use chrono::{DateTime, Local};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    Idle,
    Binding(TrimFunction),
    Running,
}

impl fmt::Display for EngineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineMode::Idle => write!(f, "idle"),
            EngineMode::Binding(function) => write!(f, "binding {}", function),
            EngineMode::Running => write!(f, "running"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub mode: EngineMode,
    pub bindings: usize,
    /// Bindings whose device is currently connected
    pub attached: usize,
}

/// Notifications for presentation layers
#[derive(Debug, Clone)]
pub enum EngineEvent {
    BindingsChanged(BindingTable),
    ActionTriggered {
        function: TrimFunction,
        offset: f32,
        at: DateTime<Local>,
    },
    ActionFailed {
        function: TrimFunction,
        error: String,
    },
    BindingEvicted {
        evicted: TrimFunction,
        by: TrimFunction,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub axis: AxisId,
    pub step: f32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            axis: AxisId::Rudder,
            step: 0.05,
        }
    }
}

struct EngineState {
    mode: EngineMode,
    table: BindingTable,
    store: Box<dyn BindingStore>,
}

struct EngineInner {
    state: Mutex<EngineState>,
    listeners: ListenerRegistry,
    trim: Arc<dyn TrimActuator>,
    settings: EngineSettings,
    events: broadcast::Sender<EngineEvent>,
    status: watch::Sender<EngineStatus>,
}

/// Cloneable handle; all clones drive the same engine
#[derive(Clone)]
pub struct BindingEngine {
    inner: Arc<EngineInner>,
}

impl BindingEngine {
    /// Creates an idle engine with an empty table.
    ///
    /// `listeners` is the registry of the monitor whose events the engine
    /// consumes. Call [`BindingEngine::load_bindings`] to fill the table.
    pub fn new(
        store: Box<dyn BindingStore>,
        trim: Arc<dyn TrimActuator>,
        listeners: ListenerRegistry,
        settings: EngineSettings,
    ) -> Self {
        info!(
            "Creating binding engine (axis {}, step {})",
            settings.axis, settings.step
        );
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (status, _) = watch::channel(EngineStatus {
            mode: EngineMode::Idle,
            bindings: 0,
            attached: 0,
        });

        Self {
            inner: Arc::new(EngineInner {
                state: Mutex::new(EngineState {
                    mode: EngineMode::Idle,
                    table: BindingTable::new(),
                    store,
                }),
                listeners,
                trim,
                settings,
                events,
                status,
            }),
        }
    }

    pub fn settings(&self) -> EngineSettings {
        self.inner.settings
    }

    /// Loads the stored table and attaches it to the connected devices.
    pub fn load_bindings(&self, live: &[DeviceIdentity]) -> Result<ReconcileReport, MappingError> {
        let mut state = self.inner.lock_state();
        let stored = state.store.load()?;
        let report = reconcile(&stored, live);
        state.table = report.table.clone();
        info!(
            "Loaded {} bindings ({} attached, {} detached)",
            state.table.len(),
            report.rebound.len(),
            report.detached.len()
        );
        self.inner.notify_changed(&state);
        Ok(report)
    }

    /// Like [`BindingEngine::load_bindings`], then writes the refreshed table
    /// back.
    pub fn reload(&self, live: &[DeviceIdentity]) -> Result<ReconcileReport, MappingError> {
        let mut state = self.inner.lock_state();
        let stored = state.store.load()?;
        let report = reconcile(&stored, live);
        state.store.save(&report.table)?;
        state.table = report.table.clone();
        info!("Reloaded {} bindings", state.table.len());
        self.inner.notify_changed(&state);
        Ok(report)
    }

    /// Arms a one-shot capture for `function`, replacing whatever mode the
    /// engine was in.
    pub fn start_bind(&self, function: TrimFunction) {
        let mut state = self.inner.lock_state();
        info!("Waiting for a button or hat for {}", function);
        self.inner.listeners.clear_listeners();

        for kind in [EventKind::ButtonDown, EventKind::HatMotion] {
            let engine = Arc::downgrade(&self.inner);
            self.inner.listeners.add_listener(kind, move |event| {
                capture(&engine, function, event)
            });
        }

        state.mode = EngineMode::Binding(function);
        self.inner.publish_status(&state);
    }

    pub fn cancel_bind(&self) -> Result<(), MappingError> {
        let mut state = self.inner.lock_state();
        let EngineMode::Binding(function) = state.mode else {
            return Err(MappingError::NotBinding);
        };
        self.inner.listeners.clear_listeners();
        state.mode = EngineMode::Idle;
        info!("Capture for {} cancelled", function);
        self.inner.publish_status(&state);
        Ok(())
    }

    /// Removes `function`'s binding and persists the table. Returns what was
    /// removed.
    ///
    /// The in-memory table only changes once the store accepted the new one.
    pub fn delete_binding(&self, function: TrimFunction) -> Result<Option<Binding>, MappingError> {
        let mut state = self.inner.lock_state();
        let mut table = state.table.clone();
        let removed = table.remove(function);
        if removed.is_none() {
            debug!("{} has no binding to delete", function);
            return Ok(None);
        }
        state.store.save(&table)?;
        state.table = table;
        info!("Deleted binding for {}", function);
        self.inner.notify_changed(&state);
        Ok(removed)
    }

    /// Drops every binding and the stored table. On a store error the table
    /// is left as it was.
    pub fn clear_bindings(&self) -> Result<(), MappingError> {
        let mut state = self.inner.lock_state();
        state.store.clear()?;
        state.table.clear();
        info!("Cleared all bindings");
        self.inner.notify_changed(&state);
        Ok(())
    }

    /// Snapshot of the table
    pub fn list_bindings(&self) -> BindingTable {
        self.inner.lock_state().table.clone()
    }

    pub fn start_run(&self) {
        let mut state = self.inner.lock_state();
        self.inner.listeners.clear_listeners();

        for kind in [EventKind::ButtonDown, EventKind::HatMotion] {
            let engine = Arc::downgrade(&self.inner);
            self.inner
                .listeners
                .add_listener(kind, move |event| dispatch(&engine, event));
        }

        state.mode = EngineMode::Running;
        info!("Running with {} bindings", state.table.len());
        self.inner.publish_status(&state);
    }

    /// Leaves run mode. Does nothing in any other mode.
    pub fn stop_run(&self) {
        let mut state = self.inner.lock_state();
        if state.mode != EngineMode::Running {
            debug!("stop_run ignored in mode {}", state.mode);
            return;
        }
        self.inner.listeners.clear_listeners();
        state.mode = EngineMode::Idle;
        info!("Run mode stopped");
        self.inner.publish_status(&state);
    }

    pub fn status(&self) -> EngineStatus {
        self.inner.status.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    pub fn watch_status(&self) -> watch::Receiver<EngineStatus> {
        self.inner.status.subscribe()
    }
}

impl EngineInner {
    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_status(&self, state: &EngineState) {
        self.status.send_replace(EngineStatus {
            mode: state.mode,
            bindings: state.table.len(),
            attached: state.table.iter().filter(|b| b.is_attached()).count(),
        });
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn notify_changed(&self, state: &EngineState) {
        self.emit(EngineEvent::BindingsChanged(state.table.clone()));
        self.publish_status(state);
    }
}

fn capture(
    engine: &Weak<EngineInner>,
    function: TrimFunction,
    event: &RawInputEvent,
) -> ListenerResult {
    let Some(engine) = engine.upgrade() else {
        return Ok(ListenerDisposition::Disarm);
    };
    let Some(control) = Control::from_event(event) else {
        return Ok(ListenerDisposition::Retain);
    };
    if control.is_neutral() {
        debug!("Ignoring {} while binding {}", control, function);
        return Ok(ListenerDisposition::Retain);
    }

    let mut state = engine.lock_state();
    if state.mode != EngineMode::Binding(function) {
        return Ok(ListenerDisposition::Disarm);
    }

    match event.device_id() {
        Some(runtime_id) => {
            let binding = Binding {
                function,
                device_name: event.device_name().to_string(),
                runtime_id: Some(runtime_id),
                control,
            };
            info!("Captured {}", binding);
            for evicted in state.table.insert(binding) {
                info!("{} lost its control to {}", evicted, function);
                engine.emit(EngineEvent::BindingEvicted { evicted, by: function });
            }
        }
        None => {
            info!("Capture without a device, removing binding for {}", function);
            state.table.remove(function);
        }
    }

    engine.listeners.clear_listeners();
    state.mode = EngineMode::Idle;

    let EngineState { store, table, .. } = &mut *state;
    if let Err(e) = store.save(table) {
        error!("Failed to persist bindings: {}", e);
    }
    engine.notify_changed(&state);
    Ok(ListenerDisposition::Disarm)
}

fn dispatch(engine: &Weak<EngineInner>, event: &RawInputEvent) -> ListenerResult {
    let Some(engine) = engine.upgrade() else {
        return Ok(ListenerDisposition::Disarm);
    };
    let (Some(runtime_id), Some(control)) = (event.device_id(), Control::from_event(event)) else {
        return Ok(ListenerDisposition::Retain);
    };

    let function = {
        let state = engine.lock_state();
        if state.mode != EngineMode::Running {
            return Ok(ListenerDisposition::Disarm);
        }
        state.table.lookup(runtime_id, &control)
    };
    let Some(function) = function else {
        return Ok(ListenerDisposition::Retain);
    };

    let context = ActionContext {
        axis: engine.settings.axis,
        step: engine.settings.step,
    };
    match function.apply(engine.trim.as_ref(), &context) {
        Ok(offset) => {
            info!("{} -> trim offset {:.3}", function, offset);
            engine.emit(EngineEvent::ActionTriggered {
                function,
                offset,
                at: Local::now(),
            });
        }
        Err(e) => {
            warn!("{} failed: {}", function, e);
            engine.emit(EngineEvent::ActionFailed {
                function,
                error: e.to_string(),
            });
        }
    }
    Ok(ListenerDisposition::Retain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::backend::{HatDirection, VirtualBackend, VirtualDeviceHandle};
    use crate::controller::event_monitor::{InputMonitor, MonitorSettings, Polling};
    use crate::persistence::MemoryBindingStore;
    use crate::trim::TrimError;
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Set,
        Release,
        Nudge(f32),
    }

    #[derive(Default)]
    struct MockActuator {
        calls: Mutex<Vec<Call>>,
        offsets: Mutex<HashMap<AxisId, f32>>,
        fail: bool,
    }

    impl MockActuator {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn result<T>(&self, value: T) -> Result<T, TrimError> {
            if self.fail {
                Err(TrimError::Timeout {
                    after: Duration::from_secs(8),
                })
            } else {
                Ok(value)
            }
        }
    }

    impl TrimActuator for MockActuator {
        fn read_axis_position(&self, _axis: AxisId) -> Result<f32, TrimError> {
            self.result(0.25)
        }

        fn apply_trim(&self, _axis: AxisId, _value: f32) -> Result<(), TrimError> {
            self.result(())
        }

        fn set_trim_to_current_position(&self, _axis: AxisId) -> Result<f32, TrimError> {
            self.calls.lock().unwrap().push(Call::Set);
            self.result(0.25)
        }

        fn release_trim(&self, axis: AxisId) -> Result<(), TrimError> {
            self.calls.lock().unwrap().push(Call::Release);
            self.offsets.lock().unwrap().insert(axis, 0.0);
            self.result(())
        }

        fn nudge_trim(&self, axis: AxisId, delta: f32) -> Result<f32, TrimError> {
            self.calls.lock().unwrap().push(Call::Nudge(delta));
            let mut offsets = self.offsets.lock().unwrap();
            let offset = offsets.entry(axis).or_insert(0.0);
            *offset += delta;
            let offset = *offset;
            self.result(offset)
        }

        fn current_trim_offset(&self, axis: AxisId) -> f32 {
            self.offsets.lock().unwrap().get(&axis).copied().unwrap_or(0.0)
        }
    }

    struct Rig {
        engine: BindingEngine,
        monitor: InputMonitor<Polling>,
        stick: VirtualDeviceHandle,
        store: MemoryBindingStore,
        trim: Arc<MockActuator>,
    }

    fn rig_with(store: MemoryBindingStore, trim: MockActuator) -> Rig {
        let backend = VirtualBackend::new();
        let stick = backend.add_device(7, "Stick1", 8, 1);
        let listeners = ListenerRegistry::new();
        let monitor = InputMonitor::open(
            Box::new(backend.clone()),
            listeners.clone(),
            MonitorSettings::default(),
        )
        .start();
        let trim = Arc::new(trim);
        let engine = BindingEngine::new(
            Box::new(store.clone()),
            trim.clone(),
            listeners,
            EngineSettings::default(),
        );
        Rig {
            engine,
            monitor,
            stick,
            store,
            trim,
        }
    }

    fn rig() -> Rig {
        rig_with(MemoryBindingStore::new(), MockActuator::default())
    }

    fn click(rig: &mut Rig, button: u8) {
        rig.stick.press(button);
        rig.monitor.poll_once();
        rig.stick.release(button);
        rig.monitor.poll_once();
    }

    fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn capture_binds_persists_and_returns_to_idle() {
        let mut rig = rig();
        let mut events = rig.engine.subscribe();

        rig.engine.start_bind(TrimFunction::Left);
        assert_eq!(rig.engine.status().mode, EngineMode::Binding(TrimFunction::Left));
        click(&mut rig, 5);

        let table = rig.engine.list_bindings();
        let binding = table.get(TrimFunction::Left).unwrap();
        assert_eq!(binding.device_name, "Stick1");
        assert_eq!(binding.runtime_id, Some(7));
        assert_eq!(binding.control, Control::Button { index: 5 });

        assert_eq!(rig.engine.status().mode, EngineMode::Idle);
        assert_eq!(rig.store.saves(), 1);
        assert!(matches!(
            drain(&mut events).as_slice(),
            [EngineEvent::BindingsChanged(t)] if t.len() == 1
        ));

        click(&mut rig, 6);
        assert_eq!(rig.engine.list_bindings().len(), 1, "capture is one-shot");
    }

    #[test]
    fn neutral_input_keeps_the_capture_armed() {
        let mut rig = rig();
        rig.engine.start_bind(TrimFunction::Set);

        click(&mut rig, 0);
        rig.stick.set_hat(0, HatDirection::UP);
        rig.monitor.poll_once();
        rig.stick.set_hat(0, HatDirection::CENTERED);
        rig.monitor.poll_once();

        // The hat press itself binds; only button 0 and the centering were ignored.
        let binding = rig.engine.list_bindings().get(TrimFunction::Set).cloned().unwrap();
        assert_eq!(
            binding.control,
            Control::Pov {
                hat: 0,
                direction: HatDirection::UP
            }
        );

        rig.engine.start_bind(TrimFunction::Release);
        click(&mut rig, 0);
        assert_eq!(rig.engine.status().mode, EngineMode::Binding(TrimFunction::Release));
        assert!(rig.engine.list_bindings().get(TrimFunction::Release).is_none());
    }

    #[test]
    fn binding_a_taken_control_evicts_the_old_function() {
        let mut rig = rig();
        let mut events = rig.engine.subscribe();

        rig.engine.start_bind(TrimFunction::Left);
        click(&mut rig, 3);
        rig.engine.start_bind(TrimFunction::Right);
        click(&mut rig, 3);

        let table = rig.engine.list_bindings();
        assert!(table.get(TrimFunction::Left).is_none());
        assert_eq!(
            table.get(TrimFunction::Right).map(|b| b.control),
            Some(Control::Button { index: 3 })
        );
        assert!(drain(&mut events).iter().any(|e| matches!(
            e,
            EngineEvent::BindingEvicted {
                evicted: TrimFunction::Left,
                by: TrimFunction::Right
            }
        )));
    }

    #[test]
    fn capture_without_device_clears_the_binding() {
        let rig = rig();
        rig.engine.start_bind(TrimFunction::Left);
        rig.engine.inner.listeners.dispatch(&RawInputEvent::ButtonEdge {
            device_id: Some(7),
            device_name: "Stick1".to_string(),
            button: 2,
            pressed: true,
        });
        assert_eq!(rig.engine.list_bindings().len(), 1);

        rig.engine.start_bind(TrimFunction::Left);
        rig.engine.inner.listeners.dispatch(&RawInputEvent::ButtonEdge {
            device_id: None,
            device_name: String::new(),
            button: 2,
            pressed: true,
        });
        assert!(rig.engine.list_bindings().is_empty());
        assert_eq!(rig.engine.status().mode, EngineMode::Idle);
    }

    #[test]
    fn cancel_bind_only_in_bind_mode() {
        let mut rig = rig();
        assert!(matches!(rig.engine.cancel_bind(), Err(MappingError::NotBinding)));

        rig.engine.start_bind(TrimFunction::Left);
        rig.engine.cancel_bind().unwrap();
        click(&mut rig, 4);
        assert!(rig.engine.list_bindings().is_empty());
        assert_eq!(rig.engine.status().mode, EngineMode::Idle);
    }

    #[test]
    fn run_mode_dispatches_bound_controls() {
        let mut rig = rig();
        let mut events = rig.engine.subscribe();
        rig.engine.start_bind(TrimFunction::Left);
        click(&mut rig, 5);
        rig.engine.start_bind(TrimFunction::Release);
        click(&mut rig, 6);
        drain(&mut events);

        rig.engine.start_run();
        assert_eq!(rig.engine.status().mode, EngineMode::Running);
        click(&mut rig, 5);
        click(&mut rig, 1);
        click(&mut rig, 5);
        click(&mut rig, 6);

        assert_eq!(
            rig.trim.calls(),
            vec![Call::Nudge(-0.05), Call::Nudge(-0.05), Call::Release]
        );
        let offsets: Vec<f32> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::ActionTriggered { offset, .. } => Some(offset),
                _ => None,
            })
            .collect();
        assert_eq!(offsets, vec![-0.05, -0.1, 0.0]);

        rig.engine.stop_run();
        click(&mut rig, 5);
        assert_eq!(rig.trim.calls().len(), 3);
        assert_eq!(rig.engine.status().mode, EngineMode::Idle);
    }

    #[test]
    fn failed_action_is_reported_and_run_continues() {
        let mut rig = rig_with(
            MemoryBindingStore::new(),
            MockActuator {
                fail: true,
                ..Default::default()
            },
        );
        let mut events = rig.engine.subscribe();
        rig.engine.start_bind(TrimFunction::Set);
        click(&mut rig, 2);
        rig.engine.start_run();

        click(&mut rig, 2);
        click(&mut rig, 2);

        let failures = drain(&mut events)
            .into_iter()
            .filter(|e| matches!(e, EngineEvent::ActionFailed { function: TrimFunction::Set, .. }))
            .count();
        assert_eq!(failures, 2);
        assert_eq!(rig.engine.status().mode, EngineMode::Running);
    }

    #[test]
    fn stop_run_outside_run_mode_is_ignored() {
        let rig = rig();
        rig.engine.start_bind(TrimFunction::Left);
        rig.engine.stop_run();
        assert_eq!(rig.engine.status().mode, EngineMode::Binding(TrimFunction::Left));
    }

    #[test]
    fn load_attaches_stored_bindings_to_live_devices() {
        let mut stored = BindingTable::new();
        stored.insert(Binding {
            function: TrimFunction::Right,
            device_name: "Stick1".to_string(),
            runtime_id: None,
            control: Control::Button { index: 4 },
        });
        stored.insert(Binding {
            function: TrimFunction::Left,
            device_name: "Yoke".to_string(),
            runtime_id: None,
            control: Control::Button { index: 4 },
        });
        let mut rig = rig_with(MemoryBindingStore::with_table(stored), MockActuator::default());

        let live = rig.monitor.devices();
        let report = rig.engine.load_bindings(&live).unwrap();
        assert_eq!(report.rebound, vec![TrimFunction::Right]);
        assert_eq!(report.detached, vec![TrimFunction::Left]);
        assert_eq!(rig.engine.status().attached, 1);
        assert_eq!(rig.store.saves(), 0);

        rig.engine.start_run();
        click(&mut rig, 4);
        assert_eq!(rig.trim.calls(), vec![Call::Nudge(0.05)]);

        rig.engine.reload(&live).unwrap();
        assert_eq!(rig.store.saves(), 1);
    }

    #[test]
    fn delete_and_clear_persist() {
        let mut rig = rig();
        rig.engine.start_bind(TrimFunction::Left);
        click(&mut rig, 5);

        assert!(rig.engine.delete_binding(TrimFunction::Right).unwrap().is_none());
        assert_eq!(rig.store.saves(), 1);
        let removed = rig.engine.delete_binding(TrimFunction::Left).unwrap();
        assert_eq!(removed.map(|b| b.function), Some(TrimFunction::Left));
        assert_eq!(rig.store.saves(), 2);

        rig.engine.start_bind(TrimFunction::Set);
        click(&mut rig, 5);
        rig.engine.clear_bindings().unwrap();
        assert!(rig.engine.list_bindings().is_empty());
        assert_eq!(rig.store.stored(), None);
    }

    #[test]
    fn store_errors_leave_the_table_untouched() {
        let mut rig = rig();
        rig.engine.start_bind(TrimFunction::Left);
        click(&mut rig, 5);
        let mut events = rig.engine.subscribe();

        rig.store.set_read_only(true);
        assert!(matches!(
            rig.engine.delete_binding(TrimFunction::Left),
            Err(MappingError::Store(_))
        ));
        assert!(rig.engine.list_bindings().get(TrimFunction::Left).is_some());
        assert!(matches!(rig.engine.clear_bindings(), Err(MappingError::Store(_))));
        assert_eq!(rig.engine.list_bindings().len(), 1);
        assert_eq!(rig.engine.status().bindings, 1);
        assert!(drain(&mut events).is_empty());
        assert_eq!(rig.store.stored().map(|t| t.len()), Some(1));

        rig.store.set_read_only(false);
        assert!(rig.engine.delete_binding(TrimFunction::Left).unwrap().is_some());
        assert!(rig.engine.list_bindings().is_empty());
    }

    #[test]
    fn status_watchers_see_every_mode_change() {
        let mut rig = rig();
        let mut status = rig.engine.watch_status();
        assert_eq!(status.borrow_and_update().mode, EngineMode::Idle);

        rig.engine.start_bind(TrimFunction::Right);
        assert!(status.has_changed().unwrap());
        assert_eq!(
            status.borrow_and_update().mode,
            EngineMode::Binding(TrimFunction::Right)
        );

        let stick = rig.stick.runtime_id();
        click(&mut rig, 2);
        let seen = status.borrow_and_update().clone();
        assert_eq!(seen.mode, EngineMode::Idle);
        assert_eq!((seen.bindings, seen.attached), (1, 1));
        assert_eq!(
            rig.engine.list_bindings().get(TrimFunction::Right).and_then(|b| b.runtime_id),
            Some(stick)
        );

        rig.engine.start_run();
        assert_eq!(status.borrow_and_update().mode, EngineMode::Running);
        rig.engine.stop_run();
        assert_eq!(status.borrow_and_update().mode, EngineMode::Idle);
        assert!(!status.has_changed().unwrap());
    }

    #[test]
    fn nudges_use_the_configured_step() {
        let mut rig = rig();
        assert_eq!(rig.engine.settings().step, 0.05);
        assert_eq!(rig.engine.settings().axis, AxisId::Rudder);

        rig.engine.start_bind(TrimFunction::Right);
        click(&mut rig, 3);
        rig.engine.start_run();
        click(&mut rig, 3);
        assert_eq!(rig.trim.calls(), vec![Call::Nudge(rig.engine.settings().step)]);
    }
}
