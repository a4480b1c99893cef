//! Physical devices through gilrs
//!
//! Button indices are laid out per device as:
//!
//! ```text
//! 0            never pressed, doubles as the "no binding" index
//! 1..=15       gilrs named buttons in NAMED_BUTTONS order
//! 16..         raw codes gilrs reports as Button::Unknown
//! ```
//!
//! Yoke and stick buttons usually have no gamepad name, so they only show up
//! as `Button::Unknown` with a raw `Code`. On Linux the evdev joystick ranges
//! (BTN_TRIGGER..=BTN_DEAD and BTN_TRIGGER_HAPPY1..=40) map to fixed raw
//! slots so stored bindings survive restarts. Other raw codes take the next
//! free slot in the order they are first seen. The d-pad is reported as hat 0
//! instead of four buttons.

use super::backend::{DeviceInfo, HatDirection, InputBackend, RuntimeId};
use super::MonitorError;
use gilrs::ev::Code;
use gilrs::{Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use std::collections::HashMap;
use std::ops::RangeInclusive;
use tracing::{debug, error, info, warn};

pub const NAMED_BUTTONS: [Button; 15] = [
    Button::South,
    Button::East,
    Button::North,
    Button::West,
    Button::C,
    Button::Z,
    Button::LeftTrigger,
    Button::LeftTrigger2,
    Button::RightTrigger,
    Button::RightTrigger2,
    Button::Select,
    Button::Start,
    Button::Mode,
    Button::LeftThumb,
    Button::RightThumb,
];

const FIRST_RAW_SLOT: usize = 1 + NAMED_BUTTONS.len();

/// EV_KEY in the upper half of a Linux `Code::into_u32`.
const EVDEV_KEY_KIND: u32 = 0x01;
const EVDEV_JOYSTICK: RangeInclusive<u32> = 0x120..=0x12f;
const EVDEV_TRIGGER_HAPPY: RangeInclusive<u32> = 0x2c0..=0x2e7;

const FIXED_RAW_SLOTS: usize = 16 + 40;
const SPARE_RAW_SLOTS: usize = 16;

/// Total button indices every gilrs device reports.
pub const BUTTON_SLOTS: usize = FIRST_RAW_SLOT + FIXED_RAW_SLOTS + SPARE_RAW_SLOTS;

const HAT_COUNT: usize = 1;

/// Fixed slot for an evdev joystick key code, if it is one.
fn evdev_slot(raw: u32) -> Option<usize> {
    if raw >> 16 != EVDEV_KEY_KIND {
        return None;
    }
    let key = raw & 0xffff;
    let offset = if EVDEV_JOYSTICK.contains(&key) {
        key - EVDEV_JOYSTICK.start()
    } else if EVDEV_TRIGGER_HAPPY.contains(&key) {
        16 + key - EVDEV_TRIGGER_HAPPY.start()
    } else {
        return None;
    };
    Some(FIRST_RAW_SLOT + offset as usize)
}

/// Raw button codes of one device and the slots they were given
#[derive(Debug)]
struct RawButtons<C> {
    fixed_layout: bool,
    slots: HashMap<usize, C>,
    seen: HashMap<u32, usize>,
    next_spare: usize,
}

impl<C: Copy> RawButtons<C> {
    fn new(fixed_layout: bool) -> Self {
        Self {
            fixed_layout,
            slots: HashMap::new(),
            seen: HashMap::new(),
            next_spare: FIRST_RAW_SLOT + FIXED_RAW_SLOTS,
        }
    }

    /// Slot for `raw`, assigning one on first sight. `None` once the spare
    /// slots are used up.
    fn learn(&mut self, raw: u32, code: C) -> Option<usize> {
        if let Some(slot) = self.seen.get(&raw) {
            return Some(*slot);
        }
        let slot = match self.fixed_layout.then(|| evdev_slot(raw)).flatten() {
            Some(slot) => slot,
            None if self.next_spare < BUTTON_SLOTS => {
                self.next_spare += 1;
                self.next_spare - 1
            }
            None => return None,
        };
        self.seen.insert(raw, slot);
        self.slots.insert(slot, code);
        Some(slot)
    }

    fn code(&self, slot: usize) -> Option<C> {
        self.slots.get(&slot).copied()
    }
}

pub struct GilrsBackend {
    gilrs: Gilrs,
    // GamepadId has no public constructor, so remember the ones we handed out.
    ids: HashMap<RuntimeId, GamepadId>,
    raw: HashMap<RuntimeId, RawButtons<Code>>,
}

impl GilrsBackend {
    pub fn new() -> Result<Self, MonitorError> {
        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(MonitorError::Initialization(e.to_string()));
            }
        };

        let ids = gilrs
            .gamepads()
            .map(|(id, _)| (usize::from(id), id))
            .collect::<HashMap<_, _>>();
        info!("Found {} connected devices", ids.len());

        Ok(Self {
            gilrs,
            ids,
            raw: HashMap::new(),
        })
    }

    fn gamepad(&self, device: RuntimeId) -> Option<Gamepad<'_>> {
        let id = self.ids.get(&device)?;
        self.gilrs.connected_gamepad(*id)
    }

    fn learn_raw(&mut self, id: GamepadId, code: Code) {
        let device = usize::from(id);
        let raw = self
            .raw
            .entry(device)
            .or_insert_with(|| RawButtons::new(cfg!(target_os = "linux")));
        if raw.seen.contains_key(&code.into_u32()) {
            return;
        }
        match raw.learn(code.into_u32(), code) {
            Some(slot) => debug!("Device {}: raw button {} is index {}", id, code, slot),
            None => warn!("Device {}: no free index for raw button {}", id, code),
        }
    }
}

impl InputBackend for GilrsBackend {
    fn pump(&mut self) {
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            match event {
                EventType::Connected => {
                    info!("Device {} connected", id);
                    self.ids.insert(usize::from(id), id);
                }
                EventType::Disconnected => {
                    warn!("Device {} disconnected", id);
                    self.raw.remove(&usize::from(id));
                }
                EventType::ButtonPressed(Button::Unknown, code)
                | EventType::ButtonReleased(Button::Unknown, code)
                | EventType::ButtonChanged(Button::Unknown, _, code) => {
                    self.learn_raw(id, code);
                }
                _ => {}
            }
        }
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        self.gilrs
            .gamepads()
            .map(|(id, gamepad)| {
                debug!(
                    "Device {}: {} (UUID {:?})",
                    id,
                    gamepad.name(),
                    gamepad.uuid()
                );
                DeviceInfo {
                    name: gamepad.name().to_string(),
                    runtime_id: usize::from(id),
                    buttons: BUTTON_SLOTS,
                    hats: HAT_COUNT,
                }
            })
            .collect()
    }

    fn button(&self, device: RuntimeId, index: u8) -> Option<bool> {
        let gamepad = self.gamepad(device)?;
        let slot = usize::from(index);
        match slot {
            0 => Some(false),
            s if s < FIRST_RAW_SLOT => Some(gamepad.is_pressed(NAMED_BUTTONS[s - 1])),
            s if s < BUTTON_SLOTS => {
                let pressed = self
                    .raw
                    .get(&device)
                    .and_then(|raw| raw.code(s))
                    .and_then(|code| gamepad.state().button_data(code))
                    .is_some_and(|data| data.is_pressed());
                Some(pressed)
            }
            _ => None,
        }
    }

    fn hat(&self, device: RuntimeId, index: u8) -> Option<HatDirection> {
        if usize::from(index) >= HAT_COUNT {
            return None;
        }
        let gamepad = self.gamepad(device)?;
        let axis = |positive: Button, negative: Button| {
            i8::from(gamepad.is_pressed(positive)) - i8::from(gamepad.is_pressed(negative))
        };
        Some(HatDirection::new(
            axis(Button::DPadRight, Button::DPadLeft),
            axis(Button::DPadUp, Button::DPadDown),
        ))
    }
}
