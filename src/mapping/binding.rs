//! Bindings between physical controls and trim functions

use super::MappingError;
use crate::controller::backend::{HatDirection, RuntimeId};
use crate::controller::event_monitor::RawInputEvent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The functions a control can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrimFunction {
    #[serde(rename = "Trim Set")]
    Set,
    #[serde(rename = "Trim Release")]
    Release,
    #[serde(rename = "Trim Left")]
    Left,
    #[serde(rename = "Trim Right")]
    Right,
}

impl TrimFunction {
    pub const ALL: [TrimFunction; 4] = [
        TrimFunction::Set,
        TrimFunction::Release,
        TrimFunction::Left,
        TrimFunction::Right,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TrimFunction::Set => "Trim Set",
            TrimFunction::Release => "Trim Release",
            TrimFunction::Left => "Trim Left",
            TrimFunction::Right => "Trim Right",
        }
    }
}

impl fmt::Display for TrimFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TrimFunction {
    type Err = MappingError;

    /// Accepts the label ("Trim Left") and short forms ("left", "trim-left").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        let short = normalized.strip_prefix("trim").unwrap_or(&normalized);
        match short {
            "set" => Ok(TrimFunction::Set),
            "release" => Ok(TrimFunction::Release),
            "left" => Ok(TrimFunction::Left),
            "right" => Ok(TrimFunction::Right),
            _ => Err(MappingError::UnknownFunction(s.to_string())),
        }
    }
}

/// One physical control on a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Control {
    Button { index: u8 },
    Pov { hat: u8, direction: HatDirection },
}

impl Control {
    /// Button 0 and a centered hat mean "nothing pressed" and never bind.
    pub fn is_neutral(&self) -> bool {
        match self {
            Control::Button { index } => *index == 0,
            Control::Pov { direction, .. } => direction.is_centered(),
        }
    }

    /// The control an event refers to. Releases carry no control.
    pub fn from_event(event: &RawInputEvent) -> Option<Control> {
        match event {
            RawInputEvent::ButtonEdge {
                button,
                pressed: true,
                ..
            } => Some(Control::Button { index: *button }),
            RawInputEvent::ButtonEdge { pressed: false, .. } => None,
            RawInputEvent::HatChange { hat, direction, .. } => Some(Control::Pov {
                hat: *hat,
                direction: *direction,
            }),
        }
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Control::Button { index } => write!(f, "Button {}", index),
            Control::Pov { hat, direction } => write!(f, "POV {} {}", hat, direction),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub function: TrimFunction,
    pub device_name: String,
    /// Rewritten on every load; never stored.
    #[serde(skip)]
    pub runtime_id: Option<RuntimeId>,
    pub control: Control,
}

impl Binding {
    pub fn is_attached(&self) -> bool {
        self.runtime_id.is_some()
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", self.function, self.device_name, self.control)?;
        match self.runtime_id {
            Some(id) => write!(f, " [device {}]", id),
            None => write!(f, " [detached]"),
        }
    }
}

// Persisted shape: one `[[binding]]` table per entry.
#[derive(Debug, Default, Serialize, Deserialize)]
struct BindingDocument {
    #[serde(default, rename = "binding")]
    bindings: Vec<Binding>,
}

/// Function → binding map, the unit that gets persisted
///
/// No two entries share `(device_name, control)`; [`BindingTable::insert`]
/// evicts whatever held the control before.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BindingDocument", into = "BindingDocument")]
pub struct BindingTable {
    entries: BTreeMap<TrimFunction, Binding>,
}

impl From<BindingDocument> for BindingTable {
    fn from(document: BindingDocument) -> Self {
        let mut table = BindingTable::default();
        for binding in document.bindings {
            table.insert(binding);
        }
        table
    }
}

impl From<BindingTable> for BindingDocument {
    fn from(table: BindingTable) -> Self {
        BindingDocument {
            bindings: table.entries.into_values().collect(),
        }
    }
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `binding` and returns the functions that lost their control
    /// to it.
    pub fn insert(&mut self, binding: Binding) -> Vec<TrimFunction> {
        let evicted: Vec<TrimFunction> = self
            .entries
            .values()
            .filter(|existing| {
                existing.function != binding.function
                    && existing.device_name == binding.device_name
                    && existing.control == binding.control
            })
            .map(|existing| existing.function)
            .collect();
        for function in &evicted {
            self.entries.remove(function);
        }
        self.entries.insert(binding.function, binding);
        evicted
    }

    pub fn remove(&mut self, function: TrimFunction) -> Option<Binding> {
        self.entries.remove(&function)
    }

    pub fn get(&self, function: TrimFunction) -> Option<&Binding> {
        self.entries.get(&function)
    }

    /// Function bound to `control` on the device currently holding
    /// `runtime_id`. Detached bindings never match.
    pub fn lookup(&self, runtime_id: RuntimeId, control: &Control) -> Option<TrimFunction> {
        self.entries
            .values()
            .find(|b| b.runtime_id == Some(runtime_id) && b.control == *control)
            .map(|b| b.function)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.entries.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Binding> {
        self.entries.values_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
