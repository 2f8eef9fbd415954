//! Plugins: components outside the chip which watch the pins and
//! the clock, and may drive the pins from outside.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use tracing::{event, Level};

use base::prelude::PIN_COUNT;

/// The state of one I/O pin as seen from outside the chip.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub enum PinState {
    /// Nothing drives the pin.
    Floating,
    OutputLo,
    OutputHi,
    /// The chip isn't driving the pin; something outside drives it low.
    InputLo,
    /// The chip isn't driving the pin; something outside drives it high.
    InputHi,
}

impl Display for PinState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PinState::Floating => "-",
            PinState::OutputLo => "0",
            PinState::OutputHi => "1",
            PinState::InputLo => "l",
            PinState::InputHi => "h",
        })
    }
}

/// The externally-driven side of the pins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinDriver {
    floating: u64,
    high: u64,
    changed: bool,
}

impl Default for PinDriver {
    fn default() -> PinDriver {
        PinDriver::new()
    }
}

impl PinDriver {
    /// All pins start undriven.
    #[must_use]
    pub fn new() -> PinDriver {
        PinDriver {
            floating: u64::MAX,
            high: 0,
            changed: false,
        }
    }

    /// Drives pin `pin` from outside the chip.  A floating pin reads
    /// as low.  Pin numbers are taken modulo 64.
    pub fn drive(&mut self, pin: u32, floating: bool, high: bool) {
        let mask = 1u64 << (pin & 63);
        let (old_floating, old_high) = (self.floating, self.high);
        if floating {
            self.floating |= mask;
            self.high &= !mask;
        } else {
            self.floating &= !mask;
            if high {
                self.high |= mask;
            } else {
                self.high &= !mask;
            }
        }
        if self.floating != old_floating || self.high != old_high {
            self.changed = true;
        }
    }

    /// Pins which are undriven from outside.
    #[must_use]
    pub fn floating(&self) -> u64 {
        self.floating
    }

    /// Pins driven high from outside.
    #[must_use]
    pub fn high(&self) -> u64 {
        self.high
    }

    /// Returns whether the external drive changed since the last
    /// call, and clears the flag.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }
}

/// Something attached to the chip's pins.
pub trait Plugin {
    /// Called once per system clock with the emulated time (in
    /// seconds) and the system counter.
    fn on_clock(&mut self, _time: f64, _counter: u32, _pins: &mut PinDriver) {}

    /// Called when the state of any pin may have changed.
    fn on_pin_change(&mut self, _time: f64, _pins: &[PinState; PIN_COUNT], _drive: &mut PinDriver) {
    }

    /// Called when the chip is reset.
    fn on_reset(&mut self) {}

    /// Called when the plugin is removed.
    fn on_close(&mut self) {}
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub struct PluginId(u32);

impl Display for PluginId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "plugin#{}", self.0)
    }
}

struct Attached {
    id: PluginId,
    wants_clock: bool,
    wants_pins: bool,
    plugin: Box<dyn Plugin>,
}

/// The plugins attached to a chip, in the order they were attached.
///
/// A plugin receives `on_reset` and `on_close` unconditionally, but
/// clock and pin-change notifications only once it has asked for
/// them.
#[derive(Default)]
pub struct PluginSet {
    next_id: u32,
    plugins: Vec<Attached>,
}

impl std::fmt::Debug for PluginSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.plugins.iter().map(|p| p.id))
            .finish()
    }
}

impl PluginSet {
    pub fn include(&mut self, plugin: Box<dyn Plugin>) -> PluginId {
        let id = PluginId(self.next_id);
        self.next_id += 1;
        event!(Level::DEBUG, "attaching {id}");
        self.plugins.push(Attached {
            id,
            wants_clock: false,
            wants_pins: false,
            plugin,
        });
        id
    }

    fn find(&mut self, id: PluginId) -> Option<&mut Attached> {
        self.plugins.iter_mut().find(|p| p.id == id)
    }

    /// Subscribes a plugin to clock notifications.  Returns false
    /// if there is no such plugin.
    pub fn subscribe_clock(&mut self, id: PluginId) -> bool {
        match self.find(id) {
            Some(p) => {
                p.wants_clock = true;
                true
            }
            None => false,
        }
    }

    /// Subscribes a plugin to pin-change notifications.  Returns
    /// false if there is no such plugin.
    pub fn subscribe_pins(&mut self, id: PluginId) -> bool {
        match self.find(id) {
            Some(p) => {
                p.wants_pins = true;
                true
            }
            None => false,
        }
    }

    /// Detaches a plugin, calling its `on_close`.  Returns false if
    /// there is no such plugin.
    pub fn remove(&mut self, id: PluginId) -> bool {
        match self.plugins.iter().position(|p| p.id == id) {
            Some(pos) => {
                let mut attached = self.plugins.remove(pos);
                event!(Level::DEBUG, "detaching {id}");
                attached.plugin.on_close();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn deliver_clock(&mut self, time: f64, counter: u32, drive: &mut PinDriver) {
        for p in self.plugins.iter_mut().filter(|p| p.wants_clock) {
            p.plugin.on_clock(time, counter, drive);
        }
    }

    pub fn deliver_pins(&mut self, time: f64, pins: &[PinState; PIN_COUNT], drive: &mut PinDriver) {
        for p in self.plugins.iter_mut().filter(|p| p.wants_pins) {
            p.plugin.on_pin_change(time, pins, drive);
        }
    }

    pub fn deliver_reset(&mut self) {
        for p in self.plugins.iter_mut() {
            p.plugin.on_reset();
        }
    }

    pub fn close_all(&mut self) {
        for mut p in self.plugins.drain(..) {
            event!(Level::DEBUG, "detaching {}", p.id);
            p.plugin.on_close();
        }
    }
}
