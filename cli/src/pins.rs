use std::io::Write;

use termcolor::{self, ColorChoice, ColorSpec, StandardStream, WriteColor};
use tracing::{event, Level};

use base::prelude::PIN_COUNT;
use cpu::{PinDriver, PinState, Plugin};

/// Prints the state of all 64 pins each time any of them changes,
/// pin 63 first.
pub struct PinPrinter {
    stream: StandardStream,
    last: Option<[PinState; PIN_COUNT]>,
}

fn get_colour_choice() -> ColorChoice {
    if atty::is(atty::Stream::Stdout) {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

fn colour_of(state: PinState) -> ColorSpec {
    let mut spec = ColorSpec::new();
    match state {
        PinState::Floating => {
            spec.set_dimmed(true);
        }
        PinState::OutputHi => {
            spec.set_fg(Some(termcolor::Color::Green)).set_bold(true);
        }
        PinState::OutputLo => {
            spec.set_fg(Some(termcolor::Color::Green));
        }
        PinState::InputHi => {
            spec.set_fg(Some(termcolor::Color::Yellow)).set_bold(true);
        }
        PinState::InputLo => {
            spec.set_fg(Some(termcolor::Color::Yellow));
        }
    }
    spec
}

impl PinPrinter {
    pub fn new() -> PinPrinter {
        PinPrinter {
            stream: StandardStream::stdout(get_colour_choice()),
            last: None,
        }
    }

    fn write_line(&mut self, time: f64, pins: &[PinState; PIN_COUNT]) -> Result<(), std::io::Error> {
        write!(self.stream, "{:>14.9}s ", time)?;
        let mut current: Option<PinState> = None;
        for (i, state) in pins.iter().enumerate().rev() {
            if current != Some(*state) {
                self.stream.set_color(&colour_of(*state))?;
                current = Some(*state);
            }
            write!(self.stream, "{state}")?;
            if i % 8 == 0 && i != 0 {
                self.stream.reset()?;
                current = None;
                write!(self.stream, " ")?;
            }
        }
        self.stream.reset()?;
        writeln!(self.stream)
    }
}

impl Plugin for PinPrinter {
    fn on_pin_change(&mut self, time: f64, pins: &[PinState; PIN_COUNT], _drive: &mut PinDriver) {
        if self.last.as_ref() == Some(pins) {
            return;
        }
        self.last = Some(*pins);
        if let Err(e) = self.write_line(time, pins) {
            event!(Level::ERROR, "Failed to print pin states: {}", e);
        }
    }

    fn on_close(&mut self) {
        if let Err(e) = self.stream.flush() {
            event!(Level::ERROR, "Failed to flush output: {}", e);
        }
    }
}
