//! This crate emulates the Propeller P1: eight cogs sharing a hub,
//! each with its own counters, PLLs and video generator.
#![crate_name = "cpu"]

mod clock;
mod cog;
mod counter;
mod event;
mod fault;
mod hub;
mod memory;
mod pll;
mod propeller;
mod video;

pub use clock::{ClockSource, SystemXtal, DISABLED_INTERVAL};
pub use cog::{Cog, CogRunState, CogStatus, EngineKind, EngineStatus, FrameBreak, FrameFlag};
pub use counter::{CounterMode, FreqGenerator};
pub use event::{PinDriver, PinState, Plugin, PluginId, PluginSet};
pub use fault::{BinarySizeError, Fault, FaultKind};
pub use hub::{Hub, HubAction, HubOpResult, NONE_FREE};
pub use memory::{
    HubMemory, ANTILOG_TABLE_BASE, HUB_MEMORY_SIZE, HUB_RAM_SIZE, LOG_TABLE_BASE, SINE_TABLE_BASE,
};
pub use pll::{Pll, PllChannel, PllEdges, PllGroup, PLL_MAXIMUM_FREQUENCY, PLL_MINIMUM_FREQUENCY};
pub use propeller::{HubStatus, Propeller, STEP_INSTRUCTION_LIMIT};
pub use video::{VideoGenerator, VideoMode};
