//! The cog video generator.
//!
//! WAITVID hands the generator a long of colors and a long of
//! pixels.  The generator then shifts out one pixel per
//! `PixelClocks` rising edges of its cog's PLL A, for `FrameClocks`
//! edges in total (both come from VSCL).  Each pixel selects one of
//! the color bytes, which is driven onto a group of 8 pins either
//! directly (VGA mode) or mixed with a chroma phase, a broadcast
//! carrier (PLL B) and an aural subcarrier (some cog's PLL A) in
//! the composite modes.
use serde::Serialize;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize)]
pub enum VideoMode {
    Disabled,
    Vga,
    /// Baseband on the low nibble, broadcast on the high nibble.
    Composite1,
    /// Broadcast on the low nibble, baseband on the high nibble.
    Composite2,
}

impl VideoMode {
    #[must_use]
    pub fn from_vcfg(vcfg: u32) -> VideoMode {
        match vcfg & 0x6000_0000 {
            0x0000_0000 => VideoMode::Disabled,
            0x2000_0000 => VideoMode::Vga,
            0x4000_0000 => VideoMode::Composite1,
            _ => VideoMode::Composite2,
        }
    }

    fn is_composite(self) -> bool {
        matches!(self, VideoMode::Composite1 | VideoMode::Composite2)
    }
}

#[derive(Debug, Clone)]
pub struct VideoGenerator {
    config: u32,
    scale: u32,
    scale_dirty: bool,
    pixel_clock_start: u32,
    pixel_clocks: u32,
    frame_clocks: u32,

    mode: VideoMode,
    four_color: bool,
    chroma_baseband: bool,
    chroma_broadcast: bool,
    aural_select: usize,
    aural_source: Option<usize>,
    pin_group: u32,
    pin_mask: u64,

    pixel_load: u32,
    color_load: u32,
    shift_out: u32,
    phase: u8,
    carrier: bool,
    aural: bool,
    output_load: u64,
    broadcast_up: u64,
    broadcast_down: u64,
    baseband_out: u64,
    aural_bit: u64,

    frames: u64,
}

impl Default for VideoGenerator {
    fn default() -> VideoGenerator {
        VideoGenerator::new()
    }
}

impl VideoGenerator {
    #[must_use]
    pub fn new() -> VideoGenerator {
        VideoGenerator {
            config: 0,
            scale: 0,
            scale_dirty: true,
            pixel_clock_start: 0,
            pixel_clocks: 0,
            frame_clocks: 0,
            mode: VideoMode::Disabled,
            four_color: false,
            chroma_baseband: false,
            chroma_broadcast: false,
            aural_select: 0,
            aural_source: None,
            pin_group: 0,
            pin_mask: 0,
            pixel_load: 0,
            color_load: 0,
            shift_out: 0,
            phase: 0,
            carrier: false,
            aural: false,
            output_load: 0,
            broadcast_up: 0,
            broadcast_down: 0,
            baseband_out: 0,
            aural_bit: 0,
            frames: 0,
        }
    }

    /// The VCFG register.
    #[must_use]
    pub fn cfg(&self) -> u32 {
        self.config
    }

    /// Writes VCFG.  `running_cogs` has bit `n` set when cog `n` is
    /// running; the generator only subscribes to the aural
    /// subcarrier of a cog which exists.
    pub fn set_cfg(&mut self, value: u32, running_cogs: u8) {
        self.config = value;
        self.mode = VideoMode::from_vcfg(value);
        self.four_color = value & 0x1000_0000 != 0;
        self.chroma_baseband = value & 0x0400_0000 != 0;
        self.chroma_broadcast = value & 0x0800_0000 != 0;
        self.aural_select = ((value >> 23) & 7) as usize;
        self.pin_group = (value >> 6) & 0x38;
        self.pin_mask = u64::from(value & 0xFF) << self.pin_group;
        self.aural_source = if running_cogs & (1 << self.aural_select) != 0 {
            Some(self.aural_select)
        } else {
            None
        };
    }

    /// The VSCL register.
    #[must_use]
    pub fn scl(&self) -> u32 {
        self.scale
    }

    /// Writes VSCL.  A new pixel clock count takes effect at the
    /// start of the next frame.
    pub fn set_scl(&mut self, value: u32) {
        if self.scale != value {
            self.scale_dirty = true;
            self.scale = value;
        }
    }

    #[must_use]
    pub fn mode(&self) -> VideoMode {
        self.mode
    }

    /// The cog whose PLL A edges drive this generator's aural
    /// subcarrier.
    #[must_use]
    pub fn aural_source(&self) -> Option<usize> {
        self.aural_source
    }

    /// Stops listening to the aural subcarrier of cog `cog` (which
    /// is being stopped).
    pub fn detach_aural(&mut self, cog: usize) {
        if self.aural_source == Some(cog) {
            self.aural_source = None;
        }
    }

    /// True when the current frame is finished and the generator is
    /// waiting for more data.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.frame_clocks == 0
    }

    /// Number of frames completed since the cog started.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Pins driven high by the generator.
    #[must_use]
    pub fn output(&self) -> u64 {
        self.output_load & self.pin_mask
    }

    /// Starts a new frame with the given colors and pixels.
    pub fn feed(&mut self, colors: u32, pixels: u32) {
        self.color_load = colors;
        self.pixel_load = pixels;
        if self.scale_dirty {
            self.pixel_clock_start = (self.scale >> 12) & 0xFF;
            self.scale_dirty = false;
        }
        // A zero count in VSCL stands for the largest value.
        self.frame_clocks = match self.scale & 0xFFF {
            0 => 0x1000,
            n => n,
        };
        // The first pixel goes out on the first clock.
        self.pixel_clocks = 1;
    }

    fn fill_composite(&mut self, color: u32) {
        let mut baseband = u64::from(color & 7);
        let mut broadcast = baseband;
        if color & 8 != 0 {
            let shifted_phase = (u64::from(self.phase) + u64::from(color)) & 0x80;
            if self.chroma_baseband {
                baseband = if shifted_phase != 0 {
                    (baseband + 1) & 7
                } else {
                    baseband.wrapping_sub(1) & 7
                };
            }
            baseband |= shifted_phase >> 4;
            if self.chroma_broadcast {
                broadcast = if shifted_phase != 0 {
                    (broadcast + 1) & 7
                } else {
                    broadcast.wrapping_sub(1) & 7
                };
            }
        }
        self.baseband_out = baseband << self.pin_group;
        self.broadcast_up = (7 - (broadcast >> 1)) << self.pin_group;
        self.broadcast_down = ((broadcast + 1) >> 1) << self.pin_group;
    }

    fn update_composite_output(&mut self) {
        if !self.mode.is_composite() {
            return;
        }
        self.output_load = self.baseband_out
            | if self.carrier {
                self.broadcast_up
            } else {
                self.broadcast_down
            };
        if self.aural ^ self.carrier {
            self.output_load |= self.aural_bit;
        }
    }

    /// An edge of the aural subcarrier PLL.
    pub fn aural_tick(&mut self, level: bool) {
        self.aural = level;
        self.update_composite_output();
    }

    /// An edge of this cog's PLL B (the broadcast carrier).
    pub fn carrier_tick(&mut self, level: bool) {
        self.carrier = level;
        self.update_composite_output();
    }

    /// An edge of this cog's PLL A (the pixel clock).  Returns true
    /// when this edge completed a frame.
    pub fn color_tick(&mut self, level: bool) -> bool {
        if !level || self.frame_clocks == 0 {
            return false;
        }
        self.frame_clocks -= 1;
        let frame_done = self.frame_clocks == 0;
        if frame_done {
            self.frames += 1;
        }

        if self.mode == VideoMode::Disabled {
            self.output_load = 0;
            return frame_done;
        }

        self.pixel_clocks = self.pixel_clocks.saturating_sub(1);
        if self.pixel_clocks == 0 {
            if self.four_color {
                self.shift_out = (self.color_load >> ((self.pixel_load & 3) << 3)) & 0xFF;
                self.pixel_load >>= 2;
            } else {
                self.shift_out = (self.color_load >> ((self.pixel_load & 1) << 3)) & 0xFF;
                self.pixel_load >>= 1;
            }
            self.pixel_clocks = match self.pixel_clock_start {
                0 => 0x100,
                n => n,
            };
        }

        match self.mode {
            VideoMode::Vga => {
                self.output_load = u64::from(self.shift_out) << self.pin_group;
            }
            VideoMode::Composite1 => {
                self.fill_composite(self.shift_out);
                self.broadcast_up <<= 4;
                self.broadcast_down <<= 4;
                self.aural_bit = 0x80 << self.pin_group;
                self.update_composite_output();
            }
            VideoMode::Composite2 => {
                self.fill_composite(self.shift_out);
                self.baseband_out <<= 4;
                self.aural_bit = 0x08 << self.pin_group;
                self.update_composite_output();
            }
            VideoMode::Disabled => (),
        }

        self.phase = self.phase.wrapping_add(0x10);
        frame_done
    }
}
