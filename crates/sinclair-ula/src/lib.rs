//! Standard Sinclair ULA (Uncommitted Logic Array).
//!
//! The ULA handles video generation, memory contention, keyboard I/O, border
//! colour, and the beeper. This module covers the video and contention aspects;
//! keyboard and beeper are separate concerns wired through the system bus.
//!
//! # Standalone IC
//!
//! This crate has no dependencies — the ULA accesses VRAM through closures
//! passed by the caller, keeping it decoupled from any particular memory model.
//!
//! # Timing (48K PAL)
//!
//! - 448 pixel clocks per line (= 224 CPU T-states x 2)
//! - 312 lines per frame
//! - 139,776 pixel clocks per frame (= 69,888 CPU T-states)
//! - INT asserted for first 64 pixel clocks of frame (= 32 CPU T-states)
//!
//! The ULA is ticked at the 7 MHz pixel clock (once per pixel). All internal
//! state counts in pixel clocks. The methods `tstates_per_line()` and
//! `lines_per_frame()` report in CPU T-states for frame length calculations.
//!
//! # Framebuffer
//!
//! 320x288 pixels: 256 active + 32 left border + 32 right border horizontally,
//! 192 active + 48 top border + 48 bottom border vertically.
//!
//! # Screen memory layout
//!
//! Bitmap at $4000-$57FF (6144 bytes), attributes at $5800-$5AFF (768 bytes).
//! Bitmap address: `010Y7 Y6Y2 Y1Y0 Y5Y4Y3 X4X3X2X1X0`
//! Attribute address: `0101 10Y7 Y6Y5 Y4Y3 X4X3X2X1X0`
//!
//! # Contention
//!
//! During screen fetch (lines 64-255, T-states 0-127), the ULA contends
//! memory access. Pattern repeats every 8 T-states: `[6, 5, 4, 3, 2, 1, 0, 0]`.
//! Contention is reported in CPU T-states, using the pixel clock position
//! divided by 2 to derive the CPU T-state.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)] // Intentional: u16->i16 for contention offset arithmetic.
#![allow(clippy::cast_sign_loss)] // Intentional: i16->usize after bounds-checking.

mod palette;

pub use palette::PALETTE;

/// Framebuffer dimensions.
pub const FB_WIDTH: u32 = 320;
pub const FB_HEIGHT: u32 = 288;

/// Display area within the framebuffer.
const BORDER_LEFT: u32 = 32;
const SCREEN_WIDTH: u32 = 256;
const SCREEN_HEIGHT: u32 = 192;

/// Pixel clocks per line (448 = 224 T-states x 2).
const PIXELS_PER_LINE: u16 = 448;
/// Lines per frame.
const LINES_PER_FRAME: u16 = 312;
/// CPU T-states per line (224).
const TSTATES_PER_LINE: u16 = 224;

/// INT is asserted for the first 64 pixel clocks (= 32 CPU T-states).
const INT_LENGTH_PIXELS: u16 = 64;

/// First screen line (after top border). Line 0 is the start of the frame,
/// which begins at the top of the vertical retrace. The top border starts
/// at line 64 - 48 = 16 and the screen area starts at line 64.
const FIRST_SCREEN_LINE: u16 = 64;

/// Contention area in CPU T-states: 0-127.
const CONTENTION_END_TSTATE: u16 = 128;

/// Contention delay pattern for the 48K-family ULA (repeats every 8 T-states).
const CONTENTION_PATTERN_48K: [u8; 8] = [6, 5, 4, 3, 2, 1, 0, 0];

/// Contention delay pattern for the 128K/+2/+2A/+3-family ULA. Same shape as
/// the 48K pattern but the whole window starts one T-state later, since the
/// 128K ULA's internal ALU access falls on a different phase of the shared
/// bus cycle.
const CONTENTION_PATTERN_128K: [u8; 8] = [0, 6, 5, 4, 3, 2, 1, 0];

/// Number of frames between FLASH toggles.
const FLASH_FRAME_COUNT: u8 = 16;

/// Which machine variant's contention timing this ULA instance reproduces.
///
/// The 128K/+2/+2A/+3 family shares the same video timing as the 48K but its
/// ULA asserts contention one T-state later ("Pattern A" vs "Pattern B").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentionVariant {
    #[default]
    Standard48K,
    Standard128K,
}

impl ContentionVariant {
    fn pattern(self) -> [u8; 8] {
        match self {
            ContentionVariant::Standard48K => CONTENTION_PATTERN_48K,
            ContentionVariant::Standard128K => CONTENTION_PATTERN_128K,
        }
    }
}

/// Standard Sinclair ULA.
pub struct Ula {
    variant: ContentionVariant,
    /// Current scanline (0 = start of frame).
    line: u16,
    /// Current pixel clock within the line (0-447).
    pixel: u16,
    /// Frame complete flag, auto-clears on read.
    frame_complete: bool,
    /// Current border colour (0-7).
    border: u8,
    /// FLASH state: false = normal, true = inverted.
    flash_state: bool,
    /// Frame counter for FLASH timing.
    flash_counter: u8,
    /// ARGB32 framebuffer.
    framebuffer: Vec<u32>,
    /// Snow effect: when the CPU reads display memory during a ULA fetch
    /// phase, the data bus conflict causes the ULA to use the CPU's byte
    /// instead of its own VRAM fetch for the next bitmap read.
    snow_byte: Option<u8>,
}

impl Ula {
    #[must_use]
    pub fn new() -> Self {
        Self::with_variant(ContentionVariant::Standard48K)
    }

    /// Construct a ULA reproducing a specific machine variant's contention
    /// timing.
    #[must_use]
    pub fn with_variant(variant: ContentionVariant) -> Self {
        Self {
            variant,
            line: 0,
            pixel: 0,
            frame_complete: false,
            border: 7, // White border on power-up
            flash_state: false,
            flash_counter: 0,
            framebuffer: vec![0xFF00_0000; (FB_WIDTH * FB_HEIGHT) as usize],
            snow_byte: None,
        }
    }

    /// Advance the ULA by one pixel clock tick (7 MHz).
    ///
    /// `read_vram` reads a byte from the Spectrum's VRAM without side effects.
    /// It is only called during the active display area for bitmap/attribute
    /// fetches.
    pub fn tick(&mut self, read_vram: impl Fn(u16) -> u8) {
        self.render_pixel(&read_vram);

        // Advance beam position (pixel clock)
        self.pixel += 1;
        if self.pixel >= PIXELS_PER_LINE {
            self.pixel = 0;
            self.line += 1;
            if self.line >= LINES_PER_FRAME {
                self.line = 0;
                self.frame_complete = true;
                self.flash_counter += 1;
                if self.flash_counter >= FLASH_FRAME_COUNT {
                    self.flash_counter = 0;
                    self.flash_state = !self.flash_state;
                }
            }
        }
    }

    /// Return contention wait states for a memory access at the current beam
    /// position. `contended` is true when the address falls in contended RAM.
    #[must_use]
    pub fn contention(&self, contended: bool) -> u8 {
        if !contended || !self.in_contention_area() {
            return 0;
        }
        // The CPU's memory access happens at T2. Offset backwards by 2 T-states.
        let offset = self.tstate() as i16 - 2;
        self.contention_delay_at(offset)
    }

    /// Return contention wait states for an I/O access at the current beam
    /// position.
    ///
    /// `ula_port` is true when the port address has bit 0 clear (ULA port).
    /// `contended_high` is true when the high byte of the port address falls
    /// in contended RAM ($4000-$7FFF).
    #[must_use]
    pub fn io_contention(&self, ula_port: bool, contended_high: bool) -> u8 {
        if !self.in_contention_area() {
            return 0;
        }

        // The I/O cycle is 4 T-states. Contention depends on two factors:
        //   1. Whether the high byte of the port address is in $4000-$7FFF (contended)
        //   2. Whether the port is even (ULA port, bit 0 clear)
        //
        // Four cases, with per-T-state contention applied at the *start* of the
        // I/O operation (T-state offset -1 from the I/O read/write at T3):
        //
        // | High $40-$7F? | Even (ULA)? | Pattern                        |
        // |---------------|-------------|--------------------------------|
        // | No            | Yes         | N:1, C:3                       |
        // | No            | No          | N:4 (no contention)            |
        // | Yes           | Yes         | C:1, C:3                       |
        // | Yes           | No          | C:1, C:1, C:1, C:1            |
        //
        // "N" means no contention applied for that T-state.
        // "C:n" means apply contention at the current beam position, then advance
        //   n T-states before the next contention check.
        //
        // We sum the total contention and apply it all at once.
        let base_offset = self.tstate() as i16 - 1;

        match (contended_high, ula_port) {
            (false, false) => {
                // N:4 -- no contention at all
                0
            }
            (false, true) => {
                // N:1, C:3 -- skip 1, then contend at offset+1
                self.contention_delay_at(base_offset + 1)
            }
            (true, true) => {
                // C:1, C:3 -- contend at offset, skip 1, contend at offset+1+delay0
                let delay0 = self.contention_delay_at(base_offset);
                let delay1 = self.contention_delay_at(base_offset + 1 + i16::from(delay0));
                delay0 + delay1
            }
            (true, false) => {
                // C:1, C:1, C:1, C:1 -- four contention checks at 1-T-state intervals
                let d0 = self.contention_delay_at(base_offset);
                let d1 = self.contention_delay_at(base_offset + 1 + i16::from(d0));
                let d2 =
                    self.contention_delay_at(base_offset + 2 + i16::from(d0) + i16::from(d1));
                let d3 = self.contention_delay_at(
                    base_offset + 3 + i16::from(d0) + i16::from(d1) + i16::from(d2),
                );
                d0 + d1 + d2 + d3
            }
        }
    }

    /// Is the INT signal currently asserted?
    #[must_use]
    pub fn int_active(&self) -> bool {
        self.line == 0 && self.pixel < INT_LENGTH_PIXELS
    }

    /// Has the frame completed? Auto-clears on read.
    pub fn take_frame_complete(&mut self) -> bool {
        let result = self.frame_complete;
        self.frame_complete = false;
        result
    }

    /// Total T-states per scanline (224 for all known Sinclair/Timex variants).
    #[must_use]
    pub fn tstates_per_line(&self) -> u16 {
        TSTATES_PER_LINE
    }

    /// Total scanlines per frame (312 for Sinclair/Timex/Scorpion, 320 for Pentagon).
    #[must_use]
    pub fn lines_per_frame(&self) -> u16 {
        LINES_PER_FRAME
    }

    /// Current scanline (0-based).
    #[must_use]
    pub fn line(&self) -> u16 {
        self.line
    }

    /// Current T-state within the current scanline.
    #[must_use]
    pub fn line_tstate(&self) -> u16 {
        self.tstate()
    }

    /// Reference to the framebuffer (ARGB32).
    #[must_use]
    pub fn framebuffer(&self) -> &[u32] {
        &self.framebuffer
    }

    /// Framebuffer width in pixels.
    #[must_use]
    pub fn framebuffer_width(&self) -> u32 {
        FB_WIDTH
    }

    /// Framebuffer height in pixels.
    #[must_use]
    pub fn framebuffer_height(&self) -> u32 {
        FB_HEIGHT
    }

    /// Current border colour index (0-7).
    #[must_use]
    pub fn border_colour(&self) -> u8 {
        self.border
    }

    /// Set border colour (from port $FE write).
    pub fn set_border_colour(&mut self, colour: u8) {
        self.border = colour & 0x07;
    }

    /// Is the ULA currently fetching screen data (bitmap or attribute)?
    ///
    /// True during the active screen area (lines 64-255) in the first 4
    /// T-states of each 8-T-state fetch group (phases 0-3). A CPU read from
    /// display memory during this window causes the "snow" effect.
    #[must_use]
    pub fn is_screen_fetch_phase(&self) -> bool {
        self.in_contention_area() && (self.tstate() % 8) < 4
    }

    /// Position the ULA at a specific line and T-state (for testing).
    #[doc(hidden)]
    pub fn set_position(&mut self, line: u16, tstate: u16) {
        self.line = line;
        self.pixel = tstate * 2;
    }

    /// Check whether a snow byte is pending (for testing).
    #[doc(hidden)]
    #[must_use]
    pub fn has_snow_byte(&self) -> bool {
        self.snow_byte.is_some()
    }

    /// Inject a snow byte from a bus conflict.
    ///
    /// When the CPU reads display memory ($4000-$5AFF) during a ULA fetch
    /// phase, the shared data bus causes the ULA to latch the CPU's byte.
    /// The next bitmap fetch renders this byte instead of VRAM contents.
    pub fn set_snow_byte(&mut self, byte: u8) {
        self.snow_byte = Some(byte);
    }

    /// Return the floating bus value at the current beam position.
    ///
    /// On a real 48K, unattached port reads leak the ULA's data bus through
    /// 470-ohm resistors. The value depends on what the ULA is fetching:
    ///   T+0: bitmap byte, T+1: attribute byte,
    ///   T+2: bitmap+1 byte, T+3: attribute+1 byte,
    ///   T+4..T+7: $FF (idle).
    /// During border/vblank, returns $FF.
    #[must_use]
    pub fn floating_bus(&self, read_vram: impl Fn(u16) -> u8) -> u8 {
        // Only during the screen area (lines 64-255, T-states 0-127)
        if !self.in_contention_area() {
            return 0xFF;
        }

        let tstate = self.tstate();
        let phase = tstate % 8;

        // ULA fetch pattern within each 8-T-state group:
        //   T+0: bitmap, T+1: attribute, T+2: bitmap+1, T+3: attribute+1
        //   T+4..T+7: idle ($FF)
        if phase >= 4 {
            return 0xFF;
        }

        // Calculate the character column from the T-state.
        // Each 8-T-state group handles 2 character columns (8 pixels = 1 byte x 2).
        let char_col_base = (tstate / 8) * 2;
        let screen_y = (self.line - FIRST_SCREEN_LINE) as u8;

        match phase {
            0 => {
                // Bitmap byte for current column
                Self::bitmap_addr(screen_y, char_col_base as u8)
                    .map_or(0xFF, &read_vram)
            }
            1 => {
                // Attribute byte for current column
                Self::attr_addr(screen_y, char_col_base as u8)
                    .map_or(0xFF, &read_vram)
            }
            2 => {
                // Bitmap byte for next column
                let col = char_col_base + 1;
                if col >= 32 {
                    return 0xFF;
                }
                Self::bitmap_addr(screen_y, col as u8).map_or(0xFF, &read_vram)
            }
            3 => {
                // Attribute byte for next column
                let col = char_col_base + 1;
                if col >= 32 {
                    return 0xFF;
                }
                Self::attr_addr(screen_y, col as u8).map_or(0xFF, &read_vram)
            }
            _ => 0xFF,
        }
    }

    // === Internal helpers ===

    /// Current CPU T-state within the line (pixel / 2).
    fn tstate(&self) -> u16 {
        self.pixel / 2
    }

    /// Render one pixel for the current beam position.
    fn render_pixel(&mut self, read_vram: &impl Fn(u16) -> u8) {
        let line = self.line;
        let pixel = self.pixel;

        // Map the current pixel clock to a framebuffer x coordinate.
        //
        // ULA horizontal timing (in pixel clocks, 448 total):
        //   Pixels   0-255: screen fetch area (256 pixels)
        //   Pixels 256-287: right border (32 pixels)
        //   Pixels 288-415: horizontal retrace (not visible)
        //   Pixels 416-447: left border (32 pixels)
        let (fb_x, in_screen_area) = if pixel < 256 {
            // Screen area
            (BORDER_LEFT + u32::from(pixel), true)
        } else if pixel < 288 {
            // Right border
            (BORDER_LEFT + SCREEN_WIDTH + u32::from(pixel - 256), false)
        } else if pixel >= 416 {
            // Left border
            (u32::from(pixel - 416), false)
        } else {
            // Horizontal retrace -- not visible
            return;
        };

        // Map the current line to a framebuffer y coordinate.
        // Lines 16-63: top border -> fb_y 0..48
        // Lines 64-255: screen -> fb_y 48..240
        // Lines 256-303: bottom border -> fb_y 240..288
        // Lines 304-311: vertical retrace (not visible)
        // Lines 0-15: vertical sync / not visible
        let fb_y = if (16..304).contains(&line) {
            u32::from(line - 16)
        } else {
            return;
        };

        if fb_y >= FB_HEIGHT {
            return;
        }

        // Is this pixel in the active screen area?
        let in_screen = in_screen_area
            && line >= FIRST_SCREEN_LINE
            && line < FIRST_SCREEN_LINE + SCREEN_HEIGHT as u16;

        if in_screen {
            self.render_screen_pixel(read_vram, fb_x, fb_y, line, pixel);
        } else {
            self.render_border_pixel(fb_x, fb_y);
        }
    }

    /// Render 1 screen pixel.
    fn render_screen_pixel(
        &mut self,
        read_vram: &impl Fn(u16) -> u8,
        fb_x: u32,
        fb_y: u32,
        line: u16,
        pixel: u16,
    ) {
        let screen_y = (line - FIRST_SCREEN_LINE) as u8;
        let pixel_x = pixel as u8; // 0-255 within the screen area

        // Which character column (0-31) and pixel within byte (0-7)?
        let char_col = pixel_x / 8;
        let bit_pos = 7 - (pixel_x % 8);

        // Bitmap address: 010Y7 Y6Y2 Y1Y0 Y5Y4Y3 X4X3X2X1X0
        let y7y6 = (screen_y >> 6) & 0x03;
        let y5y4y3 = (screen_y >> 3) & 0x07;
        let y2y1y0 = screen_y & 0x07;
        let bitmap_addr: u16 = 0x4000
            | (u16::from(y7y6) << 11)
            | (u16::from(y2y1y0) << 8)
            | (u16::from(y5y4y3) << 5)
            | u16::from(char_col);

        // Attribute address: 0101 10Y7 Y6Y5 Y4Y3 X4X3X2X1X0
        let attr_addr: u16 = 0x5800 | (u16::from(screen_y / 8) << 5) | u16::from(char_col);

        // Snow effect: if a bus conflict injected a byte, use it instead of
        // the VRAM bitmap fetch. The attribute byte is unaffected.
        let bitmap = if let Some(snow) = self.snow_byte.take() {
            snow
        } else {
            read_vram(bitmap_addr)
        };
        let attr = read_vram(attr_addr);

        // Decode attribute byte: FBPPPIII
        let flash = attr & 0x80 != 0;
        let bright = attr & 0x40 != 0;
        let paper = (attr >> 3) & 0x07;
        let ink = attr & 0x07;

        let (fg, bg) = if flash && self.flash_state {
            (paper, ink)
        } else {
            (ink, paper)
        };

        let bright_offset: u8 = if bright { 8 } else { 0 };
        let fg_colour = PALETTE[(fg + bright_offset) as usize];
        let bg_colour = PALETTE[(bg + bright_offset) as usize];

        let colour = if bitmap & (1 << bit_pos) != 0 {
            fg_colour
        } else {
            bg_colour
        };

        self.framebuffer[(fb_y * FB_WIDTH + fb_x) as usize] = colour;
    }

    /// Render 1 border pixel.
    fn render_border_pixel(&mut self, fb_x: u32, fb_y: u32) {
        self.framebuffer[(fb_y * FB_WIDTH + fb_x) as usize] = PALETTE[self.border as usize];
    }

    /// Is the current beam position within the contention area?
    fn in_contention_area(&self) -> bool {
        let tstate = self.tstate();
        self.line >= FIRST_SCREEN_LINE
            && self.line < FIRST_SCREEN_LINE + SCREEN_HEIGHT as u16
            && tstate < CONTENTION_END_TSTATE
    }

    /// Compute the bitmap address for a given screen Y and character column.
    fn bitmap_addr(screen_y: u8, char_col: u8) -> Option<u16> {
        if char_col >= 32 {
            return None;
        }
        let y7y6 = (screen_y >> 6) & 0x03;
        let y5y4y3 = (screen_y >> 3) & 0x07;
        let y2y1y0 = screen_y & 0x07;
        Some(
            0x4000
                | (u16::from(y7y6) << 11)
                | (u16::from(y2y1y0) << 8)
                | (u16::from(y5y4y3) << 5)
                | u16::from(char_col),
        )
    }

    /// Compute the attribute address for a given screen Y and character column.
    fn attr_addr(screen_y: u8, char_col: u8) -> Option<u16> {
        if char_col >= 32 {
            return None;
        }
        Some(0x5800 | (u16::from(screen_y / 8) << 5) | u16::from(char_col))
    }

    /// Look up contention delay for a given CPU T-state offset within the line.
    fn contention_delay_at(&self, tstate_offset: i16) -> u8 {
        if tstate_offset < 0 || tstate_offset >= CONTENTION_END_TSTATE as i16 {
            return 0;
        }
        self.variant.pattern()[tstate_offset as usize % 8]
    }
}

impl Default for Ula {
    fn default() -> Self {
        Self::new()
    }
}
