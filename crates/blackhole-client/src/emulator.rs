//! The local terminal emulator boundary (spec §1 non-goals: the ANSI
//! parser, cell grid, and selection live outside this crate). This
//! trait is the whole contract the coordinator needs from one.

/// What the coordinator needs from a terminal emulator instance. Real
/// implementations (xterm.js, a native cell-grid renderer, ...) live
/// outside this crate; `NullEmulator` below exists for tests.
pub trait TerminalEmulator: Send {
    /// Write decoded PTY output into the emulator's buffer.
    fn write(&mut self, bytes: &[u8]);

    /// Resize the emulator's grid. `pixel_width`/`pixel_height` are the
    /// viewport's device-pixel size, passed through for renderers that
    /// need it for font metrics.
    fn resize(&mut self, cols: u16, rows: u16, pixel_width: u32, pixel_height: u32);

    /// Current selection, if any, for copy support.
    fn get_selection_text(&self) -> Option<String>;
}

/// A no-op emulator used where no real renderer is attached (tests, or
/// a headless client). Buffers nothing; `write` is observable only via
/// `last_write` for test assertions.
#[derive(Default)]
pub struct NullEmulator {
    pub last_write: Vec<u8>,
    pub last_resize: Option<(u16, u16, u32, u32)>,
}

impl TerminalEmulator for NullEmulator {
    fn write(&mut self, bytes: &[u8]) {
        self.last_write = bytes.to_vec();
    }

    fn resize(&mut self, cols: u16, rows: u16, pixel_width: u32, pixel_height: u32) {
        self.last_resize = Some((cols, rows, pixel_width, pixel_height));
    }

    fn get_selection_text(&self) -> Option<String> {
        None
    }
}
