//! The resize contract (spec §4.7, invariant 7 / scenario S2): debounce
//! platform metrics notifications, compute a cell grid, and send a
//! RESIZE frame only when it actually changed.
//!
//! The debounce stage is grounded on `rocode-watcher`'s
//! `debounce_ms`-windowed event coalescing (same shape: every new event
//! restarts the window, only a quiescent gap flushes).

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::emulator::TerminalEmulator;

pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(220);
const MIN_SIGNIFICANT_DELTA: f64 = 0.5;

/// A single platform-metrics notification: current viewport size and
/// bottom inset (keyboard/safe-area), in px.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub bottom_inset: f64,
}

/// Coalesces a stream of raw metrics notifications into settled ones:
/// drops notifications that aren't significant (<0.5px change) and
/// only forwards once `DEBOUNCE_WINDOW` passes without a new one.
pub struct MetricsDebouncer {
    tx: mpsc::UnboundedSender<Metrics>,
}

impl MetricsDebouncer {
    pub fn spawn(window: Duration) -> (Self, mpsc::UnboundedReceiver<Metrics>) {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<Metrics>();
        let (settled_tx, settled_rx) = mpsc::unbounded_channel::<Metrics>();

        tokio::spawn(async move {
            let mut last_significant: Option<Metrics> = None;
            let mut pending: Option<Metrics> = None;
            loop {
                tokio::select! {
                    m = raw_rx.recv() => {
                        match m {
                            Some(m) => {
                                if is_significant(last_significant, m) {
                                    pending = Some(m);
                                }
                            }
                            None => break,
                        }
                    }
                    _ = tokio::time::sleep(window), if pending.is_some() => {
                        if let Some(m) = pending.take() {
                            last_significant = Some(m);
                            if settled_tx.send(m).is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        });

        (Self { tx: raw_tx }, settled_rx)
    }

    pub fn notify(&self, metrics: Metrics) {
        let _ = self.tx.send(metrics);
    }
}

fn is_significant(prev: Option<Metrics>, next: Metrics) -> bool {
    match prev {
        None => true,
        Some(prev) => {
            (prev.viewport_width - next.viewport_width).abs() >= MIN_SIGNIFICANT_DELTA
                || (prev.viewport_height - next.viewport_height).abs() >= MIN_SIGNIFICANT_DELTA
                || (prev.bottom_inset - next.bottom_inset).abs() >= MIN_SIGNIFICANT_DELTA
        }
    }
}

/// Computes `(cols, rows)` from viewport/cell metrics, and remembers
/// the last `(cols, rows)` sent per session so identical triples are
/// never retransmitted (invariant 7).
#[derive(Default)]
pub struct ResizeContract {
    last_sent: HashMap<String, (u16, u16)>,
}

impl ResizeContract {
    pub fn new() -> Self {
        Self::default()
    }

    /// Step 3-4 of §4.7: floor-divide viewport by cell size, accounting
    /// for padding; `None` if the result isn't a usable positive grid or
    /// the emulator isn't laid out yet (`buffer_height < view_height`).
    pub fn compute_grid(
        viewport_width: f64,
        viewport_height: f64,
        h_padding: f64,
        v_padding: f64,
        cell_width: f64,
        cell_height: f64,
        buffer_height: Option<f64>,
    ) -> Option<(u16, u16)> {
        if cell_width <= 0.0 || cell_height <= 0.0 {
            return None;
        }
        if let Some(buffer_height) = buffer_height {
            if buffer_height <= 0.0 || buffer_height < viewport_height {
                return None;
            }
        }
        let cols = ((viewport_width - h_padding) / cell_width).floor();
        let rows = ((viewport_height - v_padding) / cell_height).floor();
        if cols <= 0.0 || rows <= 0.0 {
            return None;
        }
        Some((cols as u16, rows as u16))
    }

    /// Step 5: apply `emulator.resize` and report whether a RESIZE frame
    /// should be transmitted. Idempotent for a repeated `(cols, rows)`
    /// triple on the same session.
    pub fn maybe_resize<E: TerminalEmulator>(
        &mut self,
        session_id: &str,
        cols: u16,
        rows: u16,
        pixel_width: u32,
        pixel_height: u32,
        emulator: &mut E,
    ) -> bool {
        if self.last_sent.get(session_id) == Some(&(cols, rows)) {
            return false;
        }
        emulator.resize(cols, rows, pixel_width, pixel_height);
        self.last_sent.insert(session_id.to_string(), (cols, rows));
        true
    }

    pub fn forget(&mut self, session_id: &str) {
        self.last_sent.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::NullEmulator;

    #[test]
    fn compute_grid_80x24_at_standard_cell_size() {
        let grid = ResizeContract::compute_grid(800.0, 480.0, 0.0, 0.0, 10.0, 20.0, None);
        assert_eq!(grid, Some((80, 24)));
    }

    #[test]
    fn compute_grid_rejects_non_positive() {
        assert_eq!(ResizeContract::compute_grid(5.0, 480.0, 0.0, 0.0, 10.0, 20.0, None), None);
    }

    #[test]
    fn compute_grid_rejects_unlaid_out_buffer() {
        assert_eq!(ResizeContract::compute_grid(800.0, 480.0, 0.0, 0.0, 10.0, 20.0, Some(100.0)), None);
    }

    #[test]
    fn maybe_resize_is_idempotent_for_repeat_triple() {
        let mut contract = ResizeContract::new();
        let mut emu = NullEmulator::default();
        assert!(contract.maybe_resize("s1", 80, 24, 800, 480, &mut emu));
        assert!(!contract.maybe_resize("s1", 80, 24, 800, 480, &mut emu));
        assert!(contract.maybe_resize("s1", 100, 30, 1000, 600, &mut emu));
    }

    #[tokio::test]
    async fn debouncer_coalesces_rapid_notifications() {
        let (debouncer, mut settled) = MetricsDebouncer::spawn(Duration::from_millis(20));
        for i in 0..5 {
            debouncer.notify(Metrics { viewport_width: 800.0 + i as f64, viewport_height: 480.0, bottom_inset: 0.0 });
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        let settled_metrics = tokio::time::timeout(Duration::from_millis(200), settled.recv())
            .await
            .expect("debounced metrics never arrived")
            .expect("channel closed");
        assert_eq!(settled_metrics.viewport_width, 804.0);
    }
}
