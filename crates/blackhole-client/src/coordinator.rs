//! Session & renderer coordinator (spec §4.7): a pure reducer over
//! server frames, owning the session list, active id, emulator map and
//! modifier flags. Per design note §9, this replaces the source's mixed
//! timer/async/UI-mutation style with one-way: frames and UI actions in,
//! [`CoordinatorAction`]s out.

use std::collections::HashMap;

use blackhole_protocol::Frame;

use crate::emulator::TerminalEmulator;
use crate::modifiers::Modifiers;
use crate::resize::ResizeContract;

/// Something the coordinator wants the caller to do: send a frame on
/// the transport, or run a resize pass for a session once layout
/// settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorAction {
    Send(Frame),
    ScheduleResize(String),
}

/// Drives session lifecycle and keystroke/resize dispatch. Generic over
/// the emulator type so callers can plug in whatever renderer they
/// have; `make_emulator` constructs a fresh one per session.
pub struct Coordinator<E: TerminalEmulator, F: Fn() -> E> {
    sessions: Vec<String>,
    active: Option<String>,
    emulators: HashMap<String, E>,
    make_emulator: F,
    pub modifiers: Modifiers,
    pub resize: ResizeContract,
}

impl<E: TerminalEmulator, F: Fn() -> E> Coordinator<E, F> {
    pub fn new(make_emulator: F) -> Self {
        Self {
            sessions: Vec::new(),
            active: None,
            emulators: HashMap::new(),
            make_emulator,
            modifiers: Modifiers::default(),
            resize: ResizeContract::new(),
        }
    }

    pub fn active_session(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn sessions(&self) -> &[String] {
        &self.sessions
    }

    fn ensure_emulator(&mut self, session_id: &str) {
        if !self.emulators.contains_key(session_id) {
            self.emulators.insert(session_id.to_string(), (self.make_emulator)());
        }
    }

    pub fn on_session_list(&mut self, sessions: Vec<String>) -> Vec<CoordinatorAction> {
        self.sessions = sessions;
        if self.sessions.is_empty() {
            self.active = None;
            return vec![CoordinatorAction::Send(Frame::Create)];
        }
        if self.active.as_deref().map(|id| !self.sessions.iter().any(|s| s == id)).unwrap_or(true) {
            self.active = self.sessions.first().cloned();
        }
        let mut actions = Vec::new();
        if let Some(active) = self.active.clone() {
            self.ensure_emulator(&active);
            actions.push(CoordinatorAction::ScheduleResize(active));
        }
        actions
    }

    pub fn on_session_created(&mut self, session_id: String) -> Vec<CoordinatorAction> {
        if !self.sessions.iter().any(|s| s == &session_id) {
            self.sessions.push(session_id.clone());
        }
        if self.active.is_none() {
            self.active = Some(session_id.clone());
        }
        self.ensure_emulator(&session_id);
        vec![CoordinatorAction::ScheduleResize(session_id)]
    }

    pub fn on_session_closed(&mut self, session_id: &str) -> Vec<CoordinatorAction> {
        self.sessions.retain(|s| s != session_id);
        self.emulators.remove(session_id);
        self.resize.forget(session_id);
        if self.active.as_deref() == Some(session_id) {
            self.active = self.sessions.first().cloned();
        }
        Vec::new()
    }

    /// `stdout` per §4.7: lazily create the emulator, write the payload
    /// decoded as UTF-8 with invalid sequences replaced.
    pub fn on_stdout(&mut self, session_id: &str, payload: &[u8]) {
        self.ensure_emulator(session_id);
        if let Some(emulator) = self.emulators.get_mut(session_id) {
            let text = String::from_utf8_lossy(payload);
            emulator.write(text.as_bytes());
        }
    }

    /// Compose and send a keystroke for the active session (spec §4.6).
    /// `None` if there is no active session.
    pub fn keystroke(&mut self, text: &str) -> Option<Frame> {
        let session_id = self.active.clone()?;
        let payload = self.modifiers.apply(text);
        Some(Frame::Stdin { session_id, payload })
    }

    /// Run a resize pass for `session_id` (spec §4.7 steps 2-5). Returns
    /// `Some(Frame::Resize)` iff the grid actually changed; silently
    /// does nothing if that session has no emulator or isn't laid out.
    pub fn run_resize(
        &mut self,
        session_id: &str,
        viewport_width: f64,
        viewport_height: f64,
        h_padding: f64,
        v_padding: f64,
        cell_width: f64,
        cell_height: f64,
        buffer_height: Option<f64>,
    ) -> Option<Frame> {
        let (cols, rows) = ResizeContract::compute_grid(
            viewport_width,
            viewport_height,
            h_padding,
            v_padding,
            cell_width,
            cell_height,
            buffer_height,
        )?;
        let emulator = self.emulators.get_mut(session_id)?;
        let changed = self.resize.maybe_resize(
            session_id,
            cols,
            rows,
            viewport_width as u32,
            viewport_height as u32,
            emulator,
        );
        changed.then(|| Frame::Resize { session_id: session_id.to_string(), rows, cols })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::NullEmulator;

    fn new_coordinator() -> Coordinator<NullEmulator, fn() -> NullEmulator> {
        Coordinator::new(NullEmulator::default)
    }

    #[test]
    fn empty_session_list_requests_create() {
        let mut c = new_coordinator();
        let actions = c.on_session_list(vec![]);
        assert_eq!(actions, vec![CoordinatorAction::Send(Frame::Create)]);
    }

    #[test]
    fn session_list_adopts_first_when_active_missing() {
        let mut c = new_coordinator();
        c.on_session_list(vec!["a".into(), "b".into()]);
        assert_eq!(c.active_session(), Some("a"));
    }

    #[test]
    fn session_list_keeps_active_if_still_present() {
        let mut c = new_coordinator();
        c.on_session_list(vec!["a".into(), "b".into()]);
        c.on_session_list(vec!["b".into(), "a".into()]);
        assert_eq!(c.active_session(), Some("a"));
    }

    #[test]
    fn session_created_adopts_active_when_none() {
        let mut c = new_coordinator();
        c.on_session_created("x".into());
        assert_eq!(c.active_session(), Some("x"));
        assert_eq!(c.sessions(), ["x".to_string()]);
    }

    #[test]
    fn session_closed_selects_next_remaining() {
        let mut c = new_coordinator();
        c.on_session_list(vec!["a".into(), "b".into()]);
        c.on_session_closed("a");
        assert_eq!(c.active_session(), Some("b"));
    }

    #[test]
    fn session_closed_clears_active_when_last() {
        let mut c = new_coordinator();
        c.on_session_list(vec!["a".into()]);
        c.on_session_closed("a");
        assert_eq!(c.active_session(), None);
    }

    #[test]
    fn keystroke_targets_active_session() {
        let mut c = new_coordinator();
        c.on_session_created("a".into());
        let frame = c.keystroke("hi").unwrap();
        assert_eq!(frame, Frame::Stdin { session_id: "a".into(), payload: b"hi".to_vec() });
    }

    #[test]
    fn resize_is_idempotent_across_ticks() {
        let mut c = new_coordinator();
        c.on_session_created("a".into());
        let first = c.run_resize("a", 800.0, 480.0, 0.0, 0.0, 10.0, 20.0, None);
        assert!(first.is_some());
        let second = c.run_resize("a", 800.0, 480.0, 0.0, 0.0, 10.0, 20.0, None);
        assert!(second.is_none());
    }
}
