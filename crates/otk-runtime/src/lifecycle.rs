//! Session lifecycle state machine.
//!
//! Pure: every transition returns the side effects the controller must carry
//! out, and nothing here touches tasks or timers. The controller applies the
//! effects while holding the session guard.
//!
//! ```text
//! INIT -> CONNECTING -> LIVE <-> DEGRADED -> POLL_ONLY
//!                 \________________________________/
//!                           |            |
//!                       TERMINAL --> DISPOSED
//! ```
//!
//! `safety_armed` is an overlay on top of the state: set from start until the
//! safety timer starts the recurring poll, or until a push connection proves
//! healthy by delivering a frame.

use serde::Serialize;

use crate::events::PushSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Init,
    Connecting,
    Live,
    Degraded,
    PollOnly,
    Terminal,
    Disposed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Init => "init",
            SessionState::Connecting => "connecting",
            SessionState::Live => "live",
            SessionState::Degraded => "degraded",
            SessionState::PollOnly => "poll_only",
            SessionState::Terminal => "terminal",
            SessionState::Disposed => "disposed",
        }
    }

    /// No further channel event changes the state.
    pub fn is_absorbing(&self) -> bool {
        matches!(self, SessionState::Terminal | SessionState::Disposed)
    }
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    CancelSafety,
    StartRecurringPoll,
    /// Close push and stop every poll timer.
    StopChannels,
}

/// Published description of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub state: SessionState,
    pub safety_armed: bool,
    pub push_failures: u32,
    pub polling: bool,
    pub revision: u64,
}

impl SessionView {
    pub fn initial() -> Self {
        Self {
            state: SessionState::Init,
            safety_armed: true,
            push_failures: 0,
            polling: false,
            revision: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: SessionState,
    safety_armed: bool,
    push_failures: u32,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: SessionState::Init,
            safety_armed: true,
            push_failures: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn safety_armed(&self) -> bool {
        self.safety_armed
    }

    pub fn push_failures(&self) -> u32 {
        self.push_failures
    }

    pub fn start(&mut self) {
        if self.state == SessionState::Init {
            self.state = SessionState::Connecting;
        }
    }

    pub fn on_push(&mut self, signal: &PushSignal) -> Vec<Effect> {
        if self.state.is_absorbing() {
            return Vec::new();
        }
        let mut effects = Vec::new();
        match signal {
            PushSignal::Connected => {
                self.push_failures = 0;
            }
            PushSignal::FirstMessage => {
                if matches!(self.state, SessionState::Connecting | SessionState::Degraded) {
                    self.state = SessionState::Live;
                }
                if self.safety_armed {
                    self.safety_armed = false;
                    effects.push(Effect::CancelSafety);
                }
            }
            PushSignal::ReconnectScheduled { failures, .. } => {
                self.push_failures = *failures;
                if matches!(self.state, SessionState::Connecting | SessionState::Live) {
                    self.state = SessionState::Degraded;
                }
            }
            PushSignal::Exhausted { failures, .. } => {
                self.push_failures = *failures;
                self.state = SessionState::PollOnly;
                if self.safety_armed {
                    self.safety_armed = false;
                    effects.push(Effect::CancelSafety);
                }
                effects.push(Effect::StartRecurringPoll);
            }
        }
        effects
    }

    pub fn on_safety_elapsed(&mut self) -> Vec<Effect> {
        if self.state.is_absorbing() || !self.safety_armed {
            return Vec::new();
        }
        self.safety_armed = false;
        vec![Effect::StartRecurringPoll]
    }

    pub fn on_terminal(&mut self) -> Vec<Effect> {
        if self.state.is_absorbing() {
            return Vec::new();
        }
        self.state = SessionState::Terminal;
        self.safety_armed = false;
        vec![Effect::StopChannels]
    }

    /// Returns `false` if already disposed.
    pub fn dispose(&mut self) -> bool {
        if self.state == SessionState::Disposed {
            return false;
        }
        self.state = SessionState::Disposed;
        self.safety_armed = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otk_client::PushError;
    use std::time::Duration;

    fn failed(n: u32) -> PushSignal {
        PushSignal::ReconnectScheduled {
            failures: n,
            delay: Duration::from_secs(2 * n as u64),
            error: PushError::Closed,
        }
    }

    fn exhausted() -> PushSignal {
        PushSignal::Exhausted {
            failures: 3,
            error: PushError::Closed,
        }
    }

    #[test]
    fn first_frame_goes_live_and_supersedes_safety() {
        let mut lc = Lifecycle::new();
        lc.start();
        assert!(lc.on_push(&PushSignal::Connected).is_empty());
        assert_eq!(lc.state(), SessionState::Connecting);

        let fx = lc.on_push(&PushSignal::FirstMessage);
        assert_eq!(fx, vec![Effect::CancelSafety]);
        assert_eq!(lc.state(), SessionState::Live);
        assert!(!lc.safety_armed());

        // Safety firing late is a no-op.
        assert!(lc.on_safety_elapsed().is_empty());
    }

    #[test]
    fn failures_degrade_then_reconnect_recovers_live() {
        let mut lc = Lifecycle::new();
        lc.start();
        lc.on_push(&failed(1));
        assert_eq!(lc.state(), SessionState::Degraded);
        assert_eq!(lc.push_failures(), 1);

        lc.on_push(&PushSignal::Connected);
        assert_eq!(lc.push_failures(), 0);
        lc.on_push(&PushSignal::FirstMessage);
        assert_eq!(lc.state(), SessionState::Live);
    }

    #[test]
    fn exhaustion_moves_to_poll_only_and_starts_polling() {
        let mut lc = Lifecycle::new();
        lc.start();
        lc.on_push(&failed(1));
        lc.on_push(&failed(2));
        let fx = lc.on_push(&exhausted());
        assert_eq!(fx, vec![Effect::CancelSafety, Effect::StartRecurringPoll]);
        assert_eq!(lc.state(), SessionState::PollOnly);
        assert_eq!(lc.push_failures(), 3);
    }

    #[test]
    fn safety_elapsed_starts_polling_once() {
        let mut lc = Lifecycle::new();
        lc.start();
        assert_eq!(lc.on_safety_elapsed(), vec![Effect::StartRecurringPoll]);
        assert!(lc.on_safety_elapsed().is_empty());
        assert_eq!(lc.state(), SessionState::Connecting);
    }

    #[test]
    fn terminal_is_absorbing_except_for_dispose() {
        let mut lc = Lifecycle::new();
        lc.start();
        assert_eq!(lc.on_terminal(), vec![Effect::StopChannels]);
        assert!(lc.on_push(&PushSignal::FirstMessage).is_empty());
        assert!(lc.on_push(&exhausted()).is_empty());
        assert!(lc.on_terminal().is_empty());
        assert_eq!(lc.state(), SessionState::Terminal);

        assert!(lc.dispose());
        assert!(!lc.dispose());
        assert_eq!(lc.state(), SessionState::Disposed);
    }

    #[test]
    fn disposed_ignores_everything() {
        let mut lc = Lifecycle::new();
        lc.start();
        lc.dispose();
        assert!(lc.on_safety_elapsed().is_empty());
        assert!(lc.on_terminal().is_empty());
        assert_eq!(lc.state(), SessionState::Disposed);
    }
}
