//! Session mode state machine.
//!
//! The session has two core states, `Active` and `Inactive`, plus
//! four orthogonal flags (muted, passive, dictation, visual) that
//! change how recognized speech is consumed. The combination is
//! modeled as one tagged mode value and a small flag set rather than a
//! combinatorial explosion of named states; the passive/dictation
//! mutual exclusion is enforced as a guarded transition inside
//! [`SessionState::apply`], not by trusting callers.
//!
//! All mutation happens through [`SessionState::apply`],
//! [`SessionState::note_empty_cycle`], and
//! [`SessionState::note_activity`]; the dispatcher and actions only
//! read the flags.

use crate::config::SessionPolicy;
use crate::dictation::{TimedLine, TranscriptBuffer};
use tracing::info;

/// Core session state: exactly one holds at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Listening and responding.
    Active,
    /// Asleep: only the wake word is evaluated.
    Inactive,
}

/// Orthogonal mode flags.
///
/// `passive` and `dictation` are mutually exclusive by policy; the
/// state machine clears one before setting the other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeFlags {
    /// Transcript delivery suppressed entirely.
    pub muted: bool,
    /// Buffering transcripts until addressed.
    pub passive: bool,
    /// Appending transcripts to the dictation log.
    pub dictation: bool,
    /// Periodic visual captures enabled.
    pub visual: bool,
}

/// Externally triggered transition events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Explicit sleep request (phrase or action).
    Sleep,
    /// Explicit wake request (wake word or action).
    Wake,
    /// Suppress transcript delivery.
    Mute,
    /// Restore transcript delivery.
    Unmute,
    /// Begin buffering transcripts passively.
    StartPassive,
    /// Stop passive buffering.
    StopPassive,
    /// Begin appending transcripts to the dictation log.
    StartDictation,
    /// Stop dictation.
    StopDictation,
    /// Enable periodic visual captures.
    StartVisual,
    /// Disable periodic visual captures.
    StopVisual,
}

/// The observable result of a transition, used by the dispatcher to
/// announce the change and release or re-acquire resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChange {
    /// Session went to sleep.
    WentInactive,
    /// Session woke up.
    WentActive,
    /// Muted flag set.
    Muted,
    /// Muted flag cleared.
    Unmuted,
    /// Passive listening started.
    PassiveStarted,
    /// Passive listening stopped.
    PassiveStopped,
    /// Dictation started.
    DictationStarted,
    /// Dictation stopped.
    DictationStopped,
    /// Visual mode started.
    VisualStarted,
    /// Visual mode stopped.
    VisualStopped,
}

/// The session mode state machine.
///
/// Owns the mode, the flags, the idle counter, and the passive
/// transcript buffer. One instance exists per conversational
/// participant; it is never shared across turn sequences.
#[derive(Debug)]
pub struct SessionState {
    mode: SessionMode,
    flags: ModeFlags,
    /// Consecutive empty recognition cycles while Active. Defined only
    /// while Active; reset on any activity or wake.
    idle_cycles: u32,
    idle_threshold: u32,
    visual_interval: u32,
    cycles_since_visual: u32,
    passive_buffer: TranscriptBuffer,
}

impl SessionState {
    /// Create session state honoring the startup policy.
    #[must_use]
    pub fn new(policy: &SessionPolicy) -> Self {
        let mut state = Self {
            mode: SessionMode::Active,
            flags: ModeFlags::default(),
            idle_cycles: 0,
            idle_threshold: policy.idle_cycle_threshold,
            visual_interval: policy.visual_interval_cycles,
            cycles_since_visual: 0,
            passive_buffer: TranscriptBuffer::new(),
        };
        if policy.start_muted {
            state.flags.muted = true;
        }
        // Apply through the guarded transitions so passive/dictation
        // exclusion holds even for contradictory startup flags.
        if policy.start_passive {
            let _ = state.apply(SessionEvent::StartPassive);
        }
        if policy.start_dictation {
            let _ = state.apply(SessionEvent::StartDictation);
        }
        if policy.start_inactive {
            let _ = state.apply(SessionEvent::Sleep);
        }
        state
    }

    /// Current core mode.
    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Current flag set.
    #[must_use]
    pub fn flags(&self) -> ModeFlags {
        self.flags
    }

    /// Current idle cycle count. Meaningful only while Active.
    #[must_use]
    pub fn idle_cycles(&self) -> u32 {
        self.idle_cycles
    }

    /// Apply a transition event. Returns the resulting change, or
    /// `None` when the event is a no-op in the current state.
    pub fn apply(&mut self, event: SessionEvent) -> Option<ModeChange> {
        let change = match event {
            SessionEvent::Sleep => {
                if self.mode == SessionMode::Inactive {
                    return None;
                }
                self.mode = SessionMode::Inactive;
                self.idle_cycles = 0;
                Some(ModeChange::WentInactive)
            }
            SessionEvent::Wake => {
                if self.mode == SessionMode::Active {
                    return None;
                }
                self.mode = SessionMode::Active;
                self.idle_cycles = 0;
                Some(ModeChange::WentActive)
            }
            SessionEvent::Mute => {
                if self.flags.muted {
                    return None;
                }
                self.flags.muted = true;
                Some(ModeChange::Muted)
            }
            SessionEvent::Unmute => {
                if !self.flags.muted {
                    return None;
                }
                self.flags.muted = false;
                Some(ModeChange::Unmuted)
            }
            SessionEvent::StartPassive => {
                if self.flags.passive {
                    return None;
                }
                // Passive and dictation never hold together.
                self.flags.dictation = false;
                self.flags.passive = true;
                Some(ModeChange::PassiveStarted)
            }
            SessionEvent::StopPassive => {
                if !self.flags.passive {
                    return None;
                }
                self.flags.passive = false;
                Some(ModeChange::PassiveStopped)
            }
            SessionEvent::StartDictation => {
                if self.flags.dictation {
                    return None;
                }
                self.flags.passive = false;
                self.flags.dictation = true;
                Some(ModeChange::DictationStarted)
            }
            SessionEvent::StopDictation => {
                if !self.flags.dictation {
                    return None;
                }
                self.flags.dictation = false;
                Some(ModeChange::DictationStopped)
            }
            SessionEvent::StartVisual => {
                if self.flags.visual {
                    return None;
                }
                self.flags.visual = true;
                self.cycles_since_visual = 0;
                Some(ModeChange::VisualStarted)
            }
            SessionEvent::StopVisual => {
                if !self.flags.visual {
                    return None;
                }
                self.flags.visual = false;
                Some(ModeChange::VisualStopped)
            }
        };
        if let Some(c) = change {
            info!("session transition: {c:?} (mode={:?}, flags={:?})", self.mode, self.flags);
        }
        change
    }

    /// Record an empty recognition cycle.
    ///
    /// While Active and not suppressed, increments the idle counter and
    /// fires a single `WentInactive` transition when the configured
    /// threshold is crossed. While Inactive, empty cycles are discarded
    /// without counting. Auto-sleep is suppressed while visual,
    /// passive, or dictation is set.
    pub fn note_empty_cycle(&mut self) -> Option<ModeChange> {
        if self.mode != SessionMode::Active || self.idle_threshold == 0 {
            return None;
        }
        if self.flags.visual || self.flags.passive || self.flags.dictation {
            return None;
        }
        self.idle_cycles += 1;
        if self.idle_cycles >= self.idle_threshold {
            return self.apply(SessionEvent::Sleep);
        }
        None
    }

    /// Record a non-empty transcript: resets the idle counter.
    pub fn note_activity(&mut self) {
        self.idle_cycles = 0;
    }

    /// Evaluate the visual capture interval for one empty cycle.
    ///
    /// Returns `true` when a periodic capture is due. The interval
    /// piggybacks on the recognition cycle cadence; there is no
    /// separate timer thread, so a capture can never race an in-flight
    /// turn; a missed interval simply fires on a later cycle.
    pub fn visual_capture_due(&mut self) -> bool {
        if !self.flags.visual || self.mode != SessionMode::Active || self.visual_interval == 0 {
            return false;
        }
        self.cycles_since_visual += 1;
        if self.cycles_since_visual >= self.visual_interval {
            self.cycles_since_visual = 0;
            return true;
        }
        false
    }

    /// Append a transcript to the passive buffer.
    pub fn buffer_passive(&mut self, text: impl Into<String>) {
        self.passive_buffer.push(text);
    }

    /// Number of lines currently buffered in passive mode.
    #[must_use]
    pub fn passive_len(&self) -> usize {
        self.passive_buffer.len()
    }

    /// Take the entire passive buffer, leaving it empty.
    pub fn flush_passive(&mut self) -> Vec<TimedLine> {
        self.passive_buffer.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(idle: u32) -> SessionPolicy {
        SessionPolicy {
            idle_cycle_threshold: idle,
            ..SessionPolicy::default()
        }
    }

    fn active_state(idle: u32) -> SessionState {
        SessionState::new(&policy(idle))
    }

    #[test]
    fn starts_active_by_default() {
        let state = active_state(10);
        assert_eq!(state.mode(), SessionMode::Active);
        assert_eq!(state.flags(), ModeFlags::default());
    }

    #[test]
    fn startup_policy_flags() {
        let state = SessionState::new(&SessionPolicy {
            start_inactive: true,
            start_muted: true,
            ..SessionPolicy::default()
        });
        assert_eq!(state.mode(), SessionMode::Inactive);
        assert!(state.flags().muted);
    }

    #[test]
    fn contradictory_startup_prefers_dictation() {
        let state = SessionState::new(&SessionPolicy {
            start_passive: true,
            start_dictation: true,
            ..SessionPolicy::default()
        });
        assert!(state.flags().dictation);
        assert!(!state.flags().passive);
    }

    #[test]
    fn sleep_wake_roundtrip() {
        let mut state = active_state(10);
        assert_eq!(state.apply(SessionEvent::Sleep), Some(ModeChange::WentInactive));
        assert_eq!(state.apply(SessionEvent::Sleep), None);
        assert_eq!(state.apply(SessionEvent::Wake), Some(ModeChange::WentActive));
        assert_eq!(state.apply(SessionEvent::Wake), None);
    }

    #[test]
    fn idle_threshold_fires_exactly_once() {
        let mut state = active_state(5);
        for _ in 0..4 {
            assert_eq!(state.note_empty_cycle(), None);
        }
        assert_eq!(state.mode(), SessionMode::Active);
        assert_eq!(state.note_empty_cycle(), Some(ModeChange::WentInactive));
        assert_eq!(state.mode(), SessionMode::Inactive);
        // Further empty cycles while Inactive do not re-fire.
        assert_eq!(state.note_empty_cycle(), None);
    }

    #[test]
    fn activity_resets_idle_counter() {
        let mut state = active_state(3);
        let _ = state.note_empty_cycle();
        let _ = state.note_empty_cycle();
        state.note_activity();
        assert_eq!(state.idle_cycles(), 0);
        assert_eq!(state.note_empty_cycle(), None);
        assert_eq!(state.note_empty_cycle(), None);
        assert_eq!(state.note_empty_cycle(), Some(ModeChange::WentInactive));
    }

    #[test]
    fn zero_threshold_disables_auto_sleep() {
        let mut state = active_state(0);
        for _ in 0..1000 {
            assert_eq!(state.note_empty_cycle(), None);
        }
        assert_eq!(state.mode(), SessionMode::Active);
    }

    #[test]
    fn auto_sleep_suppressed_by_modes() {
        for event in [
            SessionEvent::StartVisual,
            SessionEvent::StartPassive,
            SessionEvent::StartDictation,
        ] {
            let mut state = active_state(2);
            let _ = state.apply(event);
            for _ in 0..10 {
                assert_eq!(state.note_empty_cycle(), None);
            }
            assert_eq!(state.mode(), SessionMode::Active, "suppressed under {event:?}");
        }
    }

    #[test]
    fn muted_does_not_suppress_auto_sleep() {
        let mut state = active_state(2);
        let _ = state.apply(SessionEvent::Mute);
        let _ = state.note_empty_cycle();
        assert_eq!(state.note_empty_cycle(), Some(ModeChange::WentInactive));
    }

    #[test]
    fn passive_and_dictation_are_mutually_exclusive() {
        let mut state = active_state(10);
        let _ = state.apply(SessionEvent::StartPassive);
        assert!(state.flags().passive);

        assert_eq!(
            state.apply(SessionEvent::StartDictation),
            Some(ModeChange::DictationStarted)
        );
        assert!(state.flags().dictation);
        assert!(!state.flags().passive);

        // And symmetrically.
        assert_eq!(
            state.apply(SessionEvent::StartPassive),
            Some(ModeChange::PassiveStarted)
        );
        assert!(state.flags().passive);
        assert!(!state.flags().dictation);
    }

    #[test]
    fn mute_unmute_are_idempotent() {
        let mut state = active_state(10);
        assert_eq!(state.apply(SessionEvent::Unmute), None);
        assert_eq!(state.apply(SessionEvent::Mute), Some(ModeChange::Muted));
        assert_eq!(state.apply(SessionEvent::Mute), None);
        assert_eq!(state.apply(SessionEvent::Unmute), Some(ModeChange::Unmuted));
    }

    #[test]
    fn visual_interval_fires_periodically() {
        let mut state = SessionState::new(&SessionPolicy {
            visual_interval_cycles: 3,
            ..policy(0)
        });
        let _ = state.apply(SessionEvent::StartVisual);
        assert!(!state.visual_capture_due());
        assert!(!state.visual_capture_due());
        assert!(state.visual_capture_due());
        // Counter resets after firing.
        assert!(!state.visual_capture_due());
        assert!(!state.visual_capture_due());
        assert!(state.visual_capture_due());
    }

    #[test]
    fn visual_interval_inert_without_flag() {
        let mut state = active_state(0);
        for _ in 0..10 {
            assert!(!state.visual_capture_due());
        }
    }

    #[test]
    fn passive_buffer_flushes_and_clears() {
        let mut state = active_state(10);
        state.buffer_passive("hi");
        state.buffer_passive("how are you");
        assert_eq!(state.passive_len(), 2);
        let lines = state.flush_passive();
        assert_eq!(lines.len(), 2);
        assert_eq!(state.passive_len(), 0);
    }
}
