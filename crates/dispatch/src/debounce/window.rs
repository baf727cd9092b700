//! Debounce window transitions.
//!
//! Pure: every transition takes the current instant and returns the timer
//! work to do as [`TimerIntent`]s. The engine applies them.

use std::time::Duration;

use {
    parley_config::{TimerConfig, TimerMode},
    tokio::time::Instant,
};

/// Timer work requested by a transition, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerIntent {
    /// (Re)arm the completion timer to fire after the delay.
    ArmCompletion(Duration),
    /// (Re)arm the seen timer.
    ArmSeen(Duration),
    MarkSeenNow,
    /// Drop the pending typing timer.
    CancelTyping,
    TypingOffNow,
    ArmTyping(Duration),
}

/// Presence features of the context that triggered a transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresenceCaps {
    pub seen: bool,
    pub typing: bool,
}

impl PresenceCaps {
    pub const NONE: Self = Self {
        seen: false,
        typing: false,
    };
}

/// Timing state of one open window.
#[derive(Debug, Clone)]
pub struct Window {
    last_duration: Duration,
    start: Instant,
    deadline: Instant,
    marked_seen: bool,
    typing_on: bool,
}

impl Window {
    /// Open a window for the first event of a quiet session.
    ///
    /// `seen_earlier` is whether seen was already marked for this session in
    /// an earlier window.
    pub fn open(
        config: &TimerConfig,
        now: Instant,
        caps: PresenceCaps,
        seen_earlier: bool,
    ) -> (Self, Vec<TimerIntent>) {
        let last_duration = config.initial();
        let mut window = Self {
            last_duration,
            start: now,
            deadline: now + last_duration,
            marked_seen: false,
            typing_on: false,
        };
        let mut intents = vec![TimerIntent::ArmCompletion(last_duration)];
        intents.extend(window.presence(config, now, caps, seen_earlier));
        (window, intents)
    }

    /// Another event arrived while the window is open.
    pub fn on_event(
        &mut self,
        config: &TimerConfig,
        now: Instant,
        caps: PresenceCaps,
        seen_earlier: bool,
    ) -> Vec<TimerIntent> {
        let mut intents = Vec::new();
        match config.mode {
            TimerMode::Extend => {
                let elapsed = now.saturating_duration_since(self.start);
                self.last_duration = self.last_duration.saturating_sub(elapsed) + config.extend();
                self.start = now;
                self.deadline = now + self.last_duration;
                intents.push(TimerIntent::ArmCompletion(self.last_duration));
            },
            TimerMode::Refresh => {
                self.deadline = now + self.last_duration;
                intents.push(TimerIntent::ArmCompletion(self.last_duration));
            },
            TimerMode::Fixed => {},
        }
        intents.extend(self.presence(config, now, caps, seen_earlier));
        intents
    }

    fn presence(
        &mut self,
        config: &TimerConfig,
        now: Instant,
        caps: PresenceCaps,
        seen_earlier: bool,
    ) -> Vec<TimerIntent> {
        let mut intents = Vec::new();
        let remaining = self.deadline.saturating_duration_since(now);

        if config.show_seen_before_end_ms > 0 && caps.seen {
            if config.seen_always_after_first && (self.marked_seen || seen_earlier) {
                self.marked_seen = true;
                intents.push(TimerIntent::MarkSeenNow);
            } else {
                intents.push(TimerIntent::ArmSeen(
                    remaining.saturating_sub(config.seen_before_end()),
                ));
            }
        }

        if config.show_typing_before_end_ms > 0 && caps.typing {
            intents.push(TimerIntent::CancelTyping);
            if self.typing_on {
                self.typing_on = false;
                intents.push(TimerIntent::TypingOffNow);
            }
            intents.push(TimerIntent::ArmTyping(
                remaining.saturating_sub(config.typing_before_end()),
            ));
        }
        intents
    }

    /// The seen timer fired.
    pub fn mark_seen(&mut self) {
        self.marked_seen = true;
    }

    /// The typing timer fired.
    pub fn mark_typing_on(&mut self) {
        self.typing_on = true;
    }

    pub fn marked_seen(&self) -> bool {
        self.marked_seen
    }

    pub fn typing_on(&self) -> bool {
        self.typing_on
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn last_duration(&self) -> Duration {
        self.last_duration
    }
}
