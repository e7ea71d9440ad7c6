use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::transport::UserId;

/// Tracks per-user, per-command cooldown windows.
///
/// [`try_acquire`](Self::try_acquire) opens a window and reports whether the
/// caller was free to run; while a window is open further calls are refused.
#[derive(Default)]
pub struct CooldownTracker {
    cooldowns: HashMap<(UserId, &'static str), Instant>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `user` is still within a cooldown window for `command`.
    pub fn is_cooling_down(&self, user: UserId, command: &'static str) -> bool {
        self.cooldowns
            .get(&(user, command))
            .is_some_and(|expires_at| Instant::now() < *expires_at)
    }

    /// Remaining cooldown, or `None` when the window has expired.
    pub fn remaining(&self, user: UserId, command: &'static str) -> Option<Duration> {
        let expires_at = self.cooldowns.get(&(user, command))?;
        expires_at.checked_duration_since(Instant::now())
            .filter(|left| !left.is_zero())
    }

    /// Start a window of `duration` unless one is already open.
    pub fn try_acquire(&mut self, user: UserId, command: &'static str, duration: Duration) -> bool {
        if self.is_cooling_down(user, command) {
            return false;
        }
        self.clear_expired();
        self.cooldowns
            .insert((user, command), Instant::now() + duration);
        true
    }

    /// Remove all expired cooldown entries.
    pub fn clear_expired(&mut self) {
        let now = Instant::now();
        self.cooldowns.retain(|_, expires_at| now < *expires_at);
    }
}
