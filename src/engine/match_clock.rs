use crate::types::MatchStatus;

/// Per-room match timer driven by simulated time. `game_time` counts every
/// simulated millisecond. The countdown starts when the first player joins
/// and the match ends once it reaches zero.
#[derive(Clone, Debug)]
pub struct MatchClock {
    duration_ms: u64,
    now_ms: u64,
    started_at_ms: Option<u64>,
    game_time_ms: u64,
    time_remaining_ms: u64,
    pub game_over: bool,
    winner_id: Option<String>,
    winner_name: Option<String>,
}

impl MatchClock {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            now_ms: 0,
            started_at_ms: None,
            game_time_ms: 0,
            time_remaining_ms: duration_ms,
            game_over: false,
            winner_id: None,
            winner_name: None,
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn is_running(&self) -> bool {
        self.started_at_ms.is_some() && !self.game_over
    }

    pub fn winner_id(&self) -> Option<&str> {
        self.winner_id.as_deref()
    }

    pub(super) fn advance(&mut self, dt_ms: u64) {
        self.now_ms = self.now_ms.saturating_add(dt_ms);
        self.game_time_ms = self.game_time_ms.saturating_add(dt_ms);
    }

    pub(super) fn start(&mut self) {
        if self.started_at_ms.is_none() {
            self.started_at_ms = Some(self.now_ms);
            self.time_remaining_ms = self.duration_ms;
        }
    }

    /// Back to the pre-match state. Used when the room empties.
    pub(super) fn reset(&mut self) {
        self.started_at_ms = None;
        self.time_remaining_ms = self.duration_ms;
        self.game_over = false;
        self.winner_id = None;
        self.winner_name = None;
    }

    /// Recomputes the remaining time. Returns true on the tick the countdown
    /// runs out.
    pub(super) fn refresh(&mut self) -> bool {
        if self.game_over {
            self.time_remaining_ms = 0;
            return false;
        }
        let Some(started_at) = self.started_at_ms else {
            self.time_remaining_ms = self.duration_ms;
            return false;
        };
        let elapsed = self.now_ms.saturating_sub(started_at);
        self.time_remaining_ms = self.duration_ms.saturating_sub(elapsed);
        self.time_remaining_ms == 0
    }

    /// Locks in the result. Only the first call has any effect.
    pub(super) fn finish(&mut self, winner: Option<(String, String)>) -> bool {
        if self.game_over {
            return false;
        }
        self.game_over = true;
        self.time_remaining_ms = 0;
        if let Some((id, name)) = winner {
            self.winner_id = Some(id);
            self.winner_name = Some(name);
        }
        true
    }

    pub fn status(&self) -> MatchStatus {
        MatchStatus {
            game_time: self.game_time_ms,
            time_remaining: self.time_remaining_ms,
            game_over: self.game_over,
            winner_id: self.winner_id.clone(),
            winner_name: self.winner_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_waits_for_start() {
        let mut clock = MatchClock::new(1_000);
        clock.advance(5_000);
        assert!(!clock.refresh());
        assert_eq!(clock.status().time_remaining, 1_000);
        assert_eq!(clock.status().game_time, 5_000);
    }

    #[test]
    fn refresh_fires_once_the_countdown_hits_zero() {
        let mut clock = MatchClock::new(1_000);
        clock.start();
        clock.advance(999);
        assert!(!clock.refresh());
        assert_eq!(clock.status().time_remaining, 1);
        clock.advance(1);
        assert!(clock.refresh());
    }

    #[test]
    fn game_time_keeps_counting_after_the_finish() {
        let mut clock = MatchClock::new(1_000);
        clock.start();
        clock.advance(1_000);
        assert!(clock.refresh());
        clock.finish(None);
        clock.advance(500);
        clock.refresh();
        let status = clock.status();
        assert_eq!(status.game_time, 1_500);
        assert_eq!(status.time_remaining, 0);
    }

    #[test]
    fn finish_is_idempotent() {
        let mut clock = MatchClock::new(1_000);
        clock.start();
        assert!(clock.finish(Some(("a".to_string(), "Alice".to_string()))));
        assert!(!clock.finish(Some(("b".to_string(), "Bob".to_string()))));
        let status = clock.status();
        assert!(status.game_over);
        assert_eq!(status.winner_id.as_deref(), Some("a"));
        assert_eq!(status.winner_name.as_deref(), Some("Alice"));
        assert_eq!(status.time_remaining, 0);
    }

    #[test]
    fn reset_clears_the_result() {
        let mut clock = MatchClock::new(1_000);
        clock.start();
        clock.finish(None);
        clock.advance(300);
        clock.reset();
        assert!(!clock.game_over);
        assert_eq!(clock.status().game_time, 300);
        assert!(!clock.is_running());
        assert_eq!(clock.status().time_remaining, 1_000);
    }
}
