use std::time::Duration;

use crate::overlay::settings::TimerDirection;

/// Level clock. Elapsed time only accumulates while running, so a pause and
/// resume carries on from where the clock stopped.
#[derive(Clone, Debug, Default)]
pub struct LevelTimer {
    banked: Duration,
    running_since: Option<Duration>,
}

impl LevelTimer {
    pub fn start(&mut self, now: Duration) {
        self.banked = Duration::ZERO;
        self.running_since = Some(now);
    }

    pub fn pause(&mut self, now: Duration) {
        if let Some(since) = self.running_since.take() {
            self.banked += now.saturating_sub(since);
        }
    }

    pub fn resume(&mut self, now: Duration) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn elapsed(&self, now: Duration) -> Duration {
        match self.running_since {
            Some(since) => self.banked + now.saturating_sub(since),
            None => self.banked,
        }
    }
}

/// The clock face for `elapsed`: counting up, or down from `limit`.
pub fn clock_face(direction: TimerDirection, elapsed: Duration, limit: Duration) -> String {
    let shown = match direction {
        TimerDirection::CountUp => elapsed,
        TimerDirection::CountDown => limit.saturating_sub(elapsed),
    };

    format_clock(shown.as_secs())
}

/// `MM:SS`, with an `HH:` prefix once there is at least an hour.
pub fn format_clock(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds / 60) % 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}
