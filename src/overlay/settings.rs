use std::time::Duration;

use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum TimerDirection {
    CountUp,
    CountDown,
}

/// What a `Restart` means while the level is not cleared.
///
/// Some level types never show a death screen, so a restart is the only
/// visible sign that the player died.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum RestartPolicy {
    CountAsDeath,
    Ignore,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    pub timer_direction: TimerDirection,
    pub timer_warning: bool,
    pub timer_warning_minutes: u64,
    pub level_name_visible: bool,
    pub level_author_visible: bool,
    pub restart_policy: RestartPolicy,
    #[serde(with = "millis")]
    pub death_debounce: Duration,
    #[serde(with = "millis")]
    pub display_delay: Duration,
    #[serde(with = "millis")]
    pub duplicate_window: Duration,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        OverlaySettings {
            timer_direction: TimerDirection::CountUp,
            timer_warning: false,
            timer_warning_minutes: 10,
            level_name_visible: true,
            level_author_visible: true,
            restart_policy: RestartPolicy::CountAsDeath,
            death_debounce: Duration::from_millis(500),
            display_delay: Duration::from_millis(1500),
            duplicate_window: Duration::from_millis(500),
        }
    }
}

impl OverlaySettings {
    pub fn warning_at(&self) -> Duration {
        Duration::from_secs(self.timer_warning_minutes * 60)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
