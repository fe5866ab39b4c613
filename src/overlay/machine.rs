use std::time::Duration;

use serde::Serialize;

use crate::overlay::event::{EventKind, GameEvent, Level};
use crate::overlay::settings::{OverlaySettings, RestartPolicy, TimerDirection};
use crate::overlay::timer::{clock_face, LevelTimer};

const AUTHOR_PREFIX: &str = "👤 ";

/// What the renderer is handed. A copy, never the live state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OverlayView {
    pub level: Option<Level>,
    pub timer: String,
    pub timer_running: bool,
    pub death_count: u32,
    pub cleared: bool,
    pub hidden: bool,
    pub fade_items: Vec<String>,
    /// Bumped once per timer warning, so the renderer can play a sound on change.
    pub alert_count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerAlert {
    WarningReached,
    TimeUp,
}

/// A task that runs once `due` has passed unless something replaces it first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deferred<T> {
    pub due: Duration,
    pub task: T,
}

impl<T> Deferred<T> {
    fn is_due(&self, now: Duration) -> bool {
        self.due <= now
    }
}

/// Overlay state driven by game events and clock ticks.
///
/// All time is given as an offset from an arbitrary epoch chosen by the host;
/// the machine never reads a clock itself.
pub struct OverlayMachine {
    settings: OverlaySettings,
    level: Option<Level>,
    hidden: bool,
    cleared: bool,
    death_count: u32,
    fade_items: Vec<String>,
    timer: LevelTimer,
    timer_face: String,
    warned: bool,
    alert_count: u32,
    pending_death: Option<Deferred<()>>,
    pending_display: Option<Deferred<Level>>,
    last_event: Option<(EventKind, Duration)>,
}

impl OverlayMachine {
    pub fn new(settings: OverlaySettings) -> OverlayMachine {
        OverlayMachine {
            settings,
            level: None,
            hidden: true,
            cleared: false,
            death_count: 0,
            fade_items: Vec::new(),
            timer: LevelTimer::default(),
            timer_face: String::new(),
            warned: false,
            alert_count: 0,
            pending_death: None,
            pending_display: None,
            last_event: None,
        }
    }

    pub fn view(&self) -> OverlayView {
        OverlayView {
            level: self.level.clone(),
            timer: self.timer_face.clone(),
            timer_running: self.timer.is_running(),
            death_count: self.death_count,
            cleared: self.cleared,
            hidden: self.hidden,
            fade_items: self.fade_items.clone(),
            alert_count: self.alert_count,
        }
    }

    /// Earliest time a deferred task wants to run.
    pub fn next_deadline(&self) -> Option<Duration> {
        let death = self.pending_death.as_ref().map(|d| d.due);
        let display = self.pending_display.as_ref().map(|d| d.due);

        match (death, display) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn handle(&mut self, event: GameEvent, now: Duration) {
        self.advance(now);

        let kind = event.kind();
        if self.is_duplicate(kind, now) {
            debug!("dropping duplicate {} event", kind.tag());
            return;
        }
        self.last_event = Some((kind, now));

        match event {
            GameEvent::LevelLoaded(level) => self.level_loaded(level, now),
            GameEvent::Death => self.death(now),
            GameEvent::Restart => self.restart(now),
            GameEvent::Exit => {
                self.timer.pause(now);
                self.hidden = true;
                if let Some(pending) = self.pending_display.take() {
                    debug!("exit cancels pending display of {}", pending.task.code);
                }
            }
            GameEvent::Clear => {
                self.timer.pause(now);
                self.cleared = true;
            }
            GameEvent::GameOver => self.timer.pause(now),
        }
    }

    /// Run every deferred task that is due by `now`, oldest first.
    pub fn advance(&mut self, now: Duration) {
        loop {
            let death = self.pending_death.as_ref().filter(|d| d.is_due(now)).map(|d| d.due);
            let display = self
                .pending_display
                .as_ref()
                .filter(|d| d.is_due(now))
                .map(|d| d.due);

            match (death, display) {
                (None, None) => break,
                (Some(death), Some(display)) if display < death => self.fire_display(),
                (Some(_), _) => self.fire_death(),
                (None, Some(_)) => self.fire_display(),
            }
        }
    }

    /// Periodic clock update.
    pub fn tick(&mut self, now: Duration) -> Option<TimerAlert> {
        self.advance(now);

        if !self.timer.is_running() {
            return None;
        }

        let direction = self.settings.timer_direction;
        let limit = self.settings.warning_at();
        let elapsed = self.timer.elapsed(now);
        self.timer_face = clock_face(direction, elapsed, limit);

        let time_up = direction == TimerDirection::CountDown
            && limit.saturating_sub(elapsed) < Duration::from_secs(1);
        if time_up {
            debug!("count down finished, pausing timer");
            self.timer.pause(now);
        }

        if !(time_up || elapsed >= limit) || !self.settings.timer_warning || self.warned {
            return None;
        }

        self.warned = true;
        self.alert_count += 1;
        let alert = if time_up {
            TimerAlert::TimeUp
        } else {
            TimerAlert::WarningReached
        };
        info!("timer alert {:?} at {}", alert, self.timer_face);

        Some(alert)
    }

    fn is_duplicate(&self, kind: EventKind, now: Duration) -> bool {
        if kind == EventKind::Level {
            return false;
        }

        match self.last_event {
            Some((last, at)) => last == kind && now.saturating_sub(at) < self.settings.duplicate_window,
            None => false,
        }
    }

    fn level_loaded(&mut self, level: Level, now: Duration) {
        if let Some(pending) = &self.pending_display {
            if pending.task.code == level.code {
                return;
            }
            debug!("level {} replaces pending {}", level.code, pending.task.code);
            self.pending_display = None;
        }

        let same_level = self.level.as_ref().map_or(false, |l| l.code == level.code);

        if same_level && !self.timer.is_running() && !self.cleared {
            debug!("resuming level {}", level.code);
            self.hidden = false;
            self.timer.resume(now);
        } else if !same_level || self.hidden {
            if self.hidden {
                self.display_level(level, now);
            } else {
                // give the outgoing level time to animate away
                self.hidden = true;
                self.schedule_display(level, now);
            }
        }
    }

    fn schedule_display(&mut self, level: Level, now: Duration) {
        self.pending_display = Some(Deferred {
            due: now + self.settings.display_delay,
            task: level,
        });
    }

    fn death(&mut self, now: Duration) {
        if self.pending_death.is_some() {
            debug!("death already being counted");
            return;
        }

        self.pending_death = Some(Deferred {
            due: now + self.settings.death_debounce,
            task: (),
        });
    }

    fn restart(&mut self, now: Duration) {
        if self.cleared {
            if let Some(level) = self.level.clone() {
                self.display_level(level, now);
            }
            return;
        }

        match self.settings.restart_policy {
            RestartPolicy::CountAsDeath => self.death(now),
            RestartPolicy::Ignore => debug!("ignoring restart on uncleared level"),
        }
    }

    fn fire_death(&mut self) {
        self.pending_death = None;
        self.death_count += 1;
        info!("death count {}", self.death_count);
    }

    fn fire_display(&mut self) {
        if let Some(pending) = self.pending_display.take() {
            self.display_level(pending.task, pending.due);
        }
    }

    fn display_level(&mut self, level: Level, now: Duration) {
        info!("displaying level {} {:?}", level.code, level.name);

        self.fade_items = self.fade_items_for(&level);
        self.level = Some(level);
        self.hidden = false;
        self.cleared = false;
        self.death_count = 0;
        self.pending_death = None;
        self.pending_display = None;
        self.warned = false;

        self.timer.start(now);
        self.timer_face = clock_face(
            self.settings.timer_direction,
            Duration::ZERO,
            self.settings.warning_at(),
        );
    }

    fn fade_items_for(&self, level: &Level) -> Vec<String> {
        let mut items = Vec::new();
        if self.settings.level_name_visible {
            items.push(level.name.clone());
        }
        if self.settings.level_author_visible {
            items.push(format!("{}{}", AUTHOR_PREFIX, level.author));
        }
        items
    }
}
