use std::time::Duration;

use flume::Receiver;
use tokio::{
    select,
    sync::watch,
    time::{interval, sleep_until, Instant, MissedTickBehavior},
};

use crate::overlay::{
    event::GameEvent,
    machine::{OverlayMachine, OverlayView},
    settings::OverlaySettings,
};

pub const TICK: Duration = Duration::from_secs(1);

/// Owns the overlay state machine and feeds it ticks, events and deferred
/// deadlines one at a time. Renderers subscribe to the snapshots it publishes.
pub struct OverlayHost {
    machine: OverlayMachine,
    events: Receiver<GameEvent>,
    view: watch::Sender<OverlayView>,
    epoch: Instant,
}

pub fn new(
    settings: OverlaySettings,
    events: Receiver<GameEvent>,
) -> (OverlayHost, watch::Receiver<OverlayView>) {
    let machine = OverlayMachine::new(settings);
    let (view, view_receiver) = watch::channel(machine.view());

    let host = OverlayHost {
        machine,
        events,
        view,
        epoch: Instant::now(),
    };

    (host, view_receiver)
}

impl OverlayHost {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Runs until every event sender is dropped.
    pub async fn run(mut self) {
        let mut ticker = interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.machine.next_deadline().map(|d| self.epoch + d);

            select! {
                _ = ticker.tick() => {
                    let now = self.now();
                    if let Some(alert) = self.machine.tick(now) {
                        debug!("timer alert {:?}", alert);
                    }
                },
                event = self.events.recv_async() => {
                    match event {
                        Ok(event) => {
                            debug!("event {:?}\tbuffer {}", event, self.events.len());
                            let now = self.now();
                            self.machine.handle(event, now);
                        }
                        Err(_) => {
                            info!("event channel closed, stopping overlay");
                            break;
                        }
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let now = self.now();
                    self.machine.advance(now);
                },
            }

            self.publish();
        }

        self.publish();
    }

    fn publish(&self) {
        let view = self.machine.view();

        self.view.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::event::Level;
    use flume::unbounded;
    use tokio::time::{sleep, timeout};

    #[tokio::test]
    async fn publishes_level_and_debounced_death() {
        let (sender, receiver) = unbounded();
        let (host, mut view) = new(OverlaySettings::default(), receiver);
        let running = tokio::spawn(host.run());

        sender
            .send_async(GameEvent::LevelLoaded(Level::new("A", "First", "me")))
            .await
            .unwrap();
        sender.send_async(GameEvent::Death).await.unwrap();
        sender.send_async(GameEvent::Death).await.unwrap();

        sleep(Duration::from_millis(800)).await;

        let snapshot = view.borrow_and_update().clone();
        assert_eq!(snapshot.level.unwrap().code, "A");
        assert!(!snapshot.hidden);
        assert_eq!(snapshot.death_count, 1);

        drop(sender);
        timeout(Duration::from_secs(2), running)
            .await
            .expect("host stops once senders are gone")
            .unwrap();
    }
}
