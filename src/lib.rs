use std::time::Duration;

use flume::unbounded;

use crate::overlay::{host, transport, OverlaySettings};

#[macro_use]
extern crate log;

pub mod error;
pub mod img;
pub mod overlay;
pub mod pipeline;
pub mod roi;

/// Connect to the event server WebSocket at `url` and run the overlay until the
/// process is stopped. Every snapshot change is written to stdout as a JSON
/// line for the display layer.
pub async fn start_overlay(settings: OverlaySettings, url: String, retry: Duration) {
    let (event_sender, event_receiver) = unbounded();
    let (host, mut view) = host::new(settings, event_receiver);

    let relay = tokio::spawn(transport::relay_events(url, retry, event_sender));

    tokio::spawn(async move {
        while view.changed().await.is_ok() {
            let snapshot = view.borrow().clone();
            match serde_json::to_string(&snapshot) {
                Ok(line) => println!("{}", line),
                Err(error) => error!("could not encode overlay view: {}", error),
            }
        }
    });

    host.run().await;
    relay.abort();
}
