use std::{cmp::Reverse, collections::BinaryHeap, sync::Arc, thread};

use chrono::{DateTime, Utc};
use flume::{bounded, unbounded, Receiver, Sender};
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::{
    error::VisionError,
    img::{frame::Frame, Template},
    overlay::GameEvent,
};

/// Turns a frame into the game events visible in it.
pub trait Classifier: Send + Sync {
    fn classify(&self, frame: &Frame) -> Result<Vec<GameEvent>, VisionError>;
}

/// Emits an event whenever its template shows up in the frame.
pub struct TemplateClassifier {
    rules: Vec<(Template, GameEvent, f64)>,
}

impl TemplateClassifier {
    pub fn new() -> Self {
        TemplateClassifier { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, template: Template, event: GameEvent, threshold: f64) {
        self.rules.push((template, event, threshold));
    }
}

impl Default for TemplateClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for TemplateClassifier {
    fn classify(&self, frame: &Frame) -> Result<Vec<GameEvent>, VisionError> {
        let mut events = Vec::new();
        for (template, event, threshold) in &self.rules {
            if frame.find_template(template, *threshold)?.is_some() {
                events.push(event.clone());
            }
        }

        Ok(events)
    }
}

struct Detection {
    num: i64,
    events: Vec<GameEvent>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
}

impl Eq for Detection {}

impl PartialEq for Detection {
    fn eq(&self, other: &Self) -> bool {
        self.num.eq(&other.num)
    }
}

impl PartialOrd for Detection {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Detection {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.num.cmp(&other.num)
    }
}

struct OrderedDetections {
    detections: BinaryHeap<Reverse<Detection>>,
    next_frame_num: i64,
}

/// Classifies frames on a pool of worker threads and emits their events in
/// frame order.
///
/// Frames must be numbered 0, 1, 2, ... with no gaps; a missing number holds
/// back every later frame.
pub struct Pipeline {
    decode_sender: Sender<Frame>,
    router: JoinHandle<()>,
}

/// Start the workers and the router. Must be called inside a tokio runtime.
pub fn new(
    classifier: Arc<dyn Classifier>,
    workers: usize,
    event_sender: Sender<GameEvent>,
) -> Pipeline {
    let workers = workers.max(1);
    let (decode_sender, decode_receiver) = bounded::<Frame>(workers * 2);
    let (output_sender, output_receiver) = unbounded::<Detection>();

    for thread_num in 0..workers {
        let frames = decode_receiver.clone();
        let output = output_sender.clone();
        let classifier = classifier.clone();

        thread::spawn(move || process_frames(thread_num, frames, output, classifier));
    }

    let router = tokio::spawn(route_detections(output_receiver, event_sender));

    Pipeline {
        decode_sender,
        router,
    }
}

impl Pipeline {
    pub fn get_decode_sender(&self) -> Sender<Frame> {
        self.decode_sender.clone()
    }

    /// Stop accepting frames and wait for everything queued to be emitted.
    pub async fn finish(self) {
        drop(self.decode_sender);

        if let Err(error) = self.router.await {
            error!("frame router failed: {}", error);
        }
    }
}

fn process_frames(
    thread_num: usize,
    frames: Receiver<Frame>,
    output: Sender<Detection>,
    classifier: Arc<dyn Classifier>,
) {
    while let Ok(frame) = frames.recv() {
        let events = match classifier.classify(&frame) {
            Ok(events) => events,
            Err(error) => {
                error!("frame {}\tclassification failed: {}", frame.num, error);
                Vec::new()
            }
        };

        debug!(
            "frame {}\tprocessed\tbuffer {}\tthread_num {}",
            frame.num,
            frames.len(),
            thread_num
        );

        let detection = Detection {
            num: frame.num,
            events,
            start_date: frame.captured_at,
            end_date: Utc::now(),
        };

        if output.send(detection).is_err() {
            break;
        }
    }
}

async fn route_detections(output: Receiver<Detection>, event_sender: Sender<GameEvent>) {
    let mut ordered = OrderedDetections {
        detections: BinaryHeap::new(),
        next_frame_num: 0,
    };
    let mut stream = output.stream();

    while let Some(detection) = stream.next().await {
        ordered.detections.push(Reverse(detection));

        while ordered
            .detections
            .peek()
            .map_or(false, |d| d.0.num == ordered.next_frame_num)
        {
            let Reverse(detection) = match ordered.detections.pop() {
                Some(detection) => detection,
                None => break,
            };
            let duration = detection.end_date - detection.start_date;

            debug!(
                "frame {}\toutput\t\tduration {}ms\tbuffer {}",
                detection.num,
                duration.num_milliseconds(),
                ordered.detections.len(),
            );

            for event in detection.events {
                info!("frame {}\tevent {:?}", detection.num, event);
                if event_sender.send_async(event).await.is_err() {
                    warn!("event receiver dropped, stopping frame router");
                    return;
                }
            }

            ordered.next_frame_num += 1;
        }
    }

    if !ordered.detections.is_empty() {
        warn!(
            "{} frames never emitted, waiting on frame {}",
            ordered.detections.len(),
            ordered.next_frame_num
        );
    }
}
