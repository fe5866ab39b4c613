//! Event-driven overlay: level metadata, level timer, death counter and the
//! host loop that feeds them.

pub mod event;
pub mod host;
pub mod machine;
pub mod settings;
pub mod timer;
pub mod transport;

pub use event::{decode_message, EventKind, GameEvent, Level};
pub use machine::{OverlayMachine, OverlayView, TimerAlert};
pub use settings::{OverlaySettings, RestartPolicy, TimerDirection};
