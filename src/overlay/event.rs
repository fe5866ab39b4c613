use serde::{Deserialize, Serialize};

use crate::error::EventError;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Level {
    pub code: String,
    pub name: String,
    pub author: String,
}

impl Level {
    pub fn new(code: &str, name: &str, author: &str) -> Level {
        Level {
            code: code.to_string(),
            name: name.to_string(),
            author: author.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameEvent {
    LevelLoaded(Level),
    Death,
    Restart,
    Exit,
    Clear,
    GameOver,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Level,
    Death,
    Restart,
    Exit,
    Clear,
    GameOver,
}

impl EventKind {
    pub fn from_tag(tag: &str) -> Option<EventKind> {
        match tag {
            "level" => Some(EventKind::Level),
            "death" => Some(EventKind::Death),
            "restart" => Some(EventKind::Restart),
            "exit" => Some(EventKind::Exit),
            "clear" => Some(EventKind::Clear),
            "gameover" => Some(EventKind::GameOver),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            EventKind::Level => "level",
            EventKind::Death => "death",
            EventKind::Restart => "restart",
            EventKind::Exit => "exit",
            EventKind::Clear => "clear",
            EventKind::GameOver => "gameover",
        }
    }
}

impl GameEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            GameEvent::LevelLoaded(_) => EventKind::Level,
            GameEvent::Death => EventKind::Death,
            GameEvent::Restart => EventKind::Restart,
            GameEvent::Exit => EventKind::Exit,
            GameEvent::Clear => EventKind::Clear,
            GameEvent::GameOver => EventKind::GameOver,
        }
    }

    pub fn to_message(&self) -> Result<String, EventError> {
        let level = match self {
            GameEvent::LevelLoaded(level) => Some(level),
            _ => None,
        };

        Ok(serde_json::to_string(&Message {
            kind: Some(self.kind().tag().to_string()),
            level: level.cloned(),
        })?)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    level: Option<Level>,
}

/// Decode one wire message into the events it carries.
///
/// A `level` payload loads that level whatever the message type is, after
/// the type's own event.
pub fn decode_message(text: &str) -> Result<Vec<GameEvent>, EventError> {
    let message: Message = serde_json::from_str(text)?;
    let kind = message.kind.as_deref().and_then(EventKind::from_tag);
    let mut events = Vec::with_capacity(2);

    match (kind, message.level) {
        (Some(EventKind::Level), Some(level)) => events.push(GameEvent::LevelLoaded(level)),
        (Some(EventKind::Level), None) | (None, None) => {
            return Err(EventError::MalformedEvent(message.kind))
        }
        (kind, level) => {
            match kind {
                Some(EventKind::Death) => events.push(GameEvent::Death),
                Some(EventKind::Restart) => events.push(GameEvent::Restart),
                Some(EventKind::Exit) => events.push(GameEvent::Exit),
                Some(EventKind::Clear) => events.push(GameEvent::Clear),
                Some(EventKind::GameOver) => events.push(GameEvent::GameOver),
                Some(EventKind::Level) | None => {}
            }
            if let Some(level) = level {
                events.push(GameEvent::LevelLoaded(level));
            }
        }
    }

    Ok(events)
}
