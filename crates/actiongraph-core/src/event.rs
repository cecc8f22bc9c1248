use std::sync::Mutex;

use serde::Serialize;
use tracing::info;

use crate::model::Action;
use crate::types::UserId;

/// Change notification, published after the mutation committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ActionEvent {
    Added {
        action: Action,
        user_id: UserId,
    },
    Updated {
        before: Action,
        after: Action,
        user_id: UserId,
    },
    Deleted {
        action: Action,
        user_id: UserId,
    },
}

impl ActionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Added { .. } => "added",
            Self::Updated { .. } => "updated",
            Self::Deleted { .. } => "deleted",
        }
    }

    /// The action as it stands after the event (the removed one for deletes).
    pub fn action(&self) -> &Action {
        match self {
            Self::Added { action, .. } | Self::Deleted { action, .. } => action,
            Self::Updated { after, .. } => after,
        }
    }
}

pub trait EventSink: Send + Sync {
    fn publish(&self, event: &ActionEvent);
}

pub struct NoopSink;

impl EventSink for NoopSink {
    fn publish(&self, _event: &ActionEvent) {}
}

pub struct LogSink;

impl EventSink for LogSink {
    fn publish(&self, event: &ActionEvent) {
        let a = event.action();
        info!(event = event.name(), action = a.id, name = %a.name, "action event");
    }
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ActionEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ActionEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: &ActionEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

impl<T: EventSink + ?Sized> EventSink for std::sync::Arc<T> {
    fn publish(&self, event: &ActionEvent) {
        (**self).publish(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn recording_sink_keeps_order() {
        let sink = Arc::new(RecordingSink::new());
        let shared: Box<dyn EventSink> = Box::new(sink.clone());
        let a = Action::new(1, "build");
        shared.publish(&ActionEvent::Added {
            action: a.clone(),
            user_id: 0,
        });
        shared.publish(&ActionEvent::Deleted {
            action: a,
            user_id: 7,
        });
        let names: Vec<_> = sink.events().iter().map(ActionEvent::name).collect();
        assert_eq!(names, vec!["added", "deleted"]);
    }

    #[test]
    fn event_serializes_with_tag() {
        let ev = ActionEvent::Deleted {
            action: Action::new(1, "build"),
            user_id: 3,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], "deleted");
        assert_eq!(json["action"]["name"], "build");
    }
}
