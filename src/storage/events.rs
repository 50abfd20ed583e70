//! Change notifications.
//!
//! Every committed write publishes one [`ChangeEvent`] per touched row on a
//! broadcast channel. Listeners filter by owner and table.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Buffered events per subscriber before it starts lagging.
const CHANNEL_CAPACITY: usize = 1024;

/// Tables that emit change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Tasks,
    Projects,
    FollowUps,
    TimeEntries,
}

impl Table {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tasks => "tasks",
            Self::Projects => "projects",
            Self::FollowUps => "follow_ups",
            Self::TimeEntries => "time_entries",
        }
    }
}

/// Kind of row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One row-level change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    /// Task number for tasks, follow-up/time-entry row id, or project id.
    pub entity_id: String,
    pub owner_id: String,
}

impl ChangeEvent {
    #[must_use]
    pub fn new(table: Table, kind: ChangeKind, entity_id: impl Into<String>, owner_id: &str) -> Self {
        Self {
            table,
            kind,
            entity_id: entity_id.into(),
            owner_id: owner_id.to_string(),
        }
    }
}

/// Publish side of the change channel.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    /// Send to current subscribers. Having none is not an error.
    pub fn publish(&self, events: impl IntoIterator<Item = ChangeEvent>) {
        for event in events {
            tracing::trace!(
                table = event.table.as_str(),
                kind = ?event.kind,
                entity = %event.entity_id,
                "change published"
            );
            let _ = self.sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = ChangeBus::new();
        let mut rx = bus.subscribe();

        bus.publish([
            ChangeEvent::new(Table::Tasks, ChangeKind::Insert, "T1", "alice"),
            ChangeEvent::new(Table::FollowUps, ChangeKind::Insert, "9", "alice"),
        ]);

        assert_eq!(rx.recv().await.unwrap().entity_id, "T1");
        assert_eq!(rx.recv().await.unwrap().table, Table::FollowUps);
    }

    #[test]
    fn test_publish_without_subscribers() {
        ChangeBus::new().publish([ChangeEvent::new(
            Table::Projects,
            ChangeKind::Delete,
            "proj_1",
            "bob",
        )]);
    }
}
