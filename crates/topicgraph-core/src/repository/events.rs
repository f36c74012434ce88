//! Lifecycle notifications.

use tokio::sync::broadcast;
use tracing::trace;

use crate::topic::Topic;

/// A change the repository announces to subscribers.
#[derive(Debug, Clone)]
pub enum RepositoryEvent {
    Deleted {
        topic: Topic,
    },
    Moved {
        topic: Topic,
        source: Option<Topic>,
        target: Topic,
    },
    Renamed {
        topic: Topic,
        old_key: String,
        new_key: String,
    },
}

impl RepositoryEvent {
    pub fn topic(&self) -> &Topic {
        match self {
            Self::Deleted { topic } | Self::Moved { topic, .. } | Self::Renamed { topic, .. } => {
                topic
            }
        }
    }
}

/// Fan-out of [`RepositoryEvent`]s to any number of subscribers.
///
/// Publishing with no subscribers is not an error. A subscriber that falls
/// more than `capacity` events behind observes a lag on its next receive.
#[derive(Debug, Clone)]
pub struct RepositoryEvents {
    sender: broadcast::Sender<RepositoryEvent>,
}

impl RepositoryEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RepositoryEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: RepositoryEvent) {
        if self.sender.send(event).is_err() {
            trace!("No subscribers for repository event");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
