use tokio::sync::broadcast;

/// Table group touched by a committed write.
///
/// Subscribers re-query what they display when they see an event. Events are
/// only sent after the transaction that produced them has committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreEvent {
    Folders,
    Feeds,
    Items,
    User,
    Windows,
    /// Everything was deleted.
    Reset,
}

const CAPACITY: usize = 64;

pub(crate) struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, events: &[StoreEvent]) {
        for event in events {
            // Only fails when nobody is listening.
            let _ = self.sender.send(*event);
        }
    }
}
