use std::sync::Arc;

use crate::deadletter::FjallDeadLetterStore;
use crate::messaging::InMemoryBroker;
use crate::observability::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub node_name: Arc<str>,
    pub broker: Arc<InMemoryBroker>,
    pub metrics: Arc<Metrics>,
    /// Present only when dead letters are persisted
    pub dead_letters: Option<Arc<FjallDeadLetterStore>>,
}

impl AppState {
    pub fn new(
        node_name: impl Into<Arc<str>>,
        broker: Arc<InMemoryBroker>,
        metrics: Arc<Metrics>,
        dead_letters: Option<Arc<FjallDeadLetterStore>>,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            broker,
            metrics,
            dead_letters,
        }
    }
}
