//! Ingress: turns inbound transport events into queued turns.

use std::sync::Arc;

use crate::core::{InboundEvent, PendingTurn, QueueManager, Replier};
use crate::state::{ConversationState, StateStore};
use crate::transport::Transport;

#[derive(Clone)]
pub struct Ingress {
    queue: QueueManager,
    store: Arc<StateStore>,
    transport: Arc<dyn Transport>,
}

impl Ingress {
    pub fn new(queue: QueueManager, store: Arc<StateStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            queue,
            store,
            transport,
        }
    }

    /// Queue `event` behind the sender's earlier messages. Returns once the
    /// turn is queued, not once it is answered.
    pub async fn handle(&self, event: InboundEvent) {
        let user = event.user_id();
        let state = ConversationState::new(user.clone(), self.store.clone());
        let replier = Replier::new(self.transport.clone(), event.reply_to.clone());
        let turn = PendingTurn::new(event, state, replier, self.transport.clone());

        tracing::info!(
            "Received {} message {} from {}",
            self.transport.name(),
            turn.id,
            user
        );
        self.queue.enqueue(user, turn).await;
    }
}
