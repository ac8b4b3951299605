//! Scripted backend and recording transport shared by unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;

use crate::core::{InboundEvent, OutboundChunk, PendingTurn, Replier, UserId};
use crate::providers::{Assistant, ProviderError};
use crate::state::{ConversationState, StateStore};
use crate::transport::{Transport, TransportError, DEFAULT_MAX_MESSAGE_LEN};

type ReplyFn = dyn Fn(&str) -> Result<String, ProviderError> + Send + Sync;

/// Backend that answers through a closure and records concurrency.
pub struct ScriptedAssistant {
    reply: Box<ReplyFn>,
    delay: Duration,
    gate: Option<Arc<Barrier>>,
    calls: Mutex<Vec<(String, String)>>,
    in_flight: Mutex<HashMap<String, usize>>,
    max_per_user: AtomicUsize,
    total: AtomicUsize,
    max_total: AtomicUsize,
}

impl ScriptedAssistant {
    pub fn replying<F>(reply: F) -> Arc<Self>
    where
        F: Fn(&str) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self::with_delay(reply, Duration::ZERO)
    }

    pub fn with_delay<F>(reply: F, delay: Duration) -> Arc<Self>
    where
        F: Fn(&str) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self::build(reply, delay, None)
    }

    /// Every call waits at `gate` before answering.
    pub fn gated<F>(reply: F, gate: Arc<Barrier>) -> Arc<Self>
    where
        F: Fn(&str) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self::build(reply, Duration::ZERO, Some(gate))
    }

    fn build<F>(reply: F, delay: Duration, gate: Option<Arc<Barrier>>) -> Arc<Self>
    where
        F: Fn(&str) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            reply: Box::new(reply),
            delay,
            gate,
            calls: Mutex::new(Vec::new()),
            in_flight: Mutex::new(HashMap::new()),
            max_per_user: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            max_total: AtomicUsize::new(0),
        })
    }

    /// (user, message) pairs in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn messages_for(&self, user: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(u, _)| u == user)
            .map(|(_, m)| m)
            .collect()
    }

    /// Most calls ever in flight at once for a single user.
    pub fn max_in_flight_per_user(&self) -> usize {
        self.max_per_user.load(Ordering::SeqCst)
    }

    /// Most calls ever in flight at once overall.
    pub fn max_in_flight_total(&self) -> usize {
        self.max_total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Assistant for ScriptedAssistant {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn ask(
        &self,
        _assistant_id: &str,
        message: &str,
        state: &ConversationState,
    ) -> Result<String, ProviderError> {
        let user = state.user().to_string();
        self.calls
            .lock()
            .unwrap()
            .push((user.clone(), message.to_string()));
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            let count = in_flight.entry(user.clone()).or_insert(0);
            *count += 1;
            self.max_per_user.fetch_max(*count, Ordering::SeqCst);
        }
        let now = self.total.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_total.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.wait().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.total.fetch_sub(1, Ordering::SeqCst);
        if let Some(count) = self.in_flight.lock().unwrap().get_mut(&user) {
            *count -= 1;
        }
        (self.reply)(message)
    }
}

/// Transport that remembers what it was asked to send.
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
    composing: AtomicUsize,
    fail_composing: AtomicBool,
    fail_body: Mutex<Option<String>>,
    max_len: usize,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Self::with_max_len(DEFAULT_MAX_MESSAGE_LEN)
    }

    pub fn with_max_len(max_len: usize) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            composing: AtomicUsize::new(0),
            fail_composing: AtomicBool::new(false),
            fail_body: Mutex::new(None),
            max_len,
        })
    }

    /// (recipient, body) pairs in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, body)| body).collect()
    }

    pub fn bodies_to(&self, to: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(recipient, _)| recipient == to)
            .map(|(_, body)| body)
            .collect()
    }

    pub fn composing_count(&self) -> usize {
        self.composing.load(Ordering::SeqCst)
    }

    pub fn fail_composing(&self, fail: bool) {
        self.fail_composing.store(fail, Ordering::SeqCst);
    }

    pub fn fail_on_body(&self, body: &str) {
        *self.fail_body.lock().unwrap() = Some(body.to_string());
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    fn max_message_len(&self) -> usize {
        self.max_len
    }

    async fn send(&self, to: &str, chunk: &OutboundChunk) -> Result<(), TransportError> {
        if self.fail_body.lock().unwrap().as_deref() == Some(chunk.body.as_str()) {
            return Err(TransportError::Api(format!("rejected '{}'", chunk.body)));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), chunk.body.clone()));
        Ok(())
    }

    async fn notify_composing(&self, _event: &InboundEvent) -> Result<(), TransportError> {
        self.composing.fetch_add(1, Ordering::SeqCst);
        if self.fail_composing.load(Ordering::SeqCst) {
            return Err(TransportError::Api("typing not allowed".to_string()));
        }
        Ok(())
    }
}

/// Build a turn from `user` whose replies go back to `user`.
pub fn turn_for(user: &str, body: &str, transport: Arc<RecordingTransport>) -> PendingTurn {
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    let event = InboundEvent::new("test", user, user, body);
    let state = ConversationState::new(UserId::from(user), store);
    let transport: Arc<dyn Transport> = transport;
    let replier = Replier::new(transport.clone(), user);
    PendingTurn::new(event, state, replier, transport)
}
