//! Conversation state: what a backend remembers about each user between turns.

pub mod sqlite;

pub use sqlite::StateStore;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::core::UserId;
use crate::error::Error;

/// Handle on one user's slice of the state store.
#[derive(Clone)]
pub struct ConversationState {
    user: UserId,
    store: Arc<StateStore>,
}

impl ConversationState {
    pub fn new(user: UserId, store: Arc<StateStore>) -> Self {
        Self { user, store }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, Error> {
        self.store.get(&self.user, key)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.store.set(&self.user, key, value)
    }

    pub fn remove(&self, key: &str) -> Result<bool, Error> {
        self.store.remove(&self.user, key)
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, Error> {
        match self.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), Error> {
        self.set(key, &serde_json::to_string(value)?)
    }
}
