//! State Persistence - mirrors designated state slices to durable storage
//!
//! Application state is a serializable struct whose top-level fields are
//! "slices". A [`StatePersistence`] is configured with the slice keys worth
//! keeping across restarts and offers an explicit load/save pair:
//!
//! - [`StatePersistence::rehydrate`] at startup seeds the state from storage
//! - [`StatePersistence::persist`] after every mutation writes each tracked
//!   slice, deleting the durable key when the slice is absent
//!
//! [`StateContainer`] wires the pair around a lock so every `update` is
//! followed by a save. Storage failures are logged and never block or roll
//! back the in-memory transition.

use crate::storage::DurableStorage;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Load/save pair for the tracked slices of a state value
#[derive(Clone)]
pub struct StatePersistence {
    storage: Arc<dyn DurableStorage>,
    keys: Vec<String>,
}

impl StatePersistence {
    pub fn new(storage: Arc<dyn DurableStorage>, keys: Vec<String>) -> Self {
        Self { storage, keys }
    }

    pub fn storage(&self) -> &Arc<dyn DurableStorage> {
        &self.storage
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn tracks(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Build the initial state from durable storage.
    ///
    /// Missing keys mean "no prior value". Unreadable or unparsable slices are
    /// skipped with a warning; if the seeded object still does not fit `S`,
    /// the default state is returned.
    pub fn rehydrate<S>(&self) -> S
    where
        S: DeserializeOwned + Default,
    {
        let mut seed = Map::new();

        for key in &self.keys {
            match self.storage.get(key) {
                Ok(Some(raw)) => match serde_json::from_str::<Value>(&raw) {
                    Ok(value) => {
                        seed.insert(key.clone(), value);
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "Discarding unparsable persisted slice");
                    }
                },
                Ok(None) => {
                    debug!(key = %key, "No persisted slice");
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to read persisted slice");
                }
            }
        }

        if seed.is_empty() {
            return S::default();
        }

        match serde_json::from_value(Value::Object(seed)) {
            Ok(state) => {
                debug!(keys = ?self.keys, "Rehydrated state from durable storage");
                state
            }
            Err(e) => {
                warn!(error = %e, "Persisted slices do not match the state shape; starting empty");
                S::default()
            }
        }
    }

    /// Mirror every tracked slice of `state` to durable storage
    pub fn persist<S>(&self, state: &S)
    where
        S: Serialize,
    {
        let slices = match serde_json::to_value(state) {
            Ok(Value::Object(slices)) => slices,
            Ok(_) => {
                warn!("State did not serialize to an object; nothing persisted");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to serialize state; nothing persisted");
                return;
            }
        };

        for key in &self.keys {
            let result = match slices.get(key) {
                None | Some(Value::Null) => self.storage.remove(key),
                Some(slice) => match serde_json::to_string(slice) {
                    Ok(json) => self.storage.set(key, &json),
                    Err(e) => Err(e.into()),
                },
            };

            if let Err(e) = result {
                warn!(key = %key, error = %e, "Failed to mirror state slice to durable storage");
            }
        }
    }
}

/// State value guarded by a lock, rehydrated on construction and persisted
/// after every update
pub struct StateContainer<S> {
    state: RwLock<S>,
    persistence: StatePersistence,
}

impl<S> StateContainer<S>
where
    S: Serialize + DeserializeOwned + Default + Clone,
{
    pub fn new(persistence: StatePersistence) -> Self {
        let state = persistence.rehydrate::<S>();
        Self {
            state: RwLock::new(state),
            persistence,
        }
    }

    pub fn persistence(&self) -> &StatePersistence {
        &self.persistence
    }

    /// Run `f` against the current state
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub fn snapshot(&self) -> S {
        self.read(S::clone)
    }

    /// Apply `f` to the state, then persist the result.
    ///
    /// The save runs while the write lock is held so durable storage always
    /// reflects the latest transition.
    pub fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut guard);
        self.persistence.persist(&*guard);
        result
    }
}
