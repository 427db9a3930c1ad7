//! An in-memory credential jar

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;

use super::CredentialJar;
use crate::clock::{Clock, System, UnixTime};
use crate::config::CookieOptions;
use crate::error::BoxError;

#[derive(Debug)]
struct Entry {
    value: String,
    expires: UnixTime,
}

/// An in-memory credential jar
///
/// Clones share the same contents, standing in for a cookie jar that every
/// tab of an origin can see.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCookieJar<C = System> {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    clock: C,
}

impl InMemoryCookieJar<System> {
    /// Constructs a new, empty jar using the system clock
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C> InMemoryCookieJar<C> {
    /// Constructs a new, empty jar using the given clock
    pub fn with_clock(clock: C) -> Self {
        Self {
            entries: Arc::default(),
            clock,
        }
    }
}

#[async_trait]
impl<C: Clock + Send + Sync> CredentialJar for InMemoryCookieJar<C> {
    async fn get(&self, key: &str) -> Result<Option<String>, BoxError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if now < entry.expires => Ok(Some(entry.value.clone())),
            Some(_) => {
                tracing::trace!(key, "discarding expired value");
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, options: &CookieOptions) -> Result<(), BoxError> {
        let expires = self.clock.now() + options.max_age;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key.to_owned(),
                Entry {
                    value: value.to_owned(),
                    expires,
                },
            );
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), BoxError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}
