//! Where outgoing calls get their credentials from
//!
//! An interactive tab reads the shared [`SessionStore`] and keeps the current
//! access token in memory as the default credential for future calls. A
//! server-rendered request instead works from the cookies it arrived with and
//! reports any change back through its response.

use std::{
    fmt,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use cookie::{time::Duration as CookieDuration, Cookie};
use tokio::sync::watch;

use crate::config::SessionConfig;
use crate::store::SessionStore;
use crate::{AccessToken, RefreshToken, SessionError, TokenPair};

/// Read and write access to the credentials used by outgoing calls
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// The access token to attach to the next call
    fn access_token(&self) -> Option<AccessToken>;

    /// The refresh token to present to the refresh endpoint
    async fn refresh_token(&self) -> Result<Option<RefreshToken>, SessionError>;

    /// Records a new credential pair
    async fn persist(&self, tokens: &TokenPair) -> Result<(), SessionError>;

    /// Forgets the credential pair
    async fn clear(&self) -> Result<(), SessionError>;
}

/// Credentials backed by the store every tab of an origin shares
///
/// The in-memory default credential is published on a watch channel so
/// observers can follow it.
pub struct SharedCredentials {
    store: SessionStore,
    current: watch::Sender<Option<AccessToken>>,
}

impl SharedCredentials {
    /// Loads the default credential from `store`
    pub async fn load(store: SessionStore) -> Result<Self, SessionError> {
        let access_token = store.access_token().await.map_err(SessionError::Store)?;
        let (current, _) = watch::channel(access_token);
        Ok(Self { store, current })
    }

    /// The shared store
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Follows changes to the default credential
    pub fn subscribe(&self) -> watch::Receiver<Option<AccessToken>> {
        self.current.subscribe()
    }

    /// Re-reads the default credential from the shared store
    ///
    /// Used when another tab announces that it changed the stored pair.
    pub async fn reload(&self) -> Result<(), SessionError> {
        let access_token = self
            .store
            .access_token()
            .await
            .map_err(SessionError::Store)?;
        self.current.send_replace(access_token);
        Ok(())
    }
}

#[async_trait]
impl CredentialSource for SharedCredentials {
    fn access_token(&self) -> Option<AccessToken> {
        self.current.borrow().clone()
    }

    async fn refresh_token(&self) -> Result<Option<RefreshToken>, SessionError> {
        // Another tab may have rotated the pair since this one last looked
        self.store
            .refresh_token()
            .await
            .map_err(SessionError::Store)
    }

    async fn persist(&self, tokens: &TokenPair) -> Result<(), SessionError> {
        self.store
            .persist(tokens)
            .await
            .map_err(SessionError::Store)?;
        self.current
            .send_replace(Some(tokens.access_token.clone()));
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionError> {
        self.current.send_replace(None);
        self.store.clear().await.map_err(SessionError::Store)
    }
}

impl fmt::Debug for SharedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SharedCredentials")
            .field("store", &self.store)
            .field("current", &*self.current.borrow())
            .finish()
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    access_token: Option<AccessToken>,
    refresh_token: Option<RefreshToken>,
    changed: bool,
}

/// Credentials carried by a single server-rendered request
///
/// Nothing is shared with other requests. Changes are kept in the snapshot
/// and turned into `Set-Cookie` values by
/// [`response_cookies`][Self::response_cookies].
#[derive(Debug)]
pub struct RequestCredentials {
    config: SessionConfig,
    snapshot: Mutex<Snapshot>,
}

impl RequestCredentials {
    /// Parses the credentials out of a request's `Cookie` header
    ///
    /// Malformed cookie pairs are skipped.
    pub fn from_cookie_header(header: &str, config: SessionConfig) -> Self {
        let mut snapshot = Snapshot::default();
        for parsed in Cookie::split_parse(header) {
            let cookie = match parsed {
                Ok(cookie) => cookie,
                Err(error) => {
                    tracing::debug!(%error, "skipping malformed cookie");
                    continue;
                }
            };
            if cookie.value().is_empty() {
                continue;
            }
            if cookie.name() == config.access_token_key() {
                snapshot.access_token = Some(AccessToken::new(cookie.value().to_owned()));
            } else if cookie.name() == config.refresh_token_key() {
                snapshot.refresh_token = Some(RefreshToken::new(cookie.value().to_owned()));
            }
        }

        Self {
            config,
            snapshot: Mutex::new(snapshot),
        }
    }

    /// Whether the request carries an access token
    pub fn is_signed_in(&self) -> bool {
        self.lock().access_token.is_some()
    }

    /// The `Set-Cookie` values needed to carry changes back to the browser
    ///
    /// Empty if the credentials were never changed during the request.
    pub fn response_cookies(&self) -> Vec<Cookie<'static>> {
        let snapshot = self.lock();
        if !snapshot.changed {
            return Vec::new();
        }

        let options = self.config.cookie_options();
        let cookie = |name: &str, value: Option<&str>| {
            let max_age = match value {
                Some(_) => {
                    CookieDuration::seconds(i64::try_from(options.max_age.0).unwrap_or(i64::MAX))
                }
                None => CookieDuration::ZERO,
            };
            Cookie::build((name.to_owned(), value.unwrap_or_default().to_owned()))
                .path(options.path.clone())
                .max_age(max_age)
                .build()
        };

        vec![
            cookie(
                self.config.access_token_key(),
                snapshot.access_token.as_ref().map(|t| t.as_str()),
            ),
            cookie(
                self.config.refresh_token_key(),
                snapshot.refresh_token.as_ref().map(|t| t.as_str()),
            ),
        ]
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Snapshot> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CredentialSource for RequestCredentials {
    fn access_token(&self) -> Option<AccessToken> {
        self.lock().access_token.clone()
    }

    async fn refresh_token(&self) -> Result<Option<RefreshToken>, SessionError> {
        Ok(self.lock().refresh_token.clone())
    }

    async fn persist(&self, tokens: &TokenPair) -> Result<(), SessionError> {
        let mut snapshot = self.lock();
        snapshot.access_token = Some(tokens.access_token.clone());
        snapshot.refresh_token = Some(tokens.refresh_token.clone());
        snapshot.changed = true;
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionError> {
        let mut snapshot = self.lock();
        snapshot.access_token = None;
        snapshot.refresh_token = None;
        snapshot.changed = true;
        Ok(())
    }
}
