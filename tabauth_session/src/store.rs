//! Persistence of the credential pair
//!
//! A [`CredentialJar`] is the key-value contract of a cookie jar or similar
//! store, and [`SessionStore`] applies the session's keys and options on top
//! of it. Jars are shared: every tab of an origin holds a handle to the same
//! jar, so a pair written by one tab is immediately readable by the others.

use std::{fmt, sync::Arc};

use async_trait::async_trait;

use crate::config::{CookieOptions, SessionConfig};
use crate::error::BoxError;
use crate::{AccessToken, RefreshToken, TokenPair};

#[cfg(feature = "file")]
pub mod file;
pub mod memory;

#[cfg(feature = "file")]
pub use file::FileCookieJar;
pub use memory::InMemoryCookieJar;

/// A persistent key-value store for credential strings
#[async_trait]
pub trait CredentialJar: Send + Sync {
    /// Reads a value, returning `None` if it is absent or has outlived its max age
    async fn get(&self, key: &str) -> Result<Option<String>, BoxError>;

    /// Writes a value
    async fn set(&self, key: &str, value: &str, options: &CookieOptions) -> Result<(), BoxError>;

    /// Removes a value; removing an absent value is not an error
    async fn clear(&self, key: &str) -> Result<(), BoxError>;
}

/// Read, write and clear access to the persisted credential pair
#[derive(Clone)]
pub struct SessionStore {
    jar: Arc<dyn CredentialJar>,
    config: Arc<SessionConfig>,
}

impl SessionStore {
    /// Constructs a store over `jar` using the default configuration
    pub fn new(jar: impl CredentialJar + 'static) -> Self {
        Self::with_config(jar, SessionConfig::default())
    }

    /// Constructs a store over `jar`
    pub fn with_config(jar: impl CredentialJar + 'static, config: SessionConfig) -> Self {
        Self {
            jar: Arc::new(jar),
            config: Arc::new(config),
        }
    }

    /// The configuration in use
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Reads the persisted access token
    pub async fn access_token(&self) -> Result<Option<AccessToken>, BoxError> {
        let value = self.jar.get(self.config.access_token_key()).await?;
        Ok(value.filter(|v| !v.is_empty()).map(AccessToken::new))
    }

    /// Reads the persisted refresh token
    pub async fn refresh_token(&self) -> Result<Option<RefreshToken>, BoxError> {
        let value = self.jar.get(self.config.refresh_token_key()).await?;
        Ok(value.filter(|v| !v.is_empty()).map(RefreshToken::new))
    }

    /// Persists both halves of a credential pair
    ///
    /// The access token is written first. If the refresh token cannot be
    /// written, the previous access token is put back so that readers never
    /// see halves of two different pairs.
    pub async fn persist(&self, tokens: &TokenPair) -> Result<(), BoxError> {
        let options = self.config.cookie_options();
        let previous_access = self.jar.get(self.config.access_token_key()).await?;

        self.jar
            .set(
                self.config.access_token_key(),
                tokens.access_token.as_str(),
                options,
            )
            .await?;

        if let Err(error) = self
            .jar
            .set(
                self.config.refresh_token_key(),
                tokens.refresh_token.as_str(),
                options,
            )
            .await
        {
            tracing::warn!(
                error = (&*error as &dyn std::error::Error),
                "unable to persist refresh token, restoring the previous access token"
            );
            self.restore_access_token(previous_access).await;
            return Err(error);
        }

        tracing::trace!("persisted credential pair");
        Ok(())
    }

    async fn restore_access_token(&self, previous: Option<String>) {
        let key = self.config.access_token_key();
        let restored = match previous {
            Some(value) => self.jar.set(key, &value, self.config.cookie_options()).await,
            None => self.jar.clear(key).await,
        };

        if let Err(error) = restored {
            tracing::warn!(
                error = (&*error as &dyn std::error::Error),
                "unable to restore the previous access token, clearing the pair"
            );
            if let Err(error) = self.clear().await {
                tracing::error!(
                    error = (&*error as &dyn std::error::Error),
                    "unable to clear a partially written credential pair"
                );
            }
        }
    }

    /// Removes both halves of the credential pair
    ///
    /// Both keys are attempted even if the first removal fails.
    pub async fn clear(&self) -> Result<(), BoxError> {
        let access = self.jar.clear(self.config.access_token_key()).await;
        let refresh = self.jar.clear(self.config.refresh_token_key()).await;
        access?;
        refresh?;
        tracing::trace!("cleared credential pair");
        Ok(())
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
