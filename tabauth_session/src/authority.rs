//! The credential exchange and refresh endpoints

use std::{error, sync::Arc};

use async_trait::async_trait;

use crate::{RefreshTokenRef, Session, SessionError, SignInCredentials, TokenPair, User};

pub mod dto;
#[cfg(feature = "http")]
pub mod http;
pub mod scripted;

#[cfg(feature = "http")]
pub use self::http::{AuthorityConfig, AuthorityError, HttpAuthority};
pub use scripted::ScriptedAuthority;

/// The server that issues credential pairs
#[async_trait]
pub trait AsyncAuthority: Send + Sync {
    /// The error type returned when an exchange fails
    type Error: error::Error + Send + Sync + 'static;

    /// Exchanges a user's credentials for a new session
    async fn sign_in(&self, credentials: &SignInCredentials) -> Result<Session, Self::Error>;

    /// Exchanges a refresh token for a new credential pair
    async fn refresh(&self, refresh_token: &RefreshTokenRef) -> Result<TokenPair, Self::Error>;
}

#[async_trait]
impl<T: AsyncAuthority + ?Sized> AsyncAuthority for Arc<T> {
    type Error = T::Error;

    async fn sign_in(&self, credentials: &SignInCredentials) -> Result<Session, Self::Error> {
        (**self).sign_in(credentials).await
    }

    async fn refresh(&self, refresh_token: &RefreshTokenRef) -> Result<TokenPair, Self::Error> {
        (**self).refresh(refresh_token).await
    }
}

/// The authenticated identity endpoint
///
/// Implementations are expected to send the current access token and to
/// recover from an expired one the same way any other call does.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    /// Loads the user the current credentials belong to
    async fn me(&self) -> Result<User, SessionError>;
}

#[async_trait]
impl<T: IdentitySource + ?Sized> IdentitySource for Arc<T> {
    async fn me(&self) -> Result<User, SessionError> {
        (**self).me().await
    }
}
