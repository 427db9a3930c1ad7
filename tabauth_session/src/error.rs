use std::{error, sync::Arc};

use thiserror::Error;

/// A boxed error from a storage backend or endpoint
pub type BoxError = Box<dyn error::Error + Send + Sync + 'static>;

/// An error produced while maintaining a session
#[derive(Debug, Error)]
pub enum SessionError {
    /// The server rejected the credential for a reason other than expiry
    #[error("credential rejected by the server (code: {})", code.as_deref().unwrap_or("none"))]
    InvalidCredential {
        /// The application error code, if the server supplied one
        code: Option<String>,
    },
    /// The expired credential could not be refreshed
    #[error("unable to refresh the session")]
    RefreshFailed(#[from] RefreshError),
    /// The session is unusable and the caller must decide how to re-authenticate
    ///
    /// Only produced where no interactive tab exists to sign out of.
    #[error("authentication required")]
    AuthenticationRequired {
        /// The failure that ended the session
        #[source]
        source: Option<Box<SessionError>>,
    },
    /// The credential exchange failed
    #[error("sign-in failed")]
    SignIn(#[source] BoxError),
    /// The identity endpoint could not be queried
    #[error("unable to load the signed-in user")]
    Identity(#[source] BoxError),
    /// The credential store failed
    #[error("credential store failure")]
    Store(#[source] BoxError),
    /// The cross-tab channel refused an operation
    #[error(transparent)]
    Broadcast(#[from] crate::broadcast::BroadcastError),
    /// The request body cannot be cloned, so the request cannot be re-issued
    /// after a refresh
    #[error("request cannot be replayed after a credential refresh")]
    UnreplayableRequest,
    /// The access token contains bytes not allowed in a header value
    #[error("access token is not a valid header value")]
    InvalidHeader,
}

impl SessionError {
    /// Wraps an unrecoverable failure for a caller that decides on redirection
    pub fn authentication_required(source: SessionError) -> Self {
        Self::AuthenticationRequired {
            source: Some(Box::new(source)),
        }
    }

    /// Whether a route guard should treat this error as a missing session
    pub fn is_authentication_required(&self) -> bool {
        matches!(self, Self::AuthenticationRequired { .. })
    }
}

/// The outcome of a failed refresh, shared by every request waiting on it
#[derive(Clone, Debug, Error)]
pub enum RefreshError {
    /// No refresh token was available in the store
    #[error("no refresh token available")]
    MissingRefreshToken,
    /// The refresh endpoint rejected the request or could not be reached
    #[error("refresh endpoint rejected the refresh token")]
    Rejected(#[source] Arc<dyn error::Error + Send + Sync + 'static>),
    /// The refreshed credentials could not be read or persisted
    #[error("unable to access stored credentials during refresh")]
    Store(#[source] Arc<SessionError>),
    /// The refresh was torn down before it settled
    #[error("refresh abandoned before it settled")]
    Abandoned,
}
