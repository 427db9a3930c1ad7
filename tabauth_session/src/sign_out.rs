//! What happens when a session can no longer be used

use async_trait::async_trait;

use crate::SessionError;

/// Reacts to a session that cannot be recovered
///
/// An interactive tab signs out and returns to the entry view (see
/// [`Tab`][crate::Tab]); a server-rendered request has no tab to redirect and
/// hands the decision to its caller instead ([`DeferToCaller`]).
#[async_trait]
pub trait SignOutStrategy: Send + Sync {
    /// Ends the session
    ///
    /// Must be safe to call repeatedly.
    async fn sign_out(&self);

    /// Converts an unrecoverable failure into the error handed to the caller
    fn surface(&self, error: SessionError) -> SessionError {
        error
    }
}

/// Leaves sign-out to the caller by surfacing
/// [`SessionError::AuthenticationRequired`]
#[derive(Clone, Copy, Debug, Default)]
pub struct DeferToCaller;

#[async_trait]
impl SignOutStrategy for DeferToCaller {
    async fn sign_out(&self) {
        tracing::debug!("session ended outside an interactive tab, deferring to caller");
    }

    fn surface(&self, error: SessionError) -> SessionError {
        if error.is_authentication_required() {
            error
        } else {
            SessionError::authentication_required(error)
        }
    }
}
