//! An authority that answers from a script
//!
//! Useful in tests and demos where no API server is available.

use std::{
    collections::VecDeque,
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Notify;

use super::AsyncAuthority;
use crate::{Email, Password, RefreshTokenRef, Session, SignInCredentials, TokenPair};

/// The error returned by a [`ScriptedAuthority`]
#[derive(Clone, Debug, Error)]
#[error("{0}")]
pub struct ScriptedError(String);

impl ScriptedError {
    /// Constructs a scripted error with the given message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

struct Account {
    email: Email,
    password: Password,
    session: Session,
}

/// An authority that answers from a script
///
/// Sign-in succeeds for accounts registered with [`with_account`][Self::with_account].
/// Each refresh consumes the next scripted outcome; once the script runs
/// out, refreshes are rejected.
#[derive(Default)]
pub struct ScriptedAuthority {
    accounts: Vec<Account>,
    refreshes: Mutex<VecDeque<Result<TokenPair, ScriptedError>>>,
    gate: Option<Arc<Notify>>,
    sign_in_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
}

impl ScriptedAuthority {
    /// Constructs an authority with no accounts and no scripted refreshes
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account that signs in to `session`
    pub fn with_account(mut self, email: Email, password: Password, session: Session) -> Self {
        self.accounts.push(Account {
            email,
            password,
            session,
        });
        self
    }

    /// Scripts the next refresh to succeed with `tokens`
    pub fn then_refresh(self, tokens: TokenPair) -> Self {
        self.push_refresh(Ok(tokens));
        self
    }

    /// Scripts the next refresh to be rejected
    pub fn then_reject_refresh(self, message: impl Into<String>) -> Self {
        self.push_refresh(Err(ScriptedError::new(message)));
        self
    }

    /// Holds every refresh until `gate` is notified
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// How many sign-in exchanges have been attempted
    pub fn sign_in_calls(&self) -> usize {
        self.sign_in_calls.load(Ordering::Acquire)
    }

    /// How many refresh exchanges have been attempted
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::Acquire)
    }

    fn push_refresh(&self, outcome: Result<TokenPair, ScriptedError>) {
        self.refreshes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
    }
}

#[async_trait]
impl AsyncAuthority for ScriptedAuthority {
    type Error = ScriptedError;

    async fn sign_in(&self, credentials: &SignInCredentials) -> Result<Session, Self::Error> {
        self.sign_in_calls.fetch_add(1, Ordering::AcqRel);

        self.accounts
            .iter()
            .find(|a| a.email == credentials.email && a.password == credentials.password)
            .map(|a| a.session.clone())
            .ok_or_else(|| ScriptedError::new("invalid email or password"))
    }

    async fn refresh(&self, refresh_token: &RefreshTokenRef) -> Result<TokenPair, Self::Error> {
        self.refresh_calls.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(refresh_token = ?refresh_token, "scripted refresh requested");

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        self.refreshes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Err(ScriptedError::new("refresh token rejected")))
    }
}

impl fmt::Debug for ScriptedAuthority {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ScriptedAuthority")
            .field(
                "accounts",
                &self
                    .accounts
                    .iter()
                    .map(|a| a.email.as_str())
                    .collect::<Vec<_>>(),
            )
            .field("sign_in_calls", &self.sign_in_calls())
            .field("refresh_calls", &self.refresh_calls())
            .finish_non_exhaustive()
    }
}
