//! Single-flight renewal of expired access tokens
//!
//! However many calls discover an expired access token at once, only one
//! refresh is sent to the authority. Every caller waits in a queue and is
//! resumed, in arrival order, with either the new access token or the error
//! that ended the refresh.
//!
//! The refresh itself runs on its own task, so a caller that gives up
//! waiting does not strand the others.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::oneshot;

use crate::authority::AsyncAuthority;
use crate::credentials::CredentialSource;
use crate::sign_out::SignOutStrategy;
use crate::{AccessToken, AccessTokenRef, RefreshError};

type Settlement = Result<AccessToken, RefreshError>;

/// A caller waiting for the refresh in flight to settle
struct PendingRequest {
    settle: oneshot::Sender<Settlement>,
}

#[derive(Default)]
enum RefreshState {
    #[default]
    Idle,
    Refreshing {
        queue: Vec<PendingRequest>,
    },
}

/// Coordinates renewal of the access token for one client
pub struct RefreshCoordinator<A> {
    inner: Arc<Inner<A>>,
}

struct Inner<A> {
    authority: A,
    credentials: Arc<dyn CredentialSource>,
    sign_out: Arc<dyn SignOutStrategy>,
    state: Mutex<RefreshState>,
}

impl<A> Clone for RefreshCoordinator<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A> RefreshCoordinator<A> {
    /// Constructs a coordinator
    ///
    /// `credentials` supplies the refresh token and receives the new pair;
    /// `sign_out` is invoked when the refresh token itself is no longer usable.
    pub fn new(
        authority: A,
        credentials: Arc<dyn CredentialSource>,
        sign_out: Arc<dyn SignOutStrategy>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                authority,
                credentials,
                sign_out,
                state: Mutex::new(RefreshState::Idle),
            }),
        }
    }

    /// The credentials used by calls made through this coordinator
    pub fn credentials(&self) -> &dyn CredentialSource {
        &*self.inner.credentials
    }

    /// The reaction to an unrecoverable session
    pub fn sign_out_strategy(&self) -> &dyn SignOutStrategy {
        &*self.inner.sign_out
    }

    /// Whether a refresh is currently in flight
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.inner.lock_state(), RefreshState::Refreshing { .. })
    }

    /// How many callers are waiting on the refresh in flight
    pub fn queued(&self) -> usize {
        match &*self.inner.lock_state() {
            RefreshState::Idle => 0,
            RefreshState::Refreshing { queue } => queue.len(),
        }
    }
}

impl<A: AsyncAuthority + 'static> RefreshCoordinator<A> {
    /// Waits for a fresh access token after a call was rejected as expired
    ///
    /// `rejected` is the access token the failed call carried. If the current
    /// token already differs from it, an earlier refresh has replaced it and
    /// that token is returned without contacting the authority. Otherwise the
    /// caller joins the refresh in flight, starting one if none is running.
    pub async fn on_expired_credential(
        &self,
        rejected: Option<&AccessTokenRef>,
    ) -> Result<AccessToken, RefreshError> {
        let (settle, settled) = oneshot::channel();

        let starts_cycle = {
            let mut state = self.inner.lock_state();
            match &mut *state {
                RefreshState::Refreshing { queue } => {
                    queue.push(PendingRequest { settle });
                    tracing::debug!(queued = queue.len(), "refresh in flight, queued request");
                    false
                }
                RefreshState::Idle => {
                    if let Some(current) = self.inner.credentials.access_token() {
                        if rejected.map_or(true, |r| r.as_str() != current.as_str()) {
                            tracing::debug!("access token already replaced, skipping refresh");
                            return Ok(current);
                        }
                    }
                    *state = RefreshState::Refreshing {
                        queue: vec![PendingRequest { settle }],
                    };
                    true
                }
            }
        };

        if starts_cycle {
            tracing::debug!("access token expired, starting refresh");
            tokio::spawn(run_refresh(self.inner.clone()));
        }

        settled.await.unwrap_or(Err(RefreshError::Abandoned))
    }
}

impl<A: fmt::Debug> fmt::Debug for RefreshCoordinator<A> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("authority", &self.inner.authority)
            .field("refreshing", &self.is_refreshing())
            .field("queued", &self.queued())
            .finish_non_exhaustive()
    }
}

impl<A> Inner<A> {
    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolves every queued caller and returns to idle
    ///
    /// The queue is taken and the state reset under one lock, so callers
    /// that discover a new expiry once woken start a new cycle.
    fn settle(&self, outcome: &Settlement) -> usize {
        let queue = match std::mem::take(&mut *self.lock_state()) {
            RefreshState::Refreshing { queue } => queue,
            RefreshState::Idle => Vec::new(),
        };

        let count = queue.len();
        for pending in queue {
            // A caller that stopped waiting has nothing left to resume
            let _ = pending.settle.send(outcome.clone());
        }
        count
    }
}

impl<A: AsyncAuthority> Inner<A> {
    async fn refresh(&self) -> Settlement {
        let refresh_token = self
            .credentials
            .refresh_token()
            .await
            .map_err(|e| RefreshError::Store(Arc::new(e)))?
            .ok_or(RefreshError::MissingRefreshToken)?;

        let tokens = self
            .authority
            .refresh(&refresh_token)
            .await
            .map_err(|e| RefreshError::Rejected(Arc::new(e)))?;

        self.credentials
            .persist(&tokens)
            .await
            .map_err(|e| RefreshError::Store(Arc::new(e)))?;

        Ok(tokens.access_token)
    }
}

/// Settles the queue if a refresh cycle is torn down before it finishes
struct CycleGuard<'a, A> {
    inner: &'a Inner<A>,
    armed: bool,
}

impl<A> Drop for CycleGuard<'_, A> {
    fn drop(&mut self) {
        if self.armed {
            let abandoned = self.inner.settle(&Err(RefreshError::Abandoned));
            tracing::error!(abandoned, "refresh cycle ended without settling");
        }
    }
}

async fn run_refresh<A: AsyncAuthority>(inner: Arc<Inner<A>>) {
    let mut guard = CycleGuard {
        inner: &inner,
        armed: true,
    };

    let outcome = inner.refresh().await;

    match &outcome {
        Ok(_) => {
            let resumed = inner.settle(&outcome);
            guard.armed = false;
            tracing::info!(resumed, "refreshed access token, resuming queued requests");
        }
        Err(error) => {
            if let Err(clear_error) = inner.credentials.clear().await {
                tracing::warn!(
                    error = (&clear_error as &dyn std::error::Error),
                    "unable to clear credentials after failed refresh"
                );
            }
            let failed = inner.settle(&outcome);
            guard.armed = false;
            tracing::warn!(
                error = (error as &dyn std::error::Error),
                failed,
                "refresh failed, rejecting queued requests and signing out"
            );
            inner.sign_out.sign_out().await;
        }
    }
}
