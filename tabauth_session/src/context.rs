//! The per-tab view of the session
//!
//! A [`Tab`] holds what one open tab knows: its credentials, its handle on
//! the session channel, the view it shows and the user it believes is signed
//! in. [`SessionContext`] adds the network-facing operations (sign-in and
//! hydration) and keeps the tab in step with its siblings once mounted.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use tokio::{sync::watch, task::JoinHandle};

use crate::authority::{AsyncAuthority, IdentitySource};
use crate::broadcast::{BroadcastMessage, TabChannel};
use crate::credentials::{CredentialSource, SharedCredentials};
use crate::sign_out::SignOutStrategy;
use crate::{SessionError, SignInCredentials, User, View};

/// Whether a sign-out is announced to the other tabs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Announce {
    /// Publish `SignOut` on the session channel
    Publish,
    /// Stay quiet, because the sign-out was itself prompted by another tab
    Suppress,
}

/// One open tab
#[derive(Clone)]
pub struct Tab {
    inner: Arc<TabInner>,
}

struct TabInner {
    credentials: Arc<SharedCredentials>,
    channel: TabChannel,
    view: watch::Sender<View>,
    user: watch::Sender<Option<User>>,
}

impl Tab {
    /// Constructs a tab showing the entry view
    pub fn new(credentials: Arc<SharedCredentials>, channel: TabChannel) -> Self {
        let (view, _) = watch::channel(View::Entry);
        let (user, _) = watch::channel(None);
        Self {
            inner: Arc::new(TabInner {
                credentials,
                channel,
                view,
                user,
            }),
        }
    }

    /// The tab's credentials
    pub fn credentials(&self) -> &Arc<SharedCredentials> {
        &self.inner.credentials
    }

    /// The tab's handle on the session channel
    pub fn channel(&self) -> &TabChannel {
        &self.inner.channel
    }

    /// The view currently shown
    pub fn view(&self) -> View {
        *self.inner.view.borrow()
    }

    /// Follows navigation of this tab
    pub fn watch_view(&self) -> watch::Receiver<View> {
        self.inner.view.subscribe()
    }

    /// The user this tab believes is signed in
    pub fn user(&self) -> Option<User> {
        self.inner.user.borrow().clone()
    }

    /// Follows changes to the signed-in user
    pub fn watch_user(&self) -> watch::Receiver<Option<User>> {
        self.inner.user.subscribe()
    }

    /// Whether this tab has a signed-in user
    pub fn is_authenticated(&self) -> bool {
        self.inner.user.borrow().is_some()
    }

    pub(crate) fn navigate(&self, view: View) {
        let previous = self.inner.view.send_replace(view);
        if previous != view {
            tracing::debug!(tab = %self.inner.channel.id(), ?view, "navigated");
        }
    }

    pub(crate) fn set_user(&self, user: Option<User>) {
        self.inner.user.send_replace(user);
    }

    /// Clears the session and returns to the entry view
    ///
    /// Signing out of an already signed-out tab leaves it unchanged apart
    /// from the announcement.
    pub async fn sign_out(&self, announce: Announce) {
        if let Err(error) = self.inner.credentials.clear().await {
            tracing::warn!(
                error = (&error as &dyn std::error::Error),
                "unable to clear stored credentials while signing out"
            );
        }
        self.set_user(None);
        self.navigate(View::Entry);

        tracing::info!(tab = %self.inner.channel.id(), ?announce, "signed out");

        if announce == Announce::Publish {
            self.inner.channel.publish(BroadcastMessage::SignOut);
        }
    }

    async fn on_message(&self, message: BroadcastMessage) {
        match message {
            BroadcastMessage::SignIn => {
                // The store is shared, so the new pair is already readable here
                if let Err(error) = self.inner.credentials.reload().await {
                    tracing::warn!(
                        error = (&error as &dyn std::error::Error),
                        "unable to reload credentials announced by another tab"
                    );
                }
                self.navigate(View::Dashboard);
            }
            BroadcastMessage::SignOut => self.sign_out(Announce::Suppress).await,
        }
    }
}

#[async_trait]
impl SignOutStrategy for Tab {
    async fn sign_out(&self) {
        Tab::sign_out(self, Announce::Publish).await
    }
}

impl fmt::Debug for Tab {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Tab")
            .field("channel", &self.inner.channel)
            .field("view", &self.view())
            .field("user", &*self.inner.user.borrow())
            .finish_non_exhaustive()
    }
}

/// A tab together with the endpoints it talks to
pub struct SessionContext<A, I> {
    tab: Tab,
    authority: A,
    identity: I,
}

impl<A, I> SessionContext<A, I> {
    /// Constructs a context for `tab`
    ///
    /// `identity` should make its calls through the same credentials as the
    /// tab, so that an expired token is refreshed transparently.
    pub fn new(tab: Tab, authority: A, identity: I) -> Self {
        Self {
            tab,
            authority,
            identity,
        }
    }

    /// The tab this context drives
    pub fn tab(&self) -> &Tab {
        &self.tab
    }

    /// The authority used to sign in
    pub fn authority(&self) -> &A {
        &self.authority
    }

    /// The identity endpoint used to restore the session
    pub fn identity(&self) -> &I {
        &self.identity
    }

    /// The user this tab believes is signed in
    pub fn user(&self) -> Option<User> {
        self.tab.user()
    }

    /// Whether this tab has a signed-in user
    pub fn is_authenticated(&self) -> bool {
        self.tab.is_authenticated()
    }

    /// Signs out and tells the other tabs to do the same
    pub async fn sign_out(&self) {
        self.tab.sign_out(Announce::Publish).await
    }
}

impl<A: AsyncAuthority, I: IdentitySource> SessionContext<A, I> {
    /// Starts following the other tabs and restores any stored session
    ///
    /// If a token is stored, the user is loaded from the identity endpoint;
    /// should that fail, the tab signs out unless the session was already
    /// ended along the way. The returned guard keeps the tab
    /// listening until it is dropped.
    pub async fn mount(&self) -> Result<MountedTab, SessionError> {
        let mut subscription = self.tab.channel().subscribe()?;
        let tab = self.tab.clone();
        let listener = tokio::spawn(async move {
            while let Some(message) = subscription.recv().await {
                tab.on_message(message).await;
            }
            tracing::debug!("session channel closed, tab no longer listening");
        });
        let mounted = MountedTab { listener };

        if self.tab.credentials().access_token().is_some() {
            match self.identity.me().await {
                Ok(user) => {
                    tracing::debug!(email = %user.email, "restored session");
                    self.tab.set_user(Some(user));
                }
                Err(error) if self.tab.credentials().access_token().is_none() => {
                    tracing::debug!(
                        error = (&error as &dyn std::error::Error),
                        "session ended while it was being restored"
                    );
                }
                Err(error) => {
                    tracing::warn!(
                        error = (&error as &dyn std::error::Error),
                        "unable to restore session, signing out"
                    );
                    self.tab.sign_out(Announce::Publish).await;
                }
            }
        }

        Ok(mounted)
    }

    /// Exchanges credentials for a session and announces it to the other tabs
    ///
    /// On failure the tab is left exactly as it was.
    pub async fn sign_in(&self, credentials: &SignInCredentials) -> Result<User, SessionError> {
        let session = self
            .authority
            .sign_in(credentials)
            .await
            .map_err(|e| SessionError::SignIn(Box::new(e)))?;

        self.tab.credentials().persist(&session.tokens).await?;
        self.tab.set_user(Some(session.user.clone()));
        self.tab.navigate(View::Dashboard);

        tracing::info!(tab = %self.tab.channel().id(), email = %session.user.email, "signed in");

        self.tab.channel().publish(BroadcastMessage::SignIn);
        Ok(session.user)
    }
}

impl<A: fmt::Debug, I: fmt::Debug> fmt::Debug for SessionContext<A, I> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("tab", &self.tab)
            .field("authority", &self.authority)
            .field("identity", &self.identity)
            .finish()
    }
}

/// Keeps a mounted tab listening to the session channel
///
/// Dropping the guard stops the listener.
#[derive(Debug)]
pub struct MountedTab {
    listener: JoinHandle<()>,
}

impl Drop for MountedTab {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
