//! Same-origin messaging between tabs
//!
//! A [`BroadcastHub`] is the named channel of one origin. Each tab opens its
//! own [`TabChannel`] on the hub and may publish on it freely, but subscribes
//! at most once. Messages are fire-and-forget: a tab that has not subscribed
//! yet, or has gone away, simply misses them and is expected to read the
//! shared store when it mounts.

use std::{
    fmt,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use thiserror::Error;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 16;

/// The default name of the session channel
pub const DEFAULT_CHANNEL_NAME: &str = "auth";

/// A session change announced to other tabs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BroadcastMessage {
    /// A tab signed in and persisted a new credential pair
    SignIn,
    /// A tab signed out and cleared the persisted credentials
    SignOut,
}

impl BroadcastMessage {
    /// The tag carried on the wire
    pub const fn tag(self) -> &'static str {
        match self {
            Self::SignIn => "SignIn",
            Self::SignOut => "SignOut",
        }
    }
}

impl fmt::Display for BroadcastMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A tag that does not name a known message
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown broadcast tag: {0}")]
pub struct UnknownTag(String);

impl FromStr for BroadcastMessage {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SignIn" => Ok(Self::SignIn),
            "SignOut" => Ok(Self::SignOut),
            other => Err(UnknownTag(other.to_owned())),
        }
    }
}

/// An error from a tab's channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum BroadcastError {
    /// The tab already holds a subscription
    #[error("tab is already subscribed to the session channel")]
    AlreadySubscribed,
}

/// Identifies a tab on its hub
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TabId(u64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "tab-{}", self.0)
    }
}

#[derive(Clone, Debug)]
struct Envelope {
    sender: TabId,
    tag: Arc<str>,
}

/// The session channel of one origin
#[derive(Clone)]
pub struct BroadcastHub {
    name: Arc<str>,
    tx: broadcast::Sender<Envelope>,
    next_tab: Arc<AtomicU64>,
}

impl BroadcastHub {
    /// Opens a hub with the default channel name
    pub fn new() -> Self {
        Self::named(DEFAULT_CHANNEL_NAME)
    }

    /// Opens a hub with the given channel name
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        let (tx, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self {
            name: name.into(),
            tx,
            next_tab: Arc::new(AtomicU64::new(1)),
        }
    }

    /// The channel's name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opens the channel for a new tab
    pub fn open(&self) -> TabChannel {
        let id = TabId(self.next_tab.fetch_add(1, Ordering::Relaxed));
        tracing::trace!(channel = %self.name, tab = %id, "opened tab channel");
        TabChannel {
            id,
            name: self.name.clone(),
            tx: self.tx.clone(),
            subscribed: AtomicBool::new(false),
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("name", &self.name)
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

/// One tab's handle on the session channel
pub struct TabChannel {
    id: TabId,
    name: Arc<str>,
    tx: broadcast::Sender<Envelope>,
    subscribed: AtomicBool,
}

impl TabChannel {
    /// The tab this channel belongs to
    pub fn id(&self) -> TabId {
        self.id
    }

    /// Announces a session change to every other subscribed tab
    pub fn publish(&self, message: BroadcastMessage) {
        self.publish_tag(message.tag());
    }

    pub(crate) fn publish_tag(&self, tag: &str) {
        let delivered = self
            .tx
            .send(Envelope {
                sender: self.id,
                tag: tag.into(),
            })
            .unwrap_or(0);
        tracing::debug!(channel = %self.name, tab = %self.id, tag, delivered, "published session message");
    }

    /// Starts receiving messages from other tabs
    ///
    /// A tab subscribes once for its whole lifetime.
    pub fn subscribe(&self) -> Result<Subscription, BroadcastError> {
        if self.subscribed.swap(true, Ordering::AcqRel) {
            return Err(BroadcastError::AlreadySubscribed);
        }
        Ok(Subscription {
            id: self.id,
            name: self.name.clone(),
            rx: self.tx.subscribe(),
        })
    }
}

impl fmt::Debug for TabChannel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TabChannel")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("subscribed", &self.subscribed.load(Ordering::Relaxed))
            .finish()
    }
}

/// A tab's stream of messages from other tabs
pub struct Subscription {
    id: TabId,
    name: Arc<str>,
    rx: broadcast::Receiver<Envelope>,
}

impl Subscription {
    /// Waits for the next message from another tab
    ///
    /// The tab's own messages and tags with no known meaning are skipped.
    /// Returns `None` once the hub and every other tab are gone.
    pub async fn recv(&mut self) -> Option<BroadcastMessage> {
        loop {
            let envelope = match self.rx.recv().await {
                Ok(envelope) => envelope,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(channel = %self.name, tab = %self.id, skipped, "session channel lagged, skipping ahead");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            };

            if envelope.sender == self.id {
                continue;
            }

            match envelope.tag.parse() {
                Ok(message) => {
                    tracing::trace!(channel = %self.name, tab = %self.id, from = %envelope.sender, %message, "received session message");
                    return Some(message);
                }
                Err(UnknownTag(tag)) => {
                    tracing::trace!(channel = %self.name, tab = %self.id, tag = %tag, "ignoring message with no handler");
                }
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
