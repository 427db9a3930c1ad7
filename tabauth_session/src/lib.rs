//! Session coordination for clients of a token-protected API
//!
//! This crate keeps a signed-in session usable for as long as its refresh
//! token allows. Calls made with an access token that has since expired are
//! not failed back to the caller; instead they are handed to a
//! [`RefreshCoordinator`], which sends a single refresh to the authority no
//! matter how many calls noticed the expiry, and then resumes every one of
//! them with the renewed token.
//!
//! When several tabs of the same origin share one credential store, the
//! [`broadcast`] channel keeps them in step: a tab that signs in or out
//! announces it, and its siblings follow without contacting the server.
//!
//! # General Flow (interactive tab)
//!
//! Each tab loads its credentials from the shared store, opens its own handle
//! on the origin's session channel and mounts a [`SessionContext`]. The
//! reqwest integration in `tabauth_reqwest` then attaches the current access
//! token to every call and routes expiries through the coordinator.
//!
//! ```
//! use std::sync::Arc;
//!
//! use tabauth_session::{
//!     authority::ScriptedAuthority,
//!     broadcast::BroadcastHub,
//!     credentials::SharedCredentials,
//!     store::{InMemoryCookieJar, SessionStore},
//!     Email, Password, RefreshCoordinator, SessionContext, SignInCredentials, Tab, User,
//! };
//! # use tabauth_session::{AccessToken, RefreshToken, Session, SessionError, TokenPair};
//! # struct NoIdentity;
//! # #[async_trait::async_trait]
//! # impl tabauth_session::authority::IdentitySource for NoIdentity {
//! #     async fn me(&self) -> Result<User, SessionError> {
//! #         Err(SessionError::InvalidCredential { code: None })
//! #     }
//! # }
//!
//! # #[tokio::main(flavor = "current_thread")] async fn main() -> Result<(), SessionError> {
//! # let session = Session {
//! #     tokens: TokenPair::new(AccessToken::from_static("T1"), RefreshToken::from_static("R1")),
//! #     user: User::new(Email::from_static("a@x.com")),
//! # };
//! let authority = Arc::new(ScriptedAuthority::new().with_account(
//!     Email::from_static("a@x.com"),
//!     Password::from_static("p"),
//!     session,
//! ));
//!
//! let jar = InMemoryCookieJar::new();
//! let hub = BroadcastHub::new();
//!
//! let credentials = Arc::new(SharedCredentials::load(SessionStore::new(jar.clone())).await?);
//! let tab = Tab::new(credentials.clone(), hub.open());
//! let coordinator = RefreshCoordinator::new(authority.clone(), credentials, Arc::new(tab.clone()));
//!
//! let context = SessionContext::new(tab, authority, NoIdentity);
//! let _mounted = context.mount().await?;
//!
//! let user = context
//!     .sign_in(&SignInCredentials::new(
//!         Email::from_static("a@x.com"),
//!         Password::from_static("p"),
//!     ))
//!     .await?;
//!
//! tracing::info!(email = %user.email, refreshing = coordinator.is_refreshing(), "signed in");
//! # Ok(())
//! # }
//! ```
//!
//! # Server-rendered requests
//!
//! A request rendered on the server has no tab to sign out of. Build its
//! credentials with
//! [`RequestCredentials::from_cookie_header`][credentials::RequestCredentials::from_cookie_header]
//! and pair them with the [`DeferToCaller`] strategy: unrecoverable failures
//! then surface as [`SessionError::AuthenticationRequired`] and any renewed
//! pair is available as `Set-Cookie` values for the response.
//!
//! # Features
//!
//! The following features are supported by this crate, all of which are enabled by default:
//!
//! * `file`: Provides a credential jar persisted to a JSON file on the local filesystem.
//! * `http`: Provides an authority that performs the credential exchange and refresh
//!   against a JSON API using [reqwest].

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

pub mod authority;
mod braids;
pub mod broadcast;
pub mod clock;
pub mod config;
mod context;
mod coordinator;
pub mod credentials;
mod error;
mod session;
mod sign_out;
pub mod store;

pub use braids::*;
pub use context::{Announce, MountedTab, SessionContext, Tab};
pub use coordinator::RefreshCoordinator;
pub use error::{BoxError, RefreshError, SessionError};
pub use session::{Session, SignInCredentials, TokenPair, User, View};
pub use sign_out::{DeferToCaller, SignOutStrategy};
