use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{AccessToken, Email, Password, RefreshToken};

/// The signed-in user, as reported by the credential exchange or identity endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// The user's email address
    pub email: Email,
    /// Permission strings granted to the user
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    /// Roles held by the user
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl User {
    /// Constructs a user with no permissions or roles
    pub fn new(email: Email) -> Self {
        Self {
            email,
            permissions: BTreeSet::new(),
            roles: BTreeSet::new(),
        }
    }
}

/// An access token and the refresh token that can renew it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenPair {
    /// The access token
    pub access_token: AccessToken,
    /// The refresh token
    pub refresh_token: RefreshToken,
}

impl TokenPair {
    /// Constructs a new token pair
    pub fn new(access_token: AccessToken, refresh_token: RefreshToken) -> Self {
        Self {
            access_token,
            refresh_token,
        }
    }
}

/// A signed-in session: the credential pair plus the user it belongs to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    /// The session's credentials
    pub tokens: TokenPair,
    /// The signed-in user
    pub user: User,
}

/// Credentials presented to the credential exchange endpoint
#[derive(Clone, Debug, Serialize)]
pub struct SignInCredentials {
    /// The user's email
    pub email: Email,
    /// The user's password
    pub password: Password,
}

impl SignInCredentials {
    /// Constructs a new set of sign-in credentials
    pub fn new(email: Email, password: Password) -> Self {
        Self { email, password }
    }
}

/// What a tab is currently showing
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum View {
    /// The sign-in view shown to anonymous visitors
    #[default]
    Entry,
    /// The authenticated landing view
    Dashboard,
}
