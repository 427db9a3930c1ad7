//! Wire formats of the session endpoints

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{AccessToken, Email, RefreshToken, Session, TokenPair, User};

/// The application error code marking an access token that may be refreshed
pub const TOKEN_EXPIRED: &str = "token.expired";

/// Body of a successful credential exchange
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    /// The new access token
    pub token: AccessToken,
    /// The new refresh token
    pub refresh_token: RefreshToken,
    /// Permissions granted to the user
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    /// Roles held by the user
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl SignInResponse {
    /// Combines the response with the email that signed in
    ///
    /// The exchange does not echo the email back.
    pub fn into_session(self, email: Email) -> Session {
        Session {
            tokens: TokenPair::new(self.token, self.refresh_token),
            user: User {
                email,
                permissions: self.permissions,
                roles: self.roles,
            },
        }
    }
}

/// Body of a refresh request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
    /// The refresh token being exchanged
    pub refresh_token: &'a str,
}

/// Body of a successful refresh
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    /// The new access token
    pub token: AccessToken,
    /// The new refresh token
    pub refresh_token: RefreshToken,
}

impl From<RefreshResponse> for TokenPair {
    fn from(resp: RefreshResponse) -> Self {
        TokenPair::new(resp.token, resp.refresh_token)
    }
}

/// Body of an error response
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ErrorResponse {
    /// The application error code
    #[serde(default)]
    pub code: Option<String>,
    /// A human readable description
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorResponse {
    /// Whether the error marks an expired, refreshable access token
    pub fn is_token_expired(&self) -> bool {
        self.code.as_deref() == Some(TOKEN_EXPIRED)
    }
}
