//! Session configuration

use crate::clock::DurationSecs;

/// The name of the cookie holding the access token
pub const DEFAULT_ACCESS_TOKEN_KEY: &str = "nextauth.token";

/// The name of the cookie holding the refresh token
pub const DEFAULT_REFRESH_TOKEN_KEY: &str = "nextauth.refreshToken";

/// Options attached to every persisted credential
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookieOptions {
    /// How long the value remains readable after being written
    pub max_age: DurationSecs,
    /// The path scope of the value
    pub path: String,
}

impl Default for CookieOptions {
    /// Thirty days, visible from every path
    fn default() -> Self {
        Self {
            max_age: DurationSecs::days(30),
            path: "/".to_owned(),
        }
    }
}

/// Where and how the credential pair is persisted
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    access_token_key: String,
    refresh_token_key: String,
    cookie: CookieOptions,
}

impl Default for SessionConfig {
    /// Uses the `nextauth.token` and `nextauth.refreshToken` keys with
    /// default [`CookieOptions`]
    fn default() -> Self {
        Self {
            access_token_key: DEFAULT_ACCESS_TOKEN_KEY.to_owned(),
            refresh_token_key: DEFAULT_REFRESH_TOKEN_KEY.to_owned(),
            cookie: CookieOptions::default(),
        }
    }
}

impl SessionConfig {
    /// Overrides the key used for the access token
    pub fn with_access_token_key(mut self, key: impl Into<String>) -> Self {
        self.access_token_key = key.into();
        self
    }

    /// Overrides the key used for the refresh token
    pub fn with_refresh_token_key(mut self, key: impl Into<String>) -> Self {
        self.refresh_token_key = key.into();
        self
    }

    /// Overrides the options attached to persisted credentials
    pub fn with_cookie_options(mut self, cookie: CookieOptions) -> Self {
        self.cookie = cookie;
        self
    }

    /// The key used for the access token
    #[inline]
    pub fn access_token_key(&self) -> &str {
        &self.access_token_key
    }

    /// The key used for the refresh token
    #[inline]
    pub fn refresh_token_key(&self) -> &str {
        &self.refresh_token_key
    }

    /// The options attached to persisted credentials
    #[inline]
    pub fn cookie_options(&self) -> &CookieOptions {
        &self.cookie
    }
}
