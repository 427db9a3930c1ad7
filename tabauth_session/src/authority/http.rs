//! An authority reached over HTTP

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use super::{dto, AsyncAuthority};
use crate::{RefreshTokenRef, Session, SignInCredentials, TokenPair};

/// Where the authority lives and how long to wait for it
#[derive(Clone, Debug)]
pub struct AuthorityConfig {
    base_url: reqwest::Url,
    timeout: Duration,
}

impl AuthorityConfig {
    /// Constructs a configuration for the API rooted at `base_url`
    ///
    /// Endpoint paths are joined onto `base_url`, so it should end in `/`.
    /// The request timeout defaults to 30 seconds.
    pub fn new(base_url: reqwest::Url) -> Self {
        Self {
            base_url,
            timeout: Duration::from_secs(30),
        }
    }

    /// Overrides the request timeout
    ///
    /// A refresh that times out is treated like any other failed refresh.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The API's base URL
    pub fn base_url(&self) -> &reqwest::Url {
        &self.base_url
    }

    /// The request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Builds an HTTP client honoring this configuration
    pub fn build_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder().timeout(self.timeout).build()
    }
}

/// The `sessions` and `refresh` endpoints of the API
#[derive(Clone, Debug)]
pub struct HttpAuthority {
    client: reqwest::Client,
    sessions_url: reqwest::Url,
    refresh_url: reqwest::Url,
}

impl HttpAuthority {
    /// Constructs an authority from its configuration
    pub fn new(config: &AuthorityConfig) -> Result<Self, AuthorityError> {
        let client = config.build_client().map_err(AuthorityError::Client)?;
        Self::with_client(client, config.base_url())
    }

    /// Constructs an authority that uses an existing client
    pub fn with_client(
        client: reqwest::Client,
        base_url: &reqwest::Url,
    ) -> Result<Self, AuthorityError> {
        Ok(Self {
            client,
            sessions_url: base_url.join("sessions")?,
            refresh_url: base_url.join("refresh")?,
        })
    }
}

#[async_trait]
impl AsyncAuthority for HttpAuthority {
    type Error = AuthorityError;

    async fn sign_in(&self, credentials: &SignInCredentials) -> Result<Session, Self::Error> {
        request_session(&self.client, &self.sessions_url, credentials).await
    }

    async fn refresh(&self, refresh_token: &RefreshTokenRef) -> Result<TokenPair, Self::Error> {
        request_refresh(&self.client, &self.refresh_url, refresh_token).await
    }
}

#[tracing::instrument(
    err,
    skip(client, sessions_url, credentials),
    fields(
        sessions_url = %sessions_url,
        credentials.email = %credentials.email,
    ),
)]
async fn request_session(
    client: &reqwest::Client,
    sessions_url: &reqwest::Url,
    credentials: &SignInCredentials,
) -> Result<Session, AuthorityError> {
    tracing::trace!("exchanging credentials for a session");

    let body = post_json(client, sessions_url.clone(), credentials).await?;
    let resp: dto::SignInResponse = serde_json::from_slice(&body)?;

    tracing::info!(
        permissions = resp.permissions.len(),
        roles = resp.roles.len(),
        "received new session"
    );

    Ok(resp.into_session(credentials.email.clone()))
}

#[tracing::instrument(
    err,
    skip(client, refresh_url, refresh_token),
    fields(refresh_url = %refresh_url),
)]
async fn request_refresh(
    client: &reqwest::Client,
    refresh_url: &reqwest::Url,
    refresh_token: &RefreshTokenRef,
) -> Result<TokenPair, AuthorityError> {
    tracing::trace!("exchanging refresh token");

    let req = dto::RefreshRequest {
        refresh_token: refresh_token.as_str(),
    };
    let body = post_json(client, refresh_url.clone(), &req).await?;
    let resp: dto::RefreshResponse = serde_json::from_slice(&body)?;

    tracing::info!("received refreshed credential pair");

    Ok(resp.into())
}

async fn post_json<S: serde::Serialize + ?Sized>(
    client: &reqwest::Client,
    url: reqwest::Url,
    payload: &S,
) -> Result<Bytes, AuthorityError> {
    let resp = client
        .post(url)
        .json(payload)
        .send()
        .await
        .map_err(AuthorityError::RequestSend)?;

    tracing::debug!(
        response.status = resp.status().as_u16(),
        "received response from authority"
    );

    if let Err(error) = resp.error_for_status_ref() {
        let body = resp.text().await.map_err(AuthorityError::BodyReadError)?;
        return Err(AuthorityError::ErrorWithBody {
            source: error,
            body,
        });
    }

    resp.bytes().await.map_err(AuthorityError::BodyReadError)
}

/// An error while exchanging credentials with the authority
#[derive(Debug, Error)]
pub enum AuthorityError {
    /// An error from the authority with an error body
    #[error("error response from authority: {body}")]
    ErrorWithBody {
        /// The underlying request error
        source: reqwest::Error,
        /// The body of the error
        body: String,
    },
    /// Unable to deserialize the response body
    #[error("error deserializing response body from authority")]
    BodyError(#[from] serde_json::Error),
    /// Unable to read the response
    #[error("error reading response body")]
    BodyReadError(reqwest::Error),
    /// Unable to send a request to the authority
    #[error("error sending request to authority")]
    RequestSend(reqwest::Error),
    /// Unable to build the HTTP client
    #[error("error building HTTP client")]
    Client(reqwest::Error),
    /// The endpoint URL could not be derived from the base URL
    #[error("invalid authority URL")]
    Url(#[from] url::ParseError),
}
