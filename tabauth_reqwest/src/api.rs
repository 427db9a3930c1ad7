use async_trait::async_trait;
use reqwest::Url;
use reqwest_middleware::{ClientWithMiddleware, RequestBuilder};
use tabauth_session::{authority::IdentitySource, SessionError, User};

/// A client for the session's API, rooted at its base URL
///
/// Requests are sent through the given middleware stack, so they carry the
/// session's credentials when it includes a [`SessionMiddleware`](crate::SessionMiddleware).
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: ClientWithMiddleware,
    base_url: Url,
}

impl ApiClient {
    /// Constructs a client for the API at `base_url`
    pub fn new(client: ClientWithMiddleware, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// The API's base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The underlying middleware client
    pub fn client(&self) -> &ClientWithMiddleware {
        &self.client
    }

    /// Resolves `path` against the base URL
    pub fn url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path)
    }

    /// Starts a `GET` request to `path`
    pub fn get(&self, path: &str) -> Result<RequestBuilder, url::ParseError> {
        Ok(self.client.get(self.url(path)?))
    }

    /// Starts a `POST` request to `path`
    pub fn post(&self, path: &str) -> Result<RequestBuilder, url::ParseError> {
        Ok(self.client.post(self.url(path)?))
    }
}

#[async_trait]
impl IdentitySource for ApiClient {
    async fn me(&self) -> Result<User, SessionError> {
        let url = self
            .url("me")
            .map_err(|e| SessionError::Identity(Box::new(e)))?;
        fetch_user(&self.client, url).await
    }
}

#[tracing::instrument(skip(client, url), fields(url = %url))]
async fn fetch_user(client: &ClientWithMiddleware, url: Url) -> Result<User, SessionError> {
    let resp = client.get(url).send().await.map_err(into_session_error)?;
    let resp = resp
        .error_for_status()
        .map_err(|e| SessionError::Identity(Box::new(e)))?;
    let user: User = resp
        .json()
        .await
        .map_err(|e| SessionError::Identity(Box::new(e)))?;

    tracing::debug!(email = %user.email, "loaded signed-in user");
    Ok(user)
}

fn into_session_error(error: reqwest_middleware::Error) -> SessionError {
    match error {
        reqwest_middleware::Error::Middleware(inner) => match inner.downcast::<SessionError>() {
            Ok(error) => error,
            Err(inner) => SessionError::Identity(inner.into()),
        },
        reqwest_middleware::Error::Reqwest(error) => SessionError::Identity(Box::new(error)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use reqwest::{header, Client, Request, Response, StatusCode};
    use reqwest_middleware::{ClientBuilder, Middleware, Next};
    use tabauth_session::{
        authority::ScriptedAuthority,
        broadcast::BroadcastHub,
        credentials::SharedCredentials,
        store::{InMemoryCookieJar, SessionStore},
        AccessToken, RefreshCoordinator, RefreshToken, SessionContext, Tab, TokenPair,
    };

    use super::*;
    use crate::SessionMiddleware;

    /// Serves `GET me` to requests carrying `Bearer T2`, and reports every
    /// other token as expired
    struct FakeMe;

    #[async_trait::async_trait]
    impl Middleware for FakeMe {
        async fn handle(
            &self,
            req: Request,
            _: &mut http::Extensions,
            _: Next<'_>,
        ) -> reqwest_middleware::Result<Response> {
            assert_eq!(req.url().path(), "/api/me");
            let authorized = req
                .headers()
                .get(header::AUTHORIZATION)
                .is_some_and(|v| v == "Bearer T2");

            let resp = if authorized {
                http::Response::builder()
                    .status(StatusCode::OK)
                    .body(r#"{"email":"a@x.com","permissions":["metrics.list"],"roles":["editor"]}"#)
                    .unwrap()
            } else {
                http::Response::builder()
                    .status(StatusCode::UNAUTHORIZED)
                    .body(r#"{"code":"token.expired"}"#)
                    .unwrap()
            };
            Ok(resp.into())
        }
    }

    #[test]
    fn paths_resolve_against_the_base_url() {
        let api = ApiClient::new(
            ClientBuilder::new(Client::default()).build(),
            "https://api.example.com/api/".parse().unwrap(),
        );

        assert_eq!(api.url("me").unwrap().as_str(), "https://api.example.com/api/me");
    }

    #[tokio::test]
    async fn mounting_a_tab_with_an_expired_token_restores_the_user() {
        let store = SessionStore::new(InMemoryCookieJar::new());
        store
            .persist(&TokenPair::new(
                AccessToken::from_static("T1"),
                RefreshToken::from_static("R1"),
            ))
            .await
            .unwrap();

        let authority = Arc::new(ScriptedAuthority::new().then_refresh(TokenPair::new(
            AccessToken::from_static("T2"),
            RefreshToken::from_static("R2"),
        )));
        let credentials = Arc::new(SharedCredentials::load(store.clone()).await.unwrap());
        let tab = Tab::new(credentials.clone(), BroadcastHub::new().open());
        let coordinator =
            RefreshCoordinator::new(authority.clone(), credentials, Arc::new(tab.clone()));

        let api = ApiClient::new(
            ClientBuilder::new(Client::default())
                .with(SessionMiddleware::new(coordinator))
                .with(FakeMe)
                .build(),
            "https://api.example.com/api/".parse().unwrap(),
        );
        let context = SessionContext::new(tab, authority.clone(), api);

        let _mounted = context.mount().await.unwrap();

        let user = context.user().expect("user restored");
        assert_eq!(user.email.as_str(), "a@x.com");
        assert!(user.roles.contains("editor"));
        assert_eq!(authority.refresh_calls(), 1);
        assert_eq!(
            store.access_token().await.unwrap(),
            Some(AccessToken::from_static("T2"))
        );
    }
}
