//! Middleware that keeps outgoing requests authenticated
//!
//! When using [`ClientWithMiddleware`](reqwest_middleware::ClientWithMiddleware),
//! include the [`SessionMiddleware`] in the middleware stack to attach the
//! current access token to each outbound request. Should the API reject that
//! token as expired, the middleware waits on the session's
//! [`RefreshCoordinator`] and re-issues the request once with the renewed
//! token; the caller only ever sees the final response.
//!
//! If a request already has specified an `Authorization` header value by
//! the time that the middleware executes, the existing value will be left
//! in place and the request is passed through untouched, allowing overrides
//! to be specified as required.
//!
//! ```
//! use std::sync::Arc;
//!
//! use reqwest::Client;
//! use reqwest_middleware::ClientBuilder;
//! use tabauth_reqwest::SessionMiddleware;
//! use tabauth_session::{
//!     authority::ScriptedAuthority,
//!     credentials::SharedCredentials,
//!     store::{InMemoryCookieJar, SessionStore},
//!     DeferToCaller, RefreshCoordinator,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")] async fn main() {
//! let credentials = SharedCredentials::load(SessionStore::new(InMemoryCookieJar::new()))
//!     .await
//!     .unwrap();
//! let coordinator = RefreshCoordinator::new(
//!     ScriptedAuthority::new(),
//!     Arc::new(credentials),
//!     Arc::new(DeferToCaller),
//! );
//!
//! let client = ClientBuilder::new(Client::default())
//!     .with(SessionMiddleware::new(coordinator))
//!     .build();
//!
//! let req = client
//!     .get("https://example.com");
//! # async move { req
//!     .send()
//!     .await
//!     .unwrap();
//! # };
//! # }
//! ```
//!
//! The middleware can also be configured to manage requests only
//! conditionally. This can be useful in the event that you want to
//! use a single common middleware stack with multiple potential backends
//! and want to ensure that the session's token is only sent to its own API.
//!
//! These predicates can be composed together to evaluate more complex
//! requirements prior to attaching a token to a request.
//!
//! ```
//! use std::sync::Arc;
//!
//! use predicates::prelude::PredicateBooleanExt;
//! use tabauth_reqwest::{ExactHostMatch, HttpsOnly, SessionMiddleware};
//! # use tabauth_session::{
//! #     authority::ScriptedAuthority,
//! #     credentials::RequestCredentials,
//! #     config::SessionConfig,
//! #     DeferToCaller, RefreshCoordinator,
//! # };
//! # let credentials = RequestCredentials::from_cookie_header("", SessionConfig::default());
//! # let coordinator = RefreshCoordinator::new(
//! #     ScriptedAuthority::new(),
//! #     Arc::new(credentials),
//! #     Arc::new(DeferToCaller),
//! # );
//!
//! SessionMiddleware::new(coordinator)
//!     .with_predicate(HttpsOnly.and(ExactHostMatch::new("example.com")));
//! ```
//!
//! Failures raised by the middleware are carried as
//! [`reqwest_middleware::Error::Middleware`]; use [`session_error()`] to
//! recover the underlying [`SessionError`].

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

use std::fmt;

use bytes::{BufMut, BytesMut};
use predicates::{prelude::*, reflection};
use reqwest::{header, Request, Response, StatusCode};
use reqwest_middleware::{Middleware, Next, Result};
use tabauth_session::{
    authority::{dto::ErrorResponse, AsyncAuthority},
    AccessTokenRef, RefreshCoordinator, SessionError,
};

mod api;

pub use api::ApiClient;

/// A middleware that authenticates outgoing requests and recovers from
/// expired access tokens
pub struct SessionMiddleware<A, P = HttpsOnly> {
    coordinator: RefreshCoordinator<A>,
    predicate: P,
}

impl<A> SessionMiddleware<A, HttpsOnly> {
    /// Construct a new middleware from a refresh coordinator
    ///
    /// By default, this middleware will only manage a request if it
    /// is being sent via HTTPS. To change this behavior, provide a
    /// custom predicate with [`with_predicate()`][Self::with_predicate()].
    pub fn new(coordinator: RefreshCoordinator<A>) -> Self {
        Self {
            coordinator,
            predicate: HttpsOnly,
        }
    }

    /// Replaces the default predicate with a custom predicate
    pub fn with_predicate<P>(self, predicate: P) -> SessionMiddleware<A, P> {
        SessionMiddleware {
            coordinator: self.coordinator,
            predicate,
        }
    }
}

impl<A, P> SessionMiddleware<A, P> {
    /// The coordinator used to recover from expired access tokens
    pub fn coordinator(&self) -> &RefreshCoordinator<A> {
        &self.coordinator
    }
}

impl<A, P: Clone> Clone for SessionMiddleware<A, P> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
            predicate: self.predicate.clone(),
        }
    }
}

impl<A: fmt::Debug, P: fmt::Debug> fmt::Debug for SessionMiddleware<A, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionMiddleware")
            .field("coordinator", &self.coordinator)
            .field("predicate", &self.predicate)
            .finish()
    }
}

fn bearer(token: &AccessTokenRef) -> std::result::Result<header::HeaderValue, SessionError> {
    let mut header_value = BytesMut::with_capacity(token.as_str().len() + 7);
    header_value.put_slice(b"Bearer ");
    header_value.put_slice(token.as_str().as_bytes());
    let mut value = header::HeaderValue::from_maybe_shared(header_value.freeze())
        .map_err(|_| SessionError::InvalidHeader)?;
    value.set_sensitive(true);
    Ok(value)
}

async fn read_error_body(resp: Response) -> ErrorResponse {
    match resp.bytes().await {
        Ok(body) => serde_json::from_slice(&body).unwrap_or_else(|error| {
            tracing::debug!(%error, "401 response carried no recognizable error body");
            ErrorResponse::default()
        }),
        Err(error) => {
            tracing::debug!(%error, "unable to read 401 response body");
            ErrorResponse::default()
        }
    }
}

fn fail(error: SessionError) -> reqwest_middleware::Error {
    reqwest_middleware::Error::middleware(error)
}

#[async_trait::async_trait]
impl<A, P> Middleware for SessionMiddleware<A, P>
where
    A: AsyncAuthority + 'static,
    P: Predicate<Request> + Send + Sync + 'static,
{
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        if !self.predicate.eval(&req) || req.headers().contains_key(header::AUTHORIZATION) {
            return next.run(req, extensions).await;
        }

        let sent_with = self.coordinator.credentials().access_token();
        if let Some(token) = &sent_with {
            req.headers_mut()
                .insert(header::AUTHORIZATION, bearer(token).map_err(fail)?);
        }

        let replay = req.try_clone();
        let resp = next.clone().run(req, extensions).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        let url = resp.url().clone();
        let body = read_error_body(resp).await;
        let strategy = self.coordinator.sign_out_strategy();

        if !body.is_token_expired() {
            tracing::info!(%url, code = ?body.code, "credential rejected, ending session");
            strategy.sign_out().await;
            return Err(fail(strategy.surface(SessionError::InvalidCredential {
                code: body.code,
            })));
        }

        tracing::debug!(%url, "access token expired, waiting for refresh");
        let token = self
            .coordinator
            .on_expired_credential(sent_with.as_deref())
            .await
            .map_err(|e| fail(strategy.surface(SessionError::RefreshFailed(e))))?;

        let mut req = replay.ok_or_else(|| fail(SessionError::UnreplayableRequest))?;
        req.headers_mut()
            .insert(header::AUTHORIZATION, bearer(&token).map_err(fail)?);

        tracing::debug!(%url, "re-issuing request with refreshed access token");
        next.run(req, extensions).await
    }
}

/// Recovers the session failure carried by a middleware error
pub fn session_error(error: &reqwest_middleware::Error) -> Option<&SessionError> {
    match error {
        reqwest_middleware::Error::Middleware(inner) => inner.downcast_ref(),
        reqwest_middleware::Error::Reqwest(_) => None,
    }
}

/// Only manage a request if it is being sent over HTTPS
#[derive(Clone, Copy, Debug)]
pub struct HttpsOnly;

impl Predicate<Request> for HttpsOnly {
    #[inline]
    fn eval(&self, req: &Request) -> bool {
        req.url().scheme() == "https"
    }

    fn find_case(&self, expected: bool, req: &Request) -> Option<reflection::Case> {
        let result = self.eval(req);
        if result != expected {
            Some(
                reflection::Case::new(Some(self), result).add_product(reflection::Product::new(
                    "scheme",
                    req.url().scheme().to_owned(),
                )),
            )
        } else {
            None
        }
    }
}

impl reflection::PredicateReflection for HttpsOnly {}
impl fmt::Display for HttpsOnly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("scheme is https")
    }
}

/// Only manage a request if it is being sent to the exact host specified
#[derive(Clone, Debug)]
pub struct ExactHostMatch {
    host: String,
}

impl ExactHostMatch {
    /// Construct a new predicate from a host string
    pub fn new<S>(host: S) -> Self
    where
        S: ToString,
    {
        Self {
            host: host.to_string(),
        }
    }
}

impl Predicate<Request> for ExactHostMatch {
    #[inline]
    fn eval(&self, req: &Request) -> bool {
        req.url().host_str() == Some(&self.host)
    }

    fn find_case(&self, expected: bool, req: &Request) -> Option<reflection::Case> {
        let result = self.eval(req);
        if result != expected {
            Some(
                reflection::Case::new(Some(self), result).add_product(reflection::Product::new(
                    "host",
                    req.url()
                        .host_str()
                        .unwrap_or("<value not valid utf-8>")
                        .to_owned(),
                )),
            )
        } else {
            None
        }
    }
}

impl reflection::PredicateReflection for ExactHostMatch {}
impl fmt::Display for ExactHostMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("host == ")?;
        f.write_str(&self.host)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        time::Duration,
    };

    use reqwest::Client;
    use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
    use tabauth_session::{
        authority::ScriptedAuthority,
        broadcast::{BroadcastHub, BroadcastMessage, Subscription},
        config::SessionConfig,
        credentials::{RequestCredentials, SharedCredentials},
        store::{InMemoryCookieJar, SessionStore},
        AccessToken, DeferToCaller, RefreshToken, SignOutStrategy, Tab, TokenPair, View,
    };
    use tokio::sync::Notify;

    use super::*;

    const API_URL: &str = "https://api.example.com/me";
    const USER_BODY: &str = r#"{"email":"a@x.com","permissions":["metrics.list"],"roles":[]}"#;

    /// Stands in for the API server: accepts exactly one access token and
    /// rejects everything else with the configured error code
    struct FakeApi {
        accepted: String,
        rejection: &'static str,
        seen: Mutex<Vec<Option<String>>>,
    }

    impl FakeApi {
        fn accepting(token: &str) -> Self {
            Self {
                accepted: format!("Bearer {token}"),
                rejection: "token.expired",
                seen: Mutex::new(Vec::new()),
            }
        }

        fn rejecting_with(mut self, code: &'static str) -> Self {
            self.rejection = code;
            self
        }

        fn seen(&self) -> Vec<Option<String>> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Middleware for FakeApi {
        async fn handle(
            &self,
            req: Request,
            _: &mut http::Extensions,
            _: Next<'_>,
        ) -> Result<Response> {
            let authorization = req
                .headers()
                .get(header::AUTHORIZATION)
                .map(|v| v.to_str().expect("authorization header was not valid UTF-8").to_owned());
            self.seen.lock().unwrap().push(authorization.clone());

            let resp = if authorization.as_deref() == Some(self.accepted.as_str()) {
                http::Response::builder()
                    .status(StatusCode::OK)
                    .body(USER_BODY.to_owned())
                    .unwrap()
            } else {
                http::Response::builder()
                    .status(StatusCode::UNAUTHORIZED)
                    .body(format!(r#"{{"code":"{}","message":"rejected"}}"#, self.rejection))
                    .unwrap()
            };

            Ok(resp.into())
        }
    }

    #[derive(Default)]
    struct CountingSignOut {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl SignOutStrategy for CountingSignOut {
        async fn sign_out(&self) {
            self.calls.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn pair(access: &'static str, refresh: &'static str) -> TokenPair {
        TokenPair::new(
            AccessToken::from_static(access),
            RefreshToken::from_static(refresh),
        )
    }

    fn client(
        coordinator: RefreshCoordinator<Arc<ScriptedAuthority>>,
        api: Arc<FakeApi>,
    ) -> ClientWithMiddleware {
        ClientBuilder::new(Client::default())
            .with(SessionMiddleware::new(coordinator))
            .with_arc(api)
            .build()
    }

    async fn wait_for_queue<A>(coordinator: &RefreshCoordinator<A>, n: usize) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while coordinator.queued() < n {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("requests did not queue in time");
    }

    /// One interactive tab whose store starts out holding `T1`/`R1`
    struct Interactive {
        store: SessionStore,
        tab: Tab,
        authority: Arc<ScriptedAuthority>,
        coordinator: RefreshCoordinator<Arc<ScriptedAuthority>>,
        announcements: Subscription,
        _observer: tabauth_session::broadcast::TabChannel,
    }

    impl Interactive {
        async fn new(authority: ScriptedAuthority) -> Self {
            let store = SessionStore::new(InMemoryCookieJar::new());
            store.persist(&pair("T1", "R1")).await.unwrap();

            let hub = BroadcastHub::new();
            let observer = hub.open();
            let announcements = observer.subscribe().unwrap();

            let credentials = Arc::new(SharedCredentials::load(store.clone()).await.unwrap());
            let tab = Tab::new(credentials.clone(), hub.open());
            let authority = Arc::new(authority);
            let coordinator = RefreshCoordinator::new(
                authority.clone(),
                credentials,
                Arc::new(tab.clone()),
            );

            Self {
                store,
                tab,
                authority,
                coordinator,
                announcements,
                _observer: observer,
            }
        }
    }

    mod when_the_access_token_is_accepted {
        use super::*;

        #[tokio::test]
        async fn middleware_attaches_the_current_token() {
            let session = Interactive::new(ScriptedAuthority::new()).await;
            let api = Arc::new(FakeApi::accepting("T1"));
            let client = client(session.coordinator.clone(), api.clone());

            let resp = client.get(API_URL).send().await.unwrap();

            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(api.seen(), vec![Some("Bearer T1".to_owned())]);
            assert_eq!(session.authority.refresh_calls(), 0);
        }
    }

    mod when_the_access_token_has_expired {
        use super::*;

        #[tokio::test]
        async fn concurrent_requests_share_one_refresh_and_are_replayed() {
            let gate = Arc::new(Notify::new());
            let session = Interactive::new(
                ScriptedAuthority::new()
                    .then_refresh(pair("T2", "R2"))
                    .gated(gate.clone()),
            )
            .await;
            let api = Arc::new(FakeApi::accepting("T2"));
            let client = client(session.coordinator.clone(), api.clone());

            let first = tokio::spawn({
                let client = client.clone();
                async move { client.get(API_URL).send().await }
            });
            let second = tokio::spawn({
                let client = client.clone();
                async move { client.get(API_URL).send().await }
            });

            wait_for_queue(&session.coordinator, 2).await;
            gate.notify_one();

            let first = first.await.unwrap().unwrap();
            let second = second.await.unwrap().unwrap();

            assert_eq!(first.status(), StatusCode::OK);
            assert_eq!(second.status(), StatusCode::OK);
            assert_eq!(session.authority.refresh_calls(), 1);

            let seen = api.seen();
            assert_eq!(seen.len(), 4);
            assert_eq!(
                seen.iter()
                    .filter(|s| s.as_deref() == Some("Bearer T2"))
                    .count(),
                2
            );

            assert_eq!(
                session.store.access_token().await.unwrap(),
                Some(AccessToken::from_static("T2"))
            );
            assert_eq!(
                session.store.refresh_token().await.unwrap(),
                Some(RefreshToken::from_static("R2"))
            );
        }

        #[tokio::test]
        async fn many_concurrent_expiries_all_resolve() {
            const N: usize = 8;

            let gate = Arc::new(Notify::new());
            let session = Interactive::new(
                ScriptedAuthority::new()
                    .then_refresh(pair("T2", "R2"))
                    .gated(gate.clone()),
            )
            .await;
            let api = Arc::new(FakeApi::accepting("T2"));
            let client = client(session.coordinator.clone(), api);

            let requests: Vec<_> = (0..N)
                .map(|_| {
                    let client = client.clone();
                    tokio::spawn(async move { client.get(API_URL).send().await })
                })
                .collect();

            wait_for_queue(&session.coordinator, N).await;
            gate.notify_one();

            for request in requests {
                assert_eq!(request.await.unwrap().unwrap().status(), StatusCode::OK);
            }
            assert_eq!(session.authority.refresh_calls(), 1);
            assert!(!session.coordinator.is_refreshing());
        }

        #[tokio::test]
        async fn failed_refresh_rejects_every_request_and_signs_out() {
            let gate = Arc::new(Notify::new());
            let mut session = Interactive::new(
                ScriptedAuthority::new()
                    .then_reject_refresh("refresh token revoked")
                    .gated(gate.clone()),
            )
            .await;
            let api = Arc::new(FakeApi::accepting("T2"));
            let client = client(session.coordinator.clone(), api);

            let first = tokio::spawn({
                let client = client.clone();
                async move { client.get(API_URL).send().await }
            });
            let second = tokio::spawn({
                let client = client.clone();
                async move { client.get(API_URL).send().await }
            });

            wait_for_queue(&session.coordinator, 2).await;
            gate.notify_one();

            for request in [first, second] {
                let error = request.await.unwrap().unwrap_err();
                assert!(matches!(
                    session_error(&error),
                    Some(SessionError::RefreshFailed(_))
                ));
            }

            assert_eq!(session.store.access_token().await.unwrap(), None);
            assert_eq!(session.store.refresh_token().await.unwrap(), None);
            assert_eq!(
                session.announcements.recv().await,
                Some(BroadcastMessage::SignOut)
            );
            assert_eq!(session.tab.view(), View::Entry);
        }
    }

    mod when_the_request_body_cannot_be_cloned {
        use futures_util::stream;

        use super::*;

        #[tokio::test]
        async fn streamed_upload_fails_without_stranding_the_queue() {
            let gate = Arc::new(Notify::new());
            let session = Interactive::new(
                ScriptedAuthority::new()
                    .then_refresh(pair("T2", "R2"))
                    .gated(gate.clone()),
            )
            .await;
            let api = Arc::new(FakeApi::accepting("T2"));
            let client = client(session.coordinator.clone(), api.clone());

            let upload = tokio::spawn({
                let client = client.clone();
                async move {
                    let chunks = stream::iter(vec![Ok::<_, std::io::Error>("chunk")]);
                    client
                        .post(API_URL)
                        .body(reqwest::Body::wrap_stream(chunks))
                        .send()
                        .await
                }
            });
            wait_for_queue(&session.coordinator, 1).await;
            let read = tokio::spawn({
                let client = client.clone();
                async move { client.get(API_URL).send().await }
            });
            wait_for_queue(&session.coordinator, 2).await;
            gate.notify_one();

            let error = upload.await.unwrap().unwrap_err();
            assert!(matches!(
                session_error(&error),
                Some(SessionError::UnreplayableRequest)
            ));
            assert_eq!(read.await.unwrap().unwrap().status(), StatusCode::OK);

            assert_eq!(session.authority.refresh_calls(), 1);
            assert_eq!(
                session.store.access_token().await.unwrap(),
                Some(AccessToken::from_static("T2"))
            );
            assert_eq!(
                session.coordinator.credentials().access_token(),
                Some(AccessToken::from_static("T2"))
            );
        }
    }

    mod when_the_access_token_is_rejected_for_another_reason {
        use super::*;

        #[tokio::test]
        async fn interactive_tab_signs_out_without_refreshing() {
            let mut session = Interactive::new(ScriptedAuthority::new()).await;
            let api = Arc::new(FakeApi::accepting("T2").rejecting_with("token.invalid"));
            let client = client(session.coordinator.clone(), api.clone());

            let error = client.get(API_URL).send().await.unwrap_err();

            match session_error(&error) {
                Some(SessionError::InvalidCredential { code }) => {
                    assert_eq!(code.as_deref(), Some("token.invalid"))
                }
                other => panic!("unexpected error: {other:?}"),
            }
            assert_eq!(api.seen().len(), 1);
            assert_eq!(session.authority.refresh_calls(), 0);
            assert_eq!(session.store.access_token().await.unwrap(), None);
            assert_eq!(
                session.announcements.recv().await,
                Some(BroadcastMessage::SignOut)
            );
        }
    }

    mod when_rendering_on_the_server {
        use super::*;

        fn server_client(
            authority: ScriptedAuthority,
            api: Arc<FakeApi>,
        ) -> (Arc<RequestCredentials>, ClientWithMiddleware) {
            let credentials = Arc::new(RequestCredentials::from_cookie_header(
                "nextauth.token=T1; nextauth.refreshToken=R1",
                SessionConfig::default(),
            ));
            let coordinator = RefreshCoordinator::new(
                Arc::new(authority),
                credentials.clone(),
                Arc::new(DeferToCaller),
            );
            (credentials, client(coordinator, api))
        }

        #[tokio::test]
        async fn refreshed_pair_is_returned_as_cookies() {
            let (credentials, client) = server_client(
                ScriptedAuthority::new().then_refresh(pair("T2", "R2")),
                Arc::new(FakeApi::accepting("T2")),
            );

            let resp = client.get(API_URL).send().await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);

            let cookies = credentials.response_cookies();
            assert_eq!(cookies.len(), 2);
            assert_eq!(cookies[0].value(), "T2");
            assert_eq!(cookies[1].value(), "R2");
        }

        #[tokio::test]
        async fn failed_refresh_requires_authentication() {
            let (credentials, client) = server_client(
                ScriptedAuthority::new().then_reject_refresh("refresh token revoked"),
                Arc::new(FakeApi::accepting("T2")),
            );

            let error = client.get(API_URL).send().await.unwrap_err();

            let error = session_error(&error).expect("session error");
            assert!(error.is_authentication_required());
            assert!(!credentials.is_signed_in());
            assert!(credentials
                .response_cookies()
                .iter()
                .all(|c| c.value().is_empty()));
        }

        #[tokio::test]
        async fn invalid_credential_requires_authentication() {
            let (_, client) = server_client(
                ScriptedAuthority::new(),
                Arc::new(FakeApi::accepting("T2").rejecting_with("token.invalid")),
            );

            let error = client.get(API_URL).send().await.unwrap_err();

            assert!(session_error(&error)
                .expect("session error")
                .is_authentication_required());
        }
    }

    mod when_the_request_is_not_managed {
        use super::*;

        fn counting_client(api: Arc<FakeApi>) -> (Arc<CountingSignOut>, ClientWithMiddleware) {
            let credentials = RequestCredentials::from_cookie_header(
                "nextauth.token=T1; nextauth.refreshToken=R1",
                SessionConfig::default(),
            );
            let sign_out = Arc::new(CountingSignOut::default());
            let coordinator = RefreshCoordinator::new(
                Arc::new(ScriptedAuthority::new()),
                Arc::new(credentials),
                sign_out.clone(),
            );
            (sign_out, client(coordinator, api))
        }

        #[tokio::test]
        async fn caller_supplied_authorization_is_left_in_place() {
            const OVERRIDE_TOKEN: &str = "overridden!";

            let api = Arc::new(FakeApi::accepting(OVERRIDE_TOKEN));
            let (_, client) = counting_client(api.clone());

            let resp = client
                .get(API_URL)
                .bearer_auth(OVERRIDE_TOKEN)
                .send()
                .await
                .unwrap();

            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(api.seen(), vec![Some("Bearer overridden!".to_owned())]);
        }

        #[tokio::test]
        async fn plain_http_is_passed_through_untouched() {
            let api = Arc::new(FakeApi::accepting("T1"));
            let (sign_out, client) = counting_client(api.clone());

            let resp = client.get("http://api.example.com/me").send().await.unwrap();

            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(api.seen(), vec![None]);
            assert_eq!(sign_out.calls.load(Ordering::Acquire), 0);
        }

        #[tokio::test]
        async fn predicate_can_exclude_other_hosts() {
            let api = Arc::new(FakeApi::accepting("T1"));
            let credentials = RequestCredentials::from_cookie_header(
                "nextauth.token=T1",
                SessionConfig::default(),
            );
            let coordinator = RefreshCoordinator::new(
                Arc::new(ScriptedAuthority::new()),
                Arc::new(credentials),
                Arc::new(DeferToCaller),
            );
            let client = ClientBuilder::new(Client::default())
                .with(
                    SessionMiddleware::new(coordinator)
                        .with_predicate(HttpsOnly.and(ExactHostMatch::new("api.example.com"))),
                )
                .with_arc(api.clone())
                .build();

            client.get(API_URL).send().await.unwrap();
            client.get("https://cdn.example.com/me").send().await.unwrap();

            assert_eq!(api.seen(), vec![Some("Bearer T1".to_owned()), None]);
        }
    }

    mod https_only_predicate {
        use super::*;

        #[test]
        fn matches_when_request_has_https_scheme() {
            let request =
                Request::new(reqwest::Method::GET, "https://example.com".parse().unwrap());
            let predicate = HttpsOnly;
            let result = dbg!(predicate.find_case(true, &request));
            assert!(result.is_none())
        }

        #[test]
        fn does_not_match_when_request_has_http_scheme() {
            let request = Request::new(reqwest::Method::GET, "http://example.com".parse().unwrap());
            let predicate = HttpsOnly;
            let result = dbg!(predicate.find_case(false, &request));
            assert!(result.is_none())
        }
    }

    mod exact_host_match_predicate {
        use super::*;

        #[test]
        fn matches_when_request_has_same_host() {
            let request =
                Request::new(reqwest::Method::GET, "https://example.com".parse().unwrap());
            let predicate = ExactHostMatch::new("example.com");
            let result = dbg!(predicate.find_case(true, &request));
            assert!(result.is_none())
        }

        #[test]
        fn does_not_match_when_request_has_different_host() {
            let request = Request::new(
                reqwest::Method::GET,
                "http://does-not-match.com".parse().unwrap(),
            );
            let predicate = ExactHostMatch::new("example.com");
            let result = dbg!(predicate.find_case(false, &request));
            assert!(result.is_none())
        }
    }
}
