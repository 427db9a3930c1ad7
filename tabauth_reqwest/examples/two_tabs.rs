use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use reqwest_middleware::ClientBuilder;
use tabauth_reqwest::{ApiClient, ExactHostMatch, SessionMiddleware};
use tabauth_session::{
    authority::{AuthorityConfig, HttpAuthority, IdentitySource},
    broadcast::BroadcastHub,
    credentials::SharedCredentials,
    store::{FileCookieJar, SessionStore},
    Email, Password, RefreshCoordinator, SessionContext, SignInCredentials, Tab, View,
};
use tokio::time;

#[derive(Debug, Parser)]
struct Opts {
    /// The base URL of the API, ending in a slash
    #[arg(short, long, env)]
    api_url: reqwest::Url,

    /// The email to sign in with
    #[arg(short, long, env)]
    email: Email,

    /// The password to sign in with
    #[arg(short, long, env, hide_env_values = true)]
    password: Password,

    /// The local file shared by both tabs as their cookie jar
    #[arg(short = 'f', long, env, default_value = ".session.json")]
    credentials_file: PathBuf,
}

async fn open_tab(
    name: &'static str,
    opts: &Opts,
    hub: &BroadcastHub,
    authority: Arc<HttpAuthority>,
) -> color_eyre::Result<SessionContext<Arc<HttpAuthority>, ApiClient>> {
    let store = SessionStore::new(FileCookieJar::new(opts.credentials_file.clone()));
    let credentials = Arc::new(SharedCredentials::load(store).await?);
    let tab = Tab::new(credentials.clone(), hub.open());
    tracing::info!(name, tab = %tab.channel().id(), "opened tab");

    let coordinator =
        RefreshCoordinator::new(authority.clone(), credentials, Arc::new(tab.clone()));
    let host = opts.api_url.host_str().unwrap_or_default().to_owned();
    let client = ClientBuilder::new(reqwest::Client::builder().build()?)
        .with(SessionMiddleware::new(coordinator).with_predicate(ExactHostMatch::new(host)))
        .build();

    let api = ApiClient::new(client, opts.api_url.clone());
    Ok(SessionContext::new(tab, authority, api))
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let authority = Arc::new(HttpAuthority::new(&AuthorityConfig::new(
        opts.api_url.clone(),
    ))?);
    let hub = BroadcastHub::new();

    let tab_a = open_tab("a", &opts, &hub, authority.clone()).await?;
    let tab_b = open_tab("b", &opts, &hub, authority).await?;
    let _mounted_a = tab_a.mount().await?;
    let _mounted_b = tab_b.mount().await?;

    if !tab_a.is_authenticated() {
        let user = tab_a
            .sign_in(&SignInCredentials::new(
                opts.email.clone(),
                opts.password.clone(),
            ))
            .await?;
        tracing::info!(email = %user.email, roles = ?user.roles, "tab a signed in");
    }

    let mut view_b = tab_b.tab().watch_view();
    time::timeout(
        Duration::from_secs(5),
        view_b.wait_for(|v| *v == View::Dashboard),
    )
    .await??;
    tracing::info!("tab b followed the sign-in");

    // Access tokens are short-lived; keep calling until at least one refresh happens
    let mut interval = time::interval(Duration::from_secs(5));
    for _ in 0..12 {
        interval.tick().await;
        if !tab_a.is_authenticated() {
            break;
        }
        let user = tab_a.identity().me().await?;
        tracing::info!(email = %user.email, "identity endpoint answered");
    }

    tab_a.sign_out().await;
    time::timeout(Duration::from_secs(5), view_b.wait_for(|v| *v == View::Entry)).await??;
    tracing::info!("tab b followed the sign-out");

    Ok(())
}
