use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use axum::{
    extract::FromRef,
    http::{header, Method},
    Router,
};
use tera::Tera;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use crate::{
    accounts::{
        notifications::{DynEmailClient, NotificationConfig, Notifier},
        services::{AccountService, DynRateLimiter, VerificationService},
    },
    client_ip::TrustedProxies,
    database::{DatabaseOptions, PostgresConnection},
    email::clients::{ConsoleMailer, SendgridMailer},
    rate_limit::RedisRateLimiter,
    repos::{DynTokenRepo, DynUserRepo},
};

pub struct Options {
    pub address: SocketAddr,
    pub base_url: String,
    pub database: DatabaseOptions,
    pub email_from_address: String,
    pub email_from_name: String,
    pub redis_url: String,
    pub sendgrid_key: Option<String>,
    pub templates_dir: String,
    pub trusted_proxies: Vec<IpAddr>,
}

#[derive(Clone)]
pub struct AppState {
    account_service: AccountService,
    trusted_proxies: TrustedProxies,
}

impl AppState {
    pub fn new(account_service: AccountService, trusted_proxies: TrustedProxies) -> Self {
        Self {
            account_service,
            trusted_proxies,
        }
    }
}

impl FromRef<AppState> for AccountService {
    fn from_ref(state: &AppState) -> Self {
        state.account_service.clone()
    }
}

impl FromRef<AppState> for TrustedProxies {
    fn from_ref(state: &AppState) -> Self {
        state.trusted_proxies.clone()
    }
}

/// Build the application's router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::GET, Method::OPTIONS, Method::POST, Method::PUT])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE, header::ORIGIN])
        .allow_credentials(true);

    Router::new()
        .nest("/api/v1/account", crate::accounts::http::routes())
        .with_state(state)
        .layer(cors)
}

pub async fn serve(opts: Options) -> anyhow::Result<()> {
    let db_connection = PostgresConnection::connect(&opts.database).await?;

    let templates = Tera::new(&format!("{}/**/*", opts.templates_dir.trim_end_matches('/')))
        .context("Failed to load email templates.")?;

    let email_client: DynEmailClient = match opts.sendgrid_key {
        Some(api_key) => Arc::new(SendgridMailer::new(api_key, opts.email_from_name)),
        None => {
            info!("No SendGrid key provided. Emails will be printed to stdout.");

            Arc::new(ConsoleMailer)
        }
    };

    let notification_config = NotificationConfig::new(&opts.base_url, &opts.email_from_address);
    let notifier = Notifier::new(notification_config, email_client, templates);

    let rate_limiter: DynRateLimiter = Arc::new(RedisRateLimiter::new(&opts.redis_url)?);
    let token_repo: DynTokenRepo = Arc::new(db_connection.clone());
    let user_repo: DynUserRepo = Arc::new(db_connection);

    let verification_service = VerificationService::new(notifier, token_repo.clone());
    let account_service =
        AccountService::new(rate_limiter, token_repo, user_repo, verification_service);

    if opts.trusted_proxies.is_empty() {
        info!("No trusted proxies. Clients are identified by their peer address.");
    }

    let app = app(AppState::new(
        account_service,
        TrustedProxies::new(opts.trusted_proxies),
    ));

    info!(address = %opts.address, "Starting server.");

    axum::Server::bind(&opts.address)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    Ok(())
}
