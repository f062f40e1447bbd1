use std::{
    borrow::Cow,
    net::{IpAddr, SocketAddr},
};

use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::{database::DatabaseOptions, server};

mod migrate;
mod purge;

#[derive(Parser)]
#[clap(version)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    /// DSN to tell Sentry where to send events.
    ///
    /// If provided, errors will be sent to Sentry.
    #[clap(long = "sentry-dsn", env = "SENTRY_DSN")]
    sentry_dsn: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations.
    Migrate(MigrateOpts),
    /// Delete expired activation and password reset tokens.
    PurgeTokens(DatabaseOpts),
    /// Run migrations, then serve the API.
    Serve(ServeOpts),
}

#[derive(Args)]
struct MigrateOpts {
    /// Connection string for the database.
    #[clap(long = "database-url", env = "DATABASE_URL")]
    database_url: String,
}

impl From<MigrateOpts> for migrate::MigrationOpts {
    fn from(opts: MigrateOpts) -> Self {
        Self {
            database_url: opts.database_url,
        }
    }
}

#[derive(Args)]
struct DatabaseOpts {
    /// The number of connections to use for the database pool.
    #[clap(long = "database-pool-size", default_value = "16")]
    database_pool_size: u32,

    /// The number of seconds before a database connection times out.
    #[clap(long = "database-timeout", default_value = "5")]
    database_timeout: u8,

    /// Connection string for the application database.
    #[clap(long = "database-url", env = "DATABASE_URL")]
    database_url: String,
}

impl From<DatabaseOpts> for DatabaseOptions {
    fn from(opts: DatabaseOpts) -> Self {
        Self {
            pool_size: opts.database_pool_size,
            timeout_seconds: opts.database_timeout,
            url: opts.database_url,
        }
    }
}

#[derive(Args)]
struct ServeOpts {
    /// Address to listen on.
    #[clap(long = "address", default_value = "0.0.0.0:8000", env = "ADDRESS")]
    address: SocketAddr,

    /// Public URL of the application.
    ///
    /// Activation and password reset links are built relative to this URL.
    #[clap(long = "base-url", env = "BASE_URL")]
    base_url: String,

    #[clap(flatten)]
    database: DatabaseOpts,

    /// Address to send emails from.
    #[clap(
        long = "email-from-address",
        default_value = "admin@localhost",
        env = "EMAIL_FROM_ADDRESS"
    )]
    email_from_address: String,

    /// Display name to send emails from.
    #[clap(
        long = "email-from-name",
        default_value = "Codegradr",
        env = "EMAIL_FROM_NAME"
    )]
    email_from_name: String,

    /// Connection string for Redis.
    #[clap(long = "redis-url", env = "REDIS_URL")]
    redis_url: String,

    /// API key for SendGrid.
    ///
    /// If provided, emails will be sent using SendGrid. If this is not set,
    /// emails will be printed to stdout.
    #[clap(long = "sendgrid-key", env = "SENDGRID_KEY")]
    sendgrid_key: Option<String>,

    /// Directory containing the email templates.
    #[clap(long = "templates-dir", default_value = "templates", env = "TEMPLATES_DIR")]
    templates_dir: String,

    /// Addresses of reverse proxies trusted to set the `Forwarded` header.
    ///
    /// Requests from any other peer are identified by their connection
    /// address when rate limiting.
    #[clap(
        long = "trusted-proxy",
        env = "TRUSTED_PROXIES",
        value_delimiter = ','
    )]
    trusted_proxies: Vec<IpAddr>,
}

impl From<ServeOpts> for server::Options {
    fn from(opts: ServeOpts) -> Self {
        Self {
            address: opts.address,
            base_url: opts.base_url,
            database: opts.database.into(),
            email_from_address: opts.email_from_address,
            email_from_name: opts.email_from_name,
            redis_url: opts.redis_url,
            sendgrid_key: opts.sendgrid_key,
            templates_dir: opts.templates_dir,
            trusted_proxies: opts.trusted_proxies,
        }
    }
}

pub async fn run_with_sys_args() -> anyhow::Result<()> {
    use tracing_subscriber::prelude::*;

    let cli = Cli::parse();

    let sentry_config = cli.sentry_dsn.map(|dsn| {
        debug!("Enabled sentry.");

        let release_name = option_env!("VERGEN_GIT_SHA")
            .map(Cow::from)
            .or_else(|| sentry::release_name!());

        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: release_name,
                ..Default::default()
            },
        ))
    });

    let sentry_tracing_layer = if sentry_config.is_some() {
        Some(sentry_tracing::layer())
    } else {
        None
    };

    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(sentry_tracing_layer)
        .init();

    match cli.command {
        Commands::Migrate(opts) => migrate::run_migrations(opts.into()).await,
        Commands::PurgeTokens(opts) => purge::purge_expired_tokens(opts.into()).await,
        Commands::Serve(opts) => {
            let migrate_opts = MigrateOpts {
                database_url: opts.database.database_url.clone(),
            };

            migrate::run_migrations(migrate_opts.into()).await?;

            server::serve(opts.into()).await
        }
    }
}
