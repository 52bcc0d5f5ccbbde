use std::{process, sync::Arc, time::Duration};

use clap::Parser;
use morpho::{
    application::{
        auth::{AuthService, LogCodeDelivery, TokenSigner, hash_password},
        catalog::CatalogService,
        error::AppError,
        repos::{CatalogRepo, UsersRepo},
    },
    cache::{CacheConfig, PathCache},
    config::{self, CliArgs, Command},
    domain::assets::AssetUrlResolver,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let cli_args = CliArgs::parse();

    match cli_args.command.as_ref() {
        Some(Command::HashPassword(args)) => {
            let hash = hash_password(&args.password)?;
            println!("{hash}");
            Ok(())
        }
        Some(Command::Serve(_)) | None => {
            let settings = config::load(&cli_args)?;
            telemetry::init(&settings.logging)?;
            run_serve(settings).await
        }
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let pool = PostgresRepositories::connect(
        &settings.database.url,
        settings.database.max_connections.get(),
    )
    .await
    .map_err(|err| InfraError::database(err.to_string()))?;
    let repositories = Arc::new(PostgresRepositories::new(pool));

    let state = build_http_state(repositories, &settings);
    serve_http(&settings, state).await
}

fn build_http_state(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> HttpState {
    let catalog_repo: Arc<dyn CatalogRepo> = repositories.clone();
    let users_repo: Arc<dyn UsersRepo> = repositories;

    let resolver = AssetUrlResolver::new(&settings.storage.endpoint_url, &settings.storage.bucket);
    let catalog = Arc::new(CatalogService::new(
        catalog_repo,
        resolver,
        settings.database.query_timeout,
    ));

    let signer = settings.auth.signing_secret.as_ref().map(|secret| {
        TokenSigner::new(
            secret.as_bytes(),
            settings.auth.intermediary_ttl,
            settings.auth.session_ttl,
        )
    });
    if signer.is_none() {
        warn!(
            target: "morpho::auth",
            "auth.signing_secret is not set; login is disabled and protected routes deny every request"
        );
    }
    let auth = Arc::new(AuthService::new(
        users_repo,
        signer,
        Arc::new(LogCodeDelivery),
    ));

    let cache_config = CacheConfig::from(&settings.cache);
    let cache = cache_config
        .enabled
        .then(|| Arc::new(PathCache::new(&cache_config)));

    HttpState::new(catalog, auth, cache)
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let addr = settings.server.addr;
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| InfraError::Bind { addr, source })?;
    info!(target: "morpho::server", %addr, "listening");

    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal());
    let grace = settings.server.graceful_shutdown;

    tokio::select! {
        result = server => result.map_err(InfraError::from)?,
        () = drain_deadline(grace) => {
            warn!(
                target: "morpho::server",
                grace_secs = grace.as_secs(),
                "in-flight requests did not finish before the shutdown deadline"
            );
        }
    }

    info!(target: "morpho::server", "shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(target: "morpho::server", error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(target: "morpho::server", "shutdown signal received; draining connections");
}

async fn drain_deadline(grace: Duration) {
    shutdown_signal().await;
    tokio::time::sleep(grace).await;
}
