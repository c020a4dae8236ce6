use std::error::Error;
use std::sync::Arc;

use authkeep::core::auth::{AuthApiState, TokenService, auth_api_router};
use authkeep::core::config::Config;
use authkeep::core::db::{
    CredentialStore, InMemoryUserStore, UserRepository, create_pool_with_migrations,
};
use axum::http::{HeaderValue, Method, header};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    // Log config status (without revealing secrets)
    tracing::info!(
        "Config loaded: database={}, client_url={}, upload_dir={}",
        config.has_database(),
        config.has_client_url(),
        config.upload_dir
    );

    let tokens = TokenService::from_env()?;

    let store: Arc<dyn CredentialStore> = if let Some(db_config) = config.db_config() {
        let pool = create_pool_with_migrations(&db_config).await?;
        Arc::new(UserRepository::with_cost(pool, config.bcrypt_cost))
    } else {
        tracing::warn!("DATABASE_URL not set, users are kept in memory and lost on restart");
        Arc::new(InMemoryUserStore::with_cost(config.bcrypt_cost))
    };

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
    let cors = match &config.client_url {
        Some(origin) => cors.allow_origin(origin.parse::<HeaderValue>()?),
        None => cors.allow_origin(Any),
    };

    let app = auth_api_router(AuthApiState::new(store, tokens))
        // Uploaded profile images
        .nest_service("/uploads", ServeDir::new(&config.upload_dir))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http());

    let addr = config.bind_addr()?;
    tracing::info!("listening on http://{}", addr);
    tracing::info!("Auth API: http://{}/api/auth", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
