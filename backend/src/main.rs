//! Backend entry-point: environment, tracing, and server bootstrap.

use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};

use backend::server::config::AppConfig;
use backend::server::create_server;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Optional in production; development runs keep settings in ./.env.
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            warn!(error = %err, ".env could not be loaded");
        }
    }

    if let Err(err) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %err, "tracing init failed");
    }

    let config = AppConfig::from_env()
        .map_err(|err| std::io::Error::other(format!("configuration: {err}")))?;

    let server = create_server(config).await?;
    server.await
}
