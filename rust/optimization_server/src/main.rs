// src/main.rs

use optimization_server::{run_server, DEFAULT_ADDR};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let addr = std::env::var("PORTFOLIO_SERVER_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    info!("Starting portfolio construction server at http://{}", addr);
    run_server(&addr).await
}
