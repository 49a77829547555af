// src/lib.rs

pub mod handlers;
pub mod models;
pub mod objective;
pub mod optimizer;
pub mod pipeline;

pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

pub async fn run_server(addr: &str) -> std::io::Result<()> {
    use actix_web::{App, HttpServer};
    use handlers::{construct, health_check};

    HttpServer::new(|| {
        App::new()
            .service(construct)
            .service(health_check)
    })
    .bind(addr)?
    .run()
    .await
}
