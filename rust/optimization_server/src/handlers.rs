// src/handlers.rs

use crate::models::{ConstructionRequest, ConstructionResponse};
use crate::pipeline::{self, Construction};
use actix_web::http::StatusCode;
use actix_web::{get, post, web, HttpResponse, Responder};
use tracing::{error, info, warn};
use validator::Validate;

#[post("/construct")]
pub async fn construct(request: web::Json<ConstructionRequest>) -> impl Responder {
    let request = request.into_inner();

    // Validate lengths, tickers and config before touching the tables
    if let Err(err) = request.validate() {
        warn!(error = %err, "Rejected construction request");
        return HttpResponse::BadRequest().json(ConstructionResponse::failure("invalid_input", err.to_string()));
    }

    let market = match request.market() {
        Ok(market) => market,
        Err(err) => {
            warn!(error = %err, "Could not assemble market tables");
            return HttpResponse::BadRequest().json(ConstructionResponse::failure(
                "invalid_input",
                format!("Failed to build market tables: {}", err),
            ));
        }
    };

    info!(tickers = request.universe.len(), regime = %request.config.regime, "Constructing portfolio");

    let ConstructionRequest {
        fundamentals, config, ..
    } = request;
    let outcome = web::block(move || pipeline::construct(&market, &fundamentals, &config)).await;

    match outcome {
        Ok(Ok(construction)) => {
            let (status, message) = match &construction {
                Construction::EmptySelection { .. } => (
                    "empty_selection",
                    "No ticker passed the filter".to_string(),
                ),
                Construction::Constructed(report) => (
                    "constructed",
                    format!(
                        "Optimization succeeded with status: {}",
                        report.portfolio.status
                    ),
                ),
            };
            HttpResponse::Ok().json(ConstructionResponse {
                success: true,
                status: status.to_string(),
                message,
                report: Some(construction),
            })
        }
        Ok(Err(err)) => {
            let kind = err.kind();
            let code = match kind {
                "invalid_input" => StatusCode::BAD_REQUEST,
                "insufficient_history" | "degenerate_covariance" => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            warn!(kind, error = %err, "Construction failed");
            HttpResponse::build(code).json(ConstructionResponse::failure(kind, err.to_string()))
        }
        Err(err) => {
            error!(error = %err, "Construction task did not complete");
            HttpResponse::InternalServerError().json(ConstructionResponse::failure(
                "internal_error",
                format!("Construction task failed: {}", err),
            ))
        }
    }
}

#[get("/health")]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().body("OK")
}
