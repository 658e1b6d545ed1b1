use crate::tools::{DATE_TIME_FORMAT, with_public_headers};
use chrono::Local;
use reqwest::StatusCode;
use serde_json::{Value, json};
use volo_http::{
    response::Response,
    server::{
        IntoResponse,
        extract::Json,
        route::{Router, get},
    },
};

async fn health_handler() -> Response {
    with_public_headers((StatusCode::OK, Json(health_body())).into_response())
}

fn health_body() -> Value {
    json!({
        "status": "ok",
        "message": "chat relay is running",
        "timestamp": Local::now().format(DATE_TIME_FORMAT).to_string(),
        "version": env!("CARGO_PKG_VERSION"),
    })
}

pub fn health_router() -> Router {
    Router::new().route("/health", get(health_handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_body() {
        let body = health_body();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["timestamp"].as_str().unwrap().len(), "2025-06-01 08:30:05".len());
    }

    #[tokio::test]
    async fn test_health_allows_any_origin() {
        let response = health_handler().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(response.headers()["cache-control"], "no-cache");
    }
}
