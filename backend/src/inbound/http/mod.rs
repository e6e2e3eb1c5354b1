//! HTTP inbound adapter: the minimal REST surface.

use actix_web::{get, web, Responder};

/// Liveness-style hello endpoint kept for client development.
#[get("/api/hello")]
pub async fn hello() -> impl Responder {
    web::Json(serde_json::json!({ "message": "Hello from API!" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use rstest::rstest;

    #[rstest]
    #[actix_rt::test]
    async fn hello_returns_greeting() {
        let app = test::init_service(App::new().service(hello)).await;
        let request = test::TestRequest::get().uri("/api/hello").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(body["message"], "Hello from API!");
    }
}
