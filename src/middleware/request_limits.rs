use axum::{extract::Request, middleware::Next, response::Response};
use shared::AppError;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::warn;

// Body size is enforced by `DefaultBodyLimit` on the router.
pub const GLOBAL_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type TimeoutFuture = Pin<Box<dyn Future<Output = Result<Response, AppError>> + Send>>;

/// Fails the request with 408 `REQUEST_TIMEOUT` once `limit` elapses.
pub fn request_timeout(limit: Duration) -> impl Fn(Request, Next) -> TimeoutFuture + Clone {
    move |req: Request, next: Next| {
        Box::pin(async move {
            let path = req.uri().path().to_string();
            match tokio::time::timeout(limit, next.run(req)).await {
                Ok(resp) => Ok(resp),
                Err(_elapsed) => {
                    warn!(%path, limit_ms = limit.as_millis() as u64, "request timeout exceeded");
                    Err(AppError::timeout(format!(
                        "Request exceeded {}s timeout",
                        limit.as_secs_f64()
                    )))
                }
            }
        }) as TimeoutFuture
    }
}

pub async fn request_timeout_middleware(req: Request, next: Next) -> Result<Response, AppError> {
    request_timeout(GLOBAL_REQUEST_TIMEOUT)(req, next).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::StatusCode,
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    fn app(limit: Duration) -> Router {
        Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    "done"
                }),
            )
            .route("/fast", get(|| async { "done" }))
            .layer(middleware::from_fn(request_timeout(limit)))
    }

    fn get_request(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_slow_request_gets_408() {
        let response = app(Duration::from_millis(20))
            .oneshot(get_request("/slow"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "REQUEST_TIMEOUT");
        assert_eq!(body["code"], "408");
    }

    #[tokio::test]
    async fn test_fast_request_passes_through() {
        let response = app(Duration::from_secs(5))
            .oneshot(get_request("/fast"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
