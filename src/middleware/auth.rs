use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use shared::{AppError, AuthService, UserContext};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};

/// Caller identity placed in the request extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserContext);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserContext>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::authentication("Authentication required"))
    }
}

/// Verify the Bearer token and attach the caller's [`UserContext`].
pub async fn require_auth(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| {
            warn!(path = %request.uri().path(), "missing Authorization header");
            AppError::authentication("Authentication required. Provide a Bearer token.")
        })?
        .to_str()
        .map_err(|_| AppError::authentication("Invalid authorization header format"))?;

    let token = auth.extract_token_from_header(header)?;
    let user = auth.extract_user_context(token).map_err(|e| {
        warn!(error = %e, "token rejected");
        e
    })?;

    debug!(user_id = %user.user_id, roles = ?user.roles, "request authenticated");
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

type MiddlewareFuture = Pin<Box<dyn Future<Output = Result<Response, AppError>> + Send>>;

/// Role-check hook layered inside [`require_auth`]: the caller must carry
/// `role`, otherwise the request is answered with 403.
pub fn require_role(role: &'static str) -> impl Fn(Request, Next) -> MiddlewareFuture + Clone {
    move |request: Request, next: Next| {
        Box::pin(async move {
            let verdict = match request.extensions().get::<UserContext>() {
                None => Err(AppError::authentication("Authentication required")),
                Some(user) if !user.has_role(role) => {
                    warn!(user_id = %user.user_id, required = role, "insufficient role");
                    Err(AppError::authorization(format!(
                        "The '{}' role is required",
                        role
                    )))
                }
                Some(_) => Ok(()),
            };
            verdict?;

            Ok(next.run(request).await)
        }) as MiddlewareFuture
    }
}
