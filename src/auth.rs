use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;
use sqlx::PgPool;

use crate::error::AppError;

/// Identity resolved once per request from the session token and passed
/// explicitly into every query. Handlers that take this extractor never see
/// an unauthenticated request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let pool = req
            .app_data::<web::Data<PgPool>>()
            .expect("PgPool missing from app data")
            .clone();
        let token = bearer_token(req);

        Box::pin(async move {
            let token = token.ok_or(AppError::Unauthorized)?;

            let row: Option<(String,)> = sqlx::query_as(
                "SELECT user_id FROM session WHERE token = $1 AND expires_at > NOW()",
            )
            .bind(&token)
            .fetch_optional(pool.get_ref())
            .await?;

            match row {
                Some((user_id,)) => Ok(AuthenticatedUser { user_id }),
                None => Err(AppError::Unauthorized),
            }
        })
    }
}
