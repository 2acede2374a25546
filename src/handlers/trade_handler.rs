use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use chrono::Utc;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::models::trade::{validate_custom_values, Trade, TradePayload};
use crate::services::strategy_store;
use crate::services::trade_query::{self, PageSpec, SortSpec, TradeFilter};

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTradesQuery {
    strategy_id: Uuid,
    #[serde(default)]
    is_backtest: bool,
    sort_field: Option<String>,
    sort_direction: Option<String>,
    page_index: Option<i64>,
    page_size: Option<i64>,
}

#[get("/trades")]
async fn list_trades(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    query: web::Query<ListTradesQuery>,
) -> Result<impl Responder, AppError> {
    let q = query.into_inner();
    let sort = SortSpec::from_params(q.sort_field.as_deref(), q.sort_direction.as_deref())?;
    let page = PageSpec::new(q.page_index, q.page_size);
    let filter = TradeFilter {
        owner_id: user.user_id,
        strategy_id: q.strategy_id,
        is_backtest: q.is_backtest,
    };

    let result = trade_query::list_trades(pool.get_ref(), &filter, sort, page).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "trades": result.rows,
        "totalCount": result.total_count
    })))
}

/// Validates the payload against the owning strategy's custom field
/// definitions. Shared by create and update.
async fn check_against_strategy(
    pool: &PgPool,
    user: &AuthenticatedUser,
    payload: &TradePayload,
) -> Result<(), AppError> {
    payload.validate().map_err(AppError::validation)?;

    let strategy = strategy_store::find_owned(pool, &user.user_id, payload.strategy_id).await?;
    let fields = strategy_store::fields_for(pool, strategy.id).await?;
    validate_custom_values(&fields, &payload.custom_values).map_err(AppError::validation)?;

    Ok(())
}

#[post("/trades")]
async fn create_trade(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    body: web::Json<TradePayload>,
) -> Result<impl Responder, AppError> {
    let payload = body.into_inner();
    check_against_strategy(pool.get_ref(), &user, &payload).await?;

    let lifecycle = payload.lifecycle_fields(Utc::now());

    let rec = sqlx::query_as::<_, Trade>(
        "INSERT INTO trade (user_id, strategy_id, status, asset, date_opened, date_closed, \
         direction, result, profit_loss, notes, is_backtest, custom_values) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING *",
    )
    .bind(&user.user_id)
    .bind(payload.strategy_id)
    .bind(payload.status)
    .bind(&payload.asset)
    .bind(lifecycle.date_opened)
    .bind(lifecycle.date_closed)
    .bind(payload.direction)
    .bind(lifecycle.result)
    .bind(lifecycle.profit_loss)
    .bind(&payload.notes)
    .bind(payload.is_backtest)
    .bind(Json(&payload.custom_values))
    .fetch_one(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Trade logged successfully",
        "trade": rec
    })))
}

#[put("/trades/{id}")]
async fn update_trade(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    body: web::Json<TradePayload>,
) -> Result<impl Responder, AppError> {
    let trade_id = path.into_inner();
    let payload = body.into_inner();
    check_against_strategy(pool.get_ref(), &user, &payload).await?;

    let lifecycle = payload.lifecycle_fields(Utc::now());

    // Ownership, strategy and partition are fixed at creation; the update
    // deliberately never touches user_id, strategy_id or is_backtest.
    let rec = sqlx::query_as::<_, Trade>(
        "UPDATE trade SET status = $1, asset = $2, date_opened = $3, date_closed = $4, \
         direction = $5, result = $6, profit_loss = $7, notes = $8, custom_values = $9, \
         updated_at = NOW() \
         WHERE id = $10 AND user_id = $11 RETURNING *",
    )
    .bind(payload.status)
    .bind(&payload.asset)
    .bind(lifecycle.date_opened)
    .bind(lifecycle.date_closed)
    .bind(payload.direction)
    .bind(lifecycle.result)
    .bind(lifecycle.profit_loss)
    .bind(&payload.notes)
    .bind(Json(&payload.custom_values))
    .bind(trade_id)
    .bind(&user.user_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| AppError::NotFound("Trade not found".to_string()))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Trade updated successfully",
        "trade": rec
    })))
}

#[delete("/trades/{id}")]
async fn delete_trade(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let trade_id = path.into_inner();

    let res = sqlx::query("DELETE FROM trade WHERE id = $1 AND user_id = $2")
        .bind(trade_id)
        .bind(&user.user_id)
        .execute(pool.get_ref())
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("Trade not found".to_string()));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Trade deleted successfully"
    })))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(list_trades)
        .service(create_trade)
        .service(update_trade)
        .service(delete_trade);
}
