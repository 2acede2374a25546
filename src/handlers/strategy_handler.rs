use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::models::strategy::{CustomField, Strategy, StrategyPayload, StrategyWithFields};
use crate::services::{metrics, strategy_store};

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

async fn insert_custom_fields(
    tx: &mut Transaction<'_, Postgres>,
    strategy_id: Uuid,
    payload: &StrategyPayload,
) -> Result<(), AppError> {
    for (position, field) in payload.custom_fields.iter().enumerate() {
        sqlx::query(
            "INSERT INTO custom_field (strategy_id, name, type, options, required, position) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(strategy_id)
        .bind(&field.name)
        .bind(field.field_type)
        .bind(field.options.as_ref().map(Json))
        .bind(field.required)
        .bind(position as i32)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[post("/strategies")]
async fn create_strategy(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    body: web::Json<StrategyPayload>,
) -> Result<impl Responder, AppError> {
    let payload = body.into_inner();
    payload.validate().map_err(AppError::validation)?;

    // Strategy row and its custom fields land together or not at all.
    let mut tx = pool.begin().await?;

    let strategy = sqlx::query_as::<_, Strategy>(
        "INSERT INTO strategy (user_id, name, description, instrument) \
         VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(&user.user_id)
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(payload.instrument)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::field_error("name", "A strategy with this name already exists")
        } else {
            e.into()
        }
    })?;

    insert_custom_fields(&mut tx, strategy.id, &payload).await?;

    let custom_fields = sqlx::query_as::<_, CustomField>(
        "SELECT * FROM custom_field WHERE strategy_id = $1 ORDER BY position ASC",
    )
    .bind(strategy.id)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Strategy created successfully",
        "strategy": StrategyWithFields { strategy, custom_fields }
    })))
}

#[get("/strategies")]
async fn list_strategies(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let strategies = strategy_store::list_with_fields(pool.get_ref(), &user.user_id).await?;
    Ok(HttpResponse::Ok().json(strategies))
}

#[get("/strategies/{id}")]
async fn get_strategy(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    let strategy = strategy_store::find_owned(pool.get_ref(), &user.user_id, path.into_inner()).await?;
    let custom_fields = strategy_store::fields_for(pool.get_ref(), strategy.id).await?;
    Ok(HttpResponse::Ok().json(StrategyWithFields {
        strategy,
        custom_fields,
    }))
}

#[put("/strategies/{id}")]
async fn update_strategy(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    body: web::Json<StrategyPayload>,
) -> Result<impl Responder, AppError> {
    let strategy_id = path.into_inner();
    let payload = body.into_inner();
    payload.validate().map_err(AppError::validation)?;

    let mut tx = pool.begin().await?;

    let strategy = sqlx::query_as::<_, Strategy>(
        "UPDATE strategy SET name = $1, description = $2, instrument = $3, updated_at = NOW() \
         WHERE id = $4 AND user_id = $5 RETURNING *",
    )
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(payload.instrument)
    .bind(strategy_id)
    .bind(&user.user_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::field_error("name", "A strategy with this name already exists")
        } else {
            e.into()
        }
    })?
    .ok_or_else(|| AppError::NotFound("Strategy not found".to_string()))?;

    // Replace the field set wholesale; field order follows the payload.
    sqlx::query("DELETE FROM custom_field WHERE strategy_id = $1")
        .bind(strategy.id)
        .execute(&mut *tx)
        .await?;
    insert_custom_fields(&mut tx, strategy.id, &payload).await?;

    let custom_fields = sqlx::query_as::<_, CustomField>(
        "SELECT * FROM custom_field WHERE strategy_id = $1 ORDER BY position ASC",
    )
    .bind(strategy.id)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Strategy updated successfully",
        "strategy": StrategyWithFields { strategy, custom_fields }
    })))
}

#[delete("/strategies/{id}")]
async fn delete_strategy(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<impl Responder, AppError> {
    // Custom fields and trades go with it via the referential cascade.
    let res = sqlx::query("DELETE FROM strategy WHERE id = $1 AND user_id = $2")
        .bind(path.into_inner())
        .bind(&user.user_id)
        .execute(pool.get_ref())
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("Strategy not found".to_string()));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Strategy deleted successfully"
    })))
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetricsQuery {
    #[serde(default)]
    is_backtest: bool,
}

#[get("/strategies/{id}/metrics")]
async fn get_metrics(
    pool: web::Data<PgPool>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    query: web::Query<MetricsQuery>,
) -> Result<impl Responder, AppError> {
    let strategy = strategy_store::find_owned(pool.get_ref(), &user.user_id, path.into_inner()).await?;

    let metrics = metrics::compute_metrics(
        pool.get_ref(),
        &user.user_id,
        strategy.id,
        query.is_backtest,
    )
    .await?;

    Ok(HttpResponse::Ok().json(metrics))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(create_strategy)
        .service(list_strategies)
        .service(get_metrics)
        .service(get_strategy)
        .service(update_strategy)
        .service(delete_strategy);
}
