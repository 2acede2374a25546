use std::collections::HashMap;

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::strategy::{CustomField, Strategy, StrategyWithFields};

/// Looks up a strategy scoped to its owner. A strategy that exists but
/// belongs to someone else is indistinguishable from one that does not
/// exist.
pub async fn find_owned(
    pool: &PgPool,
    owner_id: &str,
    strategy_id: Uuid,
) -> Result<Strategy, AppError> {
    sqlx::query_as::<_, Strategy>("SELECT * FROM strategy WHERE id = $1 AND user_id = $2")
        .bind(strategy_id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Strategy not found".to_string()))
}

pub async fn fields_for(pool: &PgPool, strategy_id: Uuid) -> Result<Vec<CustomField>, AppError> {
    let fields = sqlx::query_as::<_, CustomField>(
        "SELECT * FROM custom_field WHERE strategy_id = $1 ORDER BY position ASC",
    )
    .bind(strategy_id)
    .fetch_all(pool)
    .await?;
    Ok(fields)
}

/// All of the caller's strategies, newest first, each with its ordered
/// custom fields.
pub async fn list_with_fields(
    pool: &PgPool,
    owner_id: &str,
) -> Result<Vec<StrategyWithFields>, AppError> {
    let strategies =
        sqlx::query_as::<_, Strategy>("SELECT * FROM strategy WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(owner_id)
            .fetch_all(pool)
            .await?;

    let ids: Vec<Uuid> = strategies.iter().map(|s| s.id).collect();
    let fields = sqlx::query_as::<_, CustomField>(
        "SELECT * FROM custom_field WHERE strategy_id = ANY($1) ORDER BY position ASC",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let mut by_strategy: HashMap<Uuid, Vec<CustomField>> = HashMap::new();
    for field in fields {
        by_strategy.entry(field.strategy_id).or_default().push(field);
    }

    Ok(strategies
        .into_iter()
        .map(|strategy| {
            let custom_fields = by_strategy.remove(&strategy.id).unwrap_or_default();
            StrategyWithFields {
                strategy,
                custom_fields,
            }
        })
        .collect())
}
