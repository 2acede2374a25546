use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::trade::Trade;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

/// Every trade query is scoped by owner and partition. Cross-user reads are
/// impossible by construction: the owner id is part of the filter, not a
/// check applied afterwards.
#[derive(Debug, Clone)]
pub struct TradeFilter {
    pub owner_id: String,
    pub strategy_id: Uuid,
    pub is_backtest: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Whitelist of sortable trade attributes. Sort columns are interpolated into
/// SQL, so anything not on this list is rejected before query construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSortField {
    Asset,
    Status,
    Direction,
    Result,
    ProfitLoss,
    DateOpened,
    DateClosed,
    CreatedAt,
    UpdatedAt,
}

impl TradeSortField {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asset" => Some(Self::Asset),
            "status" => Some(Self::Status),
            "direction" => Some(Self::Direction),
            "result" => Some(Self::Result),
            "profitLoss" => Some(Self::ProfitLoss),
            "dateOpened" => Some(Self::DateOpened),
            "dateClosed" => Some(Self::DateClosed),
            "createdAt" => Some(Self::CreatedAt),
            "updatedAt" => Some(Self::UpdatedAt),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Status => "status",
            Self::Direction => "direction",
            Self::Result => "result",
            Self::ProfitLoss => "profit_loss",
            Self::DateOpened => "date_opened",
            Self::DateClosed => "date_closed",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: TradeSortField,
    pub direction: SortDirection,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            field: TradeSortField::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

impl SortSpec {
    /// Resolves the raw query parameters. No sort field means newest-first by
    /// creation time; an explicit field defaults to ascending.
    pub fn from_params(field: Option<&str>, direction: Option<&str>) -> Result<Self, AppError> {
        let direction = match direction {
            Some(d) => Some(
                SortDirection::parse(d)
                    .ok_or_else(|| AppError::field_error("sortDirection", "Must be 'asc' or 'desc'"))?,
            ),
            None => None,
        };

        match field {
            None => Ok(Self {
                direction: direction.unwrap_or(SortDirection::Desc),
                ..Self::default()
            }),
            Some(f) => {
                let field = TradeSortField::parse(f)
                    .ok_or_else(|| AppError::field_error("sortField", "Unknown sort field"))?;
                Ok(Self {
                    field,
                    direction: direction.unwrap_or(SortDirection::Asc),
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpec {
    pub index: i64,
    pub size: i64,
}

impl PageSpec {
    pub fn new(index: Option<i64>, size: Option<i64>) -> Self {
        Self {
            index: index.unwrap_or(0).max(0),
            size: size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(self) -> i64 {
        self.index * self.size
    }
}

#[derive(Debug)]
pub struct TradePage {
    pub rows: Vec<Trade>,
    pub total_count: i64,
}

// Ties on the requested key are broken by id so pagination stays stable
// across requests.
fn list_sql(sort: SortSpec) -> String {
    format!(
        "SELECT * FROM trade \
         WHERE user_id = $1 AND strategy_id = $2 AND is_backtest = $3 \
         ORDER BY {} {}, id ASC LIMIT $4 OFFSET $5",
        sort.field.column(),
        sort.direction.sql()
    )
}

pub async fn list_trades(
    pool: &PgPool,
    filter: &TradeFilter,
    sort: SortSpec,
    page: PageSpec,
) -> Result<TradePage, AppError> {
    let (total_count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM trade WHERE user_id = $1 AND strategy_id = $2 AND is_backtest = $3",
    )
    .bind(&filter.owner_id)
    .bind(filter.strategy_id)
    .bind(filter.is_backtest)
    .fetch_one(pool)
    .await?;

    let rows = sqlx::query_as::<_, Trade>(&list_sql(sort))
        .bind(&filter.owner_id)
        .bind(filter.strategy_id)
        .bind(filter.is_backtest)
        .bind(page.size)
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

    Ok(TradePage { rows, total_count })
}
