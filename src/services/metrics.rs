use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::trade::TradeResult;

/// The slice of a trade the aggregator cares about.
#[derive(Debug, FromRow)]
pub struct OutcomeRow {
    pub result: Option<TradeResult>,
    pub profit_loss: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyMetrics {
    pub win_rate: i64,
    pub total_profit: f64,
    pub avg_return: f64,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Reduces the full trade set of one strategy partition to its three derived
/// statistics.
///
/// Break-even trades are excluded from the win-rate denominator but still
/// count toward the trade total that the average return divides by. The
/// average is taken over the unrounded profit sum, then both are rounded to
/// two decimals.
pub fn aggregate(rows: &[OutcomeRow]) -> StrategyMetrics {
    let total = rows.len() as i64;
    let wins = rows
        .iter()
        .filter(|r| r.result == Some(TradeResult::Win))
        .count() as i64;
    let break_even = rows
        .iter()
        .filter(|r| r.result == Some(TradeResult::BreakEven))
        .count() as i64;

    let relevant = total - break_even;
    let win_rate = if relevant > 0 {
        (wins as f64 / relevant as f64 * 100.0).round() as i64
    } else {
        0
    };

    let total_profit: f64 = rows
        .iter()
        .filter_map(|r| r.profit_loss)
        .filter(|v| v.is_finite())
        .sum();

    let avg_return = if total > 0 {
        round2(total_profit / total as f64)
    } else {
        0.0
    };

    StrategyMetrics {
        win_rate,
        total_profit: round2(total_profit),
        avg_return,
    }
}

/// Recomputed from the store on every call, over the full (unpaginated)
/// set for the strategy and partition.
pub async fn compute_metrics(
    pool: &PgPool,
    owner_id: &str,
    strategy_id: Uuid,
    is_backtest: bool,
) -> Result<StrategyMetrics, AppError> {
    let rows = sqlx::query_as::<_, OutcomeRow>(
        "SELECT result, profit_loss FROM trade \
         WHERE user_id = $1 AND strategy_id = $2 AND is_backtest = $3",
    )
    .bind(owner_id)
    .bind(strategy_id)
    .bind(is_backtest)
    .fetch_all(pool)
    .await?;

    Ok(aggregate(&rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(result: Option<TradeResult>, profit_loss: Option<f64>) -> OutcomeRow {
        OutcomeRow {
            result,
            profit_loss,
        }
    }

    #[test]
    fn win_rate_excludes_break_even_from_denominator() {
        // 10 trades: 5 wins, 2 break-even, 3 losses -> 5/8 -> 63%
        let mut rows = Vec::new();
        for _ in 0..5 {
            rows.push(row(Some(TradeResult::Win), Some(1.0)));
        }
        for _ in 0..2 {
            rows.push(row(Some(TradeResult::BreakEven), Some(0.0)));
        }
        for _ in 0..3 {
            rows.push(row(Some(TradeResult::Loss), Some(-1.0)));
        }

        assert_eq!(aggregate(&rows).win_rate, 63);
    }

    #[test]
    fn profit_and_average_round_to_two_decimals() {
        let rows = vec![
            row(Some(TradeResult::Win), Some(3.5)),
            row(Some(TradeResult::Loss), Some(-2.0)),
            row(Some(TradeResult::BreakEven), Some(0.0)),
        ];
        let metrics = aggregate(&rows);
        assert_eq!(metrics.total_profit, 1.5);
        assert_eq!(metrics.avg_return, 0.5);
    }

    #[test]
    fn average_divides_by_all_trades_including_unresolved() {
        // An open trade with no result still counts toward the denominator.
        let rows = vec![
            row(Some(TradeResult::Win), Some(3.0)),
            row(None, None),
            row(None, None),
        ];
        let metrics = aggregate(&rows);
        assert_eq!(metrics.total_profit, 3.0);
        assert_eq!(metrics.avg_return, 1.0);
        assert_eq!(metrics.win_rate, 100);
    }

    #[test]
    fn empty_set_yields_zeros() {
        let metrics = aggregate(&[]);
        assert_eq!(metrics.win_rate, 0);
        assert_eq!(metrics.total_profit, 0.0);
        assert_eq!(metrics.avg_return, 0.0);
    }

    #[test]
    fn all_break_even_yields_zero_win_rate() {
        let rows = vec![
            row(Some(TradeResult::BreakEven), Some(0.1)),
            row(Some(TradeResult::BreakEven), Some(-0.1)),
        ];
        assert_eq!(aggregate(&rows).win_rate, 0);
    }

    #[test]
    fn non_finite_values_contribute_nothing() {
        let rows = vec![
            row(Some(TradeResult::Win), Some(f64::NAN)),
            row(Some(TradeResult::Win), Some(2.0)),
        ];
        let metrics = aggregate(&rows);
        assert_eq!(metrics.total_profit, 2.0);
        assert_eq!(metrics.avg_return, 1.0);
    }

    #[test]
    fn average_comes_from_unrounded_total() {
        // Sum = 0.0149999..., which rounds to 0.01; the average must divide
        // the raw sum, not the rounded one.
        let rows = vec![
            row(Some(TradeResult::Win), Some(0.007)),
            row(Some(TradeResult::Win), Some(0.008)),
        ];
        let metrics = aggregate(&rows);
        assert_eq!(metrics.total_profit, 0.02);
        assert_eq!(metrics.avg_return, 0.01);
    }

    #[test]
    fn half_percentages_round_up() {
        // 1 win, 1 loss -> 50%; 5 wins of 8 relevant -> 62.5 -> 63
        let rows = vec![
            row(Some(TradeResult::Win), Some(1.0)),
            row(Some(TradeResult::Loss), Some(-1.0)),
        ];
        assert_eq!(aggregate(&rows).win_rate, 50);
    }
}
