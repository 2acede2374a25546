use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::FieldErrors;
use crate::models::strategy::{CustomField, FieldType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "trade_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    OrderPlaced,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "trade_result", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TradeResult {
    Win,
    BreakEven,
    Loss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "direction", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

/// A value stored under one of the strategy's custom fields. Text and select
/// fields carry a single string, multi-select fields carry a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CustomValue {
    Text(String),
    List(Vec<String>),
}

impl CustomValue {
    fn is_empty(&self) -> bool {
        match self {
            CustomValue::Text(s) => s.trim().is_empty(),
            CustomValue::List(v) => v.is_empty(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: Uuid,
    pub user_id: String,
    pub strategy_id: Uuid,
    pub status: TradeStatus,
    pub asset: String,
    pub date_opened: Option<DateTime<Utc>>,
    pub date_closed: Option<DateTime<Utc>>,
    pub direction: Direction,
    pub result: Option<TradeResult>,
    pub profit_loss: Option<f64>,
    pub notes: String,
    pub is_backtest: bool,
    pub custom_values: Json<HashMap<String, CustomValue>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradePayload {
    pub strategy_id: Uuid,
    pub status: TradeStatus,
    pub asset: String,
    pub date_opened: Option<DateTime<Utc>>,
    pub date_closed: Option<DateTime<Utc>>,
    pub direction: Direction,
    pub result: Option<TradeResult>,
    pub profit_loss: Option<f64>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub is_backtest: bool,
    #[serde(default)]
    pub custom_values: HashMap<String, CustomValue>,
}

/// The lifecycle fields as they will actually be persisted for the requested
/// status. Fields that are meaningless for the new status are cleared rather
/// than carried over, so a trade moved back from `closed` loses its result,
/// profit/loss and close date.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleFields {
    pub date_opened: Option<DateTime<Utc>>,
    pub date_closed: Option<DateTime<Utc>>,
    pub result: Option<TradeResult>,
    pub profit_loss: Option<f64>,
}

impl TradePayload {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();

        if self.asset.trim().is_empty() {
            errors
                .entry("asset".to_string())
                .or_default()
                .push("Asset is required".to_string());
        }

        if self.profit_loss.is_some_and(|pl| !pl.is_finite()) {
            errors
                .entry("profitLoss".to_string())
                .or_default()
                .push("Profit/Loss must be a valid number".to_string());
        }

        // Sign policy: reject, never silently flip the sign.
        if let (Some(TradeResult::Win), Some(pl)) = (self.result, self.profit_loss) {
            if pl <= 0.0 {
                errors
                    .entry("profitLoss".to_string())
                    .or_default()
                    .push("Profit must be positive for wins".to_string());
            }
        }
        if let (Some(TradeResult::Loss), Some(pl)) = (self.result, self.profit_loss) {
            if pl >= 0.0 {
                errors
                    .entry("profitLoss".to_string())
                    .or_default()
                    .push("Loss must be negative".to_string());
            }
        }

        if let (Some(opened), Some(closed)) = (self.date_opened, self.date_closed) {
            if closed < opened {
                errors
                    .entry("dateClosed".to_string())
                    .or_default()
                    .push("Close date cannot precede open date".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Normalizes the lifecycle fields for the requested status. Dates the
    /// caller left out default to `now` when the status requires them.
    pub fn lifecycle_fields(&self, now: DateTime<Utc>) -> LifecycleFields {
        match self.status {
            TradeStatus::OrderPlaced => LifecycleFields {
                date_opened: None,
                date_closed: None,
                result: None,
                profit_loss: None,
            },
            TradeStatus::Open => LifecycleFields {
                date_opened: Some(self.date_opened.unwrap_or(now)),
                date_closed: None,
                result: None,
                profit_loss: None,
            },
            TradeStatus::Closed => LifecycleFields {
                date_opened: Some(self.date_opened.unwrap_or(now)),
                date_closed: Some(self.date_closed.unwrap_or(now)),
                result: self.result,
                profit_loss: self.profit_loss,
            },
        }
    }
}

/// Checks a trade's custom values against the strategy's field definitions.
/// Keys that no longer match any definition are left alone, so values logged
/// under since-removed fields survive edits.
pub fn validate_custom_values(
    fields: &[CustomField],
    values: &HashMap<String, CustomValue>,
) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();

    for field in fields {
        let value = values.get(&field.name);

        if field.required && value.map_or(true, CustomValue::is_empty) {
            errors
                .entry(field.name.clone())
                .or_default()
                .push("This field is required".to_string());
            continue;
        }

        let Some(value) = value else { continue };

        match (field.field_type, value) {
            (FieldType::Text, CustomValue::Text(_)) => {}
            (FieldType::Select, CustomValue::Text(v)) => {
                if !v.is_empty() && !field.options().contains(v) {
                    errors
                        .entry(field.name.clone())
                        .or_default()
                        .push(format!("'{v}' is not a valid option"));
                }
            }
            (FieldType::MultiSelect, CustomValue::List(vs)) => {
                for v in vs {
                    if !field.options().contains(v) {
                        errors
                            .entry(field.name.clone())
                            .or_default()
                            .push(format!("'{v}' is not a valid option"));
                    }
                }
            }
            (FieldType::Text, CustomValue::List(_)) | (FieldType::Select, CustomValue::List(_)) => {
                errors
                    .entry(field.name.clone())
                    .or_default()
                    .push("Expected a single value".to_string());
            }
            (FieldType::MultiSelect, CustomValue::Text(_)) => {
                errors
                    .entry(field.name.clone())
                    .or_default()
                    .push("Expected a list of values".to_string());
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn payload(status: TradeStatus) -> TradePayload {
        TradePayload {
            strategy_id: Uuid::new_v4(),
            status,
            asset: "EURUSD".to_string(),
            date_opened: None,
            date_closed: None,
            direction: Direction::Long,
            result: None,
            profit_loss: None,
            notes: String::new(),
            is_backtest: false,
            custom_values: HashMap::new(),
        }
    }

    fn field(name: &str, field_type: FieldType, options: &[&str], required: bool) -> CustomField {
        CustomField {
            id: Uuid::new_v4(),
            strategy_id: Uuid::new_v4(),
            name: name.to_string(),
            field_type,
            options: if options.is_empty() {
                None
            } else {
                Some(Json(options.iter().map(|s| s.to_string()).collect()))
            },
            required,
            position: 0,
        }
    }

    #[test]
    fn win_with_negative_profit_is_rejected() {
        let mut p = payload(TradeStatus::Closed);
        p.result = Some(TradeResult::Win);
        p.profit_loss = Some(-3.0);
        let errors = p.validate().unwrap_err();
        assert_eq!(
            errors["profitLoss"],
            vec!["Profit must be positive for wins".to_string()]
        );
    }

    #[test]
    fn loss_with_positive_profit_is_rejected() {
        let mut p = payload(TradeStatus::Closed);
        p.result = Some(TradeResult::Loss);
        p.profit_loss = Some(2.5);
        let errors = p.validate().unwrap_err();
        assert_eq!(errors["profitLoss"], vec!["Loss must be negative".to_string()]);
    }

    #[test]
    fn break_even_near_zero_is_accepted() {
        let mut p = payload(TradeStatus::Closed);
        p.result = Some(TradeResult::BreakEven);
        p.profit_loss = Some(-0.1);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn close_before_open_is_rejected() {
        let mut p = payload(TradeStatus::Closed);
        p.date_opened = Some(Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap());
        p.date_closed = Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        let errors = p.validate().unwrap_err();
        assert!(errors.contains_key("dateClosed"));
    }

    #[test]
    fn reopening_a_closed_trade_clears_outcome_fields() {
        let mut p = payload(TradeStatus::Open);
        p.date_opened = Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
        p.date_closed = Some(Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap());
        p.result = Some(TradeResult::Win);
        p.profit_loss = Some(5.0);

        let fields = p.lifecycle_fields(Utc::now());
        assert_eq!(fields.date_opened, p.date_opened);
        assert_eq!(fields.date_closed, None);
        assert_eq!(fields.result, None);
        assert_eq!(fields.profit_loss, None);
    }

    #[test]
    fn moving_to_order_placed_clears_everything() {
        let mut p = payload(TradeStatus::OrderPlaced);
        p.date_opened = Some(Utc::now());
        p.result = Some(TradeResult::Loss);
        p.profit_loss = Some(-1.0);

        let fields = p.lifecycle_fields(Utc::now());
        assert_eq!(
            fields,
            LifecycleFields {
                date_opened: None,
                date_closed: None,
                result: None,
                profit_loss: None,
            }
        );
    }

    #[test]
    fn opening_without_a_date_defaults_to_now() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap();
        let fields = payload(TradeStatus::Open).lifecycle_fields(now);
        assert_eq!(fields.date_opened, Some(now));
    }

    #[test]
    fn closing_defaults_both_dates_to_now() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap();
        let fields = payload(TradeStatus::Closed).lifecycle_fields(now);
        assert_eq!(fields.date_opened, Some(now));
        assert_eq!(fields.date_closed, Some(now));
    }

    #[test]
    fn required_field_must_be_present_and_non_empty() {
        let fields = vec![field("Setup", FieldType::Text, &[], true)];

        let mut values = HashMap::new();
        assert!(validate_custom_values(&fields, &values).is_err());

        values.insert("Setup".to_string(), CustomValue::Text("  ".to_string()));
        assert!(validate_custom_values(&fields, &values).is_err());

        values.insert("Setup".to_string(), CustomValue::Text("breakout".to_string()));
        assert!(validate_custom_values(&fields, &values).is_ok());
    }

    #[test]
    fn select_value_must_come_from_options() {
        let fields = vec![field("Session", FieldType::Select, &["london", "ny"], false)];

        let mut values = HashMap::new();
        values.insert("Session".to_string(), CustomValue::Text("tokyo".to_string()));
        assert!(validate_custom_values(&fields, &values).is_err());

        values.insert("Session".to_string(), CustomValue::Text("london".to_string()));
        assert!(validate_custom_values(&fields, &values).is_ok());
    }

    #[test]
    fn multi_select_checks_every_element() {
        let fields = vec![field(
            "Confluences",
            FieldType::MultiSelect,
            &["fvg", "ob", "liquidity"],
            false,
        )];

        let mut values = HashMap::new();
        values.insert(
            "Confluences".to_string(),
            CustomValue::List(vec!["fvg".to_string(), "trendline".to_string()]),
        );
        assert!(validate_custom_values(&fields, &values).is_err());

        values.insert(
            "Confluences".to_string(),
            CustomValue::List(vec!["fvg".to_string(), "ob".to_string()]),
        );
        assert!(validate_custom_values(&fields, &values).is_ok());
    }

    #[test]
    fn wrong_shape_for_field_type_is_rejected() {
        let fields = vec![field("Setup", FieldType::Text, &[], false)];
        let mut values = HashMap::new();
        values.insert(
            "Setup".to_string(),
            CustomValue::List(vec!["a".to_string()]),
        );
        assert!(validate_custom_values(&fields, &values).is_err());
    }

    #[test]
    fn unknown_keys_are_preserved_not_rejected() {
        let fields = vec![field("Setup", FieldType::Text, &[], false)];
        let mut values = HashMap::new();
        values.insert(
            "RemovedField".to_string(),
            CustomValue::Text("legacy".to_string()),
        );
        assert!(validate_custom_values(&fields, &values).is_ok());
    }
}
