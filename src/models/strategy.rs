use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::FieldErrors;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "instrument", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    Forex,
    Crypto,
    Stocks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "field_type")]
pub enum FieldType {
    #[sqlx(rename = "text")]
    #[serde(rename = "text")]
    Text,
    #[sqlx(rename = "select")]
    #[serde(rename = "select")]
    Select,
    #[sqlx(rename = "multi-select")]
    #[serde(rename = "multi-select")]
    MultiSelect,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub instrument: Instrument,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One user-defined attribute on a strategy. `options` is only meaningful
/// for select and multi-select fields; `position` preserves the order the
/// fields were declared in.
#[derive(Debug, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CustomField {
    pub id: Uuid,
    pub strategy_id: Uuid,
    pub name: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub options: Option<Json<Vec<String>>>,
    pub required: bool,
    pub position: i32,
}

impl CustomField {
    pub fn options(&self) -> &[String] {
        self.options.as_ref().map(|o| o.0.as_slice()).unwrap_or(&[])
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyWithFields {
    #[serde(flatten)]
    pub strategy: Strategy,
    pub custom_fields: Vec<CustomField>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldInput {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyPayload {
    pub name: String,
    pub description: Option<String>,
    pub instrument: Instrument,
    #[serde(default)]
    pub custom_fields: Vec<CustomFieldInput>,
}

impl StrategyPayload {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();

        if self.name.trim().is_empty() {
            errors
                .entry("name".to_string())
                .or_default()
                .push("Strategy name is required".to_string());
        }

        for field in &self.custom_fields {
            if field.name.trim().is_empty() {
                errors
                    .entry("customFields".to_string())
                    .or_default()
                    .push("Field name is required".to_string());
            }
            let needs_options = matches!(field.field_type, FieldType::Select | FieldType::MultiSelect);
            let has_options = field.options.as_ref().is_some_and(|o| !o.is_empty());
            if needs_options && !has_options {
                errors
                    .entry("customFields".to_string())
                    .or_default()
                    .push(format!("Field '{}' needs at least one option", field.name));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(custom_fields: Vec<CustomFieldInput>) -> StrategyPayload {
        StrategyPayload {
            name: "Breakout".to_string(),
            description: None,
            instrument: Instrument::Forex,
            custom_fields,
        }
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut p = payload(vec![]);
        p.name = "   ".to_string();
        let errors = p.validate().unwrap_err();
        assert!(errors.contains_key("name"));
    }

    #[test]
    fn select_field_without_options_is_rejected() {
        let p = payload(vec![CustomFieldInput {
            name: "Setup".to_string(),
            field_type: FieldType::Select,
            options: Some(vec![]),
            required: false,
        }]);
        let errors = p.validate().unwrap_err();
        assert!(errors.contains_key("customFields"));
    }

    #[test]
    fn text_field_without_options_is_fine() {
        let p = payload(vec![CustomFieldInput {
            name: "Session".to_string(),
            field_type: FieldType::Text,
            options: None,
            required: true,
        }]);
        assert!(p.validate().is_ok());
    }
}
