//! `.gitmem/config.json` parsing and strict validation.
//!
//! Unknown keys are preserved verbatim (in `extra`) so a future config
//! version's fields survive a round trip through an older binary.

use serde_json::{Map, Value};

use crate::error::GitmemError;

const KNOWN_KEYS: &[&str] = &["ai", "indexStartDate", "indexModel", "checkModel", "scope"];

/// The `ai` config value: off, always-on, or on-from-date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiSetting {
    Disabled,
    Enabled,
    SinceDate(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GitmemConfig {
    pub ai: AiSetting,
    pub index_start_date: Option<String>,
    pub index_model: String,
    pub check_model: String,
    pub scope: Option<gitmem_types::ScopeConfig>,
    /// Keys present in the source JSON this was parsed from that this
    /// struct doesn't model; written back unmodified.
    pub extra: Map<String, Value>,
}

impl GitmemConfig {
    pub fn parse(raw: &str) -> Result<Self, GitmemError> {
        let value: Value = serde_json::from_str(raw).map_err(|e| GitmemError::ConfigInvalid {
            path: "config.json".into(),
            reason: format!("invalid JSON: {e}"),
        })?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, GitmemError> {
        let invalid = |reason: String| GitmemError::ConfigInvalid {
            path: "config.json".into(),
            reason,
        };

        let Value::Object(mut obj) = value else {
            return Err(invalid("config.json must be a JSON object".into()));
        };

        let ai = match obj.remove("ai") {
            Some(Value::Bool(true)) => AiSetting::Enabled,
            Some(Value::Bool(false)) | None => AiSetting::Disabled,
            Some(Value::String(s)) if looks_like_iso_date(&s) => AiSetting::SinceDate(s),
            Some(other) => {
                return Err(invalid(format!(
                    "\"ai\" must be a boolean or an ISO date string, got {other}"
                )))
            }
        };

        let index_start_date = match obj.remove("indexStartDate") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if looks_like_iso_date(&s) => Some(s),
            Some(other) => {
                return Err(invalid(format!(
                    "\"indexStartDate\" must be null or an ISO date string, got {other}"
                )))
            }
        };

        let index_model = match obj.remove("indexModel") {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(other) => return Err(invalid(format!("\"indexModel\" must be a non-empty string, got {other}"))),
            None => return Err(invalid("\"indexModel\" is required".into())),
        };

        let check_model = match obj.remove("checkModel") {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(other) => return Err(invalid(format!("\"checkModel\" must be a non-empty string, got {other}"))),
            None => return Err(invalid("\"checkModel\" is required".into())),
        };

        let scope = match obj.remove("scope") {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                serde_json::from_value(v)
                    .map_err(|e| invalid(format!("\"scope\" is invalid: {e}")))?,
            ),
        };

        Ok(GitmemConfig {
            ai,
            index_start_date,
            index_model,
            check_model,
            scope,
            extra: obj,
        })
    }

    /// Renders back to JSON, merging known fields with whatever unknown keys
    /// were present on parse.
    pub fn to_json(&self) -> Value {
        let mut obj = self.extra.clone();
        obj.insert(
            "ai".into(),
            match &self.ai {
                AiSetting::Disabled => Value::Bool(false),
                AiSetting::Enabled => Value::Bool(true),
                AiSetting::SinceDate(d) => Value::String(d.clone()),
            },
        );
        obj.insert(
            "indexStartDate".into(),
            self.index_start_date
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        );
        obj.insert("indexModel".into(), Value::String(self.index_model.clone()));
        obj.insert("checkModel".into(), Value::String(self.check_model.clone()));
        if let Some(scope) = &self.scope {
            obj.insert(
                "scope".into(),
                serde_json::to_value(scope).unwrap_or(Value::Null),
            );
        }
        Value::Object(obj)
    }

    pub fn known_keys() -> &'static [&'static str] {
        KNOWN_KEYS
    }
}

fn looks_like_iso_date(s: &str) -> bool {
    // Accepts a plain date (`2024-01-01`) or a full ISO 8601 timestamp; we
    // don't need calendar validity here, only shape, since the underlying
    // git/model calls treat it as an opaque comparison string.
    let date_part = s.split('T').next().unwrap_or(s);
    let mut parts = date_part.splitn(3, '-');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(y), Some(m), Some(d))
            if y.len() == 4 && y.chars().all(|c| c.is_ascii_digit())
                && m.len() == 2 && m.chars().all(|c| c.is_ascii_digit())
                && d.len() == 2 && d.chars().all(|c| c.is_ascii_digit())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> String {
        r#"{"ai": true, "indexStartDate": null, "indexModel": "claude-opus", "checkModel": "claude-sonnet"}"#.into()
    }

    #[test]
    fn parses_minimal_valid_config() {
        let cfg = GitmemConfig::parse(&minimal_json()).unwrap();
        assert_eq!(cfg.ai, AiSetting::Enabled);
        assert_eq!(cfg.index_model, "claude-opus");
    }

    #[test]
    fn rejects_empty_model_name() {
        let raw = r#"{"ai": true, "indexModel": "", "checkModel": "claude-sonnet"}"#;
        assert!(GitmemConfig::parse(raw).is_err());
    }

    #[test]
    fn accepts_date_string_ai_value() {
        let raw = r#"{"ai": "2024-06-01", "indexModel": "m", "checkModel": "m"}"#;
        let cfg = GitmemConfig::parse(raw).unwrap();
        assert_eq!(cfg.ai, AiSetting::SinceDate("2024-06-01".into()));
    }

    #[test]
    fn unknown_keys_survive_round_trip() {
        let raw = r#"{"ai": true, "indexModel": "m", "checkModel": "m", "futureField": 42}"#;
        let cfg = GitmemConfig::parse(raw).unwrap();
        let back = cfg.to_json();
        assert_eq!(back.get("futureField"), Some(&Value::Number(42.into())));
    }
}
