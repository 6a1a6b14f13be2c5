use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AppError;

/// Presence rule for an optional field: `all`, `exists`, `not_exists`, or an
/// exact value the field must equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Presence {
    #[default]
    Any,
    Exists,
    NotExists,
    Equals(String),
}

impl Presence {
    pub fn matches(&self, value: Option<&str>) -> bool {
        let value = value.filter(|v| !v.is_empty());
        match self {
            Presence::Any => true,
            Presence::Exists => value.is_some(),
            Presence::NotExists => value.is_none(),
            Presence::Equals(expected) => value == Some(expected.as_str()),
        }
    }
}

impl From<String> for Presence {
    fn from(value: String) -> Self {
        match value.as_str() {
            "" | "all" | "any" => Presence::Any,
            "exists" => Presence::Exists,
            "not_exists" => Presence::NotExists,
            _ => Presence::Equals(value),
        }
    }
}

impl From<Presence> for String {
    fn from(value: Presence) -> Self {
        value.to_string()
    }
}

impl FromStr for Presence {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Presence::from(s.to_string()))
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Presence::Any => f.write_str("all"),
            Presence::Exists => f.write_str("exists"),
            Presence::NotExists => f.write_str("not_exists"),
            Presence::Equals(value) => f.write_str(value),
        }
    }
}

/// Exact-match filter value; `""`, `all` and `any` clear it.
pub fn exact_match(value: String) -> Option<String> {
    match value.as_str() {
        "" | "all" | "any" => None,
        _ => Some(value),
    }
}

fn de_exact_match<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.and_then(exact_match))
}

/// Presence rule plus an optional closed set of accepted values. An empty set
/// places no restriction on values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldFilter {
    pub presence: Presence,
    pub accepted: BTreeSet<String>,
}

impl FieldFilter {
    pub fn matches(&self, value: Option<&str>) -> bool {
        if !self.presence.matches(value) {
            return false;
        }
        match value.filter(|v| !v.is_empty()) {
            Some(v) if !self.accepted.is_empty() => self.accepted.contains(v),
            _ => true,
        }
    }
}

/// Snapshot of every active filter for one evaluation pass.
/// `FilterConfig::default()` lets every record through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Exact escalation value; `None` means any.
    #[serde(deserialize_with = "de_exact_match")]
    pub escalated: Option<String>,
    pub repeat_contacts_min: Option<usize>,
    pub repeat_contacts_max: Option<usize>,
    pub csat: FieldFilter,
    pub decagon_language: FieldFilter,
    pub rtr_flagged: Presence,
    pub sandbox: Presence,
    /// Exact device value; `None` means any.
    #[serde(deserialize_with = "de_exact_match")]
    pub user_device: Option<String>,
    pub fee_block_state: Presence,
    pub is_trial: Presence,
    pub language: FieldFilter,
    pub admin_portal: Presence,
}

impl FilterConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, AppError> {
        let config: FilterConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(AppError::InvalidDateRange { start, end });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_parses_keywords_and_literals() {
        assert_eq!("all".parse::<Presence>().unwrap(), Presence::Any);
        assert_eq!("any".parse::<Presence>().unwrap(), Presence::Any);
        assert_eq!("exists".parse::<Presence>().unwrap(), Presence::Exists);
        assert_eq!("not_exists".parse::<Presence>().unwrap(), Presence::NotExists);
        assert_eq!(
            "TRUE".parse::<Presence>().unwrap(),
            Presence::Equals("TRUE".to_string())
        );
    }

    #[test]
    fn presence_rules() {
        assert!(Presence::Any.matches(None));
        assert!(Presence::Any.matches(Some("x")));
        assert!(Presence::Exists.matches(Some("x")));
        assert!(!Presence::Exists.matches(None));
        assert!(!Presence::Exists.matches(Some("")));
        assert!(Presence::NotExists.matches(None));
        assert!(Presence::NotExists.matches(Some("")));
        assert!(!Presence::NotExists.matches(Some("x")));

        let exact = Presence::Equals("TRUE".to_string());
        assert!(exact.matches(Some("TRUE")));
        assert!(!exact.matches(Some("true")));
        assert!(!exact.matches(None));
    }

    #[test]
    fn field_filter_set_only_applies_to_present_values() {
        let filter = FieldFilter {
            presence: Presence::Any,
            accepted: ["en".to_string(), "fr".to_string()].into_iter().collect(),
        };
        assert!(filter.matches(Some("en")));
        assert!(!filter.matches(Some("de")));
        assert!(filter.matches(None));

        let must_exist = FieldFilter {
            presence: Presence::Exists,
            ..filter
        };
        assert!(!must_exist.matches(None));
    }

    #[test]
    fn loads_partial_toml() {
        let config = FilterConfig::from_toml_str(
            r#"
            start_date = "2024-08-01"
            escalated = "Yes"
            repeat_contacts_min = 2
            sandbox = "not_exists"
            rtr_flagged = "TRUE"

            [csat]
            presence = "exists"
            accepted = ["4", "5"]
            "#,
        )
        .unwrap();

        assert_eq!(config.start_date, NaiveDate::from_ymd_opt(2024, 8, 1));
        assert_eq!(config.end_date, None);
        assert_eq!(config.escalated.as_deref(), Some("Yes"));
        assert_eq!(config.repeat_contacts_min, Some(2));
        assert_eq!(config.sandbox, Presence::NotExists);
        assert_eq!(config.rtr_flagged, Presence::Equals("TRUE".to_string()));
        assert_eq!(config.csat.presence, Presence::Exists);
        assert_eq!(config.csat.accepted.len(), 2);
        assert_eq!(config.language, FieldFilter::default());
    }

    #[test]
    fn all_clears_exact_match_fields() {
        let config = FilterConfig::from_toml_str(
            r#"
            escalated = "all"
            user_device = "all"
            "#,
        )
        .unwrap();
        assert_eq!(config.escalated, None);
        assert_eq!(config.user_device, None);

        let config = FilterConfig::from_toml_str(
            r#"
            escalated = "any"
            user_device = ""
            "#,
        )
        .unwrap();
        assert_eq!(config, FilterConfig::default());

        let config = FilterConfig::from_toml_str("user_device = \"ios\"").unwrap();
        assert_eq!(config.user_device.as_deref(), Some("ios"));
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(FilterConfig::from_toml_str("").unwrap(), FilterConfig::default());
    }

    #[test]
    fn rejects_reversed_date_range() {
        let err = FilterConfig::from_toml_str(
            r#"
            start_date = "2024-09-01"
            end_date = "2024-08-01"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidDateRange { .. }));
    }
}
