//! Data models for the risk pipeline.
//!
//! The vocabulary enums serialize to the values field devices and dashboards
//! already exchange (`alto`, `critico`, `pendiente`, ...).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---

/// Generates `as_str`, `Display` and `FromStr` for a unit-only enum whose
/// text form is also its serde form.
macro_rules! text_enum {
    (
        $name:ident,
        $what:literal,
        { $($variant:ident => $text:literal $(| $alias:literal)*),+ $(,)? }
    ) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text $(| $alias)* => Ok($name::$variant),)+
                    other => Err(CoreError::Validation(format!(
                        "unknown {} `{}`",
                        $what, other
                    ))),
                }
            }
        }
    };
}

/// Ordinal classification of failure likelihood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "bajo", alias = "low")]
    Low,
    #[serde(rename = "medio", alias = "medium")]
    Medium,
    #[serde(rename = "alto", alias = "high")]
    High,
    #[serde(rename = "critico", alias = "critical")]
    Critical,
}

text_enum!(RiskLevel, "risk level", {
    Low => "bajo" | "low",
    Medium => "medio" | "medium",
    High => "alto" | "high",
    Critical => "critico" | "critical",
});

/// Channel an alert was raised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Temperature,
    Humidity,
    Current,
    System,
}

text_enum!(AlertType, "alert type", {
    Temperature => "temperature",
    Humidity => "humidity",
    Current => "current",
    System => "system",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "advertencia", alias = "warning")]
    Warning,
    #[serde(rename = "critico", alias = "critical")]
    Critical,
}

text_enum!(Severity, "severity", {
    Warning => "advertencia" | "warning",
    Critical => "critico" | "critical",
});

/// Operator-facing alert state.
///
/// Moves forward only: `Pending -> InProgress -> Resolved`, or straight to
/// `Resolved`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlertStatus {
    #[default]
    #[serde(rename = "pendiente", alias = "pending")]
    Pending,
    #[serde(rename = "en_proceso", alias = "in_progress")]
    InProgress,
    #[serde(rename = "resuelto", alias = "resolved")]
    Resolved,
}

text_enum!(AlertStatus, "alert status", {
    Pending => "pendiente" | "pending",
    InProgress => "en_proceso" | "in_progress",
    Resolved => "resuelto" | "resolved",
});

impl AlertStatus {
    /// Whether an operator may move an alert from `self` to `next`.
    ///
    /// Re-applying the current state is allowed so notes can be edited.
    pub fn can_transition_to(self, next: AlertStatus) -> bool {
        match self {
            AlertStatus::Resolved => next == AlertStatus::Resolved,
            _ => next >= self,
        }
    }

    /// Alerts an operator has picked up or closed count as read.
    pub fn marks_read(self) -> bool {
        matches!(self, AlertStatus::InProgress | AlertStatus::Resolved)
    }
}

// ---

/// Outcome of evaluating one sensor triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub risk_level: RiskLevel,
    /// Percentage in `[0, 100]`.
    pub failure_probability: f64,
    pub influential_factors: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// An alert produced by the generator, not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDraft {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub message: String,
    pub severity: Severity,
}

/// A persisted sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    // ---
    pub id: i64,
    pub device_id: String,
    pub temperature: f64,
    pub humidity: f64,
    pub current: f64,
    pub timestamp: DateTime<Utc>,
}

/// A reading together with the assessment stored for it, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingWithRisk {
    #[serde(flatten)]
    pub reading: SensorReading,
    pub risk_level: Option<RiskLevel>,
    pub failure_probability: Option<f64>,
}

/// A persisted risk assessment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub id: i64,
    pub reading_id: i64,
    pub device_id: String,
    pub risk_level: RiskLevel,
    pub failure_probability: f64,
    pub influential_factors: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// A persisted alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    // ---
    pub id: i64,
    pub assessment_id: i64,
    pub device_id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub message: String,
    pub severity: Severity,
    pub status: AlertStatus,
    pub read: bool,
    pub notes: String,
    pub timestamp: DateTime<Utc>,
}

/// A registered field device.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Device {
    pub id: i64,
    pub device_id: String,
    pub name: String,
    pub location: String,
    pub area: Option<String>,
    pub operator: Option<String>,
    pub active: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Registration payload for a device (insert or update by `device_id`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewDevice {
    pub device_id: String,
    pub name: String,
    pub location: String,
    pub area: Option<String>,
    pub operator: Option<String>,
}

/// Reading history query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryFilter {
    pub device_id: Option<String>,
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub to: Option<DateTime<Utc>>,
    pub limit: u32,
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn risk_levels_are_ordered() {
        // ---
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn wire_names() {
        // ---
        assert_eq!(serde_json::to_string(&RiskLevel::High).unwrap(), "\"alto\"");
        assert_eq!(
            serde_json::to_string(&Severity::Warning).unwrap(),
            "\"advertencia\""
        );
        assert_eq!(
            serde_json::to_string(&AlertStatus::InProgress).unwrap(),
            "\"en_proceso\""
        );
        assert_eq!(serde_json::to_string(&AlertType::System).unwrap(), "\"system\"");

        let level: RiskLevel = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(level, RiskLevel::Critical);
    }

    #[test]
    fn parse_matches_serde_names() {
        // ---
        assert_eq!("critico".parse::<Severity>().unwrap(), Severity::Critical);
        assert_eq!("medio".parse::<RiskLevel>().unwrap(), RiskLevel::Medium);
        assert_eq!(
            "resolved".parse::<AlertStatus>().unwrap(),
            AlertStatus::Resolved
        );
        assert!(matches!(
            "archived".parse::<AlertStatus>(),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn status_moves_forward_only() {
        // ---
        use AlertStatus::*;

        assert!(Pending.can_transition_to(InProgress));
        assert!(Pending.can_transition_to(Resolved));
        assert!(InProgress.can_transition_to(Resolved));
        assert!(InProgress.can_transition_to(InProgress));

        assert!(!InProgress.can_transition_to(Pending));
        assert!(!Resolved.can_transition_to(Pending));
        assert!(!Resolved.can_transition_to(InProgress));
        assert!(Resolved.can_transition_to(Resolved));
    }

    #[test]
    fn draft_serializes_type_field() {
        // ---
        let draft = AlertDraft {
            alert_type: AlertType::Temperature,
            message: "Temperatura critica: 50°C".into(),
            severity: Severity::Critical,
        };
        let json = serde_json::to_value(&draft).unwrap();
        assert_eq!(json["type"], "temperature");
        assert_eq!(json["severity"], "critico");
    }
}
