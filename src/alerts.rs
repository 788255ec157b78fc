//! Alert generation and the auto-resolve rule.
//!
//! Pure logic, no database access. The orchestrator persists what the
//! generator returns and asks [`AutoResolvePolicy`] whether a device's
//! outstanding alerts may be swept.

use crate::config::{ThresholdConfig, TierThresholds};
use crate::models::{AlertDraft, AlertType, RiskLevel, Severity};
use crate::risk::{reading_text, Tier};

pub const SYSTEM_CRITICAL_MESSAGE: &str =
    "Sistema en estado critico - Revision inmediata requerida";
pub const SYSTEM_HIGH_MESSAGE: &str = "Riesgo alto detectado - Monitoreo cercano recomendado";

#[derive(Debug, Clone, Copy)]
pub struct AlertGenerator {
    thresholds: ThresholdConfig,
}

impl AlertGenerator {
    pub fn new(thresholds: ThresholdConfig) -> Self {
        Self { thresholds }
    }

    /// Derive the alerts for one reading.
    ///
    /// At most one alert per channel (a critical breach masks the warning
    /// one), then a system alert when the overall level is high or critical.
    /// Order: temperature, humidity, current, system.
    pub fn generate(
        &self,
        temperature: f64,
        humidity: f64,
        current: f64,
        risk_level: RiskLevel,
    ) -> Vec<AlertDraft> {
        // ---
        let t = &self.thresholds;
        let mut alerts = Vec::new();

        check(
            &mut alerts,
            AlertType::Temperature,
            &t.temperature,
            temperature,
            temperature,
            ("Temperatura critica", "Temperatura elevada"),
            "°C",
        );
        check(
            &mut alerts,
            AlertType::Humidity,
            &t.humidity,
            humidity,
            humidity,
            ("Humedad critica", "Humedad elevada"),
            "%",
        );
        check(
            &mut alerts,
            AlertType::Current,
            &t.current,
            current.abs(),
            current,
            ("Corriente critica", "Corriente elevada"),
            "A",
        );

        match risk_level {
            RiskLevel::Critical => alerts.push(AlertDraft {
                alert_type: AlertType::System,
                message: SYSTEM_CRITICAL_MESSAGE.to_string(),
                severity: Severity::Critical,
            }),
            RiskLevel::High => alerts.push(AlertDraft {
                alert_type: AlertType::System,
                message: SYSTEM_HIGH_MESSAGE.to_string(),
                severity: Severity::Warning,
            }),
            RiskLevel::Medium | RiskLevel::Low => {}
        }

        alerts
    }
}

/// Push an alert for a channel if `level` reaches its warning tier.
///
/// `level` is what gets classified, `shown` is what goes in the message
/// (they differ for current, which is classified by magnitude).
fn check(
    alerts: &mut Vec<AlertDraft>,
    alert_type: AlertType,
    tier: &TierThresholds,
    level: f64,
    shown: f64,
    (critical_prefix, warning_prefix): (&str, &str),
    unit: &str,
) {
    let (prefix, severity) = match tier.classify(level) {
        Tier::Critical => (critical_prefix, Severity::Critical),
        Tier::Warning => (warning_prefix, Severity::Warning),
        Tier::Normal => return,
    };
    alerts.push(AlertDraft {
        alert_type,
        message: format!("{prefix}: {}{unit}", reading_text(shown)),
        severity,
    });
}

/// Decides when a reading counts as "back to normal".
#[derive(Debug, Clone, Copy)]
pub struct AutoResolvePolicy {
    temperature_max: f64,
    current_max: f64,
}

impl AutoResolvePolicy {
    pub fn new(thresholds: &ThresholdConfig) -> Self {
        Self {
            temperature_max: thresholds.temperature_max,
            current_max: thresholds.current_max,
        }
    }

    /// Both limits are strict; humidity plays no part.
    pub fn should_resolve(&self, temperature: f64, current: f64) -> bool {
        temperature < self.temperature_max && current.abs() < self.current_max
    }
}
