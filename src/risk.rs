//! Rule-based risk evaluation.
//!
//! Pure logic, no I/O. Each channel of a (temperature, humidity, current)
//! triple is classified into a [`Tier`]; the number of critical and warning
//! channels decides the risk level and failure probability. The result only
//! depends on the triple and the [`ThresholdConfig`] the evaluator was built
//! with.

use chrono::Utc;
use serde::Serialize;

use crate::config::{ThresholdConfig, TierThresholds};
use crate::models::{Prediction, RiskLevel};

pub const LABEL_TEMPERATURE_HIGH: &str = "Temperatura elevada";
pub const LABEL_HUMIDITY_HIGH: &str = "Humedad elevada";
pub const LABEL_CURRENT_HIGH: &str = "Corriente elevada";
pub const LABEL_NORMAL: &str = "Condiciones normales";

/// Classification of a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Normal,
    Warning,
    Critical,
}

impl TierThresholds {
    /// Both limits are inclusive.
    pub fn classify(&self, value: f64) -> Tier {
        if value >= self.critical {
            Tier::Critical
        } else if value >= self.warning {
            Tier::Warning
        } else {
            Tier::Normal
        }
    }
}

/// Per-channel tiers for one triple, in fixed channel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelTiers {
    pub temperature: Tier,
    pub humidity: Tier,
    pub current: Tier,
}

impl ChannelTiers {
    fn iter(&self) -> impl Iterator<Item = Tier> {
        [self.temperature, self.humidity, self.current].into_iter()
    }

    pub fn critical_count(&self) -> usize {
        self.iter().filter(|t| *t == Tier::Critical).count()
    }

    pub fn warning_count(&self) -> usize {
        self.iter().filter(|t| *t == Tier::Warning).count()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RiskEvaluator {
    thresholds: ThresholdConfig,
}

impl RiskEvaluator {
    pub fn new(thresholds: ThresholdConfig) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    /// Classify each channel against its tier thresholds.
    pub fn classify(&self, temperature: f64, humidity: f64, current: f64) -> ChannelTiers {
        ChannelTiers {
            temperature: self.thresholds.temperature.classify(temperature),
            humidity: self.thresholds.humidity.classify(humidity),
            current: self.thresholds.current.classify(current.abs()),
        }
    }

    /// Risk level and failure probability (percent) for a triple.
    ///
    /// | condition               | level   | probability |
    /// |-------------------------|---------|-------------|
    /// | 2+ critical channels    | critico | 100         |
    /// | 1 critical channel      | alto    | 80          |
    /// | 2+ warning channels     | medio   | 50          |
    /// | 1 warning channel       | bajo    | 20          |
    /// | otherwise               | bajo    | 5           |
    pub fn risk_level(&self, temperature: f64, humidity: f64, current: f64) -> (RiskLevel, f64) {
        // ---
        let tiers = self.classify(temperature, humidity, current);
        let critical = tiers.critical_count();
        let warning = tiers.warning_count();

        if critical >= 2 {
            (RiskLevel::Critical, 100.0)
        } else if critical == 1 {
            (RiskLevel::High, 80.0)
        } else if warning >= 2 {
            (RiskLevel::Medium, 50.0)
        } else if warning == 1 {
            (RiskLevel::Low, 20.0)
        } else {
            (RiskLevel::Low, 5.0)
        }
    }

    /// Labels of the channels above their elevated limit (strictly greater),
    /// or the single normal-conditions label.
    pub fn influential_factors(
        &self,
        temperature: f64,
        humidity: f64,
        current: f64,
    ) -> Vec<String> {
        // ---
        let t = &self.thresholds;
        let mut factors = Vec::new();

        if temperature > t.temperature_max {
            factors.push(LABEL_TEMPERATURE_HIGH.to_string());
        }
        if humidity > t.humidity_max {
            factors.push(LABEL_HUMIDITY_HIGH.to_string());
        }
        if current.abs() > t.current_max {
            factors.push(LABEL_CURRENT_HIGH.to_string());
        }
        if factors.is_empty() {
            factors.push(LABEL_NORMAL.to_string());
        }
        factors
    }

    pub fn evaluate(&self, temperature: f64, humidity: f64, current: f64) -> Prediction {
        // ---
        let (risk_level, failure_probability) = self.risk_level(temperature, humidity, current);
        Prediction {
            risk_level,
            failure_probability,
            influential_factors: self.influential_factors(temperature, humidity, current),
            timestamp: Utc::now(),
        }
    }
}

// --- explanation ---

/// One input ranked by how far it sits from its comfortable value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorImportance {
    #[serde(rename = "factor")]
    pub name: &'static str,
    /// Percentage points, one decimal.
    pub importance: f64,
}

pub const NO_DATA_REASON: &str = "No hay datos suficientes para generar una explicacion";

/// Human-readable account of what drives a reading's risk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub main_reason: String,
    pub factors: Vec<FactorImportance>,
}

impl Explanation {
    pub fn no_data() -> Self {
        Self {
            main_reason: NO_DATA_REASON.to_string(),
            factors: Vec::new(),
        }
    }
}

pub fn explain(temperature: f64, humidity: f64, current: f64) -> Explanation {
    // ---
    let factors = rank_factors(temperature, humidity, current);
    let reason = match factors.first() {
        Some(top) => main_reason(top, temperature, humidity, current),
        None => NO_DATA_REASON.to_string(),
    };
    Explanation {
        main_reason: reason,
        factors,
    }
}

/// Rank the three inputs for the human-readable explanation.
///
/// Importance per channel, capped:
/// - temperature: `min(|t - 25| * 2, 35)`
/// - humidity: `min(|h - 50| * 0.5, 25)`
/// - current: `min(|c| * 8, 40)`
///
/// Sorted descending; ties keep the order temperature, humidity, current.
pub fn rank_factors(temperature: f64, humidity: f64, current: f64) -> Vec<FactorImportance> {
    // ---
    let mut factors = vec![
        FactorImportance {
            name: "Temperatura",
            importance: round1(((temperature - 25.0).abs() * 2.0).min(35.0)),
        },
        FactorImportance {
            name: "Humedad",
            importance: round1(((humidity - 50.0).abs() * 0.5).min(25.0)),
        },
        FactorImportance {
            name: "Corriente",
            importance: round1((current.abs() * 8.0).min(40.0)),
        },
    ];
    // stable sort keeps channel order on ties
    factors.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    factors
}

/// Sentence describing the top-ranked factor.
pub fn main_reason(
    top: &FactorImportance,
    temperature: f64,
    humidity: f64,
    current: f64,
) -> String {
    // ---
    let (t, h, c) = (
        reading_text(temperature),
        reading_text(humidity),
        reading_text(current),
    );
    match top.name {
        "Temperatura" if temperature > 30.0 => {
            format!("La temperatura elevada ({t}°C) es el principal factor de riesgo.")
        }
        "Temperatura" if temperature < 15.0 => {
            format!("La temperatura baja ({t}°C) puede afectar el rendimiento.")
        }
        "Temperatura" => {
            format!("La temperatura actual ({t}°C) esta dentro de rangos normales.")
        }
        "Corriente" if current.abs() > 5.0 => {
            format!("La corriente ({c}A) supera los niveles seguros.")
        }
        "Corriente" => format!("La corriente ({c}A) esta en niveles normales."),
        _ if humidity > 70.0 => format!("La humedad elevada ({h}%) puede causar problemas."),
        _ => format!("La humedad actual ({h}%) esta en niveles aceptables."),
    }
}

/// Text form of a sensor value in messages. Whole values keep one decimal
/// (`50.0`, not `50`) so messages read the same for `50` and `50.0` inputs.
pub(crate) fn reading_text(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// One decimal, halves to even (`0.25` -> `0.2`).
fn round1(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}
