//! Closed vocabularies for oracle classifications.
//!
//! The oracle answers in free words, so labels are normalized (lowercase,
//! `_`/`-`/space folded) and mapped through fixed synonym tables.

use crate::agents::messages::{IncidentType, Severity};
use crate::error::{CitypulseError, Result};

const SEVERITY_SYNONYMS: &[(&str, Severity)] = &[
    ("minor", Severity::Low),
    ("none", Severity::Low),
    ("negligible", Severity::Low),
    ("info", Severity::Low),
    ("moderate", Severity::Medium),
    ("mid", Severity::Medium),
    ("normal", Severity::Medium),
    ("severe", Severity::High),
    ("major", Severity::High),
    ("serious", Severity::High),
    ("urgent", Severity::High),
    ("extreme", Severity::Critical),
    ("emergency", Severity::Critical),
    ("fatal", Severity::Critical),
    ("catastrophic", Severity::Critical),
    ("life threatening", Severity::Critical),
];

const INCIDENT_SYNONYMS: &[(&str, IncidentType)] = &[
    ("accident", IncidentType::Collision),
    ("crash", IncidentType::Collision),
    ("pile up", IncidentType::Collision),
    ("traffic jam", IncidentType::Congestion),
    ("jam", IncidentType::Congestion),
    ("heavy traffic", IncidentType::Congestion),
    ("gridlock", IncidentType::Congestion),
    ("stalled vehicle", IncidentType::Breakdown),
    ("mechanical failure", IncidentType::Breakdown),
    ("flood", IncidentType::WeatherHazard),
    ("flooding", IncidentType::WeatherHazard),
    ("ice", IncidentType::WeatherHazard),
    ("low visibility", IncidentType::WeatherHazard),
    ("weather", IncidentType::WeatherHazard),
    ("debris", IncidentType::RoadObstruction),
    ("obstruction", IncidentType::RoadObstruction),
    ("roadblock", IncidentType::RoadObstruction),
    ("road closure", IncidentType::RoadObstruction),
    ("medical", IncidentType::MedicalEmergency),
    ("injury", IncidentType::MedicalEmergency),
];

fn normalize(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Map an oracle severity label onto the fixed scale.
///
/// Labels outside the scale and its synonym table are a `SchemaViolation`.
pub fn coerce_severity(label: &str) -> Result<Severity> {
    let key = normalize(label);
    if let Some(severity) = Severity::ALL.into_iter().find(|s| s.as_str() == key) {
        return Ok(severity);
    }
    if let Some((_, severity)) = SEVERITY_SYNONYMS.iter().find(|(word, _)| *word == key) {
        log::debug!("Coerced severity '{}' to {}", label, severity);
        return Ok(*severity);
    }
    Err(CitypulseError::SchemaViolation(format!(
        "severity '{}' is not one of low, medium, high, critical",
        label
    )))
}

/// Map an oracle incident label onto the fixed set; unrecognized labels
/// become `other`. An empty label is a `SchemaViolation`.
pub fn classify_incident_type(label: &str) -> Result<IncidentType> {
    let key = normalize(label);
    if key.is_empty() {
        return Err(CitypulseError::SchemaViolation(
            "incident_type is empty".to_string(),
        ));
    }
    if let Some(kind) = IncidentType::ALL
        .into_iter()
        .find(|t| t.as_str().replace('_', " ") == key)
    {
        return Ok(kind);
    }
    Ok(INCIDENT_SYNONYMS
        .iter()
        .find(|(word, _)| *word == key)
        .map(|(_, kind)| *kind)
        .unwrap_or(IncidentType::Other))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_exact_and_case() {
        assert_eq!(coerce_severity("critical").unwrap(), Severity::Critical);
        assert_eq!(coerce_severity("  HIGH ").unwrap(), Severity::High);
    }

    #[test]
    fn test_severity_synonyms() {
        assert_eq!(coerce_severity("Severe").unwrap(), Severity::High);
        assert_eq!(coerce_severity("life-threatening").unwrap(), Severity::Critical);
        assert_eq!(coerce_severity("life_threatening").unwrap(), Severity::Critical);
        assert_eq!(coerce_severity("moderate").unwrap(), Severity::Medium);
        assert_eq!(coerce_severity("minor").unwrap(), Severity::Low);
    }

    #[test]
    fn test_severity_unmapped() {
        for label in ["", "purple", "9/10"] {
            assert!(matches!(
                coerce_severity(label),
                Err(CitypulseError::SchemaViolation(_))
            ));
        }
    }

    #[test]
    fn test_incident_type_mapping() {
        assert_eq!(classify_incident_type("collision").unwrap(), IncidentType::Collision);
        assert_eq!(classify_incident_type("Weather Hazard").unwrap(), IncidentType::WeatherHazard);
        assert_eq!(classify_incident_type("road-obstruction").unwrap(), IncidentType::RoadObstruction);
        assert_eq!(classify_incident_type("Traffic jam").unwrap(), IncidentType::Congestion);
        assert_eq!(classify_incident_type("pile-up").unwrap(), IncidentType::Collision);
        assert_eq!(classify_incident_type("parade").unwrap(), IncidentType::Other);
    }

    #[test]
    fn test_incident_type_empty() {
        assert!(classify_incident_type("   ").is_err());
    }
}
