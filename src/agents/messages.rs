//! Messages passed between pipeline stages. Each stage produces a new value
//! and never edits its input.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CitypulseError, Result};
use crate::graph::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    Clear,
    Rain,
    Fog,
    Snow,
    Storm,
}

impl Weather {
    pub fn as_str(&self) -> &'static str {
        match self {
            Weather::Clear => "clear",
            Weather::Rain => "rain",
            Weather::Fog => "fog",
            Weather::Snow => "snow",
            Weather::Storm => "storm",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Car,
    Truck,
    Bus,
    Motorcycle,
    Bicycle,
    Ambulance,
}

impl VehicleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::Car => "car",
            VehicleType::Truck => "truck",
            VehicleType::Bus => "bus",
            VehicleType::Motorcycle => "motorcycle",
            VehicleType::Bicycle => "bicycle",
            VehicleType::Ambulance => "ambulance",
        }
    }
}

/// One sensor sample for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Road id or label in the knowledge graph.
    pub road: String,
    /// km/h
    pub speed: f64,
    pub weather: Weather,
    /// Fraction of capacity in use, 0 to 1.
    pub congestion: f64,
    pub vehicle_type: VehicleType,
}

impl SensorReading {
    pub fn validate(&self) -> Result<()> {
        if self.road.trim().is_empty() {
            return Err(CitypulseError::InvalidArgument(
                "sensor reading has an empty road".to_string(),
            ));
        }
        if !self.speed.is_finite() || self.speed < 0.0 {
            return Err(CitypulseError::InvalidArgument(format!(
                "sensor speed must be a non-negative number, got {}",
                self.speed
            )));
        }
        if !(0.0..=1.0).contains(&self.congestion) {
            return Err(CitypulseError::InvalidArgument(format!(
                "sensor congestion must be within [0, 1], got {}",
                self.congestion
            )));
        }
        Ok(())
    }

    pub fn congestion_level(&self) -> &'static str {
        match self.congestion {
            c if c >= 0.8 => "high",
            c if c >= 0.5 => "moderate",
            _ => "light",
        }
    }

    /// Retrieval query describing the reading in plain words.
    pub fn query(&self) -> String {
        format!(
            "{} congestion on {} in {} weather, {} moving at {:.0} km/h",
            self.congestion_level(),
            self.road,
            self.weather.as_str(),
            self.vehicle_type.as_str(),
            self.speed
        )
    }
}

/// A retrieved passage as seen by a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPassage {
    pub text: String,
    pub score: f32,
}

/// Vehicle stage output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SituationReport {
    pub road: String,
    pub narrative: String,
    pub retrieved_context: Vec<ContextPassage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// High and critical incidents warrant ambulance routing.
    pub fn is_urgent(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentType {
    Collision,
    Congestion,
    Breakdown,
    WeatherHazard,
    RoadObstruction,
    MedicalEmergency,
    Other,
}

impl IncidentType {
    pub const ALL: [IncidentType; 7] = [
        IncidentType::Collision,
        IncidentType::Congestion,
        IncidentType::Breakdown,
        IncidentType::WeatherHazard,
        IncidentType::RoadObstruction,
        IncidentType::MedicalEmergency,
        IncidentType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentType::Collision => "collision",
            IncidentType::Congestion => "congestion",
            IncidentType::Breakdown => "breakdown",
            IncidentType::WeatherHazard => "weather_hazard",
            IncidentType::RoadObstruction => "road_obstruction",
            IncidentType::MedicalEmergency => "medical_emergency",
            IncidentType::Other => "other",
        }
    }
}

impl fmt::Display for IncidentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarCase {
    pub case_id: String,
    pub text: String,
    pub score: f32,
}

/// Incident stage output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentReport {
    /// Road the incident concerns, carried forward for graph queries.
    pub road: String,
    pub severity: Severity,
    pub incident_type: IncidentType,
    pub report: String,
    pub similar_cases: Vec<SimilarCase>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ExtendGreen,
    RouteAmbulance,
    RebalanceTiming,
    NormalMonitoring,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Action::ExtendGreen,
        Action::RouteAmbulance,
        Action::RebalanceTiming,
        Action::NormalMonitoring,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ExtendGreen => "extend_green",
            Action::RouteAmbulance => "route_ambulance",
            Action::RebalanceTiming => "rebalance_timing",
            Action::NormalMonitoring => "normal_monitoring",
        }
    }

    pub fn parse(s: &str) -> Option<Action> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Traffic-light stage output. `route` is set exactly when `action` is
/// `route_ambulance` and then ends at a hospital.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Vec<NodeId>>,
    pub explanation: String,
}
