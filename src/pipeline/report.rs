use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::agents::{Decision, IncidentReport, SensorReading, SituationReport};
use crate::error::{StageError, TickId};

/// Pipeline states, in the only order a tick may visit them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    SensorReceived,
    SituationReported,
    IncidentClassified,
    DecisionMade,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::SensorReceived => "SENSOR_RECEIVED",
            PipelineState::SituationReported => "SITUATION_REPORTED",
            PipelineState::IncidentClassified => "INCIDENT_CLASSIFIED",
            PipelineState::DecisionMade => "DECISION_MADE",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full record of one successful tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: TickId,
    pub states: Vec<PipelineState>,
    pub reading: SensorReading,
    pub situation: SituationReport,
    pub incident: IncidentReport,
    pub decision: Decision,
}

impl TickReport {
    /// SHA-256 of the decision's JSON form, hex encoded. Equal decisions
    /// always give equal fingerprints.
    pub fn fingerprint(&self) -> String {
        decision_fingerprint(&self.decision)
    }
}

pub fn decision_fingerprint(decision: &Decision) -> String {
    // Decision holds only strings and enums, so serialization cannot fail
    // and field order is fixed by the struct.
    let canonical = serde_json::to_vec(decision).unwrap_or_default();
    let digest = Sha256::digest(&canonical);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Outcome of one tick in a batch run.
#[derive(Debug)]
pub struct TickOutcome {
    pub tick: TickId,
    pub result: Result<Decision, StageError>,
}
