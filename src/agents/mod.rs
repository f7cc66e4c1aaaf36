//! The three agents of the incident pipeline.
//!
//! Each agent is a stage function from one message to the next, drawing on
//! retrieval, the knowledge graph and the oracle through a [`StageContext`].

pub mod incident;
pub mod messages;
pub mod traffic_light;
pub mod vehicle;
pub mod vocabulary;

pub use messages::{
    Action, ContextPassage, Decision, IncidentReport, IncidentType, SensorReading, Severity,
    SimilarCase, SituationReport, VehicleType, Weather,
};

use crate::config::Config;
use crate::graph::SharedGraph;
use crate::oracle::{CancelToken, OracleAdapter};
use crate::retrieval::{RetrievalService, Retrieved};

/// Corpus names and retrieval depth used by the stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSettings {
    pub top_k: usize,
    pub vehicle_corpus: String,
    pub case_corpus: String,
    pub policy_corpus: String,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            top_k: 3,
            vehicle_corpus: "incident_cases".to_string(),
            case_corpus: "incident_cases".to_string(),
            policy_corpus: "policies".to_string(),
        }
    }
}

impl StageSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.default_k,
            vehicle_corpus: config.pipeline.vehicle_corpus.clone(),
            case_corpus: config.pipeline.case_corpus.clone(),
            policy_corpus: config.pipeline.policy_corpus.clone(),
        }
    }

    pub fn corpora(&self) -> [&str; 3] {
        [
            self.vehicle_corpus.as_str(),
            self.case_corpus.as_str(),
            self.policy_corpus.as_str(),
        ]
    }
}

/// Everything a stage may consult while handling one tick.
pub struct StageContext<'a> {
    pub retrieval: &'a RetrievalService,
    pub graph: &'a SharedGraph,
    pub oracle: &'a OracleAdapter,
    pub settings: &'a StageSettings,
    pub cancel: &'a CancelToken,
}

pub(crate) fn passages(results: Vec<Retrieved>) -> Vec<ContextPassage> {
    results
        .into_iter()
        .map(|r| ContextPassage {
            text: r.text,
            score: r.score,
        })
        .collect()
}
