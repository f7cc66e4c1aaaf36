//! Shared fixtures for unit tests: oracle stubs, the three-node scenario
//! graph and small corpora.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::agents::{
    IncidentReport, IncidentType, SensorReading, Severity, SituationReport, StageContext,
    StageSettings, VehicleType, Weather,
};
use crate::embeddings::HashingEmbedder;
use crate::error::{CitypulseError, Result};
use crate::graph::{KnowledgeGraph, NodeKind, Relation, SharedGraph};
use crate::oracle::{CancelToken, OracleAdapter, OraclePrompt, ReasoningOracle};
use crate::retrieval::{CorpusEntry, RetrievalService, Strategy};

/// Replies from a fixed queue and records every prompt it receives.
pub struct ScriptedOracle {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<OraclePrompt>>,
    delay: Option<Duration>,
}

impl ScriptedOracle {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn prompts(&self) -> Vec<OraclePrompt> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ReasoningOracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &OraclePrompt) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CitypulseError::Oracle("script exhausted".to_string()))
    }
}

/// Deterministic oracle that answers by stage, recognizing the stage from
/// the schema instructions in the prompt. Proposes ambulance routing
/// whenever that action is offered. Safe to share across ticks.
pub struct StubOracle {
    severity: String,
    delay: Option<Duration>,
}

impl StubOracle {
    pub fn with_severity(severity: &str) -> Self {
        Self {
            severity: severity.to_string(),
            delay: None,
        }
    }

    pub fn critical() -> Self {
        Self::with_severity("critical")
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ReasoningOracle for StubOracle {
    fn name(&self) -> &str {
        "stub"
    }

    async fn generate(&self, prompt: &OraclePrompt) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = if !prompt.json_mode {
            "Standing traffic in heavy rain with a reported collision.".to_string()
        } else if prompt.user.contains("\"incident_type\" (") {
            format!(
                r#"{{"severity": "{}", "incident_type": "collision", "report": "Collision blocking the road in rain."}}"#,
                self.severity
            )
        } else if prompt.user.contains("route_ambulance") {
            r#"{"action": "route_ambulance", "explanation": "Clear a corridor for the ambulance."}"#
                .to_string()
        } else {
            r#"{"action": "normal_monitoring", "explanation": "Keep watching the approach."}"#
                .to_string()
        };
        Ok(reply)
    }
}

/// R1 (road) –CONNECTED_TO– I1 (intersection) –LEADS_TO→ H1 (hospital).
pub fn scenario_graph() -> KnowledgeGraph {
    let mut graph = KnowledgeGraph::new();
    graph.add_node("R1", NodeKind::Road).unwrap();
    graph.add_node("I1", NodeKind::Intersection).unwrap();
    graph.add_node("H1", NodeKind::Hospital).unwrap();
    graph.add_edge("R1", "I1", Relation::ConnectedTo, None).unwrap();
    graph.add_edge("I1", "H1", Relation::LeadsTo, None).unwrap();
    graph
}

/// Same nodes, but H1 only leads away from I1, so R1 cannot reach it.
pub fn isolated_graph() -> KnowledgeGraph {
    let mut graph = KnowledgeGraph::new();
    graph.add_node("R1", NodeKind::Road).unwrap();
    graph.add_node("I1", NodeKind::Intersection).unwrap();
    graph.add_node("H1", NodeKind::Hospital).unwrap();
    graph.add_edge("R1", "I1", Relation::ConnectedTo, None).unwrap();
    graph.add_edge("H1", "I1", Relation::LeadsTo, None).unwrap();
    graph
}

/// `incident_cases` (dense) and `policies` (keyword).
pub fn scenario_retrieval() -> RetrievalService {
    let mut corpora = BTreeMap::new();
    corpora.insert(
        "incident_cases".to_string(),
        vec![
            CorpusEntry::new("case-1", "Rear-end collision in heavy rain with high congestion on an arterial road"),
            CorpusEntry::new("case-2", "Broken-down truck blocking one lane during light morning traffic"),
            CorpusEntry::new("case-3", "Fog pile-up near the ring road, several injuries, ambulance dispatched"),
            CorpusEntry::new("case-4", "Flooded underpass closed after a storm, traffic diverted"),
        ],
    );
    corpora.insert(
        "policies".to_string(),
        vec![
            CorpusEntry::new("pol-1", "Critical collision with injuries: clear a green corridor toward the nearest hospital"),
            CorpusEntry::new("pol-2", "High congestion without injuries: extend green on the congested approach"),
            CorpusEntry::new("pol-3", "Rain or fog: rebalance signal timing to lower approach speeds"),
        ],
    );

    let mut strategies = HashMap::new();
    strategies.insert("incident_cases".to_string(), Strategy::Dense);
    strategies.insert("policies".to_string(), Strategy::Keyword);
    RetrievalService::build(
        corpora,
        &strategies,
        Strategy::Keyword,
        Arc::new(HashingEmbedder::new(256)),
        0.0,
    )
    .unwrap()
}

pub fn scenario_reading() -> SensorReading {
    SensorReading {
        road: "R1".to_string(),
        speed: 12.0,
        weather: Weather::Rain,
        congestion: 0.95,
        vehicle_type: VehicleType::Car,
    }
}

pub fn scenario_situation() -> SituationReport {
    SituationReport {
        road: "R1".to_string(),
        narrative: "Collision on R1 in heavy rain, traffic at a standstill".to_string(),
        retrieved_context: Vec::new(),
    }
}

pub fn scenario_incident(severity: Severity) -> IncidentReport {
    IncidentReport {
        road: "R1".to_string(),
        severity,
        incident_type: IncidentType::Collision,
        report: "Collision with injuries blocking R1".to_string(),
        similar_cases: Vec::new(),
    }
}

/// Scenario graph, corpora and a scripted oracle, ready to build a
/// [`StageContext`] from.
pub struct Harness {
    pub graph: Arc<SharedGraph>,
    pub retrieval: RetrievalService,
    pub oracle: Arc<ScriptedOracle>,
    pub adapter: OracleAdapter,
    pub settings: StageSettings,
    pub cancel: CancelToken,
}

impl Harness {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_graph(scenario_graph(), responses)
    }

    pub fn with_graph<I, S>(graph: KnowledgeGraph, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let oracle = Arc::new(ScriptedOracle::new(responses));
        let adapter = OracleAdapter::new(oracle.clone(), Duration::from_secs(1));
        Self {
            graph: Arc::new(SharedGraph::new(graph)),
            retrieval: scenario_retrieval(),
            oracle,
            adapter,
            settings: StageSettings::default(),
            cancel: CancelToken::never(),
        }
    }

    pub fn ctx(&self) -> StageContext<'_> {
        StageContext {
            retrieval: &self.retrieval,
            graph: &self.graph,
            oracle: &self.adapter,
            settings: &self.settings,
            cancel: &self.cancel,
        }
    }
}
