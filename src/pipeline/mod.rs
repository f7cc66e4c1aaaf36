//! Tick orchestration: vehicle → incident → traffic-light, strictly in order.
//!
//! The knowledge graph is the only state that outlives a tick. Everything a
//! tick produces is a fresh message, so independent ticks can run at the
//! same time against shared graph, retrieval and oracle handles.

pub mod report;

pub use report::{decision_fingerprint, PipelineState, TickOutcome, TickReport};

use std::future::Future;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};

use crate::agents::{incident, traffic_light, vehicle, Decision, SensorReading, StageContext, StageSettings};
use crate::config::Config;
use crate::error::{CitypulseError, Result, Stage, StageError, TickId};
use crate::graph::{load_graph, SharedGraph};
use crate::oracle::{CancelToken, OracleAdapter, ReasoningOracle};
use crate::retrieval::RetrievalService;

const SYSTEM_INSTRUCTION: &str = "You are part of a smart-city traffic incident response \
system. Be factual and concise, and rely only on the context you are given.";

pub struct Pipeline {
    graph: Arc<SharedGraph>,
    retrieval: Arc<RetrievalService>,
    oracle: OracleAdapter,
    settings: StageSettings,
}

impl Pipeline {
    pub fn new(
        graph: Arc<SharedGraph>,
        retrieval: Arc<RetrievalService>,
        oracle: OracleAdapter,
        settings: StageSettings,
    ) -> Result<Self> {
        for corpus in settings.corpora() {
            if !retrieval.contains(corpus) {
                return Err(CitypulseError::Config(format!(
                    "pipeline corpus '{}' is not loaded (available: {})",
                    corpus,
                    retrieval.corpus_names().join(", ")
                )));
            }
        }
        if settings.top_k == 0 {
            return Err(CitypulseError::InvalidArgument(
                "top_k must be greater than 0".to_string(),
            ));
        }
        log::info!(
            "Pipeline ready: oracle '{}', {} graph nodes, corpora [{}]",
            oracle.oracle_name(),
            graph.node_count(),
            retrieval.corpus_names().join(", ")
        );
        Ok(Self {
            graph,
            retrieval,
            oracle,
            settings,
        })
    }

    /// Load the graph and corpora named by `config` and wire them to `oracle`.
    pub fn from_config(config: &Config, oracle: Arc<dyn ReasoningOracle>) -> Result<Self> {
        let graph = load_graph(config.graph_path())?;
        let retrieval = RetrievalService::from_config(config)?;
        let adapter = OracleAdapter::new(oracle, config.oracle_timeout())
            .with_system_instruction(SYSTEM_INSTRUCTION);
        Self::new(
            Arc::new(SharedGraph::new(graph)),
            Arc::new(retrieval),
            adapter,
            StageSettings::from_config(config),
        )
    }

    pub fn graph(&self) -> &Arc<SharedGraph> {
        &self.graph
    }

    pub fn retrieval(&self) -> &Arc<RetrievalService> {
        &self.retrieval
    }

    pub fn settings(&self) -> &StageSettings {
        &self.settings
    }

    /// Run one tick to a decision.
    pub async fn run_tick(&self, tick: TickId, reading: &SensorReading) -> std::result::Result<Decision, StageError> {
        self.run_tick_with_cancel(tick, reading, &CancelToken::never()).await
    }

    /// Run one tick, abandoning it with `StageTimeout` if `cancel` fires
    /// while the oracle is working.
    pub async fn run_tick_with_cancel(
        &self,
        tick: TickId,
        reading: &SensorReading,
        cancel: &CancelToken,
    ) -> std::result::Result<Decision, StageError> {
        self.trace_tick(tick, reading, cancel)
            .await
            .map(|report| report.decision)
    }

    /// Run one tick and keep every intermediate message.
    pub async fn trace_tick(
        &self,
        tick: TickId,
        reading: &SensorReading,
        cancel: &CancelToken,
    ) -> std::result::Result<TickReport, StageError> {
        let ctx = StageContext {
            retrieval: &self.retrieval,
            graph: &self.graph,
            oracle: &self.oracle,
            settings: &self.settings,
            cancel,
        };
        let start = std::time::Instant::now();
        let mut states = Vec::with_capacity(4);
        enter(tick, &mut states, PipelineState::SensorReceived);

        let situation = run_stage(tick, Stage::Vehicle, vehicle::run(&ctx, reading)).await?;
        enter(tick, &mut states, PipelineState::SituationReported);

        let incident = run_stage(tick, Stage::Incident, incident::run(&ctx, &situation)).await?;
        enter(tick, &mut states, PipelineState::IncidentClassified);

        let decision = run_stage(tick, Stage::TrafficLight, traffic_light::run(&ctx, &incident)).await?;
        enter(tick, &mut states, PipelineState::DecisionMade);

        log::info!(
            "tick {}: {} ({} severity) on {} in {:?}",
            tick,
            decision.action,
            incident.severity,
            incident.road,
            start.elapsed()
        );

        Ok(TickReport {
            tick,
            states,
            reading: reading.clone(),
            situation,
            incident,
            decision,
        })
    }

    /// Run independent ticks with up to `concurrency` in flight. Outcomes are
    /// returned in tick order.
    pub async fn run_ticks<I>(&self, readings: I, concurrency: usize) -> Vec<TickOutcome>
    where
        I: IntoIterator<Item = (TickId, SensorReading)>,
    {
        let mut outcomes: Vec<TickOutcome> = stream::iter(readings)
            .map(|(tick, reading)| async move {
                let result = self.run_tick(tick, &reading).await;
                TickOutcome { tick, result }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;
        outcomes.sort_by_key(|outcome| outcome.tick);
        outcomes
    }
}

fn enter(tick: TickId, states: &mut Vec<PipelineState>, state: PipelineState) {
    log::debug!("tick {}: {}", tick, state);
    states.push(state);
}

async fn run_stage<T>(
    tick: TickId,
    stage: Stage,
    work: impl Future<Output = Result<T>>,
) -> std::result::Result<T, StageError> {
    work.await.map_err(|source| {
        let err = StageError::new(tick, stage, source);
        log::warn!("{}", err);
        err
    })
}
