use anyhow::{Context, Result};
use citypulse::agents::SensorReading;
use citypulse::graph::{load_graph, KnowledgeGraph, NodeKind};
use citypulse::oracle::OpenAiOracle;
use citypulse::pipeline::Pipeline;
use citypulse::retrieval::RetrievalService;
use citypulse::{Config, TickId};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "citypulse")]
#[command(about = "Simulate traffic incident response with retrieval, a road graph and a reasoning oracle")]
struct Args {
    /// Config file (overrides CITYPULSE_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run sensor readings through the agent pipeline, one JSON line per tick
    Simulate {
        /// JSON array of sensor readings
        #[arg(short, long)]
        readings: PathBuf,

        /// Ticks processed at the same time (defaults to pipeline.concurrency)
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Shortest route between two locations (id or label)
    Path { from: String, to: String },
    /// Closest hospital to a road (id or label)
    NearestHospital { road: String },
    /// Query one corpus
    Retrieve {
        corpus: String,
        query: String,

        /// Number of results (defaults to retrieval.default_k)
        #[arg(short)]
        k: Option<usize>,
    },
    /// Load config, graph and corpora and print what was found
    Check,
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            let _ = dotenv::dotenv();
            Config::load_from(path)
        }
        None => Config::load(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", &config.citypulse.log_level),
    )
    .init();

    match args.command {
        Command::Simulate {
            readings,
            concurrency,
        } => simulate(&config, &readings, concurrency).await,
        Command::Path { from, to } => {
            let graph = load_graph(config.graph_path())?;
            let (from, to) = (resolve(&graph, &from)?, resolve(&graph, &to)?);
            match graph.find_path(&from, &to)? {
                Some(path) => println!("{}", describe_route(&graph, &path)),
                None => println!("No path from {} to {}", from, to),
            }
            Ok(())
        }
        Command::NearestHospital { road } => {
            let graph = load_graph(config.graph_path())?;
            let road = resolve(&graph, &road)?;
            match graph.nearest_hospital(&road)? {
                Some(hospital) => {
                    let route = graph.find_path(&road, &hospital)?.unwrap_or_default();
                    println!("{} ({})", graph.display_name(&hospital), hospital);
                    println!("{}", describe_route(&graph, &route));
                }
                None => println!("No hospital reachable from {}", road),
            }
            Ok(())
        }
        Command::Retrieve { corpus, query, k } => {
            let retrieval = RetrievalService::from_config(&config)?;
            let k = k.unwrap_or(config.retrieval.default_k);
            let start = Instant::now();
            let results = retrieval.retrieve(&query, &corpus, k)?;
            println!(
                "Found {} results in {:?} ({} retrieval)",
                results.len(),
                start.elapsed(),
                retrieval
                    .strategy_of(&corpus)
                    .map(|s| s.to_string())
                    .unwrap_or_default()
            );
            for (i, result) in results.iter().enumerate() {
                println!("\n{}. [{:.3}] {}", i + 1, result.score, result.id);
                println!("   {}", result.text);
            }
            Ok(())
        }
        Command::Check => check(&config),
    }
}

fn resolve(graph: &KnowledgeGraph, id_or_label: &str) -> Result<String> {
    graph
        .resolve(id_or_label)
        .with_context(|| format!("Unknown location: {}", id_or_label))
}

fn describe_route(graph: &KnowledgeGraph, route: &[String]) -> String {
    route
        .iter()
        .map(|id| graph.display_name(id))
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn check(config: &Config) -> Result<()> {
    let graph = load_graph(config.graph_path())
        .with_context(|| format!("Failed to load graph {}", config.graph_path().display()))?;
    println!(
        "Graph: {} nodes ({} roads, {} intersections, {} hospitals), {} edges",
        graph.node_count(),
        graph.nodes_by_kind(NodeKind::Road).len(),
        graph.nodes_by_kind(NodeKind::Intersection).len(),
        graph.nodes_by_kind(NodeKind::Hospital).len(),
        graph.edge_count()
    );

    let retrieval = RetrievalService::from_config(config)?;
    for name in retrieval.corpus_names() {
        println!(
            "Corpus {}: {} entries ({})",
            name,
            retrieval.corpus_len(&name).unwrap_or(0),
            retrieval
                .strategy_of(&name)
                .map(|s| s.to_string())
                .unwrap_or_default()
        );
    }

    for corpus in [
        &config.pipeline.vehicle_corpus,
        &config.pipeline.case_corpus,
        &config.pipeline.policy_corpus,
    ] {
        if !retrieval.contains(corpus) {
            anyhow::bail!("pipeline corpus '{}' is missing from {}", corpus, config.corpus_dir().display());
        }
    }

    match config.oracle_api_key() {
        Ok(_) => println!("Oracle: {} via {}", config.oracle.model, config.oracle.base_url),
        Err(e) => println!("Oracle: not configured ({})", e),
    }
    Ok(())
}

async fn simulate(config: &Config, readings_path: &Path, concurrency: Option<usize>) -> Result<()> {
    let content = std::fs::read_to_string(readings_path)
        .with_context(|| format!("Failed to read readings file: {}", readings_path.display()))?;
    let readings: Vec<SensorReading> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid readings file: {}", readings_path.display()))?;

    let oracle = Arc::new(OpenAiOracle::from_config(config)?);
    let pipeline = Pipeline::from_config(config, oracle)?;

    let run_id = uuid::Uuid::new_v4();
    let concurrency = concurrency.unwrap_or(config.pipeline.concurrency);
    log::info!(
        "Simulation {} started at {}: {} readings, concurrency {}",
        run_id,
        chrono::Utc::now().to_rfc3339(),
        readings.len(),
        concurrency
    );

    let start = Instant::now();
    let ticks = readings
        .into_iter()
        .enumerate()
        .map(|(i, reading)| (i as TickId + 1, reading));
    let outcomes = pipeline.run_ticks(ticks, concurrency).await;

    let mut failed = 0;
    for outcome in &outcomes {
        let line = match &outcome.result {
            Ok(decision) => serde_json::json!({
                "run_id": run_id,
                "tick": outcome.tick,
                "decision": decision,
            }),
            Err(e) => {
                failed += 1;
                serde_json::json!({
                    "run_id": run_id,
                    "tick": outcome.tick,
                    "error": {
                        "stage": e.stage,
                        "message": e.source.to_string(),
                    },
                })
            }
        };
        println!("{}", line);
    }

    log::info!(
        "Simulation {} finished in {:?}: {} ticks, {} failed",
        run_id,
        start.elapsed(),
        outcomes.len(),
        failed
    );
    Ok(())
}
