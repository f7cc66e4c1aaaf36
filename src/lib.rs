pub mod agents;
pub mod cache;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod graph;
pub mod oracle;
pub mod pipeline;
pub mod retrieval;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use error::{CitypulseError, Result, Stage, StageError, TickId};
pub use graph::{KnowledgeGraph, SharedGraph};
pub use pipeline::{Pipeline, TickReport};
