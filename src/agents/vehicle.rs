use crate::agents::{passages, SensorReading, SituationReport, StageContext};
use crate::error::{CitypulseError, Result};
use crate::oracle::OracleRequest;

const VEHICLE_PROMPT: &str = "You are the vehicle agent of a city traffic monitoring system. \
Describe the current situation on the road in two or three sentences: conditions, likely \
hazards, and anything that resembles the retrieved past cases.";

/// Sensor reading → situation report.
pub async fn run(ctx: &StageContext<'_>, reading: &SensorReading) -> Result<SituationReport> {
    reading.validate()?;

    let retrieved = ctx.retrieval.retrieve(
        &reading.query(),
        &ctx.settings.vehicle_corpus,
        ctx.settings.top_k,
    )?;
    let retrieved_context = passages(retrieved);

    let request = OracleRequest::new(VEHICLE_PROMPT)
        .with_context("reading", serde_json::to_value(reading)?)
        .with_context("retrieved_context", serde_json::to_value(&retrieved_context)?);

    let narrative = ctx
        .oracle
        .infer_with_cancel(&request, ctx.cancel)
        .await?
        .into_text()?;
    if narrative.is_empty() {
        return Err(CitypulseError::SchemaViolation(
            "oracle returned an empty narrative".to_string(),
        ));
    }

    Ok(SituationReport {
        road: reading.road.clone(),
        narrative,
        retrieved_context,
    })
}
