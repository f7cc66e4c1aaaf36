use serde_json::{Map, Value};

use crate::agents::vocabulary::{classify_incident_type, coerce_severity};
use crate::agents::{IncidentReport, IncidentType, Severity, SimilarCase, SituationReport, StageContext};
use crate::error::{CitypulseError, Result};
use crate::oracle::{FieldSpec, OracleRequest, ResponseSchema};

const INCIDENT_PROMPT: &str = "You are the incident agent of a city traffic monitoring system. \
Classify the situation using the narrative and the similar past cases.";

/// Shape the oracle must answer in. Severity and type are plain strings;
/// the stage maps them onto the fixed vocabularies itself.
pub fn incident_schema() -> ResponseSchema {
    let severities: Vec<&str> = Severity::ALL.iter().map(|s| s.as_str()).collect();
    let types: Vec<&str> = IncidentType::ALL.iter().map(|t| t.as_str()).collect();
    ResponseSchema::new()
        .field(FieldSpec::string("severity").describe(format!("one of {}", severities.join(", "))))
        .field(FieldSpec::string("incident_type").describe(format!("one of {}", types.join(", "))))
        .field(FieldSpec::string("report").describe("short incident report for operators"))
}

fn field<'a>(fields: &'a Map<String, Value>, name: &str) -> Result<&'a str> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| CitypulseError::SchemaViolation(format!("missing field '{}'", name)))
}

/// Situation report → classified incident report.
pub async fn run(ctx: &StageContext<'_>, situation: &SituationReport) -> Result<IncidentReport> {
    let similar_cases: Vec<SimilarCase> = ctx
        .retrieval
        .retrieve(&situation.narrative, &ctx.settings.case_corpus, ctx.settings.top_k)?
        .into_iter()
        .map(|r| SimilarCase {
            case_id: r.id,
            text: r.text,
            score: r.score,
        })
        .collect();

    let request = OracleRequest::new(INCIDENT_PROMPT)
        .with_context("road", situation.road.clone())
        .with_context("narrative", situation.narrative.clone())
        .with_context("similar_cases", serde_json::to_value(&similar_cases)?)
        .with_schema(incident_schema());

    let fields = ctx
        .oracle
        .infer_with_cancel(&request, ctx.cancel)
        .await?
        .into_fields()?;

    let severity = coerce_severity(field(&fields, "severity")?)?;
    let incident_type = classify_incident_type(field(&fields, "incident_type")?)?;
    let report = field(&fields, "report")?.to_string();

    Ok(IncidentReport {
        road: situation.road.clone(),
        severity,
        incident_type,
        report,
        similar_cases,
    })
}
