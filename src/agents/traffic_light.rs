use serde_json::Value;

use crate::agents::{passages, Action, Decision, IncidentReport, StageContext};
use crate::error::{CitypulseError, Result};
use crate::graph::NodeId;
use crate::oracle::{FieldSpec, OracleRequest, ResponseSchema};

const TRAFFIC_LIGHT_PROMPT: &str = "You are the traffic-light agent of a city traffic \
monitoring system. Choose one signal action for the incident and explain it briefly, \
following the retrieved policies and the routing facts.";

/// What the graph says about getting an ambulance to a hospital.
#[derive(Debug, Clone, PartialEq)]
enum HospitalRoute {
    NotNeeded,
    Found { hospital: NodeId, route: Vec<NodeId> },
    Missing,
}

/// Actions the oracle may propose; ambulance routing is only on the table
/// when a route exists.
fn allowed_actions(route: &HospitalRoute) -> Vec<Action> {
    Action::ALL
        .into_iter()
        .filter(|a| *a != Action::RouteAmbulance || matches!(route, HospitalRoute::Found { .. }))
        .collect()
}

pub fn decision_schema(allowed: &[Action]) -> ResponseSchema {
    ResponseSchema::new()
        .field(FieldSpec::enumeration("action", allowed.iter().map(|a| a.as_str())))
        .field(FieldSpec::string("explanation").optional().describe("one or two sentences for operators"))
}

/// Only urgent incidents consult the graph; the road is resolved by id or
/// label and must exist.
fn locate_hospital(ctx: &StageContext<'_>, incident: &IncidentReport) -> Result<(NodeId, HospitalRoute)> {
    if !incident.severity.is_urgent() {
        return Ok((incident.road.clone(), HospitalRoute::NotNeeded));
    }
    ctx.graph.read(|graph| -> Result<(NodeId, HospitalRoute)> {
        let road = graph
            .resolve(&incident.road)
            .ok_or_else(|| CitypulseError::UnknownNode(incident.road.clone()))?;
        let route = match graph.nearest_hospital(&road)? {
            Some(hospital) => match graph.find_path(&road, &hospital)? {
                Some(route) => HospitalRoute::Found { hospital, route },
                None => HospitalRoute::Missing,
            },
            None => HospitalRoute::Missing,
        };
        Ok((road, route))
    })
}

/// Incident report → signal decision.
pub async fn run(ctx: &StageContext<'_>, incident: &IncidentReport) -> Result<Decision> {
    let (road, hospital_route) = locate_hospital(ctx, incident)?;

    let policy_query = format!(
        "{} {} {}",
        incident.severity,
        incident.incident_type.as_str().replace('_', " "),
        incident.report
    );
    let policies = passages(ctx.retrieval.retrieve(
        &policy_query,
        &ctx.settings.policy_corpus,
        ctx.settings.top_k,
    )?);

    let routing = match &hospital_route {
        HospitalRoute::NotNeeded => Value::String("not required".to_string()),
        HospitalRoute::Found { hospital, route } => serde_json::json!({
            "nearest_hospital": hospital,
            "route": route,
        }),
        HospitalRoute::Missing => {
            Value::String(format!("no hospital reachable from {}", road))
        }
    };

    let allowed = allowed_actions(&hospital_route);
    let request = OracleRequest::new(TRAFFIC_LIGHT_PROMPT)
        .with_context("road", road.clone())
        .with_context("incident", serde_json::to_value(incident)?)
        .with_context("policies", serde_json::to_value(&policies)?)
        .with_context("hospital_routing", routing)
        .with_schema(decision_schema(&allowed));

    let fields = ctx
        .oracle
        .infer_with_cancel(&request, ctx.cancel)
        .await?
        .into_fields()?;
    let proposed = fields
        .get("action")
        .and_then(Value::as_str)
        .and_then(Action::parse)
        .ok_or_else(|| CitypulseError::SchemaViolation("missing field 'action'".to_string()))?;
    let explanation = fields
        .get("explanation")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let decision = match hospital_route {
        HospitalRoute::Found { hospital, route } => {
            if proposed != Action::RouteAmbulance {
                log::warn!(
                    "Oracle proposed {} for a {} incident on {}; routing ambulance to {} instead",
                    proposed,
                    incident.severity,
                    road,
                    hospital
                );
            }
            Decision {
                action: Action::RouteAmbulance,
                route: Some(route),
                explanation,
            }
        }
        HospitalRoute::Missing => {
            if proposed != Action::NormalMonitoring {
                log::warn!(
                    "Oracle proposed {} on {} but no hospital route exists; falling back to normal monitoring",
                    proposed,
                    road
                );
            }
            Decision {
                action: Action::NormalMonitoring,
                route: None,
                explanation: format!(
                    "Missing route: no hospital is reachable from {}, so no ambulance can be routed. {}",
                    road, explanation
                )
                .trim_end()
                .to_string(),
            }
        }
        HospitalRoute::NotNeeded => Decision {
            action: proposed,
            route: None,
            explanation,
        },
    };
    Ok(decision)
}
