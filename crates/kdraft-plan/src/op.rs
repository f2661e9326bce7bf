//! Typed edit plan model.
//!
//! This is the single translation layer between the untrusted, dynamically
//! shaped payload emitted by the planner and the rest of the engine.
//! Construction is all-or-nothing: either every operation converts into a
//! recognised [`Op`] with all required fields, or the whole payload is
//! rejected with a [`PlanError`]. No partially-built operation ever escapes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kdraft_sch::LabelKind;
use kdraft_sch::position::Point;

/// Current plan schema version. Payloads carrying a different version are
/// rejected before validation so a stale planner cannot feed the executor.
pub const PLAN_SCHEMA_VERSION: u32 = 1;

fn default_version() -> u32 {
    PLAN_SCHEMA_VERSION
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("plan contains no operations")]
    Empty,
    #[error("plan schema version mismatch: payload has v{got}, engine expects v{expected}")]
    VersionMismatch { got: u32, expected: u32 },
    #[error("malformed plan: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One end of a wire/connect operation: either a `REF:PIN` pair or an
/// explicit sheet coordinate.
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    Pin { reference: String, pin: String },
    At(Point),
}

impl Endpoint {
    pub fn pin(reference: impl Into<String>, pin: impl Into<String>) -> Self {
        Endpoint::Pin {
            reference: reference.into(),
            pin: pin.into(),
        }
    }

    pub fn at(x: f64, y: f64) -> Self {
        Endpoint::At(Point::new(x, y))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Pin { reference, pin } => write!(f, "{reference}:{pin}"),
            Endpoint::At(p) => write!(f, "{p}"),
        }
    }
}

// Wire format: a "REF:PIN" string or an [x, y] pair.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum EndpointRepr {
    Text(String),
    Coord((f64, f64)),
}

impl Serialize for Endpoint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let repr = match self {
            Endpoint::Pin { reference, pin } => EndpointRepr::Text(format!("{reference}:{pin}")),
            Endpoint::At(p) => EndpointRepr::Coord((p.x, p.y)),
        };
        repr.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Endpoint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match EndpointRepr::deserialize(deserializer)? {
            EndpointRepr::Coord((x, y)) => Ok(Endpoint::at(x, y)),
            EndpointRepr::Text(s) => {
                let (reference, pin) = s
                    .split_once(':')
                    .filter(|(r, p)| !r.is_empty() && !p.is_empty())
                    .ok_or_else(|| {
                        serde::de::Error::custom(format!(
                            "endpoint '{s}' is not 'REF:PIN' or [x, y]"
                        ))
                    })?;
                Ok(Endpoint::pin(reference, pin))
            }
        }
    }
}

/// A single edit operation. The `op` field discriminates the kind; unknown
/// kinds fail deserialization of the whole plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    AddComponent {
        /// Library id, e.g. `Device:R`.
        symbol: String,
        /// Desired designator prefix, e.g. `R`. The numeric suffix is
        /// allocated by the executor.
        prefix: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at: Option<(f64, f64)>,
        #[serde(default)]
        value: String,
        #[serde(default, skip_serializing_if = "is_zero")]
        rot: f64,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        fields: BTreeMap<String, String>,
    },
    /// Pin-to-pin wiring. Kept distinct from `connect` for planner payload
    /// compatibility; both take the same endpoint forms and share one
    /// executor path.
    Wire { from: Endpoint, to: Endpoint },
    Connect { from: Endpoint, to: Endpoint },
    Label {
        net: String,
        at: (f64, f64),
        #[serde(default)]
        kind: LabelKind,
    },
    SetProperty {
        #[serde(rename = "ref")]
        reference: String,
        key: String,
        value: String,
    },
}

fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

/// An ordered sequence of operations plus generation metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default = "default_version")]
    pub plan_version: u32,
    pub ops: Vec<Op>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Plan {
    pub fn new(ops: Vec<Op>) -> Self {
        Plan {
            plan_version: PLAN_SCHEMA_VERSION,
            ops,
            description: None,
            created_at: Some(Utc::now()),
            source: None,
        }
    }

    /// Construct a plan from an untrusted JSON payload.
    pub fn from_json(json: &str) -> Result<Self, PlanError> {
        let plan: Plan = serde_json::from_str(json)?;
        plan.check()
    }

    /// Construct a plan from an already-parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, PlanError> {
        let plan: Plan = serde_json::from_value(value)?;
        plan.check()
    }

    fn check(self) -> Result<Self, PlanError> {
        if self.plan_version != PLAN_SCHEMA_VERSION {
            return Err(PlanError::VersionMismatch {
                got: self.plan_version,
                expected: PLAN_SCHEMA_VERSION,
            });
        }
        if self.ops.is_empty() {
            return Err(PlanError::Empty);
        }
        Ok(self)
    }
}

/// Stage that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Planner,
    Validator,
    Writer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Structured diagnostic surfaced to UIs alongside apply results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub severity: Severity,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn info(stage: Stage, message: impl Into<String>) -> Self {
        Diagnostic {
            stage,
            severity: Severity::Info,
            reference: None,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn warning(stage: Stage, message: impl Into<String>) -> Self {
        Diagnostic {
            stage,
            severity: Severity::Warning,
            reference: None,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_ref(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_parses_all_operation_kinds() {
        let json = r#"{
            "plan_version": 1,
            "ops": [
                {"op": "add_component", "symbol": "Device:R", "prefix": "R", "value": "1k"},
                {"op": "wire", "from": "R1:1", "to": "D1:K"},
                {"op": "connect", "from": "R1:2", "to": [50.8, 25.4]},
                {"op": "label", "net": "VCC", "at": [50.8, 25.4], "kind": "global"},
                {"op": "set_property", "ref": "R1", "key": "Tolerance", "value": "1%"}
            ]
        }"#;
        let plan = Plan::from_json(json).unwrap();
        assert_eq!(plan.ops.len(), 5);
        assert_eq!(
            plan.ops[1],
            Op::Wire {
                from: Endpoint::pin("R1", "1"),
                to: Endpoint::pin("D1", "K"),
            }
        );
        match &plan.ops[2] {
            Op::Connect { to: Endpoint::At(p), .. } => {
                assert_eq!((p.x, p.y), (50.8, 25.4));
            }
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_rejects_the_whole_plan() {
        let json = r#"{"ops": [
            {"op": "add_component", "symbol": "Device:R", "prefix": "R"},
            {"op": "delete_everything"}
        ]}"#;
        assert!(matches!(Plan::from_json(json), Err(PlanError::Malformed(_))));
    }

    #[test]
    fn missing_required_field_rejects_the_whole_plan() {
        // Coordinate given as a single number instead of a pair.
        let json = r#"{"ops": [{"op": "label", "net": "VCC", "at": 12.7}]}"#;
        assert!(matches!(Plan::from_json(json), Err(PlanError::Malformed(_))));
    }

    #[test]
    fn empty_plan_is_rejected() {
        assert!(matches!(Plan::from_json(r#"{"ops": []}"#), Err(PlanError::Empty)));
    }

    #[test]
    fn version_gate_rejects_stale_plans() {
        let json = r#"{"plan_version": 2, "ops": [{"op": "label", "net": "X", "at": [0, 0]}]}"#;
        assert!(matches!(
            Plan::from_json(json),
            Err(PlanError::VersionMismatch { got: 2, expected: 1 })
        ));
    }

    #[test]
    fn malformed_endpoint_string_is_rejected() {
        let json = r#"{"ops": [{"op": "wire", "from": "R1", "to": "R2:1"}]}"#;
        assert!(matches!(Plan::from_json(json), Err(PlanError::Malformed(_))));
    }

    #[test]
    fn plan_json_roundtrip() {
        let plan = Plan::new(vec![
            Op::AddComponent {
                symbol: "Device:LED".into(),
                prefix: "D".into(),
                at: None,
                value: "RED".into(),
                rot: 0.0,
                fields: BTreeMap::new(),
            },
            Op::Connect {
                from: Endpoint::pin("D1", "A"),
                to: Endpoint::at(25.4, 0.0),
            },
        ]);
        let json = serde_json::to_string(&plan).unwrap();
        let back = Plan::from_json(&json).unwrap();
        assert_eq!(plan.ops, back.ops);
    }
}
