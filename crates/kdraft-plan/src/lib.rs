//! Edit plan model, validation and the atomic apply pipeline.
//!
//! A plan is an ordered list of typed operations produced by a planner from
//! a natural-language request. This crate turns an untrusted plan payload
//! into mutations on a [`kdraft_sch::Document`]:
//!
//! 1. [`Plan::from_json`] parses and version-gates the payload,
//! 2. [`validate`] checks every operation against the target document,
//! 3. [`apply_plan`] executes the whole plan on a copy, all-or-nothing,
//! 4. [`apply_to_file`] adds the load/backup/atomic-persist discipline.

pub mod apply;
pub mod op;
pub mod pipeline;
pub mod validate;

pub use apply::{ApplyError, ApplyOutcome, ApplySummary, apply_plan};
pub use op::{Diagnostic, Endpoint, Op, PLAN_SCHEMA_VERSION, Plan, PlanError, Severity, Stage};
pub use pipeline::apply_to_file;
pub use validate::{ValidationError, validate};
