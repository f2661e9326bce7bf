//! Whole-plan validation against a target document.
//!
//! Runs after construction and before any mutation. Validation is pure: it
//! never touches the document, so re-validating the same plan against the
//! same document always yields the same outcome.

use kdraft_sch::Document;
use kdraft_sch::refdes::RefdesAllocator;

use crate::op::{Endpoint, Op, Plan};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("operation {index}: {reason}")]
pub struct ValidationError {
    pub index: usize,
    pub reason: String,
}

impl ValidationError {
    fn new(index: usize, reason: impl Into<String>) -> Self {
        ValidationError {
            index,
            reason: reason.into(),
        }
    }
}

/// Check a plan against a document without mutating either.
///
/// Simulates designator allocation so that `add_component` prefixes cannot
/// collide with each other or with existing references, and enforces that
/// `(ref, pin)` endpoints only name references that exist already or were
/// created by an *earlier* operation in the same plan. Forward references to
/// a later `add_component` are rejected.
pub fn validate(plan: &Plan, doc: &Document) -> Result<(), ValidationError> {
    let mut alloc = RefdesAllocator::from_existing(doc.refs());
    // References known so far: the document's plus plan-created ones,
    // uppercased for case-insensitive matching.
    let mut known: Vec<String> = doc.refs().map(|r| r.to_ascii_uppercase()).collect();

    for (index, op) in plan.ops.iter().enumerate() {
        match op {
            Op::AddComponent { prefix, symbol, .. } => {
                if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphabetic()) {
                    return Err(ValidationError::new(
                        index,
                        format!("invalid reference prefix '{prefix}' (letters only)"),
                    ));
                }
                if symbol.is_empty() {
                    return Err(ValidationError::new(index, "empty library id"));
                }
                let refdes = alloc.allocate(prefix);
                known.push(refdes.to_ascii_uppercase());
            }
            Op::Wire { from, to } | Op::Connect { from, to } => {
                for endpoint in [from, to] {
                    check_endpoint(index, endpoint, &known)?;
                }
            }
            Op::Label { net, .. } => {
                if net.trim().is_empty() {
                    return Err(ValidationError::new(index, "empty net name"));
                }
            }
            Op::SetProperty { reference, key, .. } => {
                if key.is_empty() {
                    return Err(ValidationError::new(index, "empty property key"));
                }
                if !is_known(reference, &known) {
                    return Err(ValidationError::new(
                        index,
                        format!("set_property targets unknown reference '{reference}'"),
                    ));
                }
            }
        }
    }

    Ok(())
}

fn is_known(reference: &str, known: &[String]) -> bool {
    let upper = reference.to_ascii_uppercase();
    known.iter().any(|r| *r == upper)
}

fn check_endpoint(index: usize, endpoint: &Endpoint, known: &[String]) -> Result<(), ValidationError> {
    if let Endpoint::Pin { reference, .. } = endpoint
        && !is_known(reference, known)
    {
        return Err(ValidationError::new(
            index,
            format!(
                "endpoint names unknown reference '{reference}' \
                 (references must exist or be created by an earlier add_component)"
            ),
        ));
    }
    Ok(())
}
