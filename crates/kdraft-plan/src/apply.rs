//! Mutation executor.
//!
//! Applies a validated plan to a copy of the document. All-or-nothing: the
//! caller's document is never touched, and on any error the copy is dropped,
//! so there is no partially-applied state to clean up.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;

use kdraft_sch::pin::{ResolveError, resolve_pin};
use kdraft_sch::position::{GRID_MM, GridPoint, Point, Position};
use kdraft_sch::refdes::RefdesAllocator;
use kdraft_sch::{Document, Label, PinBinding, SchSymbol, Wire};

use crate::op::{Diagnostic, Endpoint, Op, Plan, Stage};
use crate::validate::{ValidationError, validate};

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("operation {index}: unknown reference '{reference}'")]
    UnknownReference { index: usize, reference: String },
    #[error("operation {index}: {source}")]
    UnknownPin {
        index: usize,
        #[source]
        source: ResolveError,
    },
    #[error("operation {index}: reference '{reference}' already exists")]
    ReferenceCollision { index: usize, reference: String },
    #[error("{} changed on disk while the plan was being applied", path.display())]
    ConcurrentModification { path: PathBuf },
    #[error("failed to load document")]
    Load(#[source] anyhow::Error),
    #[error("failed to persist document")]
    Persist(#[source] anyhow::Error),
}

/// What an apply did, for UIs and logs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplySummary {
    pub created_refs: Vec<String>,
    pub created_nets: Vec<String>,
    pub affected_refs: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ApplySummary {
    fn touch(&mut self, reference: &str) {
        if !self.affected_refs.iter().any(|r| r == reference) {
            self.affected_refs.push(reference.to_string());
        }
    }
}

#[derive(Debug)]
pub struct ApplyOutcome {
    pub document: Document,
    pub summary: ApplySummary,
}

// Auto-placement marches left to right in fixed steps, wrapping to a new row
// after a full column sweep. Occupied anchor grid points are skipped so new
// parts never stack on existing ones.
const PLACE_ORIGIN_MM: f64 = 25.4;
const PLACE_STEP_MM: f64 = 12.7;
const PLACE_COLUMNS: u32 = 10;

struct Placer {
    occupied: HashSet<GridPoint>,
    slot: u32,
}

impl Placer {
    fn new(doc: &Document) -> Self {
        Placer {
            occupied: doc.occupied_anchor_points(),
            slot: 0,
        }
    }

    fn mark(&mut self, p: Point) {
        self.occupied.insert(p.grid_key());
    }

    fn next(&mut self) -> Point {
        loop {
            let col = self.slot % PLACE_COLUMNS;
            let row = self.slot / PLACE_COLUMNS;
            self.slot += 1;
            let p = Point::new(
                PLACE_ORIGIN_MM + f64::from(col) * PLACE_STEP_MM,
                PLACE_ORIGIN_MM + f64::from(row) * PLACE_STEP_MM,
            );
            if self.occupied.insert(p.grid_key()) {
                return p;
            }
        }
    }
}

/// Grid points already carrying connectivity: wire ends, labels, resolvable
/// pins, symbol anchors. Soft labels must not land on any of these, or the
/// coordinate merge would short them onto an unrelated net.
fn connection_points(doc: &Document) -> HashSet<GridPoint> {
    let mut points = HashSet::new();
    for wire in &doc.wires {
        points.insert(wire.start.grid_key());
        points.insert(wire.end.grid_key());
    }
    for label in &doc.labels {
        points.insert(label.at.grid_key());
    }
    for symbol in &doc.symbols {
        points.insert(symbol.position.anchor().grid_key());
        for pin in ["1", "2"] {
            if let Ok(p) = resolve_pin(symbol, pin) {
                points.insert(p.grid_key());
            }
        }
        for pin in &symbol.pins {
            if let Some(at) = pin.at {
                points.insert(symbol.position.place(Point::new(at.x, at.y)).grid_key());
            }
        }
    }
    points
}

/// First free grid point marching right from `anchor`; marks it used.
fn free_label_point(anchor: Point, used: &mut HashSet<GridPoint>) -> Point {
    let mut k = 1i32;
    loop {
        let p = Point::new(anchor.x + f64::from(k) * GRID_MM, anchor.y);
        if used.insert(p.grid_key()) {
            return p;
        }
        k += 1;
    }
}

/// Smallest `NET_<k>` not colliding with any name in `used`; marks it used.
fn synthesize_net_name(used: &mut HashSet<String>) -> String {
    let mut k = 1u32;
    loop {
        let name = format!("NET_{k}");
        if used.insert(name.clone()) {
            return name;
        }
        k += 1;
    }
}

enum Resolved {
    /// Exact sheet coordinate, wireable.
    Point { at: Point, reference: Option<String> },
    /// Pin exists logically but its geometry is unknown.
    Soft { reference: String, pin: String },
}

fn resolve_endpoint(
    doc: &Document,
    index: usize,
    endpoint: &Endpoint,
) -> Result<Resolved, ApplyError> {
    match endpoint {
        Endpoint::At(p) => Ok(Resolved::Point {
            at: p.snapped(),
            reference: None,
        }),
        Endpoint::Pin { reference, pin } => {
            let symbol = doc
                .symbol(reference)
                .ok_or_else(|| ApplyError::UnknownReference {
                    index,
                    reference: reference.clone(),
                })?;
            match resolve_pin(symbol, pin) {
                Ok(at) => Ok(Resolved::Point {
                    at,
                    reference: Some(symbol.reference.clone()),
                }),
                // Missing geometry degrades to a soft connection; a pin the
                // populated table does not know is a planner error and
                // aborts the plan.
                Err(ResolveError::PinUnresolved { .. }) => Ok(Resolved::Soft {
                    reference: symbol.reference.clone(),
                    pin: pin.clone(),
                }),
                Err(source @ ResolveError::PinUnknown { .. }) => {
                    Err(ApplyError::UnknownPin { index, source })
                }
            }
        }
    }
}

/// Apply a plan to a document, returning the mutated copy and a summary.
///
/// Validation runs first, so a plan rejected by [`validate`] never reaches
/// the mutation loop. Connections whose pin geometry cannot be resolved
/// degrade to a pair of labels sharing a synthesized net name instead of
/// failing the whole plan; each degradation is reported as a warning
/// diagnostic.
pub fn apply_plan(doc: &Document, plan: &Plan) -> Result<ApplyOutcome, ApplyError> {
    validate(plan, doc)?;

    let mut next = doc.clone();
    let mut alloc = RefdesAllocator::from_existing(doc.refs());
    let mut placer = Placer::new(doc);
    let mut net_names: HashSet<String> = next.labels.iter().map(|l| l.text.clone()).collect();
    let mut used_points = connection_points(doc);
    let mut summary = ApplySummary::default();

    for (index, op) in plan.ops.iter().enumerate() {
        match op {
            Op::AddComponent {
                symbol,
                prefix,
                at,
                value,
                rot,
                fields,
            } => {
                let reference = alloc.allocate(prefix);
                let position = match at {
                    Some((x, y)) => {
                        let p = Point::new(*x, *y).snapped();
                        placer.mark(p);
                        Position {
                            x: p.x,
                            y: p.y,
                            rotation: *rot,
                            mirror: None,
                        }
                    }
                    None => {
                        let p = placer.next();
                        Position {
                            x: p.x,
                            y: p.y,
                            rotation: *rot,
                            mirror: None,
                        }
                    }
                };

                let mut sym = SchSymbol::new(reference.clone(), symbol.clone())
                    .with_position(position.clone());
                if !value.is_empty() {
                    sym.value = value.clone();
                }
                for (key, val) in fields {
                    sym.set_property(key.clone(), val.clone());
                }

                used_points.insert(position.anchor().grid_key());
                for pin in ["1", "2"] {
                    if let Ok(p) = resolve_pin(&sym, pin) {
                        used_points.insert(p.grid_key());
                    }
                }

                next.add_symbol(sym)
                    .map_err(|_| ApplyError::ReferenceCollision {
                        index,
                        reference: reference.clone(),
                    })?;

                log::debug!("placed {reference} ({symbol}) at ({:.2}, {:.2})", position.x, position.y);
                summary.diagnostics.push(
                    Diagnostic::info(
                        Stage::Writer,
                        format!(
                            "placed {reference} ({symbol}) at ({:.2}, {:.2})",
                            position.x, position.y
                        ),
                    )
                    .with_ref(&reference),
                );
                summary.touch(&reference);
                summary.created_refs.push(reference);
            }

            Op::Wire { from, to } | Op::Connect { from, to } => {
                let a = resolve_endpoint(&next, index, from)?;
                let b = resolve_endpoint(&next, index, to)?;

                for r in [&a, &b] {
                    match r {
                        Resolved::Point {
                            reference: Some(reference),
                            ..
                        }
                        | Resolved::Soft { reference, .. } => summary.touch(reference),
                        Resolved::Point { reference: None, .. } => {}
                    }
                }

                match (&a, &b) {
                    (
                        Resolved::Point { at: start, .. },
                        Resolved::Point { at: end, .. },
                    ) => {
                        next.add_wire(Wire::new(*start, *end));
                        used_points.insert(start.grid_key());
                        used_points.insert(end.grid_key());
                        summary.diagnostics.push(Diagnostic::info(
                            Stage::Writer,
                            format!("wired {from} to {to}"),
                        ));
                    }
                    _ => {
                        // Soft connection: one label per endpoint, joined by
                        // a fresh synthesized net name. The net model treats
                        // this as equivalent to a drawn wire.
                        let net = synthesize_net_name(&mut net_names);
                        for resolved in [&a, &b] {
                            let label = match resolved {
                                Resolved::Point { at, .. } => {
                                    used_points.insert(at.grid_key());
                                    Label {
                                        text: net.clone(),
                                        at: *at,
                                        kind: Default::default(),
                                        binds: None,
                                    }
                                }
                                Resolved::Soft { reference, pin } => {
                                    // Each soft label gets its own grid
                                    // point next to the anchor; stacking
                                    // them would merge unrelated nets by
                                    // coordinate.
                                    let anchor = next
                                        .symbol(reference)
                                        .map(|s| s.position.anchor())
                                        .unwrap_or_default();
                                    Label {
                                        text: net.clone(),
                                        at: free_label_point(anchor, &mut used_points),
                                        kind: Default::default(),
                                        binds: Some(PinBinding {
                                            reference: reference.clone(),
                                            pin: pin.clone(),
                                        }),
                                    }
                                }
                            };
                            next.add_label(label);
                        }

                        log::warn!("connection {from} -> {to} degraded to labels on net {net}");
                        summary.diagnostics.push(
                            Diagnostic::warning(
                                Stage::Writer,
                                format!(
                                    "pin geometry unavailable for {from} -> {to}; \
                                     connected via labels on net {net}"
                                ),
                            )
                            .with_suggestion(
                                "reload the document once pin tables are available and \
                                 replace the labels with a drawn wire",
                            ),
                        );
                        summary.created_nets.push(net);
                    }
                }
            }

            Op::Label { net, at, kind } => {
                let p = Point::new(at.0, at.1).snapped();
                used_points.insert(p.grid_key());
                next.add_label(Label {
                    text: net.clone(),
                    at: p,
                    kind: *kind,
                    binds: None,
                });
                if net_names.insert(net.clone()) {
                    summary.created_nets.push(net.clone());
                }
                summary.diagnostics.push(Diagnostic::info(
                    Stage::Writer,
                    format!("labelled {p} as {net}"),
                ));
            }

            Op::SetProperty {
                reference,
                key,
                value,
            } => {
                let symbol =
                    next.symbol_mut(reference)
                        .ok_or_else(|| ApplyError::UnknownReference {
                            index,
                            reference: reference.clone(),
                        })?;
                symbol.set_property(key.clone(), value.clone());
                let canonical = symbol.reference.clone();
                summary.diagnostics.push(
                    Diagnostic::info(Stage::Writer, format!("set {canonical} {key} = {value}"))
                        .with_ref(&canonical),
                );
                summary.touch(&canonical);
            }
        }
    }

    Ok(ApplyOutcome {
        document: next,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::Severity;
    use kdraft_sch::position::GRID_MM;
    use std::collections::BTreeMap;

    fn add(prefix: &str, symbol: &str, at: Option<(f64, f64)>) -> Op {
        Op::AddComponent {
            symbol: symbol.into(),
            prefix: prefix.into(),
            at,
            value: String::new(),
            rot: 0.0,
            fields: BTreeMap::new(),
        }
    }

    #[test]
    fn add_component_allocates_smallest_gap() {
        let mut doc = Document::new();
        doc.add_symbol(SchSymbol::new("R1", "Device:R")).unwrap();
        doc.add_symbol(SchSymbol::new("R3", "Device:R")).unwrap();

        let plan = Plan::new(vec![add("R", "Device:R", None), add("R", "Device:R", None)]);
        let out = apply_plan(&doc, &plan).unwrap();
        assert_eq!(out.summary.created_refs, vec!["R2", "R4"]);
        assert_eq!(out.document.symbols.len(), 4);
        // Input untouched.
        assert_eq!(doc.symbols.len(), 2);
    }

    #[test]
    fn explicit_placement_is_snapped_to_grid() {
        let plan = Plan::new(vec![add("C", "Device:C", Some((10.1, 12.6)))]);
        let out = apply_plan(&Document::new(), &plan).unwrap();
        let c1 = out.document.symbol("C1").unwrap();
        assert_eq!(c1.position.anchor().grid_key(), GridPoint::from_mm(10.16, 12.7));
    }

    #[test]
    fn auto_placement_skips_occupied_points_and_wraps() {
        let mut doc = Document::new();
        doc.add_symbol(
            SchSymbol::new("R1", "Device:R")
                .with_position(Position::new(PLACE_ORIGIN_MM, PLACE_ORIGIN_MM)),
        )
        .unwrap();

        let plan = Plan::new(vec![add("R", "Device:R", None)]);
        let out = apply_plan(&doc, &plan).unwrap();
        let r2 = out.document.symbol("R2").unwrap();
        // First slot is taken by R1, so R2 lands one step to the right.
        assert_eq!(
            r2.position.anchor().grid_key(),
            GridPoint::from_mm(PLACE_ORIGIN_MM + PLACE_STEP_MM, PLACE_ORIGIN_MM)
        );
    }

    #[test]
    fn wiring_two_terminal_pins_adds_a_wire_at_resolved_points() {
        let plan = Plan::new(vec![
            add("R", "Device:R", Some((25.4, 25.4))),
            add("D", "Device:LED", Some((50.8, 25.4))),
            Op::Connect {
                from: Endpoint::pin("R1", "2"),
                to: Endpoint::pin("D1", "A"),
            },
        ]);
        let out = apply_plan(&Document::new(), &plan).unwrap();
        assert_eq!(out.document.wires.len(), 1);
        let wire = &out.document.wires[0];
        assert_eq!(wire.start.grid_key(), GridPoint::from_mm(25.4 + GRID_MM, 25.4));
        assert_eq!(wire.end.grid_key(), GridPoint::from_mm(50.8 - GRID_MM, 25.4));
        assert!(out.summary.created_nets.is_empty());
    }

    #[test]
    fn unresolved_pin_degrades_to_labels_with_shared_net() {
        let plan = Plan::new(vec![
            add("R", "Device:R", Some((25.4, 25.4))),
            add("U", "Amp:OPA333", Some((50.8, 25.4))),
            Op::Connect {
                from: Endpoint::pin("R1", "1"),
                to: Endpoint::pin("U1", "3"),
            },
        ]);
        let out = apply_plan(&Document::new(), &plan).unwrap();

        assert!(out.document.wires.is_empty());
        assert_eq!(out.document.labels.len(), 2);
        assert_eq!(out.document.labels[0].text, out.document.labels[1].text);
        assert_eq!(out.summary.created_nets, vec!["NET_1"]);

        // The resolved side sits exactly on the pin point; the soft side
        // records which pin it stands in for.
        assert_eq!(
            out.document.labels[0].at.grid_key(),
            GridPoint::from_mm(25.4 - GRID_MM, 25.4)
        );
        let binding = out.document.labels[1].binds.as_ref().unwrap();
        assert_eq!(binding.reference, "U1");
        assert_eq!(binding.pin, "3");

        assert!(
            out.summary
                .diagnostics
                .iter()
                .any(|d| d.severity == Severity::Warning)
        );
    }

    #[test]
    fn soft_labels_for_one_symbol_land_on_distinct_points() {
        // Two degraded connections to the same pin-table-less symbol must
        // not stack their labels on one grid point.
        let mut doc = Document::new();
        doc.add_symbol(SchSymbol::new("U1", "Amp:OPA333").with_position(Position::new(50.8, 25.4)))
            .unwrap();

        let plan = Plan::new(vec![
            add("R", "Device:R", Some((25.4, 25.4))),
            add("R", "Device:R", Some((25.4, 50.8))),
            Op::Connect {
                from: Endpoint::pin("R1", "2"),
                to: Endpoint::pin("U1", "5"),
            },
            Op::Connect {
                from: Endpoint::pin("R2", "2"),
                to: Endpoint::pin("U1", "6"),
            },
        ]);
        let out = apply_plan(&doc, &plan).unwrap();

        assert_eq!(out.summary.created_nets, vec!["NET_1", "NET_2"]);
        let soft: Vec<_> = out
            .document
            .labels
            .iter()
            .filter(|l| l.binds.is_some())
            .collect();
        assert_eq!(soft.len(), 2);
        assert_ne!(soft[0].at.grid_key(), soft[1].at.grid_key());
        // Neither sits on the symbol anchor either.
        for label in soft {
            assert_ne!(label.at.grid_key(), GridPoint::from_mm(50.8, 25.4));
        }
    }

    #[test]
    fn unknown_pin_on_a_populated_table_aborts_the_plan() {
        let mut u = SchSymbol::new("U1", "Amp:OPA333");
        u.pins = vec![kdraft_sch::pin::Pin {
            name: "OUT".into(),
            number: "1".into(),
            at: Some(kdraft_sch::pin::PinAt {
                x: 7.62,
                y: 0.0,
                rotation: None,
            }),
            electrical_type: None,
            hidden: false,
        }];
        let mut doc = Document::new();
        doc.add_symbol(u).unwrap();

        let plan = Plan::new(vec![Op::Connect {
            from: Endpoint::pin("U1", "99"),
            to: Endpoint::at(0.0, 0.0),
        }]);
        let err = apply_plan(&doc, &plan).unwrap_err();
        match err {
            ApplyError::UnknownPin { index, source } => {
                assert_eq!(index, 0);
                assert!(matches!(source, ResolveError::PinUnknown { .. }));
            }
            other => panic!("expected UnknownPin, got {other:?}"),
        }
        // The typo'd pin is a hard failure, never a dangling labeled net.
        assert!(doc.labels.is_empty());
    }

    #[test]
    fn synthesized_net_names_avoid_existing_labels() {
        let mut doc = Document::new();
        doc.add_symbol(SchSymbol::new("U1", "Amp:OPA333")).unwrap();
        doc.add_label(Label {
            text: "NET_1".into(),
            at: Point::new(0.0, 0.0),
            kind: Default::default(),
            binds: None,
        });

        let plan = Plan::new(vec![Op::Connect {
            from: Endpoint::pin("U1", "3"),
            to: Endpoint::at(12.7, 12.7),
        }]);
        let out = apply_plan(&doc, &plan).unwrap();
        assert_eq!(out.summary.created_nets, vec!["NET_2"]);
    }

    #[test]
    fn label_op_snaps_and_records_new_nets_once() {
        let plan = Plan::new(vec![
            Op::Label {
                net: "VCC".into(),
                at: (12.6, 0.1),
                kind: Default::default(),
            },
            Op::Label {
                net: "VCC".into(),
                at: (0.0, 0.0),
                kind: Default::default(),
            },
        ]);
        let out = apply_plan(&Document::new(), &plan).unwrap();
        assert_eq!(out.document.labels.len(), 2);
        assert_eq!(out.document.labels[0].at.grid_key(), GridPoint::from_mm(12.7, 0.0));
        assert_eq!(out.summary.created_nets, vec!["VCC"]);
    }

    #[test]
    fn set_property_reaches_plan_created_components() {
        let plan = Plan::new(vec![
            add("R", "Device:R", None),
            Op::SetProperty {
                reference: "r1".into(),
                key: "Value".into(),
                value: "4k7".into(),
            },
        ]);
        let out = apply_plan(&Document::new(), &plan).unwrap();
        assert_eq!(out.document.symbol("R1").unwrap().value, "4k7");
        assert_eq!(out.summary.affected_refs, vec!["R1"]);
    }

    #[test]
    fn invalid_plan_fails_before_any_mutation() {
        let doc = Document::new();
        let plan = Plan::new(vec![
            add("R", "Device:R", None),
            Op::SetProperty {
                reference: "U9".into(),
                key: "MPN".into(),
                value: "X".into(),
            },
        ]);
        let err = apply_plan(&doc, &plan).unwrap_err();
        assert!(matches!(err, ApplyError::Validation(_)));
        assert!(doc.symbols.is_empty());
    }
}
