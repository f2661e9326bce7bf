//! Derived electrical connectivity.
//!
//! Nets are never stored in the document; they are recomputed here on demand
//! with a union-find over quantised grid points. Two points belong to the
//! same net when a wire joins them, when they coincide on the grid, or when
//! labels of identical text sit on both.

use std::collections::HashMap;

use petgraph::unionfind::UnionFind;
use serde::Serialize;

use kdraft_sch::pin::{is_two_terminal, resolve_pin};
use kdraft_sch::position::GridPoint;
use kdraft_sch::Document;

/// A `(reference, pin)` attachment to a net.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetMember {
    pub reference: String,
    pub pin: String,
}

/// One computed net.
#[derive(Debug, Clone, Serialize)]
pub struct Net {
    pub name: String,
    /// Set when no label names this net and the name was synthesized.
    pub synthesized: bool,
    pub members: Vec<NetMember>,
    /// All label texts on the net; the smallest one doubles as `name`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip)]
    pub(crate) points: Vec<GridPoint>,
}

impl Net {
    pub fn has_member(&self, reference: &str, pin: &str) -> bool {
        self.members
            .iter()
            .any(|m| m.reference.eq_ignore_ascii_case(reference) && m.pin == pin)
    }

    pub(crate) fn contains_point(&self, point: GridPoint) -> bool {
        self.points.contains(&point)
    }
}

enum Attach {
    Member(NetMember),
    Label(String),
}

/// Compute all nets of one sheet.
///
/// A net is emitted when it carries at least one label or joins two or more
/// pins; a bare wire touching nothing is not a net. Unnamed nets get
/// synthesized `N$<k>` names, numbered by the net's smallest grid point so
/// the same document always yields the same names.
pub fn compute_nets(doc: &Document) -> Vec<Net> {
    let mut index: HashMap<GridPoint, usize> = HashMap::new();
    let mut points: Vec<GridPoint> = Vec::new();
    let mut edges: Vec<(usize, usize)> = Vec::new();
    let mut attachments: Vec<(usize, Attach)> = Vec::new();

    fn intern(
        index: &mut HashMap<GridPoint, usize>,
        points: &mut Vec<GridPoint>,
        p: GridPoint,
    ) -> usize {
        *index.entry(p).or_insert_with(|| {
            points.push(p);
            points.len() - 1
        })
    }

    for wire in &doc.wires {
        let a = intern(&mut index, &mut points, wire.start.grid_key());
        let b = intern(&mut index, &mut points, wire.end.grid_key());
        edges.push((a, b));
    }

    for symbol in &doc.symbols {
        let pin_ids: Vec<String> = if symbol.pins.is_empty() && is_two_terminal(&symbol.lib_id) {
            vec!["1".into(), "2".into()]
        } else {
            symbol.pins.iter().map(|p| p.number.clone()).collect()
        };
        for pin in pin_ids {
            if let Ok(at) = resolve_pin(symbol, &pin) {
                let i = intern(&mut index, &mut points, at.grid_key());
                attachments.push((
                    i,
                    Attach::Member(NetMember {
                        reference: symbol.reference.clone(),
                        pin,
                    }),
                ));
            }
        }
    }

    // Sheet pins join the parent net like a component pin would, with the
    // sheet name standing in for the reference.
    for sheet in &doc.sheets {
        for pin in &sheet.pins {
            let i = intern(&mut index, &mut points, pin.at.grid_key());
            attachments.push((
                i,
                Attach::Member(NetMember {
                    reference: sheet.name.clone(),
                    pin: pin.name.clone(),
                }),
            ));
        }
    }

    // Labels attach their text at their point; labels of identical text are
    // unioned with each other through the first occurrence.
    let mut first_label: HashMap<&str, usize> = HashMap::new();
    for label in &doc.labels {
        let i = intern(&mut index, &mut points, label.at.grid_key());
        attachments.push((i, Attach::Label(label.text.clone())));
        if let Some(binding) = &label.binds {
            attachments.push((
                i,
                Attach::Member(NetMember {
                    reference: binding.reference.clone(),
                    pin: binding.pin.clone(),
                }),
            ));
        }
        match first_label.get(label.text.as_str()) {
            Some(&j) => edges.push((i, j)),
            None => {
                first_label.insert(&label.text, i);
            }
        }
    }

    let mut uf: UnionFind<usize> = UnionFind::new(points.len());
    for (a, b) in edges {
        uf.union(a, b);
    }

    struct Group {
        members: Vec<NetMember>,
        labels: Vec<String>,
        points: Vec<GridPoint>,
    }
    let mut groups: HashMap<usize, Group> = HashMap::new();
    for (i, p) in points.iter().enumerate() {
        groups
            .entry(uf.find(i))
            .or_insert_with(|| Group {
                members: Vec::new(),
                labels: Vec::new(),
                points: Vec::new(),
            })
            .points
            .push(*p);
    }
    for (i, attach) in attachments {
        let group = groups.get_mut(&uf.find(i)).expect("attachment on interned point");
        match attach {
            Attach::Member(m) => {
                if !group.members.contains(&m) {
                    group.members.push(m);
                }
            }
            Attach::Label(text) => {
                if !group.labels.contains(&text) {
                    group.labels.push(text);
                }
            }
        }
    }

    let mut groups: Vec<Group> = groups.into_values().collect();
    for g in &mut groups {
        g.points.sort();
        g.labels.sort_by(|a, b| natord::compare(a, b));
        g.members.sort_by(|a, b| {
            natord::compare(&a.reference, &b.reference).then_with(|| natord::compare(&a.pin, &b.pin))
        });
    }
    groups.sort_by_key(|g| g.points.first().copied());

    let mut nets = Vec::new();
    let mut synth = 0u32;
    for g in groups {
        if g.labels.is_empty() && g.members.len() < 2 {
            continue;
        }
        let (name, synthesized) = match g.labels.first() {
            Some(text) => (text.clone(), false),
            None => {
                synth += 1;
                (format!("N${synth}"), true)
            }
        };
        nets.push(Net {
            name,
            synthesized,
            members: g.members,
            labels: g.labels,
            points: g.points,
        });
    }
    nets.sort_by(|a, b| natord::compare(&a.name, &b.name));

    log::debug!("computed {} net(s)", nets.len());
    nets
}

/// Name of the net a `(reference, pin)` endpoint belongs to, if any.
pub fn net_of(nets: &[Net], reference: &str, pin: &str) -> Option<String> {
    nets.iter()
        .find(|n| n.has_member(reference, pin))
        .map(|n| n.name.clone())
}
