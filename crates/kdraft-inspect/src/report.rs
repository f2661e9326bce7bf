//! Per-sheet structural reports and component queries.

use std::collections::BTreeMap;

use serde::Serialize;

use kdraft_sch::{Document, LabelKind, SchSymbol};

use crate::nets::{Net, compute_nets};

#[derive(Debug, Clone, Serialize)]
pub struct ComponentReport {
    pub reference: String,
    pub symbol: String,
    pub value: String,
    pub x: f64,
    pub y: f64,
    pub rotation: f64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    pub pin_count: usize,
}

impl ComponentReport {
    fn of(symbol: &SchSymbol) -> Self {
        ComponentReport {
            reference: symbol.reference.clone(),
            symbol: symbol.lib_id.clone(),
            value: symbol.value.clone(),
            x: symbol.position.x,
            y: symbol.position.y,
            rotation: symbol.position.rotation,
            properties: symbol.properties.clone(),
            pin_count: symbol.pins.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelReport {
    pub text: String,
    pub kind: LabelKind,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SheetStats {
    pub components: usize,
    pub wires: usize,
    pub labels: usize,
    pub nets: usize,
    /// Component count per designator prefix (R, C, U, ...).
    pub component_types: BTreeMap<String, usize>,
}

/// Everything a caller needs to reason about one sheet without touching it.
#[derive(Debug, Clone, Serialize)]
pub struct SheetReport {
    pub components: Vec<ComponentReport>,
    pub nets: Vec<Net>,
    pub labels: Vec<LabelReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub child_sheets: Vec<String>,
    pub stats: SheetStats,
}

/// Build the full report for a sheet. Read-only.
pub fn inspect(doc: &Document) -> SheetReport {
    let nets = compute_nets(doc);

    let mut components: Vec<ComponentReport> = doc.symbols.iter().map(ComponentReport::of).collect();
    components.sort_by(|a, b| natord::compare(&a.reference, &b.reference));

    let mut component_types: BTreeMap<String, usize> = BTreeMap::new();
    for symbol in &doc.symbols {
        *component_types.entry(symbol.prefix()).or_default() += 1;
    }

    let labels = doc
        .labels
        .iter()
        .map(|l| LabelReport {
            text: l.text.clone(),
            kind: l.kind,
            x: l.at.x,
            y: l.at.y,
        })
        .collect::<Vec<_>>();

    let stats = SheetStats {
        components: doc.symbols.len(),
        wires: doc.wires.len(),
        labels: doc.labels.len(),
        nets: nets.len(),
        component_types,
    };

    SheetReport {
        components,
        nets,
        labels,
        child_sheets: doc.sheets.iter().map(|s| s.name.clone()).collect(),
        stats,
    }
}

/// Report for a single component, looked up case-insensitively.
pub fn find_component(doc: &Document, reference: &str) -> Option<ComponentReport> {
    doc.symbol(reference).map(ComponentReport::of)
}

/// Components whose reference matches a shell-style wildcard pattern,
/// case-insensitively. `*` matches any run of characters and `?` exactly
/// one, so `R?` matches `R1` but not `R10`.
pub fn find_components_matching(
    doc: &Document,
    pattern: &str,
) -> Result<Vec<ComponentReport>, regex::Error> {
    let mut re = String::from("^(?i)");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    let re = regex::Regex::new(&re)?;

    let mut found: Vec<ComponentReport> = doc
        .symbols
        .iter()
        .filter(|s| re.is_match(&s.reference))
        .map(ComponentReport::of)
        .collect();
    found.sort_by(|a, b| natord::compare(&a.reference, &b.reference));
    Ok(found)
}

/// Free-text component search over reference, value and library id.
pub fn search_components(doc: &Document, query: &str) -> Vec<ComponentReport> {
    let needle = query.to_ascii_lowercase();
    let mut found: Vec<ComponentReport> = doc
        .symbols
        .iter()
        .filter(|s| {
            s.reference.to_ascii_lowercase().contains(&needle)
                || s.value.to_ascii_lowercase().contains(&needle)
                || s.lib_id.to_ascii_lowercase().contains(&needle)
        })
        .map(ComponentReport::of)
        .collect();
    found.sort_by(|a, b| natord::compare(&a.reference, &b.reference));
    found
}
