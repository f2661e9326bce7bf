//! In-memory schematic document model for the kdraft edit engine.
//!
//! The central structure is [`Document`]: symbols, wires, labels and child
//! sheet references, all serialisable with `serde` so a document snapshot can
//! be stored or transferred as JSON. Parsing the native schematic file format
//! is the codec collaborator's job, behind the [`codec::DocumentCodec`]
//! trait; this crate only models and mutates the object graph.
//!
//! Electrical nets are deliberately absent here. They are derived data,
//! recomputed on demand by the inspector crate.

pub mod codec;
pub mod pin;
pub mod position;
pub mod refdes;

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::pin::Pin;
use crate::position::{GridPoint, Point, Position};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocError {
    #[error("reference '{reference}' already exists in the document")]
    ReferenceCollision { reference: String },
}

/// A placed symbol instance.
///
/// `pins` is the symbol's pin table as exposed by the codec. It may be empty
/// for freshly created symbols whose library definition has not been loaded
/// yet; the coordinate resolver treats that as a soft failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchSymbol {
    pub reference: String,
    pub lib_id: String,
    #[serde(default)]
    pub value: String,
    pub position: Position,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pins: Vec<Pin>,
}

impl SchSymbol {
    pub fn new(reference: impl Into<String>, lib_id: impl Into<String>) -> Self {
        SchSymbol {
            reference: reference.into(),
            lib_id: lib_id.into(),
            value: String::new(),
            position: Position::default(),
            properties: BTreeMap::new(),
            pins: Vec::new(),
        }
    }

    /// Builder-style placement that consumes `self`.
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Builder-style value assignment that consumes `self`.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    /// Set or overwrite a property. Keys are schemaless beyond the reserved
    /// `Value`, which is routed to the dedicated field.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        if key.eq_ignore_ascii_case("value") {
            self.value = value.into();
        } else {
            self.properties.insert(key, value.into());
        }
        self
    }

    /// Designator prefix (letters before the numeric suffix), uppercased.
    pub fn prefix(&self) -> String {
        refdes::parse_refdes(&self.reference)
            .map(|p| p.prefix)
            .unwrap_or_else(|| self.reference.to_ascii_uppercase())
    }
}

/// A straight wire segment between two sheet coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wire {
    pub start: Point,
    pub end: Point,
}

impl Wire {
    pub fn new(start: Point, end: Point) -> Self {
        Wire { start, end }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LabelKind {
    #[default]
    Local,
    Global,
    Hierarchical,
}

/// A net label annotation. Labels with identical text bind the points they
/// sit on into one net; hierarchical labels additionally cross the sheet
/// boundary through the matching sheet pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub text: String,
    pub at: Point,
    #[serde(default)]
    pub kind: LabelKind,
    /// Pin this label stands in for when it was placed as a soft connection
    /// for a pin whose exact geometry was unknown. Net computation treats the
    /// bound pin as a member of the label's net.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binds: Option<PinBinding>,
}

/// A `(reference, pin)` pair named by a soft-connection label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinBinding {
    pub reference: String,
    pub pin: String,
}

/// A pin on a child sheet's boundary, as seen from the parent sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierPin {
    pub name: String,
    pub at: Point,
}

/// Reference to a child sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetRef {
    pub name: String,
    pub file: PathBuf,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pins: Vec<HierPin>,
}

/// Complete mutable schematic state for one sheet.
///
/// Invariant: symbol references are unique, compared case-insensitively.
/// [`Document::add_symbol`] is the only insertion path and enforces this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Document {
    #[serde(default)]
    pub symbols: Vec<SchSymbol>,
    #[serde(default)]
    pub wires: Vec<Wire>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sheets: Vec<SheetRef>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a symbol by reference, case-insensitively.
    pub fn symbol(&self, reference: &str) -> Option<&SchSymbol> {
        self.symbols
            .iter()
            .find(|s| s.reference.eq_ignore_ascii_case(reference))
    }

    pub fn symbol_mut(&mut self, reference: &str) -> Option<&mut SchSymbol> {
        self.symbols
            .iter_mut()
            .find(|s| s.reference.eq_ignore_ascii_case(reference))
    }

    /// Insert a symbol, rejecting duplicate references.
    pub fn add_symbol(&mut self, symbol: SchSymbol) -> Result<(), DocError> {
        if self.symbol(&symbol.reference).is_some() {
            return Err(DocError::ReferenceCollision {
                reference: symbol.reference,
            });
        }
        self.symbols.push(symbol);
        Ok(())
    }

    pub fn refs(&self) -> impl Iterator<Item = &str> {
        self.symbols.iter().map(|s| s.reference.as_str())
    }

    pub fn add_wire(&mut self, wire: Wire) -> &mut Self {
        self.wires.push(wire);
        self
    }

    pub fn add_label(&mut self, label: Label) -> &mut Self {
        self.labels.push(label);
        self
    }

    /// Grid points occupied by symbol anchors, used by the placement
    /// heuristic to avoid stacking new parts.
    pub fn occupied_anchor_points(&self) -> HashSet<GridPoint> {
        self.symbols
            .iter()
            .map(|s| s.position.anchor().grid_key())
            .collect()
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
