//! Hierarchical sheet traversal.
//!
//! Walks the sheet tree through a [`SheetLoader`], producing a report per
//! sheet and matching parent hierarchical labels with child sheet pins.
//! Traversal keeps an explicit ancestor stack; a sheet that references an
//! ancestor is a cycle error, never unbounded recursion.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use kdraft_sch::{Document, LabelKind};

use crate::nets::Net;
use crate::report::{SheetReport, inspect};

/// Resolves a child sheet file to a loaded document.
///
/// Paths arrive as stored in the parent sheet, already joined onto the
/// parent's directory. An implementation backed by a codec reads the file;
/// tests use an in-memory map.
pub trait SheetLoader {
    fn load_sheet(&self, path: &Path) -> anyhow::Result<Document>;
}

#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error("sheet hierarchy cycle through {}", path.display())]
    HierarchyCycle { path: PathBuf },
    #[error("failed to load sheet {}", path.display())]
    SheetLoad {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

/// A parent-side hierarchical connection into a child sheet.
#[derive(Debug, Clone, Serialize)]
pub struct SheetConnection {
    /// Sheet name in the parent.
    pub sheet: String,
    /// Hierarchical pin name on the sheet boundary.
    pub pin: String,
    /// Net in the parent touching the pin point, if any.
    pub parent_net: Option<String>,
    /// Net in the child carrying a hierarchical label of the pin's name.
    pub child_net: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HierarchyReport {
    pub root: SheetReport,
    /// Reports for every reachable child sheet, keyed by sheet name.
    pub sheets: BTreeMap<String, SheetReport>,
    /// How parent nets continue into child sheets.
    pub connections: Vec<SheetConnection>,
}

/// Inspect a document and every sheet reachable from it.
pub fn inspect_hierarchy<L: SheetLoader>(
    root: &Document,
    root_dir: &Path,
    loader: &L,
) -> Result<HierarchyReport, InspectError> {
    let mut sheets = BTreeMap::new();
    let mut connections = Vec::new();
    let mut stack: Vec<PathBuf> = Vec::new();

    walk(root, root_dir, loader, &mut stack, &mut sheets, &mut connections)?;

    Ok(HierarchyReport {
        root: inspect(root),
        sheets,
        connections,
    })
}

fn walk<L: SheetLoader>(
    doc: &Document,
    dir: &Path,
    loader: &L,
    stack: &mut Vec<PathBuf>,
    sheets: &mut BTreeMap<String, SheetReport>,
    connections: &mut Vec<SheetConnection>,
) -> Result<(), InspectError> {
    let parent_nets = crate::nets::compute_nets(doc);

    for sheet in &doc.sheets {
        let path = dir.join(&sheet.file);
        if stack.contains(&path) {
            return Err(InspectError::HierarchyCycle { path });
        }

        let child = loader
            .load_sheet(&path)
            .map_err(|source| InspectError::SheetLoad {
                path: path.clone(),
                source,
            })?;
        let child_report = inspect(&child);

        for pin in &sheet.pins {
            connections.push(SheetConnection {
                sheet: sheet.name.clone(),
                pin: pin.name.clone(),
                parent_net: net_at(&parent_nets, pin.at.grid_key()),
                child_net: hier_net(&child, &child_report.nets, &pin.name),
            });
        }

        sheets.insert(sheet.name.clone(), child_report);

        stack.push(path.clone());
        let child_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        walk(&child, &child_dir, loader, stack, sheets, connections)?;
        stack.pop();
    }

    Ok(())
}

fn net_at(nets: &[Net], point: kdraft_sch::position::GridPoint) -> Option<String> {
    nets.iter()
        .find(|n| n.contains_point(point))
        .map(|n| n.name.clone())
}

/// Net in a child sheet exported under `name` via a hierarchical label.
fn hier_net(child: &Document, nets: &[Net], name: &str) -> Option<String> {
    child
        .labels
        .iter()
        .find(|l| l.kind == LabelKind::Hierarchical && l.text == name)
        .and_then(|l| net_at(nets, l.at.grid_key()))
        .or_else(|| nets.iter().find(|n| n.name == name).map(|n| n.name.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kdraft_sch::position::{GRID_MM, Point, Position};
    use kdraft_sch::{HierPin, Label, SchSymbol, SheetRef, Wire};
    use std::collections::HashMap;

    struct MapLoader(HashMap<PathBuf, Document>);

    impl SheetLoader for MapLoader {
        fn load_sheet(&self, path: &Path) -> anyhow::Result<Document> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no sheet at {}", path.display()))
        }
    }

    fn sheet_ref(name: &str, file: &str, pins: Vec<HierPin>) -> SheetRef {
        SheetRef {
            name: name.into(),
            file: file.into(),
            pins,
        }
    }

    #[test]
    fn traversal_collects_child_reports() {
        let mut root = Document::new();
        root.sheets.push(sheet_ref("power", "power.json", vec![]));

        let mut power = Document::new();
        power
            .add_symbol(SchSymbol::new("C1", "Device:C"))
            .unwrap();

        let loader = MapLoader(HashMap::from([(PathBuf::from("power.json"), power)]));
        let report = inspect_hierarchy(&root, Path::new(""), &loader).unwrap();
        assert_eq!(report.sheets.len(), 1);
        assert_eq!(report.sheets["power"].stats.components, 1);
    }

    #[test]
    fn cycle_is_detected_not_recursed() {
        let mut a = Document::new();
        a.sheets.push(sheet_ref("b", "b.json", vec![]));
        let mut b = Document::new();
        b.sheets.push(sheet_ref("a", "a.json", vec![]));

        let loader = MapLoader(HashMap::from([
            (PathBuf::from("a.json"), a.clone()),
            (PathBuf::from("b.json"), b),
        ]));
        // Walking from a: a -> b -> a must stop with a cycle error.
        let err = inspect_hierarchy(&a, Path::new(""), &loader).unwrap_err();
        match err {
            InspectError::HierarchyCycle { path } => {
                assert_eq!(path, PathBuf::from("b.json"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn self_referencing_sheet_is_a_cycle() {
        let mut a = Document::new();
        a.sheets.push(sheet_ref("a", "a.json", vec![]));
        let loader = MapLoader(HashMap::from([(PathBuf::from("a.json"), a.clone())]));
        assert!(matches!(
            inspect_hierarchy(&a, Path::new(""), &loader),
            Err(InspectError::HierarchyCycle { .. })
        ));
    }

    #[test]
    fn missing_sheet_is_a_load_error() {
        let mut root = Document::new();
        root.sheets.push(sheet_ref("gone", "gone.json", vec![]));
        let loader = MapLoader(HashMap::new());
        assert!(matches!(
            inspect_hierarchy(&root, Path::new(""), &loader),
            Err(InspectError::SheetLoad { .. })
        ));
    }

    #[test]
    fn hierarchical_pin_joins_parent_and_child_nets() {
        // Parent: R1 pin 2 wired to the sheet pin "CLK".
        let pin_at = Point::new(50.8, 25.4);
        let mut root = Document::new();
        root.add_symbol(SchSymbol::new("R1", "Device:R").with_position(Position::new(25.4, 25.4)))
            .unwrap();
        root.add_wire(Wire::new(Point::new(25.4 + GRID_MM, 25.4), pin_at));
        root.sheets.push(sheet_ref(
            "mcu",
            "mcu.json",
            vec![HierPin {
                name: "CLK".into(),
                at: pin_at,
            }],
        ));

        // Child: hierarchical label CLK on R5 pin 1.
        let mut mcu = Document::new();
        mcu.add_symbol(SchSymbol::new("R5", "Device:R").with_position(Position::new(12.7, 12.7)))
            .unwrap();
        mcu.add_label(Label {
            text: "CLK".into(),
            at: Point::new(12.7 - GRID_MM, 12.7),
            kind: LabelKind::Hierarchical,
            binds: None,
        });

        let loader = MapLoader(HashMap::from([(PathBuf::from("mcu.json"), mcu)]));
        let report = inspect_hierarchy(&root, Path::new(""), &loader).unwrap();

        assert_eq!(report.connections.len(), 1);
        let conn = &report.connections[0];
        assert_eq!(conn.sheet, "mcu");
        assert_eq!(conn.pin, "CLK");
        assert!(conn.parent_net.is_some());
        assert_eq!(conn.child_net.as_deref(), Some("CLK"));
    }
}
