//! Read-only inspection of schematic documents.
//!
//! Everything here takes `&Document` and derives structure from it: nets
//! via union-find over grid points, per-sheet reports, and hierarchical
//! traversal with cycle detection. Nothing in this crate mutates a document.

pub mod hierarchy;
pub mod nets;
pub mod report;

pub use hierarchy::{
    HierarchyReport, InspectError, SheetConnection, SheetLoader, inspect_hierarchy,
};
pub use nets::{Net, NetMember, compute_nets, net_of};
pub use report::{
    ComponentReport, LabelReport, SheetReport, SheetStats, find_component,
    find_components_matching, inspect, search_components,
};
