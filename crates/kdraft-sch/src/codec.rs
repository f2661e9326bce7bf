//! Document persistence boundary.
//!
//! The engine never parses the native schematic format itself; it loads and
//! persists whole [`Document`] objects through a [`DocumentCodec`]. The
//! bundled [`JsonCodec`] round-trips the engine's own snapshot format and is
//! what the tests (and any tooling that stores intermediate state) use.

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use atomicwrites::{AtomicFile, OverwriteBehavior};

use crate::Document;

/// Load/persist contract implemented by schematic file codecs.
///
/// Callers are expected to load a fresh document immediately before an apply
/// and persist immediately after a successful one, keeping the window for a
/// concurrent external edit small.
pub trait DocumentCodec {
    fn load(&self, path: &Path) -> anyhow::Result<Document>;

    /// Persist must be atomic: on failure the previous file content stays
    /// intact.
    fn persist(&self, path: &Path, document: &Document) -> anyhow::Result<()>;
}

/// Codec for the engine's JSON snapshot format.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl DocumentCodec for JsonCodec {
    fn load(&self, path: &Path) -> anyhow::Result<Document> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Document::from_json(&content)
            .with_context(|| format!("failed to parse document {}", path.display()))
    }

    fn persist(&self, path: &Path, document: &Document) -> anyhow::Result<()> {
        let json = document.to_json()?;
        let file = AtomicFile::new(path, OverwriteBehavior::AllowOverwrite);
        file.write(|f| f.write_all(json.as_bytes()))
            .with_context(|| format!("failed to write {}", path.display()))?;
        log::debug!(
            "persisted {} ({} symbols, {} wires, {} labels)",
            path.display(),
            document.symbols.len(),
            document.wires.len(),
            document.labels.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SchSymbol;

    #[test]
    fn json_codec_roundtrips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.kdraft.json");

        let mut doc = Document::new();
        doc.add_symbol(SchSymbol::new("C1", "Device:C").with_value("100n"))
            .unwrap();

        let codec = JsonCodec;
        codec.persist(&path, &doc).unwrap();
        let back = codec.load(&path).unwrap();
        assert_eq!(doc, back);
    }

    #[test]
    fn load_rejects_malformed_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(JsonCodec.load(&path).is_err());
    }
}
