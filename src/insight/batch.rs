//! Fact sheets and batch packing.

use std::fmt::Write as _;

use crate::parse::{StructuralModel, Unit, UnitId};

/// Appended to a fact sheet that had to be cut to fit a batch.
pub const TRUNCATION_MARKER: &str = "\n[truncated]";

/// Units sent to the generation service in one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    /// Unit ids, indexed by their position in the prompt.
    pub units: Vec<UnitId>,
    /// Rendered fact sheets, parallel to `units`.
    pub sheets: Vec<String>,
}

impl Batch {
    /// Characters of fact-sheet text in the batch.
    #[must_use]
    pub fn chars(&self) -> usize {
        self.sheets.iter().map(|s| s.chars().count()).sum()
    }
}

/// Renders the facts the generation service is allowed to rely on.
#[must_use]
pub fn fact_sheet(model: &StructuralModel, path: &str, unit: &Unit) -> String {
    let mut sheet = String::new();
    let _ = writeln!(sheet, "Unit: {} ({})", unit.qualified_name, unit.kind.as_str());
    let _ = writeln!(sheet, "File: {path}:{}-{}", unit.start_line, unit.end_line);
    let _ = writeln!(sheet, "Signature: {}", unit.signature);
    if let Some(doc) = &unit.doc {
        let _ = writeln!(sheet, "Doc: {doc}");
    }
    let calls: Vec<&str> = model.graph.targets(&unit.id).map(UnitId::as_str).collect();
    if !calls.is_empty() {
        let _ = writeln!(sheet, "References: {}", calls.join(", "));
    }
    let callers: Vec<&str> = model.graph.sources(&unit.id).map(UnitId::as_str).collect();
    if !callers.is_empty() {
        let _ = writeln!(sheet, "Referenced by: {}", callers.join(", "));
    }
    sheet
}

/// Cuts `sheet` to at most `max_chars` characters, marker included. A
/// budget too small for the marker gets a bare cut.
fn truncate(sheet: &str, max_chars: usize) -> String {
    let marker_chars = TRUNCATION_MARKER.chars().count();
    if max_chars <= marker_chars {
        return sheet.chars().take(max_chars).collect();
    }
    let mut cut: String = sheet.chars().take(max_chars - marker_chars).collect();
    cut.push_str(TRUNCATION_MARKER);
    cut
}

/// Packs sheets, in order, into batches of at most `max_chars` characters.
///
/// A sheet is never split across batches. A sheet that is larger than
/// `max_chars` on its own is truncated and sent as a batch by itself.
#[must_use]
pub fn pack(sheets: Vec<(UnitId, String)>, max_chars: usize) -> Vec<Batch> {
    let max_chars = max_chars.max(1);
    let mut batches = Vec::new();
    let mut current = Batch::default();
    let mut current_chars = 0;

    for (id, sheet) in sheets {
        let len = sheet.chars().count();
        if len > max_chars {
            if !current.units.is_empty() {
                batches.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            batches.push(Batch { units: vec![id], sheets: vec![truncate(&sheet, max_chars)] });
            continue;
        }
        if current_chars + len > max_chars && !current.units.is_empty() {
            batches.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        current.units.push(id);
        current.sheets.push(sheet);
        current_chars += len;
    }
    if !current.units.is_empty() {
        batches.push(current);
    }
    batches
}
