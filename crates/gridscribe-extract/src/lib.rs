//! Workbook extraction and chunking.
//!
//! A decoded workbook ([`WorkbookInput`]) goes in; a typed [`WorkbookModel`]
//! comes out, with cells, tables, text sections, formula lineage and
//! deterministic retrieval chunks for every sheet. Problems with the
//! workbook content are reported as diagnostics and never abort a request.
//!
//! ```no_run
//! use gridscribe_extract::{ExtractOptions, Extractor, WorkbookInput, output};
//!
//! # fn main() -> Result<(), gridscribe_extract::ExtractError> {
//! let input = WorkbookInput::from_json_str(r#"{"sheets": [{"name": "Sheet1"}]}"#)?;
//! let options = ExtractOptions::from_pairs([("chunk_max_cells", "200")])?;
//! let model = Extractor::new(options.clone())?.extract(&input);
//! let ndjson = output::ndjson_string(&model, &options)?;
//! # let _ = ndjson;
//! # Ok(())
//! # }
//! ```

pub mod chunking;
pub mod classify;
pub mod config;
pub mod error;
pub mod graph;
mod grid;
pub mod input;
pub mod model;
pub mod names;
pub mod output;
pub mod pipeline;
pub mod sections;
pub mod tables;

#[cfg(test)]
mod test_support;

pub use chunking::{ChunkSet, chunk_id, rechunk};
pub use classify::{TypeHints, classify, classify_value, is_date_format};
pub use config::{DEFAULT_CHUNK_MAX_CELLS, ExtractOptions, MAX_CHUNK_MAX_CELLS};
pub use error::{ExtractError, Result};
pub use graph::{Cycle, DependencyEdge, DependencyGraph, Vertex};
pub use input::{CellInput, InputValue, NamedRangeInput, SheetInput, TableInput, WorkbookInput};
pub use model::{
    Cell, Chunk, ChunkKind, LineageNode, NameScope, NameUse, NamedRange, Section, SheetModel,
    Table, TableSource, WorkbookMeta, WorkbookModel,
};
pub use names::{NameTable, SheetIndex};
pub use pipeline::{Extractor, extract};
pub use sections::{SectionRules, infer_sections};
pub use tables::extract_tables;

pub use gridscribe_common::{Address, CellRange, CellType, Diagnostic, DiagnosticKind, RawValue};
