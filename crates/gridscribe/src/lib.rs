//! Meta crate that re-exports the gridscribe building blocks. Pick layers
//! through feature flags: `common` for addresses and values, `parse` for
//! formula reference extraction, `extract` for the full pipeline.

#[cfg(feature = "common")]
pub use gridscribe_common as common;

#[cfg(feature = "parse")]
pub use gridscribe_parse as parse;

#[cfg(feature = "extract")]
pub use gridscribe_extract as extract;

#[cfg(feature = "extract")]
pub use gridscribe_extract::{
    Chunk, ChunkKind, ExtractError, ExtractOptions, Extractor, SheetInput, WorkbookInput,
    WorkbookModel, output,
};

#[cfg(feature = "common")]
pub use gridscribe_common::{Address, CellRange, Diagnostic, DiagnosticKind};
