//! The semantic model produced for one workbook.
//!
//! A model is built once per request, fully populated, rendered and dropped.
//! Nothing in here is mutated after the pipeline hands it back.

use std::collections::BTreeMap;
use std::fmt;

use gridscribe_common::{Address, CellRange, CellType, Diagnostic, RangeAddress, RawValue};
use gridscribe_parse::{FormulaRef, FormulaReferences};
use serde::Serialize;
use serde::ser::{SerializeMap, SerializeStruct};

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub address: Address,
    pub value: RawValue,
    pub cell_type: CellType,
    /// Formula text with its leading `=`.
    pub formula: Option<String>,
    /// Present iff `formula` is.
    pub references: Option<FormulaReferences>,
    pub comment: Option<String>,
    pub hyperlink: Option<String>,
}

impl Cell {
    pub fn new(address: Address, value: RawValue, cell_type: CellType) -> Self {
        Cell {
            address,
            value,
            cell_type,
            formula: None,
            references: None,
            comment: None,
            hyperlink: None,
        }
    }

    /// A cell with a value or a formula. Only occupied cells are stored.
    pub fn is_occupied(&self) -> bool {
        !self.value.is_blank() || self.formula.is_some()
    }

    pub fn display(&self) -> String {
        self.value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableSource {
    Declared,
    Inferred,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    /// Header row through the last record row.
    pub range: CellRange,
    /// Unique, non-empty column names in column order.
    pub headers: Vec<String>,
    /// `records[i][j]` is the value under `headers[j]` in data row `i`.
    pub records: Vec<Vec<RawValue>>,
    pub source: TableSource,
}

impl Table {
    pub fn header_row(&self) -> CellRange {
        CellRange {
            start: self.range.start,
            end: Address {
                row: self.range.start.row,
                col: self.range.end.col,
            },
        }
    }

    /// Sheet row of data row `i`.
    pub fn record_row(&self, i: usize) -> u32 {
        self.range.start.row + 1 + i as u32
    }
}

impl Serialize for Table {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut st = serializer.serialize_struct("Table", 5)?;
        st.serialize_field("name", &self.name)?;
        st.serialize_field("range", &self.range)?;
        st.serialize_field("source", &self.source)?;
        st.serialize_field("headers", &self.headers)?;
        let records: Vec<Record<'_>> = self
            .records
            .iter()
            .map(|values| Record {
                headers: &self.headers,
                values,
            })
            .collect();
        st.serialize_field("records", &records)?;
        st.end()
    }
}

/// One record rendered as an object keyed by header, in header order.
struct Record<'a> {
    headers: &'a [String],
    values: &'a [RawValue],
}

impl Serialize for Record<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.headers.len()))?;
        for (i, header) in self.headers.iter().enumerate() {
            map.serialize_entry(header, self.values.get(i).unwrap_or(&RawValue::Empty))?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub range: CellRange,
    pub text: String,
    /// Member cells in reading order.
    pub cells: Vec<Address>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Table,
    Section,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Table => "table",
            ChunkKind::Section => "section",
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub sheet: String,
    pub kind: ChunkKind,
    pub range: CellRange,
    pub text: String,
    /// Member cells, row-major; never more than the configured cap.
    pub cells: Vec<Address>,
    /// Table header cells restated on every chunk of the table.
    pub context_cells: Vec<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NameScope {
    Workbook,
    Sheet(String),
}

impl NameScope {
    pub fn sheet(&self) -> Option<&str> {
        match self {
            NameScope::Workbook => None,
            NameScope::Sheet(s) => Some(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedRange {
    pub name: String,
    pub scope: NameScope,
    pub target: RangeAddress,
    /// Definition as declared.
    pub refers_to: String,
}

impl Serialize for NamedRange {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut st = serializer.serialize_struct("NamedRange", 5)?;
        st.serialize_field("name", &self.name)?;
        match &self.scope {
            NameScope::Workbook => {
                st.serialize_field("scope", "workbook")?;
                st.skip_field("sheet")?;
            }
            NameScope::Sheet(sheet) => {
                st.serialize_field("scope", "sheet")?;
                st.serialize_field("sheet", sheet)?;
            }
        }
        st.serialize_field("refers_to", &self.refers_to)?;
        st.serialize_field("range", &self.target)?;
        st.end()
    }
}

/// A defined name used by a formula and what it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameUse {
    pub name: String,
    pub target: Option<RangeAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineageNode {
    pub cell: Address,
    pub formula: String,
    pub deps: Vec<FormulaRef>,
    pub names: Vec<NameUse>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetModel {
    pub name: String,
    /// Occupied cells keyed by address (row-major).
    pub cells: BTreeMap<Address, Cell>,
    /// Bounding box of occupied cells.
    pub dims: Option<CellRange>,
    pub merged_ranges: Vec<CellRange>,
    pub frozen_panes: Option<Address>,
    pub comments: BTreeMap<Address, String>,
    pub hyperlinks: BTreeMap<Address, String>,
    /// Names visible from this sheet: its own plus unshadowed workbook names.
    pub named_ranges: Vec<NamedRange>,
    pub tables: Vec<Table>,
    pub sections: Vec<Section>,
    pub lineage: Vec<LineageNode>,
    /// In total chunk order.
    pub chunks: Vec<Chunk>,
    /// Occupied cells that are in no table and, by configuration, no section.
    pub unchunked: Vec<Address>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkbookMeta {
    pub title: Option<String>,
    pub sheets: Vec<String>,
    pub created: Option<String>,
    pub modified: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkbookModel {
    pub meta: WorkbookMeta,
    /// Every resolved name, workbook and sheet scoped, in declaration order.
    pub named_ranges: Vec<NamedRange>,
    /// Sheets in workbook order.
    pub sheets: Vec<SheetModel>,
    /// Findings not tied to a single sheet.
    pub diagnostics: Vec<Diagnostic>,
}

impl WorkbookModel {
    pub fn sheet(&self, name: &str) -> Option<&SheetModel> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// All chunks in total order: sheet order, then each sheet's own order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.sheets.iter().flat_map(|s| s.chunks.iter())
    }

    /// Every diagnostic, workbook level first.
    pub fn all_diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .chain(self.sheets.iter().flat_map(|s| s.diagnostics.iter()))
    }
}
