//! Chunking of tables and sections into retrieval units.
//!
//! Rows are packed greedily so that no chunk holds more member cells than
//! the cap. Only a single row wider than the cap is broken up, into runs of
//! adjacent cells, and each run becomes a chunk of its own. Chunk ids are content addressed: same content at the same
//! place gives the same id on every run.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use gridscribe_common::{
    Address, CellRange, Diagnostic, DiagnosticKind, Subject, column_to_letters,
};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::grid::{bounding_box, row_slice};
use crate::model::{Cell, Chunk, ChunkKind, Section, Table};

static SLUG_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("slug pattern is valid"));

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChunkSet {
    /// Sorted by [`chunk_order`].
    pub chunks: Vec<Chunk>,
    pub diagnostics: Vec<Diagnostic>,
}

/// One packable piece: a whole row, or a run of a row wider than the cap.
#[derive(Debug, Clone)]
struct Unit {
    /// Record index for tables, row index within the section otherwise.
    ordinal: usize,
    row: u32,
    first_col: u32,
    last_col: u32,
    members: Vec<Address>,
    split: bool,
}

/// Chunk one sheet. Pure: the same inputs always give the same chunks.
pub fn rechunk(
    sheet: &str,
    tables: &[Table],
    sections: &[Section],
    cells: &BTreeMap<Address, Cell>,
    cap: usize,
) -> ChunkSet {
    let cap = cap.max(1);
    let mut set = ChunkSet::default();
    for table in tables {
        chunk_table(sheet, table, cells, cap, &mut set);
    }
    for section in sections {
        chunk_section(sheet, section, cells, cap, &mut set);
    }
    set.chunks.sort_by(chunk_order);
    set
}

/// Top-left, then bottom-right, then kind, then id.
pub fn chunk_order(a: &Chunk, b: &Chunk) -> std::cmp::Ordering {
    (a.range.start, a.range.end, a.kind, &a.chunk_id).cmp(&(
        b.range.start,
        b.range.end,
        b.kind,
        &b.chunk_id,
    ))
}

fn split_row(
    ordinal: usize,
    row: u32,
    span: (u32, u32),
    members: Vec<Address>,
    cap: usize,
    units: &mut Vec<Unit>,
) -> bool {
    if members.len() <= cap {
        units.push(Unit {
            ordinal,
            row,
            first_col: span.0,
            last_col: span.1,
            members,
            split: false,
        });
        return false;
    }
    for run in members.chunks(cap) {
        let (Some(first), Some(last)) = (run.first(), run.last()) else {
            continue;
        };
        units.push(Unit {
            ordinal,
            row,
            first_col: first.col,
            last_col: last.col,
            members: run.to_vec(),
            split: true,
        });
    }
    true
}

/// Greedy packing: a unit joins the current group while the cap allows.
/// A run of a split row always forms a group of its own, so a chunk never
/// holds part of a row together with other rows.
fn pack(units: Vec<Unit>, cap: usize) -> Vec<Vec<Unit>> {
    let mut groups: Vec<Vec<Unit>> = Vec::new();
    let mut current: Vec<Unit> = Vec::new();
    let mut size = 0;
    for unit in units {
        if !current.is_empty() && (unit.split || size + unit.members.len() > cap) {
            groups.push(std::mem::take(&mut current));
            size = 0;
        }
        if unit.split {
            groups.push(vec![unit]);
            continue;
        }
        size += unit.members.len();
        current.push(unit);
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

fn chunk_table(
    sheet: &str,
    table: &Table,
    cells: &BTreeMap<Address, Cell>,
    cap: usize,
    set: &mut ChunkSet,
) {
    let (first_col, last_col) = (table.range.start.col, table.range.end.col);
    let mut units = Vec::new();
    for ordinal in 0..table.records.len() {
        let row = table.record_row(ordinal);
        let members: Vec<Address> = row_slice(cells, row, first_col, last_col)
            .map(|(a, _)| *a)
            .collect();
        if members.is_empty() {
            continue;
        }
        let width = members.len();
        if split_row(ordinal, row, (first_col, last_col), members, cap, &mut units) {
            #[cfg(feature = "tracing")]
            tracing::debug!(sheet = %sheet, table = %table.name, row, width, cap, "splitting wide row");
            set.diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::RowSplit,
                    Subject::Table {
                        sheet: sheet.to_string(),
                        name: table.name.clone(),
                    },
                )
                .with_message(format!(
                    "row {row} has {width} cells, more than the cap of {cap}"
                )),
            );
        }
    }

    let context_cells: Vec<Address> = row_slice(cells, table.range.start.row, first_col, last_col)
        .map(|(a, _)| *a)
        .collect();
    let columns = table.headers.join(", ");
    let total = table.records.len();
    let groups = pack(units, cap);
    let whole = groups.len() == 1 && groups.iter().flatten().all(|u| !u.split);

    for group in groups {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let mut text = if whole {
            format!("Table {} with {total} rows. Columns: {columns}.", table.name)
        } else if first.split {
            format!(
                "Table {} (row {} of {total}, columns {}-{}). Columns: {columns}.",
                table.name,
                first.ordinal + 1,
                column_to_letters(first.first_col),
                column_to_letters(first.last_col)
            )
        } else {
            format!(
                "Table {} (rows {}-{} of {total}). Columns: {columns}.",
                table.name,
                first.ordinal + 1,
                last.ordinal + 1
            )
        };
        for unit in &group {
            text.push('\n');
            text.push_str(&table_line(table, unit, cells));
        }

        let (range_first_col, range_last_col) = if first.split {
            (first.first_col, first.last_col)
        } else {
            (first_col, last_col)
        };
        let range = CellRange {
            start: Address {
                row: first.row,
                col: range_first_col,
            },
            end: Address {
                row: last.row,
                col: range_last_col,
            },
        };
        let members: Vec<Address> = group.into_iter().flat_map(|u| u.members).collect();
        set.chunks.push(make_chunk(
            sheet,
            ChunkKind::Table,
            range,
            members,
            context_cells.clone(),
            text,
            cells,
        ));
    }
}

/// `header: value | header: value` over the unit's columns.
fn table_line(table: &Table, unit: &Unit, cells: &BTreeMap<Address, Cell>) -> String {
    (unit.first_col..=unit.last_col)
        .map(|col| {
            let j = (col - table.range.start.col) as usize;
            let header = table.headers.get(j).map(String::as_str).unwrap_or_default();
            let value = cells
                .get(&Address { row: unit.row, col })
                .map(Cell::display)
                .unwrap_or_default();
            format!("{header}: {value}")
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

fn chunk_section(
    sheet: &str,
    section: &Section,
    cells: &BTreeMap<Address, Cell>,
    cap: usize,
    set: &mut ChunkSet,
) {
    let mut units = Vec::new();
    for (ordinal, row) in section.cells.chunk_by(|a, b| a.row == b.row).enumerate() {
        let (Some(first), Some(last)) = (row.first().copied(), row.last().copied()) else {
            continue;
        };
        let width = row.len();
        if split_row(ordinal, first.row, (first.col, last.col), row.to_vec(), cap, &mut units) {
            set.diagnostics.push(
                Diagnostic::on_sheet(DiagnosticKind::RowSplit, sheet).with_message(format!(
                    "section {} row {} has {width} cells, more than the cap of {cap}",
                    section.range, first.row
                )),
            );
        }
    }

    let groups = pack(units, cap);
    let parts = groups.len();
    let whole = parts == 1 && groups.iter().flatten().all(|u| !u.split);

    for (i, group) in groups.into_iter().enumerate() {
        let members: Vec<Address> = group.iter().flat_map(|u| u.members.iter().copied()).collect();
        let Some(range) = bounding_box(members.iter().copied()) else {
            continue;
        };
        let (range, text) = if whole {
            (section.range, section.text.clone())
        } else {
            let mut text = format!("Section {} (part {} of {parts})", section.range, i + 1);
            for unit in &group {
                text.push('\n');
                let line: Vec<String> = unit
                    .members
                    .iter()
                    .map(|a| cells.get(a).map(Cell::display).unwrap_or_default())
                    .collect();
                text.push_str(&line.join(" "));
            }
            (range, text)
        };
        set.chunks.push(make_chunk(
            sheet,
            ChunkKind::Section,
            range,
            members,
            Vec::new(),
            text,
            cells,
        ));
    }
}

fn make_chunk(
    sheet: &str,
    kind: ChunkKind,
    range: CellRange,
    members: Vec<Address>,
    context_cells: Vec<Address>,
    text: String,
    cells: &BTreeMap<Address, Cell>,
) -> Chunk {
    Chunk {
        chunk_id: chunk_id(sheet, kind, range, &members, cells, &text),
        sheet: sheet.to_string(),
        kind,
        range,
        text,
        cells: members,
        context_cells,
    }
}

/// `<sheet slug>_<range>_<16 hex digits of SHA-256 over the content>`.
pub fn chunk_id(
    sheet: &str,
    kind: ChunkKind,
    range: CellRange,
    members: &[Address],
    cells: &BTreeMap<Address, Cell>,
    text: &str,
) -> String {
    let mut hasher = Sha256::new();
    for part in [sheet, kind.as_str(), &range.to_string()] {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    for addr in members {
        let (cell_type, display) = cells
            .get(addr)
            .map(|c| (c.cell_type.as_str(), c.display()))
            .unwrap_or(("empty", String::new()));
        hasher.update(format!("{addr}\u{1f}{cell_type}\u{1f}{display}\u{1e}").as_bytes());
    }
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();

    let mut id = format!(
        "{}_{}_",
        slug(sheet),
        range.to_string().to_lowercase().replace(':', "_")
    );
    for byte in &digest[..8] {
        let _ = write!(id, "{byte:02x}");
    }
    id
}

fn slug(sheet: &str) -> String {
    let lower = sheet.to_lowercase();
    let slug = SLUG_SEPARATORS.replace_all(&lower, "_");
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "sheet".to_string()
    } else {
        slug.to_string()
    }
}
