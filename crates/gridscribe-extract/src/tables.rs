//! Table extraction.
//!
//! Declared tables are placed first, in declaration order. On sheets that
//! declare none, blocks of cells that look like a header over records can be
//! promoted to inferred tables. Tables never overlap: a table that collides
//! with an earlier one is cut down to its largest free remainder, or dropped.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use gridscribe_common::{Address, CellRange, CellType, Diagnostic, DiagnosticKind, RawValue, Subject};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::grid::{DisjointSet, bounding_box, row_slice};
use crate::input::TableInput;
use crate::model::{Cell, Table, TableSource};

#[derive(Debug, Default)]
pub struct TableLayout {
    pub tables: Vec<Table>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Resolve the tables of one sheet.
///
/// `reserved` holds upper-cased table names declared anywhere in the
/// workbook; inferred names skip them.
pub fn extract_tables(
    sheet: &str,
    cells: &BTreeMap<Address, Cell>,
    declared: &[TableInput],
    detect: bool,
    reserved: &FxHashSet<String>,
) -> TableLayout {
    let mut layout = TableLayout::default();

    for decl in declared {
        let subject = Subject::Table {
            sheet: sheet.to_string(),
            name: decl.name.clone(),
        };
        let raw = decl.range.trim();
        let raw = raw.rsplit_once('!').map_or(raw, |(_, r)| r);
        let range = match CellRange::parse(raw) {
            Ok(range) => range,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(sheet = %sheet, table = %decl.name, range = %decl.range, "invalid table range");
                layout.diagnostics.push(
                    Diagnostic::new(DiagnosticKind::InvalidTableRange, subject)
                        .with_message(format!("`{}`: {e}", decl.range)),
                );
                continue;
            }
        };

        let placement = place(range, &layout.tables, cells);
        for note in &placement.truncations {
            #[cfg(feature = "tracing")]
            tracing::debug!(sheet = %sheet, table = %decl.name, "{note}");
            layout.diagnostics.push(
                Diagnostic::new(DiagnosticKind::TableOverlap, subject.clone()).with_message(note),
            );
        }
        match placement.range {
            Some(range) => layout.tables.push(build_table(
                decl.name.clone(),
                range,
                cells,
                TableSource::Declared,
            )),
            None if placement.truncations.is_empty() => layout.diagnostics.push(
                Diagnostic::new(DiagnosticKind::InvalidTableRange, subject)
                    .with_message(format!("`{}` has no data rows", decl.range)),
            ),
            None => {}
        }
    }

    if detect && declared.is_empty() {
        let mut next = 1usize;
        for candidate in candidate_blocks(cells) {
            let Some(range) = place(candidate, &layout.tables, cells).range else {
                continue;
            };
            if !is_text_header(range, cells) {
                continue;
            }
            let name = loop {
                let name = format!("Table{next}");
                next += 1;
                if !reserved.contains(&name.to_uppercase()) {
                    break name;
                }
            };
            #[cfg(feature = "tracing")]
            tracing::debug!(sheet = %sheet, table = %name, range = %range, "inferred table");
            layout
                .tables
                .push(build_table(name, range, cells, TableSource::Inferred));
        }
    }
    layout
}

struct Placement {
    range: Option<CellRange>,
    truncations: Vec<String>,
}

/// Trim `range` to its records and cut it free of every accepted table.
fn place(range: CellRange, accepted: &[Table], cells: &BTreeMap<Address, Cell>) -> Placement {
    let mut rect = trim_to_records(range, cells);
    let mut truncations = Vec::new();
    while let Some(other) = accepted.iter().find(|t| t.range.intersects(&rect)) {
        let Some(overlap) = rect.intersection(&other.range) else {
            break;
        };
        let next = largest_remainder(rect, overlap)
            .map(|r| trim_to_records(r, cells))
            .filter(|r| r.height() >= 2);
        match next {
            Some(r) => {
                let mut message = format!(
                    "overlaps `{}` at {overlap}; truncated {rect} to {r}",
                    other.name
                );
                if r.start.row > rect.start.row {
                    let _ = write!(
                        message,
                        "; header row {} lost, row {} now heads the table",
                        rect.start.row, r.start.row
                    );
                }
                truncations.push(message);
                rect = r;
            }
            None => {
                truncations.push(format!(
                    "overlaps `{}` at {overlap}; no data rows remain, dropped",
                    other.name
                ));
                return Placement {
                    range: None,
                    truncations,
                };
            }
        }
    }
    Placement {
        range: (rect.height() >= 2).then_some(rect),
        truncations,
    }
}

/// Header row through the row before the first fully empty record row.
fn trim_to_records(range: CellRange, cells: &BTreeMap<Address, Cell>) -> CellRange {
    let mut last = range.start.row;
    for row in range.start.row + 1..=range.end.row {
        if row_slice(cells, row, range.start.col, range.end.col)
            .next()
            .is_none()
        {
            break;
        }
        last = row;
    }
    CellRange {
        start: range.start,
        end: Address {
            row: last,
            col: range.end.col,
        },
    }
}

/// Largest of the rectangles above, below, left and right of `cut`.
/// Ties go to the earlier one in that order.
fn largest_remainder(rect: CellRange, cut: CellRange) -> Option<CellRange> {
    let above = (cut.start.row > rect.start.row).then(|| CellRange {
        start: rect.start,
        end: Address {
            row: cut.start.row - 1,
            col: rect.end.col,
        },
    });
    let below = (cut.end.row < rect.end.row).then(|| CellRange {
        start: Address {
            row: cut.end.row + 1,
            col: rect.start.col,
        },
        end: rect.end,
    });
    let left = (cut.start.col > rect.start.col).then(|| CellRange {
        start: rect.start,
        end: Address {
            row: rect.end.row,
            col: cut.start.col - 1,
        },
    });
    let right = (cut.end.col < rect.end.col).then(|| CellRange {
        start: Address {
            row: rect.start.row,
            col: cut.end.col + 1,
        },
        end: rect.end,
    });
    [above, below, left, right]
        .into_iter()
        .flatten()
        .fold(None, |best: Option<CellRange>, c| match best {
            Some(b) if b.cell_count() >= c.cell_count() => Some(b),
            _ => Some(c),
        })
}

fn build_table(
    name: String,
    range: CellRange,
    cells: &BTreeMap<Address, Cell>,
    source: TableSource,
) -> Table {
    let header_row = range.start.row;
    let raw_headers = (range.start.col..=range.end.col)
        .map(|col| {
            let text = cells
                .get(&Address { row: header_row, col })
                .map(|c| c.display().trim().to_string())
                .unwrap_or_default();
            if text.is_empty() {
                format!("column{}", col - range.start.col + 1)
            } else {
                text
            }
        })
        .collect();

    let records = (header_row + 1..=range.end.row)
        .map(|row| {
            (range.start.col..=range.end.col)
                .map(|col| {
                    cells
                        .get(&Address { row, col })
                        .map(|c| c.value.clone())
                        .unwrap_or(RawValue::Empty)
                })
                .collect()
        })
        .collect();

    Table {
        name,
        range,
        headers: unique_headers(raw_headers),
        records,
        source,
    }
}

/// Suffix repeated headers with `_2`, `_3`, ... so record keys stay unique.
fn unique_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: FxHashSet<String> = FxHashSet::default();
    raw.into_iter()
        .map(|header| {
            if seen.insert(header.clone()) {
                return header;
            }
            let mut n = 2;
            loop {
                let candidate = format!("{header}_{n}");
                if seen.insert(candidate.clone()) {
                    return candidate;
                }
                n += 1;
            }
        })
        .collect()
}

fn is_text_header(range: CellRange, cells: &BTreeMap<Address, Cell>) -> bool {
    (range.start.col..=range.end.col).all(|col| {
        cells
            .get(&Address {
                row: range.start.row,
                col,
            })
            .is_some_and(|c| c.cell_type == CellType::Str)
    })
}

/// Bounding boxes of 4-connected blocks that could be tables, in reading order.
fn candidate_blocks(cells: &BTreeMap<Address, Cell>) -> Vec<CellRange> {
    let addrs: Vec<Address> = cells.keys().copied().collect();
    let index: FxHashMap<Address, usize> = addrs.iter().enumerate().map(|(i, a)| (*a, i)).collect();
    let mut sets = DisjointSet::new(addrs.len());
    for (i, addr) in addrs.iter().enumerate() {
        for neighbour in [addr.offset(0, 1), addr.offset(1, 0)].into_iter().flatten() {
            if let Some(&j) = index.get(&neighbour) {
                sets.union(i, j);
            }
        }
    }

    let mut blocks: Vec<CellRange> = sets
        .groups()
        .into_iter()
        .filter_map(|group| bounding_box(group.into_iter().map(|i| addrs[i])))
        .filter(|rect| rect.width() >= 2 && rect.height() >= 2 && is_text_header(*rect, cells))
        .collect();
    blocks.sort();
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{grid, n, t};

    fn decl(name: &str, range: &str) -> TableInput {
        TableInput {
            name: name.into(),
            range: range.into(),
        }
    }

    fn none() -> FxHashSet<String> {
        FxHashSet::default()
    }

    #[test]
    fn declared_table_stops_at_first_empty_row() {
        let cells = grid(&[
            ("A1", t("Region")),
            ("B1", t("Units")),
            ("A2", t("North")),
            ("B2", n(10.0)),
            ("A3", t("South")),
            ("B3", n(7.0)),
            ("A5", t("footnote")),
        ]);
        let layout = extract_tables("S", &cells, &[decl("Sales", "A1:B9")], true, &none());
        assert!(layout.diagnostics.is_empty());
        let table = &layout.tables[0];
        assert_eq!(table.range.to_string(), "A1:B3");
        assert_eq!(table.headers, ["Region", "Units"]);
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.records[1], vec![t("South"), n(7.0)]);
        assert_eq!(table.source, TableSource::Declared);
    }

    #[test]
    fn headers_are_filled_and_deduplicated() {
        let cells = grid(&[
            ("A1", t("Qty")),
            ("C1", t("Qty")),
            ("D1", t("Qty_2")),
            ("A2", n(1.0)),
        ]);
        let layout = extract_tables("S", &cells, &[decl("T", "A1:E2")], false, &none());
        assert_eq!(
            layout.tables[0].headers,
            ["Qty", "column2", "Qty_2", "Qty_2_2", "column5"]
        );
        assert_eq!(layout.tables[0].records[0][4], RawValue::Empty);
    }

    #[test]
    fn later_table_is_truncated_to_largest_remainder() {
        let mut entries = Vec::new();
        let names: Vec<String> = (1..=10)
            .flat_map(|row| ["A", "B", "C", "D", "E"].map(|c| format!("{c}{row}")))
            .collect();
        for a in &names {
            entries.push((a.as_str(), t("x")));
        }
        let cells = grid(&entries);
        let layout = extract_tables(
            "S",
            &cells,
            &[decl("First", "A1:C5"), decl("Second", "B3:E10")],
            false,
            &none(),
        );
        assert_eq!(layout.tables.len(), 2);
        assert_eq!(layout.tables[1].range.to_string(), "B6:E10");
        assert_eq!(layout.diagnostics.len(), 1);
        assert_eq!(layout.diagnostics[0].kind, DiagnosticKind::TableOverlap);
        assert!(layout.diagnostics[0].message.contains("B3:C5"));
        assert!(
            layout.diagnostics[0]
                .message
                .ends_with("; header row 3 lost, row 6 now heads the table")
        );
    }

    #[test]
    fn header_kept_when_cut_from_the_side() {
        let cells = grid(&[
            ("A1", t("h")),
            ("B1", t("k")),
            ("A2", n(1.0)),
            ("B2", n(2.0)),
            ("A3", n(3.0)),
            ("B3", n(4.0)),
            ("C1", t("m")),
            ("C2", n(5.0)),
            ("C3", n(6.0)),
        ]);
        let layout = extract_tables(
            "S",
            &cells,
            &[decl("Left", "A1:A3"), decl("Wide", "A1:C3")],
            false,
            &none(),
        );
        assert_eq!(layout.tables[1].range.to_string(), "B1:C3");
        assert!(!layout.diagnostics[0].message.contains("header row"));
    }

    #[test]
    fn fully_covered_table_is_dropped() {
        let cells = grid(&[("A1", t("h")), ("B1", t("k")), ("A2", n(1.0)), ("B2", n(2.0))]);
        let layout = extract_tables(
            "S",
            &cells,
            &[decl("Outer", "A1:B2"), decl("Inner", "A1:A2")],
            false,
            &none(),
        );
        assert_eq!(layout.tables.len(), 1);
        assert!(layout.diagnostics[0].message.contains("dropped"));
    }

    #[test]
    fn invalid_and_header_only_ranges_are_reported() {
        let cells = grid(&[("A1", t("only header")), ("B1", t("h2"))]);
        let layout = extract_tables(
            "S",
            &cells,
            &[decl("Bad", "C3:A1"), decl("Thin", "A1:B1"), decl("Junk", "nope")],
            true,
            &none(),
        );
        assert!(layout.tables.is_empty());
        assert_eq!(layout.diagnostics.len(), 3);
        assert!(
            layout
                .diagnostics
                .iter()
                .all(|d| d.kind == DiagnosticKind::InvalidTableRange)
        );
    }

    #[test]
    fn infers_text_headed_blocks() {
        let cells = grid(&[
            ("B2", t("Name")),
            ("C2", t("Score")),
            ("B3", t("Ada")),
            ("C3", n(9.0)),
            ("B4", t("Bo")),
            ("F10", t("Just a note")),
            ("F11", t("second line")),
            ("H1", n(1.0)),
            ("I1", n(2.0)),
            ("H2", n(3.0)),
        ]);
        let reserved: FxHashSet<String> = ["TABLE1".to_string()].into_iter().collect();
        let layout = extract_tables("S", &cells, &[], true, &reserved);
        assert_eq!(layout.tables.len(), 1);
        let table = &layout.tables[0];
        assert_eq!(table.name, "Table2");
        assert_eq!(table.range.to_string(), "B2:C4");
        assert_eq!(table.source, TableSource::Inferred);
        assert_eq!(table.records[1], vec![t("Bo"), RawValue::Empty]);

        let off = extract_tables("S", &cells, &[], false, &reserved);
        assert!(off.tables.is_empty());
    }
}
