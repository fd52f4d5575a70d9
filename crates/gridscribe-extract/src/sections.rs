//! Text section inference.
//!
//! Free-standing text outside tables is grouped into rectangular sections by
//! 4-neighbour adjacency. Grouping runs on an index-addressed union-find, so
//! long runs of text cannot exhaust the stack.

use std::collections::BTreeMap;

use gridscribe_common::{Address, CellRange, CellType, Diagnostic, DiagnosticKind};

use crate::grid::{DisjointSet, bounding_box};
use crate::model::{Cell, Section, Table};

/// Merged areas above this many cells do not take part in adjacency.
pub const MAX_MERGE_CELLS: u64 = 10_000;

#[derive(Debug, Default)]
pub struct SectionLayout {
    pub sections: Vec<Section>,
    /// Occupied cells outside tables that are not section candidates.
    pub unchunked: Vec<Address>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Candidate(usize),
    Blocked,
}

#[derive(Debug, Clone, Copy)]
pub struct SectionRules {
    /// Empty cells allowed between two linked cells.
    pub gap_tolerance: u32,
    /// Treat non-text cells as section candidates.
    pub value_cells: bool,
}

pub fn infer_sections(
    sheet: &str,
    cells: &BTreeMap<Address, Cell>,
    tables: &[Table],
    merged: &[CellRange],
    rules: SectionRules,
) -> SectionLayout {
    let mut layout = SectionLayout::default();
    let mut candidates: Vec<Address> = Vec::new();
    let mut slots: BTreeMap<Address, Slot> = BTreeMap::new();

    for (&addr, cell) in cells {
        if tables.iter().any(|t| t.range.contains(addr)) {
            slots.insert(addr, Slot::Blocked);
        } else if cell.cell_type == CellType::Str || rules.value_cells {
            slots.insert(addr, Slot::Candidate(candidates.len()));
            candidates.push(addr);
        } else {
            slots.insert(addr, Slot::Blocked);
            layout.unchunked.push(addr);
        }
    }

    for area in merged {
        if area.cell_count() > MAX_MERGE_CELLS {
            #[cfg(feature = "tracing")]
            tracing::warn!(sheet = %sheet, range = %area, "merged area too large for adjacency");
            layout.diagnostics.push(
                Diagnostic::on_sheet(DiagnosticKind::OversizedMerge, sheet).with_message(format!(
                    "merged range {area} spans {} cells; ignored for section adjacency",
                    area.cell_count()
                )),
            );
            continue;
        }
        let Some(Slot::Candidate(anchor)) = slots.get(&area.start).copied() else {
            continue;
        };
        for addr in area.cells() {
            slots.entry(addr).or_insert(Slot::Candidate(anchor));
        }
    }

    let by_column: BTreeMap<(u32, u32), Slot> =
        slots.iter().map(|(a, s)| ((a.col, a.row), *s)).collect();
    let reach = rules.gap_tolerance.saturating_add(1);
    let mut sets = DisjointSet::new(candidates.len());

    for (&addr, &slot) in &slots {
        let Slot::Candidate(i) = slot else {
            continue;
        };
        let right = slots
            .range(
                Address {
                    row: addr.row,
                    col: addr.col + 1,
                }..=Address {
                    row: addr.row,
                    col: addr.col.saturating_add(reach),
                },
            )
            .next()
            .map(|(_, s)| *s);
        let below = by_column
            .range((addr.col, addr.row + 1)..=(addr.col, addr.row.saturating_add(reach)))
            .next()
            .map(|(_, s)| *s);
        for next in [right, below].into_iter().flatten() {
            if let Slot::Candidate(j) = next {
                sets.union(i, j);
            }
        }
    }

    layout.sections = sets
        .groups()
        .into_iter()
        .filter_map(|group| {
            let members: Vec<Address> = group.into_iter().map(|i| candidates[i]).collect();
            let range = bounding_box(members.iter().copied())?;
            Some(Section {
                range,
                text: section_text(&members, cells),
                cells: members,
            })
        })
        .collect();
    layout.sections.sort_by(|a, b| a.range.cmp(&b.range));
    layout
}

/// Cells of a row joined by a space, rows joined by a newline.
pub(crate) fn section_text(members: &[Address], cells: &BTreeMap<Address, Cell>) -> String {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut current_row = None;
    for addr in members {
        let text = cells.get(addr).map(Cell::display).unwrap_or_default();
        if current_row != Some(addr.row) {
            rows.push(Vec::new());
            current_row = Some(addr.row);
        }
        if let Some(row) = rows.last_mut() {
            row.push(text);
        }
    }
    rows.iter()
        .map(|r| r.join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TableSource;
    use crate::test_support::{addr, grid, n, t};

    const STRICT: SectionRules = SectionRules {
        gap_tolerance: 0,
        value_cells: false,
    };

    fn ranges(layout: &SectionLayout) -> Vec<String> {
        layout.sections.iter().map(|s| s.range.to_string()).collect()
    }

    #[test]
    fn adjacent_text_forms_one_section() {
        let cells = grid(&[("A10", t("Quarterly notes")), ("A11", t("Revenue grew"))]);
        let layout = infer_sections("S", &cells, &[], &[], STRICT);
        assert_eq!(ranges(&layout), ["A10:A11"]);
        assert_eq!(layout.sections[0].text, "Quarterly notes\nRevenue grew");
        assert_eq!(layout.sections[0].cells, [addr("A10"), addr("A11")]);
    }

    #[test]
    fn gap_tolerance_and_blocking_cells() {
        let cells = grid(&[
            ("A1", t("a")),
            ("A3", t("b")),
            ("C1", t("c")),
            ("C2", n(4.0)),
            ("C3", t("d")),
        ]);
        assert_eq!(
            ranges(&infer_sections("S", &cells, &[], &[], STRICT)),
            ["A1:A1", "C1:C1", "A3:A3", "C3:C3"]
        );
        let loose = SectionRules {
            gap_tolerance: 1,
            value_cells: false,
        };
        let layout = infer_sections("S", &cells, &[], &[], loose);
        assert_eq!(ranges(&layout), ["A1:C3"]);
        assert_eq!(layout.unchunked, [addr("C2")]);
        assert_eq!(layout.sections[0].text, "a c\nb d");

        let column = grid(&[("E1", t("top")), ("E2", n(1.0)), ("E3", t("bottom"))]);
        let wide = SectionRules {
            gap_tolerance: 5,
            value_cells: false,
        };
        assert_eq!(
            ranges(&infer_sections("S", &column, &[], &[], wide)),
            ["E1:E1", "E3:E3"]
        );
    }

    #[test]
    fn value_cells_join_when_enabled() {
        let cells = grid(&[("A1", t("Total")), ("B1", n(42.0))]);
        let rules = SectionRules {
            gap_tolerance: 0,
            value_cells: true,
        };
        let layout = infer_sections("S", &cells, &[], &[], rules);
        assert_eq!(layout.sections[0].text, "Total 42");
        assert!(layout.unchunked.is_empty());
    }

    #[test]
    fn table_cells_are_not_candidates() {
        let cells = grid(&[("A1", t("h")), ("A2", t("v")), ("A3", t("after"))]);
        let table = Table {
            name: "T".into(),
            range: CellRange::parse("A1:A2").unwrap(),
            headers: vec!["h".into()],
            records: vec![vec![t("v")]],
            source: TableSource::Declared,
        };
        let layout = infer_sections("S", &cells, &[table], &[], STRICT);
        assert_eq!(ranges(&layout), ["A3:A3"]);
    }

    #[test]
    fn merged_anchor_extends_adjacency() {
        let cells = grid(&[("A1", t("Heading")), ("D1", t("aside"))]);
        let merged = [CellRange::parse("A1:C1").unwrap()];
        assert_eq!(infer_sections("S", &cells, &[], &[], STRICT).sections.len(), 2);
        let layout = infer_sections("S", &cells, &[], &merged, STRICT);
        assert_eq!(ranges(&layout), ["A1:D1"]);
        assert_eq!(layout.sections[0].cells.len(), 2);
    }

    #[test]
    fn oversized_merge_is_ignored() {
        let cells = grid(&[("A1", t("x"))]);
        let merged = [CellRange::parse("A1:Z1000").unwrap()];
        let layout = infer_sections("S", &cells, &[], &merged, STRICT);
        assert_eq!(layout.diagnostics[0].kind, DiagnosticKind::OversizedMerge);
        assert_eq!(ranges(&layout), ["A1:A1"]);
    }
}
