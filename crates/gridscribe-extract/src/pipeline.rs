//! The extraction pipeline.
//!
//! Sheets are processed in parallel; each worker owns everything derived
//! from its sheet and only reads the shared name table. Cross-sheet work
//! (cycle detection) runs once all sheets are done, and the merge is ordered
//! by workbook position, never by completion.

use std::collections::BTreeMap;

use gridscribe_common::{
    Address, CellRange, DateSystem, Diagnostic, DiagnosticKind, quote_sheet_name,
};
use gridscribe_parse::{FormulaRef, FormulaReferences, extract_references};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::chunking::rechunk;
use crate::classify::{TypeHints, classify_value};
use crate::config::ExtractOptions;
use crate::error::{ExtractError, Result};
use crate::graph::DependencyGraph;
use crate::grid::bounding_box;
use crate::input::{CellInput, SheetInput, WorkbookInput};
use crate::model::{
    Cell, LineageNode, NameScope, NameUse, SheetModel, WorkbookMeta, WorkbookModel,
};
use crate::names::{NameTable, SheetIndex};
use crate::sections::{SectionRules, infer_sections};
use crate::tables::extract_tables;

/// Reusable extraction engine for one set of options.
#[derive(Debug)]
pub struct Extractor {
    options: ExtractOptions,
    pool: Option<rayon::ThreadPool>,
}

/// Read-only state shared by every sheet worker.
struct SheetContext<'a> {
    options: &'a ExtractOptions,
    date_system: DateSystem,
    sheets: &'a SheetIndex,
    names: &'a NameTable,
    /// Upper-cased declared table names across the workbook.
    reserved_tables: &'a FxHashSet<String>,
}

impl Extractor {
    /// Validate `options` and set up the worker pool.
    pub fn new(options: ExtractOptions) -> Result<Self> {
        options.validate()?;
        let pool = match options.max_threads {
            Some(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("gridscribe-{i}"))
                    .build()
                    .map_err(|e| ExtractError::ThreadPool(e.to_string()))?,
            ),
            None => None,
        };
        Ok(Extractor { options, pool })
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Build the full model. Input problems become diagnostics; this never
    /// fails once the extractor exists.
    pub fn extract(&self, input: &WorkbookInput) -> WorkbookModel {
        match &self.pool {
            Some(pool) => pool.install(|| self.run(input)),
            None => self.run(input),
        }
    }

    fn run(&self, input: &WorkbookInput) -> WorkbookModel {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("extract_workbook", sheets = input.sheets.len()).entered();

        let mut diagnostics = Vec::new();
        let mut sheet_names = SheetIndex::default();
        let mut sheet_inputs: Vec<&SheetInput> = Vec::with_capacity(input.sheets.len());
        for sheet in &input.sheets {
            if sheet_names.insert(&sheet.name) {
                sheet_inputs.push(sheet);
            } else {
                #[cfg(feature = "tracing")]
                tracing::warn!(sheet = %sheet.name, "duplicate sheet name; keeping the first");
                diagnostics.push(
                    Diagnostic::on_sheet(DiagnosticKind::DuplicateSheet, &sheet.name)
                        .with_message("sheet name already used; first occurrence kept"),
                );
            }
        }

        let workbook_names = input.named_ranges.iter().map(|decl| {
            let scope = match &decl.scope {
                Some(sheet) => NameScope::Sheet(sheet.clone()),
                None => NameScope::Workbook,
            };
            (scope, decl)
        });
        let sheet_local_names = sheet_inputs.iter().flat_map(|sheet| {
            sheet
                .named_ranges
                .iter()
                .map(move |decl| (NameScope::Sheet(sheet.name.clone()), decl))
        });
        let (names, name_diagnostics) =
            NameTable::resolve(workbook_names.chain(sheet_local_names), &sheet_names);
        diagnostics.extend(name_diagnostics);

        let reserved_tables: FxHashSet<String> = sheet_inputs
            .iter()
            .flat_map(|sheet| sheet.tables.iter())
            .map(|table| table.name.to_uppercase())
            .collect();

        let ctx = SheetContext {
            options: &self.options,
            date_system: input.date_system,
            sheets: &sheet_names,
            names: &names,
            reserved_tables: &reserved_tables,
        };
        let mut sheets: Vec<SheetModel> = sheet_inputs
            .par_iter()
            .map(|sheet| build_sheet(sheet, &ctx))
            .collect();

        flag_cycles(&mut sheets);

        WorkbookModel {
            meta: WorkbookMeta {
                title: input.properties.title.clone(),
                sheets: sheets.iter().map(|s| s.name.clone()).collect(),
                created: input.properties.created.clone(),
                modified: input.properties.modified.clone(),
            },
            named_ranges: names.iter().cloned().collect(),
            sheets,
            diagnostics,
        }
    }
}

/// One-shot convenience wrapper around [`Extractor`].
pub fn extract(input: &WorkbookInput, options: &ExtractOptions) -> Result<WorkbookModel> {
    Ok(Extractor::new(options.clone())?.extract(input))
}

fn build_sheet(input: &SheetInput, ctx: &SheetContext<'_>) -> SheetModel {
    #[cfg(feature = "tracing")]
    let _span = tracing::info_span!("extract_sheet", sheet = input.name.as_str()).entered();

    let name = input.name.as_str();
    let mut diagnostics = Vec::new();
    let mut cells: BTreeMap<Address, Cell> = BTreeMap::new();
    let mut seen: FxHashSet<Address> = FxHashSet::default();

    for raw in &input.cells {
        let address = match Address::parse(raw.address.trim()) {
            Ok(address) => address,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(sheet = %name, address = %raw.address, "skipping cell with invalid address");
                diagnostics.push(
                    Diagnostic::on_sheet(DiagnosticKind::InvalidAddress, name)
                        .with_message(format!("cell `{}`: {e}", raw.address)),
                );
                continue;
            }
        };
        if !seen.insert(address) {
            diagnostics.push(
                Diagnostic::at_cell(DiagnosticKind::DuplicateCell, name, address)
                    .with_message("cell listed more than once; first occurrence kept"),
            );
            continue;
        }
        let cell = decode_cell(name, address, raw, ctx, &mut diagnostics);
        if cell.is_occupied() {
            cells.insert(address, cell);
        }
    }

    let comments = parse_keyed(name, "comment", &input.comments, &mut diagnostics);
    let hyperlinks = parse_keyed(name, "hyperlink", &input.hyperlinks, &mut diagnostics);
    for (addr, text) in &comments {
        if let Some(cell) = cells.get_mut(addr) {
            cell.comment = Some(text.clone());
        }
    }
    for (addr, target) in &hyperlinks {
        if let Some(cell) = cells.get_mut(addr) {
            cell.hyperlink = Some(target.clone());
        }
    }

    let mut merged_ranges = Vec::with_capacity(input.merged_ranges.len());
    for raw in &input.merged_ranges {
        match CellRange::parse(raw.trim()) {
            Ok(range) => merged_ranges.push(range),
            Err(e) => diagnostics.push(
                Diagnostic::on_sheet(DiagnosticKind::InvalidAddress, name)
                    .with_message(format!("merged range `{raw}`: {e}")),
            ),
        }
    }
    let frozen_panes = input
        .frozen_panes
        .as_deref()
        .and_then(|raw| match Address::parse(raw.trim()) {
            Ok(address) => Some(address),
            Err(e) => {
                diagnostics.push(
                    Diagnostic::on_sheet(DiagnosticKind::InvalidAddress, name)
                        .with_message(format!("frozen pane `{raw}`: {e}")),
                );
                None
            }
        });

    let lineage = build_lineage(name, &cells, ctx, &mut diagnostics);

    let tables = extract_tables(
        name,
        &cells,
        &input.tables,
        ctx.options.detect_tables,
        ctx.reserved_tables,
    );
    let sections = infer_sections(
        name,
        &cells,
        &tables.tables,
        &merged_ranges,
        SectionRules {
            gap_tolerance: ctx.options.section_gap_tolerance,
            value_cells: ctx.options.section_value_cells,
        },
    );
    let chunks = rechunk(
        name,
        &tables.tables,
        &sections.sections,
        &cells,
        ctx.options.chunk_cap(),
    );
    diagnostics.extend(tables.diagnostics);
    diagnostics.extend(sections.diagnostics);
    diagnostics.extend(chunks.diagnostics);

    SheetModel {
        name: name.to_string(),
        dims: bounding_box(cells.keys().copied()),
        cells,
        merged_ranges,
        frozen_panes,
        comments,
        hyperlinks,
        named_ranges: ctx.names.visible_from(name),
        tables: tables.tables,
        sections: sections.sections,
        lineage,
        chunks: chunks.chunks,
        unchunked: sections.unchunked,
        diagnostics,
    }
}

fn decode_cell(
    sheet: &str,
    address: Address,
    raw: &CellInput,
    ctx: &SheetContext<'_>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Cell {
    let hints = TypeHints::from_input(raw.type_hint, raw.number_format.as_deref());
    let (value, cell_type) = classify_value(raw.raw_value(), hints, ctx.date_system);

    let formula = raw
        .formula
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty() && *f != "=")
        .map(|f| {
            if f.starts_with('=') {
                f.to_string()
            } else {
                format!("={f}")
            }
        });
    let references = formula.as_deref().map(|f| match extract_references(f) {
        Ok(mut refs) => {
            canonicalise_sheets(&mut refs, ctx.sheets);
            refs
        }
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(sheet = %sheet, cell = %address, error = %e, "formula did not lex");
            diagnostics.push(
                Diagnostic::at_cell(DiagnosticKind::FormulaParse, sheet, address)
                    .with_message(e.to_string()),
            );
            FormulaReferences::default()
        }
    });

    Cell {
        formula,
        references,
        ..Cell::new(address, value, cell_type)
    }
}

/// Rewrite sheet qualifiers to the workbook's spelling. Unknown sheets are
/// left as written.
fn canonicalise_sheets(refs: &mut FormulaReferences, sheets: &SheetIndex) {
    let mut changed = false;
    for r in &mut refs.refs {
        let (FormulaRef::Cell {
            sheet: Some(sheet), ..
        }
        | FormulaRef::Range {
            sheet: Some(sheet), ..
        }) = r
        else {
            continue;
        };
        if let Some(canonical) = sheets.canonical(sheet).filter(|c| *c != sheet.as_str()) {
            *sheet = canonical.to_string();
            changed = true;
        }
    }
    if changed {
        refs.refs.sort();
        refs.refs.dedup();
    }
}

/// Address-keyed side tables (comments, hyperlinks); bad keys are reported.
fn parse_keyed(
    sheet: &str,
    what: &str,
    raw: &BTreeMap<String, String>,
    diagnostics: &mut Vec<Diagnostic>,
) -> BTreeMap<Address, String> {
    let mut parsed = BTreeMap::new();
    for (key, value) in raw {
        match Address::parse(key.trim()) {
            Ok(address) => {
                parsed.entry(address).or_insert_with(|| value.clone());
            }
            Err(e) => diagnostics.push(
                Diagnostic::on_sheet(DiagnosticKind::InvalidAddress, sheet)
                    .with_message(format!("{what} at `{key}`: {e}")),
            ),
        }
    }
    parsed
}

fn build_lineage(
    sheet: &str,
    cells: &BTreeMap<Address, Cell>,
    ctx: &SheetContext<'_>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<LineageNode> {
    let mut lineage = Vec::new();
    for (address, cell) in cells {
        let (Some(formula), Some(refs)) = (&cell.formula, &cell.references) else {
            continue;
        };
        for r in &refs.refs {
            if let Some(target) = r.sheet().filter(|s| !ctx.sheets.contains(s)) {
                diagnostics.push(
                    Diagnostic::at_cell(DiagnosticKind::UnknownSheetReference, sheet, *address)
                        .with_message(format!("`{r}` points at missing sheet `{target}`")),
                );
            }
        }
        lineage.push(LineageNode {
            cell: *address,
            formula: formula.clone(),
            deps: refs.refs.clone(),
            names: refs
                .names
                .iter()
                .map(|n| NameUse {
                    name: n.clone(),
                    target: ctx.names.lookup(n, sheet).map(|r| r.target.clone()),
                })
                .collect(),
        });
    }
    lineage
}

/// Run cycle detection over every sheet's lineage and attach the findings
/// to the cells involved.
fn flag_cycles(sheets: &mut [SheetModel]) {
    let mut graph = DependencyGraph::new();
    for sheet in sheets.iter() {
        for node in &sheet.lineage {
            graph.add_formula(&sheet.name, node.cell, &node.deps);
        }
    }
    let cycles = graph.find_cycles();
    if cycles.is_empty() {
        return;
    }
    #[cfg(feature = "tracing")]
    tracing::warn!(
        cycles = cycles.len(),
        edges = graph.edge_count(),
        "circular references detected"
    );

    let position: FxHashMap<String, usize> = sheets
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name.clone(), i))
        .collect();
    for cycle in cycles {
        let (kind, message) = if cycle.self_reference {
            (
                DiagnosticKind::SelfReference,
                "formula depends on its own value".to_string(),
            )
        } else {
            let members: Vec<String> = cycle
                .cells
                .iter()
                .map(|(sheet, addr)| format!("{}!{addr}", quote_sheet_name(sheet)))
                .collect();
            (
                DiagnosticKind::CircularReference,
                format!("cycle through {}", members.join(", ")),
            )
        };
        for (sheet, address) in &cycle.cells {
            if let Some(&i) = position.get(sheet) {
                sheets[i].diagnostics.push(
                    Diagnostic::at_cell(kind, sheet.clone(), *address).with_message(message.clone()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputValue;

    fn workbook() -> WorkbookInput {
        WorkbookInput::default()
            .with_sheet(
                SheetInput::new("Sheet1")
                    .with_number("A1", 3.0)
                    .with_formula("B2", "A1+Sheet2!C3*Rate", Some(InputValue::Number(5.0)))
                    .with_text("D4", "free text")
                    .with_comment("D4", "check this")
                    .with_comment("Q", "dangling"),
            )
            .with_sheet(SheetInput::new("Sheet2").with_number("C3", 1.0))
            .with_sheet(SheetInput::new("Sheet1"))
            .with_named_range("Rate", None, "Sheet2!$C$3")
    }

    #[test]
    fn formulas_are_normalised_and_linked() {
        let model = extract(&workbook(), &ExtractOptions::default()).unwrap();
        let sheet = model.sheet("Sheet1").unwrap();
        let b2 = &sheet.cells[&Address::parse("B2").unwrap()];
        assert_eq!(b2.formula.as_deref(), Some("=A1+Sheet2!C3*Rate"));

        let node = &sheet.lineage[0];
        let deps: Vec<String> = node.deps.iter().map(ToString::to_string).collect();
        assert_eq!(deps, ["A1", "Sheet2!C3"]);
        assert_eq!(node.names[0].name, "Rate");
        assert_eq!(
            node.names[0].target.as_ref().map(ToString::to_string).as_deref(),
            Some("Sheet2!C3:C3")
        );
    }

    #[test]
    fn duplicate_sheets_and_bad_keys_become_diagnostics() {
        let model = extract(&workbook(), &ExtractOptions::default()).unwrap();
        assert_eq!(model.meta.sheets, ["Sheet1", "Sheet2"]);
        assert_eq!(model.diagnostics[0].kind, DiagnosticKind::DuplicateSheet);

        let sheet = model.sheet("Sheet1").unwrap();
        assert!(
            sheet
                .diagnostics
                .iter()
                .any(|d| d.kind == DiagnosticKind::InvalidAddress && d.message.contains("`Q`"))
        );
        let d4 = &sheet.cells[&Address::parse("D4").unwrap()];
        assert_eq!(d4.comment.as_deref(), Some("check this"));
        assert_eq!(sheet.dims.map(|d| d.to_string()).as_deref(), Some("A1:D4"));
    }

    #[test]
    fn cycles_are_reported_on_every_cell() {
        let input = WorkbookInput::default()
            .with_sheet(
                SheetInput::new("S")
                    .with_formula("A1", "=T!B1+1", None)
                    .with_formula("C1", "=SUM(C1:C3)", None)
                    .with_formula("D1", "=Nowhere!A1", None)
                    .with_formula("E1", "=\"unterminated", None),
            )
            .with_sheet(SheetInput::new("T").with_formula("B1", "=S!A1", None));
        let model = extract(&input, &ExtractOptions::default()).unwrap();
        let kinds = |sheet: &str| -> Vec<DiagnosticKind> {
            model
                .sheet(sheet)
                .unwrap()
                .diagnostics
                .iter()
                .map(|d| d.kind)
                .collect()
        };
        let s = kinds("S");
        assert!(s.contains(&DiagnosticKind::CircularReference));
        assert!(s.contains(&DiagnosticKind::SelfReference));
        assert!(s.contains(&DiagnosticKind::UnknownSheetReference));
        assert!(s.contains(&DiagnosticKind::FormulaParse));
        assert_eq!(kinds("T"), [DiagnosticKind::CircularReference]);
    }

    #[test]
    fn sheet_qualifiers_match_in_any_case() {
        let input = WorkbookInput::default()
            .with_sheet(
                SheetInput::new("Sheet1")
                    .with_formula("A1", "=sheet2!B1", None)
                    .with_formula("C1", "=Rate*2", None),
            )
            .with_sheet(SheetInput::new("Sheet2").with_formula("B1", "=SHEET1!A1", None))
            .with_sheet(SheetInput::new("SHEET2"))
            .with_named_range("Rate", None, "sheet2!B1");
        let model = extract(&input, &ExtractOptions::default()).unwrap();

        assert_eq!(model.meta.sheets, ["Sheet1", "Sheet2"]);
        let workbook_kinds: Vec<_> = model.diagnostics.iter().map(|d| d.kind).collect();
        assert_eq!(workbook_kinds, [DiagnosticKind::DuplicateSheet]);
        assert_eq!(model.named_ranges[0].target.to_string(), "Sheet2!B1:B1");

        for (sheet, cell, dep) in [("Sheet1", "A1", "Sheet2!B1"), ("Sheet2", "B1", "Sheet1!A1")] {
            let sheet = model.sheet(sheet).unwrap();
            let kinds: Vec<_> = sheet.diagnostics.iter().map(|d| d.kind).collect();
            assert_eq!(kinds, [DiagnosticKind::CircularReference], "{}", sheet.name);
            let address = Address::parse(cell).unwrap();
            let node = sheet.lineage.iter().find(|n| n.cell == address).unwrap();
            let deps: Vec<String> = node.deps.iter().map(ToString::to_string).collect();
            assert_eq!(deps, [dep]);
            let refs = sheet.cells[&address].references.as_ref().unwrap();
            assert_eq!(refs.refs, node.deps);
        }

        let sheet1 = model.sheet("Sheet1").unwrap();
        let c1 = Address::parse("C1").unwrap();
        let node = sheet1.lineage.iter().find(|n| n.cell == c1).unwrap();
        assert_eq!(
            node.names[0].target.as_ref().map(ToString::to_string).as_deref(),
            Some("Sheet2!B1:B1")
        );
        let a1 = &sheet1.cells[&Address::parse("A1").unwrap()];
        assert_eq!(a1.formula.as_deref(), Some("=sheet2!B1"));
    }

    #[test]
    fn dedicated_pool_gives_the_same_model() {
        let options = ExtractOptions {
            max_threads: Some(2),
            ..Default::default()
        };
        let pooled = Extractor::new(options).unwrap().extract(&workbook());
        let global = extract(&workbook(), &ExtractOptions::default()).unwrap();
        assert_eq!(pooled, global);
    }

    #[test]
    fn invalid_options_are_refused() {
        let options = ExtractOptions {
            chunk_max_cells: 0,
            ..Default::default()
        };
        assert!(matches!(
            Extractor::new(options),
            Err(ExtractError::InvalidOption { option: "chunk_max_cells", .. })
        ));
    }
}
