//! JSON and NDJSON rendering.
//!
//! The model is always complete; the `include_*` options only decide what is
//! written. Filtering never renumbers or reorders the chunks that remain.

use std::collections::BTreeMap;
use std::io::{self, Write};

use gridscribe_common::Address;
use serde_json::{Map, Value, json};

use crate::config::ExtractOptions;
use crate::error::Result;
use crate::model::{Cell, Chunk, ChunkKind, SheetModel, WorkbookModel};

/// Chunks that survive the options, in total order.
pub fn visible_chunks<'a>(
    model: &'a WorkbookModel,
    options: &'a ExtractOptions,
) -> impl Iterator<Item = &'a Chunk> + 'a {
    model.chunks().filter(move |c| shows(c, options))
}

fn shows(chunk: &Chunk, options: &ExtractOptions) -> bool {
    match chunk.kind {
        ChunkKind::Table => options.include_excel_tables,
        ChunkKind::Section => options.include_inferred_sections,
    }
}

pub fn to_json_value(model: &WorkbookModel, options: &ExtractOptions) -> Result<Value> {
    let mut root = Map::new();
    root.insert("workbook".into(), serde_json::to_value(&model.meta)?);
    if options.include_named_ranges {
        root.insert(
            "named_ranges".into(),
            serde_json::to_value(&model.named_ranges)?,
        );
    }
    let mut sheets = Map::new();
    for sheet in &model.sheets {
        sheets.insert(sheet.name.clone(), sheet_json(sheet, options)?);
    }
    root.insert("sheets".into(), Value::Object(sheets));
    root.insert(
        "diagnostics".into(),
        serde_json::to_value(&model.diagnostics)?,
    );
    Ok(Value::Object(root))
}

/// Compact JSON document. Byte-identical for identical model and options.
pub fn to_json_string(model: &WorkbookModel, options: &ExtractOptions) -> Result<String> {
    Ok(serde_json::to_string(&to_json_value(model, options)?)?)
}

pub fn to_json_string_pretty(model: &WorkbookModel, options: &ExtractOptions) -> Result<String> {
    Ok(serde_json::to_string_pretty(&to_json_value(model, options)?)?)
}

/// One chunk per line.
pub fn write_ndjson<W: Write>(
    model: &WorkbookModel,
    options: &ExtractOptions,
    mut writer: W,
) -> Result<()> {
    for chunk in visible_chunks(model, options) {
        serde_json::to_writer(&mut writer, chunk)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

pub fn ndjson_string(model: &WorkbookModel, options: &ExtractOptions) -> Result<String> {
    let mut buf = Vec::new();
    write_ndjson(model, options, &mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
}

fn sheet_json(sheet: &SheetModel, options: &ExtractOptions) -> Result<Value> {
    let mut out = Map::new();
    out.insert("dims".into(), serde_json::to_value(sheet.dims)?);
    out.insert(
        "frozen_panes".into(),
        serde_json::to_value(sheet.frozen_panes)?,
    );
    out.insert(
        "merged_ranges".into(),
        serde_json::to_value(&sheet.merged_ranges)?,
    );

    if options.include_cells {
        let mut cells = Map::new();
        for (addr, cell) in &sheet.cells {
            cells.insert(addr.to_string(), cell_json(cell, options)?);
        }
        out.insert("cells".into(), Value::Object(cells));
    }
    if options.include_comments {
        out.insert("comments".into(), by_address(&sheet.comments));
        out.insert("hyperlinks".into(), by_address(&sheet.hyperlinks));
    }
    if options.include_named_ranges {
        out.insert(
            "named_ranges".into(),
            serde_json::to_value(&sheet.named_ranges)?,
        );
    }
    if options.include_excel_tables {
        out.insert("tables".into(), serde_json::to_value(&sheet.tables)?);
    }
    if options.include_inferred_sections {
        out.insert("sections".into(), serde_json::to_value(&sheet.sections)?);
    }
    if options.include_formulas {
        out.insert(
            "lineage".into(),
            json!({ "nodes": serde_json::to_value(&sheet.lineage)? }),
        );
    }

    let chunks: Vec<&Chunk> = sheet
        .chunks
        .iter()
        .filter(|c| shows(c, options))
        .collect();
    out.insert("chunks".into(), serde_json::to_value(chunks)?);
    out.insert("unchunked".into(), serde_json::to_value(&sheet.unchunked)?);
    out.insert(
        "diagnostics".into(),
        serde_json::to_value(&sheet.diagnostics)?,
    );
    Ok(Value::Object(out))
}

fn by_address(entries: &BTreeMap<Address, String>) -> Value {
    Value::Object(
        entries
            .iter()
            .map(|(addr, text)| (addr.to_string(), Value::String(text.clone())))
            .collect(),
    )
}

fn cell_json(cell: &Cell, options: &ExtractOptions) -> Result<Value> {
    let mut out = Map::new();
    out.insert("v".into(), serde_json::to_value(&cell.value)?);
    out.insert("t".into(), serde_json::to_value(cell.cell_type)?);
    out.insert("display".into(), Value::String(cell.display()));
    if options.include_formulas {
        if let (Some(formula), Some(refs)) = (&cell.formula, &cell.references) {
            out.insert("f".into(), Value::String(formula.clone()));
            out.insert("deps".into(), serde_json::to_value(&refs.refs)?);
        }
    }
    if options.include_comments {
        if let Some(comment) = &cell.comment {
            out.insert("comment".into(), Value::String(comment.clone()));
        }
        if let Some(link) = &cell.hyperlink {
            out.insert("hyperlink".into(), Value::String(link.clone()));
        }
    }
    Ok(Value::Object(out))
}
