//! Decoded workbook as handed over by a container reader.
//!
//! The engine never opens files itself; whatever reads xlsx/xls/ods fills in
//! these structs (or serializes them as JSON). Addresses and ranges stay as
//! strings here so that malformed entries can be reported as diagnostics
//! instead of failing the whole document.

use std::collections::BTreeMap;
use std::io::Read;

use gridscribe_common::{CellType, DateSystem, RawValue};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct WorkbookInput {
    #[serde(default)]
    pub properties: WorkbookProperties,
    #[serde(default)]
    pub date_system: DateSystem,
    /// Sheets in workbook order.
    #[serde(default)]
    pub sheets: Vec<SheetInput>,
    /// Workbook-scoped names, plus sheet-scoped ones carrying `scope`.
    #[serde(default)]
    pub named_ranges: Vec<NamedRangeInput>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct WorkbookProperties {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct SheetInput {
    pub name: String,
    #[serde(default)]
    pub cells: Vec<CellInput>,
    #[serde(default)]
    pub comments: BTreeMap<String, String>,
    #[serde(default)]
    pub hyperlinks: BTreeMap<String, String>,
    #[serde(default)]
    pub tables: Vec<TableInput>,
    /// Names scoped to this sheet.
    #[serde(default)]
    pub named_ranges: Vec<NamedRangeInput>,
    #[serde(default)]
    pub merged_ranges: Vec<String>,
    #[serde(default)]
    pub frozen_panes: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CellInput {
    pub address: String,
    #[serde(default)]
    pub value: Option<InputValue>,
    /// Decoder's own opinion of the cell type, when it has one.
    #[serde(default)]
    pub type_hint: Option<CellType>,
    /// Number format code (`yyyy-mm-dd`) or built-in format id (`14`).
    #[serde(default)]
    pub number_format: Option<String>,
    #[serde(default)]
    pub formula: Option<String>,
}

/// Scalar as it appears in JSON.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum InputValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl From<&InputValue> for RawValue {
    fn from(value: &InputValue) -> Self {
        match value {
            InputValue::Bool(b) => RawValue::Boolean(*b),
            InputValue::Number(n) => RawValue::Number(*n),
            InputValue::Text(s) => RawValue::Text(s.clone()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TableInput {
    pub name: String,
    pub range: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NamedRangeInput {
    pub name: String,
    /// Sheet the name is local to; `None` for workbook scope. Ignored on
    /// names declared inside a [`SheetInput`], which are always local to it.
    #[serde(default)]
    pub scope: Option<String>,
    pub refers_to: String,
}

impl WorkbookInput {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn with_sheet(mut self, sheet: SheetInput) -> Self {
        self.sheets.push(sheet);
        self
    }

    pub fn with_named_range(
        mut self,
        name: impl Into<String>,
        scope: Option<&str>,
        refers_to: impl Into<String>,
    ) -> Self {
        self.named_ranges.push(NamedRangeInput {
            name: name.into(),
            scope: scope.map(str::to_string),
            refers_to: refers_to.into(),
        });
        self
    }
}

impl SheetInput {
    pub fn new(name: impl Into<String>) -> Self {
        SheetInput {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_value(mut self, address: &str, value: InputValue) -> Self {
        self.cells.push(CellInput::new(address, Some(value)));
        self
    }

    pub fn with_text(self, address: &str, text: &str) -> Self {
        self.with_value(address, InputValue::Text(text.to_string()))
    }

    pub fn with_number(self, address: &str, n: f64) -> Self {
        self.with_value(address, InputValue::Number(n))
    }

    pub fn with_formula(
        mut self,
        address: &str,
        formula: &str,
        cached: Option<InputValue>,
    ) -> Self {
        let mut cell = CellInput::new(address, cached);
        cell.formula = Some(formula.to_string());
        self.cells.push(cell);
        self
    }

    pub fn with_cell(mut self, cell: CellInput) -> Self {
        self.cells.push(cell);
        self
    }

    pub fn with_table(mut self, name: &str, range: &str) -> Self {
        self.tables.push(TableInput {
            name: name.to_string(),
            range: range.to_string(),
        });
        self
    }

    pub fn with_comment(mut self, address: &str, text: &str) -> Self {
        self.comments.insert(address.to_string(), text.to_string());
        self
    }

    pub fn with_merged(mut self, range: &str) -> Self {
        self.merged_ranges.push(range.to_string());
        self
    }
}

impl CellInput {
    pub fn new(address: &str, value: Option<InputValue>) -> Self {
        CellInput {
            address: address.to_string(),
            value,
            type_hint: None,
            number_format: None,
            formula: None,
        }
    }

    /// The decoded value, `Empty` when absent.
    pub fn raw_value(&self) -> RawValue {
        self.value.as_ref().map(RawValue::from).unwrap_or_default()
    }

    pub fn with_number_format(mut self, format: &str) -> Self {
        self.number_format = Some(format.to_string());
        self
    }

    pub fn with_type_hint(mut self, hint: CellType) -> Self {
        self.type_hint = Some(hint);
        self
    }
}
