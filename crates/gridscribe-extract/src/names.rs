//! Defined-name resolution and sheet-name lookup.
//!
//! Names are case-insensitive and unique per scope. Within one scope the last
//! declaration wins; a sheet-local name hides a workbook name of the same
//! text on that sheet only. Sheet names are case-insensitive too: every
//! reference is stored with the sheet name as the workbook spells it.

use gridscribe_common::{CellRange, Diagnostic, DiagnosticKind, RangeAddress, Subject};
use gridscribe_parse::{FormulaRef, Operand, classify_operand};
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;

use crate::input::NamedRangeInput;
use crate::model::{NameScope, NamedRange};

static NAME_SYNTAX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\p{L}_\\][\p{L}\p{N}_.?\\]*$").expect("name pattern is valid")
});

const BUILTIN_PREFIX: &str = "_xlnm.";

/// The workbook's sheet names, looked up case-insensitively.
#[derive(Debug, Default, Clone)]
pub struct SheetIndex {
    by_upper: FxHashMap<String, String>,
}

impl SheetIndex {
    /// False when a sheet of the same name, in any case, is already present.
    pub fn insert(&mut self, name: &str) -> bool {
        let upper = name.to_uppercase();
        if self.by_upper.contains_key(&upper) {
            return false;
        }
        self.by_upper.insert(upper, name.to_string());
        true
    }

    /// The name as the workbook spells it.
    pub fn canonical(&self, name: &str) -> Option<&str> {
        self.by_upper.get(&name.to_uppercase()).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.canonical(name).is_some()
    }
}

impl<'a> FromIterator<&'a str> for SheetIndex {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        let mut index = SheetIndex::default();
        for name in iter {
            index.insert(name);
        }
        index
    }
}

#[derive(Debug, Default, Clone)]
pub struct NameTable {
    entries: Vec<Option<NamedRange>>,
    index: FxHashMap<(NameScope, String), usize>,
}

impl NameTable {
    /// Resolve declarations in order. `sheets` are the workbook's sheet names.
    pub fn resolve<'a, I>(declarations: I, sheets: &SheetIndex) -> (Self, Vec<Diagnostic>)
    where
        I: IntoIterator<Item = (NameScope, &'a NamedRangeInput)>,
    {
        let mut table = NameTable::default();
        let mut diagnostics = Vec::new();

        for (scope, decl) in declarations {
            let name = decl.name.trim();
            if name.starts_with(BUILTIN_PREFIX) {
                #[cfg(feature = "tracing")]
                tracing::debug!(name = %name, "skipping built-in defined name");
                continue;
            }
            let subject = Subject::Name {
                name: name.to_string(),
                scope: scope.sheet().map(str::to_string),
            };

            let (scope, target) = match resolve_target(name, &scope, &decl.refers_to, sheets) {
                Ok(resolved) => resolved,
                Err(message) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(name = %name, refers_to = %decl.refers_to, "{message}");
                    diagnostics.push(
                        Diagnostic::new(DiagnosticKind::NameUnresolved, subject)
                            .with_message(message),
                    );
                    continue;
                }
            };

            let key = (scope.clone(), name.to_uppercase());
            if let Some(&previous) = table.index.get(&key) {
                if let Some(old) = table.entries[previous].take() {
                    diagnostics.push(
                        Diagnostic::new(DiagnosticKind::NameShadowed, subject).with_message(
                            format!(
                                "redeclared; `{}` replaces earlier definition `{}`",
                                decl.refers_to, old.refers_to
                            ),
                        ),
                    );
                }
            }
            table.index.insert(key, table.entries.len());
            table.entries.push(Some(NamedRange {
                name: name.to_string(),
                scope,
                target,
                refers_to: decl.refers_to.clone(),
            }));
        }
        (table, diagnostics)
    }

    /// Binding visible from `sheet`, preferring the sheet-local one.
    pub fn lookup(&self, name: &str, sheet: &str) -> Option<&NamedRange> {
        let upper = name.to_uppercase();
        self.get(&NameScope::Sheet(sheet.to_string()), &upper)
            .or_else(|| self.get(&NameScope::Workbook, &upper))
    }

    fn get(&self, scope: &NameScope, upper: &str) -> Option<&NamedRange> {
        let idx = *self.index.get(&(scope.clone(), upper.to_string()))?;
        self.entries[idx].as_ref()
    }

    /// All surviving bindings in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &NamedRange> {
        self.entries.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sheet-local names plus workbook names they do not shadow.
    pub fn visible_from(&self, sheet: &str) -> Vec<NamedRange> {
        self.iter()
            .filter(|n| match &n.scope {
                NameScope::Sheet(s) => s == sheet,
                NameScope::Workbook => self
                    .get(&NameScope::Sheet(sheet.to_string()), &n.name.to_uppercase())
                    .is_none(),
            })
            .cloned()
            .collect()
    }
}

fn resolve_target(
    name: &str,
    scope: &NameScope,
    refers_to: &str,
    sheets: &SheetIndex,
) -> Result<(NameScope, RangeAddress), String> {
    if !NAME_SYNTAX.is_match(name) || matches!(classify_operand(name), Operand::Reference(_)) {
        return Err(format!("`{name}` is not a valid name"));
    }
    let scope = match scope {
        NameScope::Sheet(sheet) => match sheets.canonical(sheet) {
            Some(canonical) => NameScope::Sheet(canonical.to_string()),
            None => return Err(format!("scope sheet `{sheet}` does not exist")),
        },
        NameScope::Workbook => NameScope::Workbook,
    };

    let body = refers_to.trim();
    let body = body.strip_prefix('=').unwrap_or(body).trim();
    let reference = match classify_operand(body) {
        Operand::Reference(r) => r,
        _ => return Err(format!("`{refers_to}` is not a cell or range reference")),
    };
    let (sheet, range) = match reference {
        FormulaRef::Cell { sheet, address } => (sheet, CellRange::single(address)),
        FormulaRef::Range { sheet, range } => (sheet, range),
    };
    let sheet = match sheet.or_else(|| scope.sheet().map(str::to_string)) {
        Some(sheet) => sheet,
        None => return Err(format!("`{refers_to}` has no sheet")),
    };
    let Some(canonical) = sheets.canonical(&sheet) else {
        return Err(format!("`{refers_to}` refers to missing sheet `{sheet}`"));
    };
    Ok((scope, RangeAddress::new(canonical, range)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(name: &str, refers_to: &str) -> NamedRangeInput {
        NamedRangeInput {
            name: name.into(),
            scope: None,
            refers_to: refers_to.into(),
        }
    }

    fn sheets() -> SheetIndex {
        ["Sheet1", "Data Q1", "Sheet2"].into_iter().collect()
    }

    #[test]
    fn resolves_quoted_and_anchored_targets() {
        let d = [decl("Rates", "='Data Q1'!$A$1:$A$10")];
        let (table, diags) = NameTable::resolve([(NameScope::Workbook, &d[0])], &sheets());
        assert!(diags.is_empty());
        let rates = table.lookup("rates", "Sheet1").unwrap();
        assert_eq!(rates.target.to_string(), "'Data Q1'!A1:A10");
    }

    #[test]
    fn last_declaration_wins_with_diagnostic() {
        let d = [decl("Total", "Sheet1!A1"), decl("TOTAL", "Sheet1!B2")];
        let (table, diags) =
            NameTable::resolve(d.iter().map(|x| (NameScope::Workbook, x)), &sheets());
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.lookup("Total", "Sheet1").unwrap().target.to_string(),
            "Sheet1!B2:B2"
        );
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::NameShadowed);
        assert!(diags[0].message.contains("Sheet1!A1"));
    }

    #[test]
    fn sheet_local_shadows_workbook_name() {
        let global = decl("Limit", "Sheet1!A1");
        let local = decl("Limit", "C3");
        let (table, diags) = NameTable::resolve(
            [
                (NameScope::Workbook, &global),
                (NameScope::Sheet("Data Q1".into()), &local),
            ],
            &sheets(),
        );
        assert!(diags.is_empty());
        assert_eq!(
            table.lookup("Limit", "Data Q1").unwrap().target.to_string(),
            "'Data Q1'!C3:C3"
        );
        assert_eq!(
            table.lookup("Limit", "Sheet1").unwrap().target.to_string(),
            "Sheet1!A1:A1"
        );
        let visible: Vec<_> = table
            .visible_from("Data Q1")
            .into_iter()
            .map(|n| n.scope)
            .collect();
        assert_eq!(visible, [NameScope::Sheet("Data Q1".into())]);
        assert_eq!(table.visible_from("Sheet1").len(), 1);
    }

    #[test]
    fn sheet_names_match_in_any_case() {
        let rate = decl("Rate", "sheet2!B1");
        let cap = decl("Cap", "C3");
        let (table, diags) = NameTable::resolve(
            [
                (NameScope::Workbook, &rate),
                (NameScope::Sheet("DATA q1".into()), &cap),
            ],
            &sheets(),
        );
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(
            table.lookup("rate", "Sheet1").unwrap().target.to_string(),
            "Sheet2!B1:B1"
        );
        let cap = table.lookup("Cap", "Data Q1").unwrap();
        assert_eq!(cap.scope, NameScope::Sheet("Data Q1".into()));
        assert_eq!(cap.target.to_string(), "'Data Q1'!C3:C3");

        let mut index = sheets();
        assert!(!index.insert("SHEET1"));
        assert_eq!(index.canonical("data Q1"), Some("Data Q1"));
    }

    #[test]
    fn unresolvable_names_are_dropped() {
        let d = [
            decl("Ghost", "Missing!A1"),
            decl("Const", "=0.07"),
            decl("NoSheet", "A1"),
            decl("B2", "Sheet1!A1"),
            decl("_xlnm.Print_Area", "Sheet1!A1:D9"),
        ];
        let (table, diags) =
            NameTable::resolve(d.iter().map(|x| (NameScope::Workbook, x)), &sheets());
        assert!(table.is_empty());
        assert_eq!(diags.len(), 4);
        assert!(diags.iter().all(|d| d.kind == DiagnosticKind::NameUnresolved));
    }
}
