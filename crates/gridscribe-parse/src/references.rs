//! Cell and range references contained in a formula.
//!
//! Extraction walks the token stream and inspects operand tokens only, so
//! string literals and function names can never be mistaken for references.

use std::cmp::Ordering;
use std::fmt;

use gridscribe_common::{Address, CellRange, quote_sheet_name, unquote_sheet_name};
use smallvec::SmallVec;

use crate::tokenizer::{LexError, TokenKind, tokenize};

/// A single reference as written in a formula, anchors removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FormulaRef {
    Cell {
        sheet: Option<String>,
        address: Address,
    },
    Range {
        sheet: Option<String>,
        range: CellRange,
    },
}

impl FormulaRef {
    pub fn sheet(&self) -> Option<&str> {
        match self {
            FormulaRef::Cell { sheet, .. } | FormulaRef::Range { sheet, .. } => sheet.as_deref(),
        }
    }

    /// The covered block; a cell reference is a 1x1 range.
    pub fn bounds(&self) -> CellRange {
        match self {
            FormulaRef::Cell { address, .. } => CellRange::single(*address),
            FormulaRef::Range { range, .. } => *range,
        }
    }

    /// Sheet the reference resolves to when written on `home`.
    pub fn resolved_sheet<'a>(&'a self, home: &'a str) -> &'a str {
        self.sheet().unwrap_or(home)
    }

    fn sort_key(&self) -> (Option<&str>, CellRange, u8) {
        let tag = match self {
            FormulaRef::Cell { .. } => 0,
            FormulaRef::Range { .. } => 1,
        };
        (self.sheet(), self.bounds(), tag)
    }
}

impl Ord for FormulaRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for FormulaRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for FormulaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = self.sheet() {
            write!(f, "{}!", quote_sheet_name(sheet))?;
        }
        match self {
            FormulaRef::Cell { address, .. } => write!(f, "{address}"),
            FormulaRef::Range { range, .. } => write!(f, "{range}"),
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for FormulaRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Everything a formula points at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormulaReferences {
    /// Deduplicated, sorted by sheet then position.
    pub refs: Vec<FormulaRef>,
    /// Defined-name identifiers, deduplicated case-insensitively, sorted.
    pub names: Vec<String>,
}

impl FormulaReferences {
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty() && self.names.is_empty()
    }
}

/// What a single operand token turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Reference(FormulaRef),
    Name(String),
    /// Whole rows/columns, structured table refs, external workbooks.
    Unsupported,
}

/// Extract references and defined names from a formula.
///
/// A leading `=` is optional. Lexing failures are returned as-is so the
/// caller can record them; no partial result is produced.
pub fn extract_references(formula: &str) -> Result<FormulaReferences, LexError> {
    let tokens = tokenize(formula)?;
    let mut refs: SmallVec<[FormulaRef; 8]> = SmallVec::new();
    let mut names: Vec<String> = Vec::new();

    for token in tokens.iter().filter(|t| t.kind == TokenKind::Operand) {
        match classify_operand(token.text(formula)) {
            Operand::Reference(r) => refs.push(r),
            Operand::Name(n) => names.push(n),
            Operand::Unsupported => {}
        }
    }

    refs.sort();
    refs.dedup();
    names.sort_by_key(|n| n.to_ascii_uppercase());
    names.dedup_by(|a, b| a.eq_ignore_ascii_case(b));

    Ok(FormulaReferences {
        refs: refs.into_vec(),
        names,
    })
}

/// Classify the text of one operand token.
pub fn classify_operand(text: &str) -> Operand {
    if text.contains('[') {
        return Operand::Unsupported;
    }
    let (sheet, body) = match split_sheet_prefix(text) {
        Some(split) => split,
        None => return Operand::Unsupported,
    };

    if let Some((lhs, rhs)) = body.split_once(':') {
        let rhs = strip_repeated_sheet(rhs, sheet.as_deref());
        return match (Address::parse(lhs), Address::parse(rhs)) {
            (Ok(a), Ok(b)) => Operand::Reference(FormulaRef::Range {
                sheet,
                range: CellRange::spanning(a, b),
            }),
            _ => Operand::Unsupported,
        };
    }

    if let Ok(address) = Address::parse(body) {
        return Operand::Reference(FormulaRef::Cell { sheet, address });
    }
    if sheet.is_none() && is_name_like(body) {
        return Operand::Name(body.to_string());
    }
    Operand::Unsupported
}

/// Splits `Sheet!rest` / `'My Sheet'!rest`. Returns `None` when the quoting
/// is malformed.
fn split_sheet_prefix(text: &str) -> Option<(Option<String>, &str)> {
    if text.starts_with('\'') {
        let bytes = text.as_bytes();
        let mut i = 1;
        while i < bytes.len() {
            if bytes[i] == b'\'' {
                if bytes.get(i + 1) == Some(&b'\'') {
                    i += 2;
                    continue;
                }
                break;
            }
            i += 1;
        }
        if bytes.get(i + 1) != Some(&b'!') {
            return None;
        }
        return Some((Some(unquote_sheet_name(&text[..=i])), &text[i + 2..]));
    }
    match text.split_once('!') {
        Some((sheet, rest)) if !sheet.is_empty() => Some((Some(sheet.to_string()), rest)),
        Some(_) => None,
        None => Some((None, text)),
    }
}

/// `Sheet1!A1:Sheet1!B2` repeats the sheet on the far corner.
fn strip_repeated_sheet<'a>(rhs: &'a str, sheet: Option<&str>) -> &'a str {
    let Some((prefix, rest)) = rhs.rsplit_once('!') else {
        return rhs;
    };
    match sheet {
        Some(sheet) if unquote_sheet_name(prefix) == sheet => rest,
        _ => rhs,
    }
}

fn is_name_like(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_' || first == '\\')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '?' | '\\'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(formula: &str) -> Vec<String> {
        extract_references(formula)
            .unwrap()
            .refs
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn anchors_are_dropped_and_duplicates_merged() {
        assert_eq!(rendered("=$A$1+A1+a$1"), ["A1"]);
    }

    #[test]
    fn cross_sheet_refs_keep_their_sheet() {
        assert_eq!(rendered("=A1+Sheet2!C3"), ["A1", "Sheet2!C3"]);
        assert_eq!(
            rendered("=SUM('Q1 Data'!$B$2:$B$9)"),
            ["'Q1 Data'!B2:B9"]
        );
    }

    #[test]
    fn inverted_ranges_are_normalised() {
        assert_eq!(rendered("=SUM(B3:A1)"), ["A1:B3"]);
        assert_eq!(rendered("=SUM(Sheet1!A1:Sheet1!B2)"), ["Sheet1!A1:B2"]);
    }

    #[test]
    fn strings_functions_and_literals_are_not_references() {
        assert!(rendered("=\"A1\"&LOG10(5)&TRUE&#REF!").is_empty());
        assert!(rendered("=1+2").is_empty());
    }

    #[test]
    fn unsupported_forms_are_skipped() {
        assert!(rendered("=SUM(A:A)").is_empty());
        assert!(rendered("=SUM(1:1)").is_empty());
        assert!(rendered("=SUM(Table1[Amount])").is_empty());
        assert!(rendered("=[1]Sheet1!A1").is_empty());
    }

    #[test]
    fn names_are_collected_separately() {
        let refs = extract_references("=TaxRate*A2+taxrate+ABCD1").unwrap();
        assert_eq!(refs.names, ["ABCD1", "TaxRate"]);
        assert_eq!(refs.refs.len(), 1);
    }

    #[test]
    fn malformed_formula_is_an_error() {
        assert!(extract_references("=SUM(A1").is_err());
    }
}
