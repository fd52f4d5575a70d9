//! Cell type classification.
//!
//! Checks run in a fixed order so the result never depends on which decoder
//! produced the value: explicit date formatting, boolean, number, text,
//! empty. Anything that fits none of them is treated as text.

use gridscribe_common::{CellType, DateSystem, RawValue, serial_to_datetime};

/// Decoder-provided formatting facts for one cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeHints {
    /// The cell carries a date or time number format.
    pub date_format: bool,
    /// The decoder flagged the cell as boolean.
    pub boolean: bool,
}

impl TypeHints {
    pub fn from_input(type_hint: Option<CellType>, number_format: Option<&str>) -> Self {
        TypeHints {
            date_format: type_hint == Some(CellType::Datetime)
                || number_format.is_some_and(is_date_format),
            boolean: type_hint == Some(CellType::Bool),
        }
    }
}

/// Classify a raw value. Pure and total.
pub fn classify(value: &RawValue, hints: TypeHints) -> CellType {
    match value {
        RawValue::DateTime(_) => CellType::Datetime,
        RawValue::Number(n) if hints.date_format && n.is_finite() => CellType::Datetime,
        RawValue::Boolean(_) => CellType::Bool,
        RawValue::Number(n) if hints.boolean && (*n == 0.0 || *n == 1.0) => CellType::Bool,
        RawValue::Number(n) if n.is_finite() => CellType::Number,
        RawValue::Text(s) if !s.is_empty() => CellType::Str,
        RawValue::Text(_) | RawValue::Empty => CellType::Empty,
        RawValue::Number(_) => CellType::Str,
    }
}

/// Classify and normalise the value to match its type: date serials become
/// datetimes, flagged 0/1 become booleans, unclassifiable numbers become text.
pub fn classify_value(
    value: RawValue,
    hints: TypeHints,
    date_system: DateSystem,
) -> (RawValue, CellType) {
    let cell_type = classify(&value, hints);
    let value = match (cell_type, value) {
        (CellType::Datetime, RawValue::Number(n)) => match serial_to_datetime(n, date_system) {
            Some(dt) => RawValue::DateTime(dt),
            // Serials Excel itself cannot render stay numeric.
            None => return (RawValue::Number(n), CellType::Number),
        },
        (CellType::Bool, RawValue::Number(n)) => RawValue::Boolean(n != 0.0),
        (CellType::Str, RawValue::Number(n)) => RawValue::Text(n.to_string()),
        (_, v) => v,
    };
    (value, cell_type)
}

/// Built-in format ids 14-22 and 45-47 are dates/times.
fn is_builtin_date_format(id: &str) -> Option<bool> {
    let id: u32 = id.parse().ok()?;
    Some(matches!(id, 14..=22 | 45..=47))
}

/// True when a format code shows a date or time part. Quoted literals,
/// bracketed sections (colours, locales) and escaped characters are skipped.
pub fn is_date_format(format: &str) -> bool {
    let format = format.trim();
    if let Some(builtin) = is_builtin_date_format(format) {
        return builtin;
    }
    // Elapsed-time sections ([h], [mm], [ss]) are time formats.
    let lower = format.to_ascii_lowercase();
    if ["[h", "[m]", "[mm]", "[s"].iter().any(|p| lower.contains(p)) {
        return true;
    }

    let mut escaped = false;
    let mut literal = false;
    let mut bracket = false;
    for ch in format.chars() {
        match ch {
            _ if escaped => escaped = false,
            '_' | '\\' | '*' if !literal => escaped = true,
            '"' => literal = !literal,
            _ if literal => {}
            '[' => bracket = true,
            ']' if bracket => bracket = false,
            _ if bracket => {}
            'y' | 'Y' | 'd' | 'D' | 'h' | 'H' | 's' | 'S' => return true,
            _ => {}
        }
    }
    false
}
