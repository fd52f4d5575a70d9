//! A1-style cell addresses with Excel-compatible bounds.
//!
//! Addresses are 1-based and ordered row-major, which is the reading order used
//! for sections, chunk members and output ordering throughout the workspace.

use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::str::FromStr;

/// Largest row index Excel supports (1,048,576).
pub const MAX_ROW: u32 = 1 << 20;
/// Largest column index Excel supports (16,384, column `XFD`).
pub const MAX_COL: u32 = 1 << 14;

/// Errors produced while parsing or constructing addresses and ranges.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AddressError {
    /// The input string was empty after trimming anchors.
    Empty,
    /// Column letters were missing or not ASCII letters.
    InvalidColumn(String),
    /// Row digits were missing or not decimal.
    InvalidRow(String),
    /// Encountered a 0 where a 1-based index was required.
    ZeroIndex,
    /// Row exceeded [`MAX_ROW`].
    RowOutOfBounds(u64),
    /// Column exceeded [`MAX_COL`].
    ColOutOfBounds(u64),
    /// Start/end coordinates were not ordered (start <= end).
    RangeOrder,
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressError::Empty => write!(f, "address is empty"),
            AddressError::InvalidColumn(s) => write!(f, "invalid column letters in {s:?}"),
            AddressError::InvalidRow(s) => write!(f, "invalid row number in {s:?}"),
            AddressError::ZeroIndex => {
                write!(f, "row and column indices must be 1-based (>= 1)")
            }
            AddressError::RowOutOfBounds(row) => write!(f, "row {row} exceeds {MAX_ROW}"),
            AddressError::ColOutOfBounds(col) => write!(f, "column {col} exceeds {MAX_COL}"),
            AddressError::RangeOrder => {
                write!(
                    f,
                    "range must be ordered so the start is above/left of the end"
                )
            }
        }
    }
}

impl Error for AddressError {}

/// A single cell position, 1-based.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Address {
    pub row: u32,
    pub col: u32,
}

impl Address {
    /// Construct from 1-based coordinates, validating Excel bounds.
    pub fn new(row: u32, col: u32) -> Result<Self, AddressError> {
        if row == 0 || col == 0 {
            return Err(AddressError::ZeroIndex);
        }
        if row > MAX_ROW {
            return Err(AddressError::RowOutOfBounds(row as u64));
        }
        if col > MAX_COL {
            return Err(AddressError::ColOutOfBounds(col as u64));
        }
        Ok(Address { row, col })
    }

    /// Parse `A1`, `$A$1` or `a1`. Anchors are discarded.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let (col_part, row_part) = split_a1(s)?;
        let col = letters_to_column(&col_part)
            .ok_or_else(|| AddressError::InvalidColumn(s.to_string()))?;
        if row_part.is_empty() || !row_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AddressError::InvalidRow(s.to_string()));
        }
        let row: u64 = row_part
            .parse()
            .map_err(|_| AddressError::InvalidRow(s.to_string()))?;
        if row == 0 {
            return Err(AddressError::ZeroIndex);
        }
        if row > MAX_ROW as u64 {
            return Err(AddressError::RowOutOfBounds(row));
        }
        Address::new(row as u32, col)
    }

    /// Column letters (`A`, `AB`, ...).
    pub fn column_letters(&self) -> String {
        column_to_letters(self.col)
    }

    /// Returns the address shifted by the given deltas, if it stays in bounds.
    pub fn offset(&self, d_row: i64, d_col: i64) -> Option<Address> {
        let row = self.row as i64 + d_row;
        let col = self.col as i64 + d_col;
        if row < 1 || col < 1 || row > MAX_ROW as i64 || col > MAX_COL as i64 {
            return None;
        }
        Some(Address {
            row: row as u32,
            col: col as u32,
        })
    }
}

/// Splits an A1 string into upper-cased column letters and row digits,
/// dropping `$` anchors.
fn split_a1(s: &str) -> Result<(String, &str), AddressError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(AddressError::Empty);
    }
    let bytes = s.as_bytes();
    let mut i = 0;
    if bytes[i] == b'$' {
        i += 1;
    }
    let col_start = i;
    while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
        i += 1;
    }
    if i == col_start {
        return Err(AddressError::InvalidColumn(s.to_string()));
    }
    let col = s[col_start..i].to_ascii_uppercase();
    if i < bytes.len() && bytes[i] == b'$' {
        i += 1;
    }
    Ok((col, &s[i..]))
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.row, self.col).cmp(&(other.row, other.col))
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_to_letters(self.col), self.row)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Convert a 1-based column index into letters (`1 -> A`, `28 -> AB`).
pub fn column_to_letters(col: u32) -> String {
    let mut n = col;
    let mut buf = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        buf.push(b'A' + rem);
        n = (n - 1) / 26;
    }
    buf.reverse();
    buf.into_iter().map(char::from).collect()
}

/// Convert column letters (case-insensitive) into a 1-based index.
/// Returns `None` for non-letters or columns beyond [`MAX_COL`].
pub fn letters_to_column(s: &str) -> Option<u32> {
    if s.is_empty() || s.len() > 3 {
        return None;
    }
    let mut col: u32 = 0;
    for ch in s.bytes() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        col = col * 26 + (ch.to_ascii_uppercase() - b'A') as u32 + 1;
    }
    (col <= MAX_COL).then_some(col)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_roundtrip_at_boundaries() {
        for (col, letters) in [(1, "A"), (26, "Z"), (27, "AA"), (702, "ZZ"), (703, "AAA")] {
            assert_eq!(column_to_letters(col), letters);
            assert_eq!(letters_to_column(letters), Some(col));
        }
        assert_eq!(letters_to_column("XFD"), Some(MAX_COL));
        assert_eq!(letters_to_column("XFE"), None);
        assert_eq!(letters_to_column("ABCD"), None);
    }

    #[test]
    fn parse_discards_anchors_and_case() {
        let a = Address::parse("$b$12").unwrap();
        assert_eq!(a, Address { row: 12, col: 2 });
        assert_eq!(a.to_string(), "B12");
        assert_eq!(Address::parse("B$12").unwrap(), a);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(Address::parse(""), Err(AddressError::Empty));
        assert!(matches!(
            Address::parse("12"),
            Err(AddressError::InvalidColumn(_))
        ));
        assert!(matches!(
            Address::parse("A"),
            Err(AddressError::InvalidRow(_))
        ));
        assert!(matches!(
            Address::parse("A1B"),
            Err(AddressError::InvalidRow(_))
        ));
        assert_eq!(Address::parse("A0"), Err(AddressError::ZeroIndex));
        assert_eq!(
            Address::parse("A1048577"),
            Err(AddressError::RowOutOfBounds(1_048_577))
        );
    }

    #[test]
    fn ordering_is_row_major() {
        let mut v = vec![
            Address::parse("B1").unwrap(),
            Address::parse("A2").unwrap(),
            Address::parse("A1").unwrap(),
        ];
        v.sort();
        let rendered: Vec<String> = v.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["A1", "B1", "A2"]);
    }

    #[test]
    fn offset_stays_in_bounds() {
        let a1 = Address::parse("A1").unwrap();
        assert_eq!(a1.offset(-1, 0), None);
        assert_eq!(a1.offset(1, 1), Some(Address { row: 2, col: 2 }));
    }
}
