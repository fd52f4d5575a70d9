use std::fmt;
use std::str::FromStr;

use crate::address::{Address, AddressError};

/// Rectangular block of cells, inclusive on both corners.
///
/// Invariant: `start.row <= end.row` and `start.col <= end.col`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRange {
    pub start: Address,
    pub end: Address,
}

impl CellRange {
    /// Construct from ordered corners.
    pub fn new(start: Address, end: Address) -> Result<Self, AddressError> {
        if start.row > end.row || start.col > end.col {
            return Err(AddressError::RangeOrder);
        }
        Ok(CellRange { start, end })
    }

    /// Minimal range covering two arbitrary corners.
    pub fn spanning(a: Address, b: Address) -> Self {
        CellRange {
            start: Address {
                row: a.row.min(b.row),
                col: a.col.min(b.col),
            },
            end: Address {
                row: a.row.max(b.row),
                col: a.col.max(b.col),
            },
        }
    }

    pub fn single(addr: Address) -> Self {
        CellRange {
            start: addr,
            end: addr,
        }
    }

    /// Parse `A1:B3` or a bare `A1`. Inverted corners are rejected.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        match s.split_once(':') {
            Some((a, b)) => CellRange::new(Address::parse(a)?, Address::parse(b)?),
            None => Ok(CellRange::single(Address::parse(s)?)),
        }
    }

    pub fn width(&self) -> u32 {
        self.end.col - self.start.col + 1
    }

    pub fn height(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    pub fn cell_count(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn contains(&self, addr: Address) -> bool {
        addr.row >= self.start.row
            && addr.row <= self.end.row
            && addr.col >= self.start.col
            && addr.col <= self.end.col
    }

    pub fn intersects(&self, other: &CellRange) -> bool {
        self.start.row <= other.end.row
            && other.start.row <= self.end.row
            && self.start.col <= other.end.col
            && other.start.col <= self.end.col
    }

    pub fn intersection(&self, other: &CellRange) -> Option<CellRange> {
        if !self.intersects(other) {
            return None;
        }
        Some(CellRange {
            start: Address {
                row: self.start.row.max(other.start.row),
                col: self.start.col.max(other.start.col),
            },
            end: Address {
                row: self.end.row.min(other.end.row),
                col: self.end.col.min(other.end.col),
            },
        })
    }

    /// Grows the range to include `addr`.
    pub fn include(&mut self, addr: Address) {
        self.start.row = self.start.row.min(addr.row);
        self.start.col = self.start.col.min(addr.col);
        self.end.row = self.end.row.max(addr.row);
        self.end.col = self.end.col.max(addr.col);
    }

    /// Row-major iterator over every address in the range.
    pub fn cells(&self) -> impl Iterator<Item = Address> + '_ {
        (self.start.row..=self.end.row).flat_map(move |row| {
            (self.start.col..=self.end.col).map(move |col| Address { row, col })
        })
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl FromStr for CellRange {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CellRange::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for CellRange {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for CellRange {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CellRange::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A range qualified by the sheet it lives on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RangeAddress {
    pub sheet: String,
    pub range: CellRange,
}

impl RangeAddress {
    pub fn new(sheet: impl Into<String>, range: CellRange) -> Self {
        RangeAddress {
            sheet: sheet.into(),
            range,
        }
    }
}

impl fmt::Display for RangeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", quote_sheet_name(&self.sheet), self.range)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for RangeAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Quote a sheet name for use in a reference when it needs it.
pub fn quote_sheet_name(name: &str) -> String {
    let plain = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
        && !name.as_bytes()[0].is_ascii_digit();
    if plain {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

/// Strip surrounding single quotes and collapse doubled quotes.
pub fn unquote_sheet_name(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        raw[1..raw.len() - 1].replace("''", "'")
    } else {
        raw.to_string()
    }
}
