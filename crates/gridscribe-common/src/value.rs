use chrono::{Duration as ChronoDur, NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt::{self, Display};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/* ───────────────────── Excel date-serial utilities ───────────────────
1900 system:
  Serial 1  = 1900-01-01
  Serial 60 = 1900-02-29  (phantom day Excel inherited from Lotus)
  Serial 61 = 1900-03-01
1904 system:
  Serial 0  = 1904-01-01, no phantom day.
Time of day is the fractional part (no timezone).
------------------------------------------------------------------- */

const EXCEL_EPOCH_1900: NaiveDate = NaiveDate::from_ymd_opt(1899, 12, 31).unwrap();
const EXCEL_EPOCH_1904: NaiveDate = NaiveDate::from_ymd_opt(1904, 1, 1).unwrap();
const PHANTOM_LEAP_DAY: NaiveDate = NaiveDate::from_ymd_opt(1900, 2, 28).unwrap();

/// Largest serial Excel renders as a date (9999-12-31).
const MAX_SERIAL: f64 = 2_958_465.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DateSystem {
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "1900"))]
    Excel1900,
    #[cfg_attr(feature = "serde", serde(rename = "1904"))]
    Excel1904,
}

impl Display for DateSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateSystem::Excel1900 => write!(f, "1900"),
            DateSystem::Excel1904 => write!(f, "1904"),
        }
    }
}

/// Convert an Excel serial number into a calendar datetime.
///
/// Returns `None` for negative, non-finite or out-of-range serials, which
/// Excel itself renders as `#####`.
pub fn serial_to_datetime(serial: f64, system: DateSystem) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 || serial > MAX_SERIAL {
        return None;
    }
    let days = serial.trunc() as i64;
    let frac_secs = (serial.fract() * 86_400.0).round() as i64;

    let date = match system {
        DateSystem::Excel1900 if days == 60 => PHANTOM_LEAP_DAY,
        DateSystem::Excel1900 => {
            let offset = if days < 60 { days } else { days - 1 };
            EXCEL_EPOCH_1900.checked_add_signed(ChronoDur::days(offset))?
        }
        DateSystem::Excel1904 => EXCEL_EPOCH_1904.checked_add_signed(ChronoDur::days(days))?,
    };

    // Rounding can push a time like 23:59:59.9 to midnight of the next day.
    let (date, secs) = if frac_secs >= 86_400 {
        (date.succ_opt()?, frac_secs - 86_400)
    } else {
        (date, frac_secs)
    };
    let time = NaiveTime::from_num_seconds_from_midnight_opt(secs as u32, 0)?;
    Some(date.and_time(time))
}

/// A cell value as delivered by the workbook decoder.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawValue {
    Number(f64),
    Text(String),
    Boolean(bool),
    DateTime(NaiveDateTime),
    #[default]
    Empty,
}

impl RawValue {
    /// `Empty` and empty text both count as no value.
    pub fn is_blank(&self) -> bool {
        match self {
            RawValue::Empty => true,
            RawValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Number(n) => write!(f, "{}", format_number(*n)),
            RawValue::Text(s) => write!(f, "{s}"),
            RawValue::Boolean(true) => write!(f, "TRUE"),
            RawValue::Boolean(false) => write!(f, "FALSE"),
            RawValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
            RawValue::Empty => Ok(()),
        }
    }
}

/// Integral values print without a fractional part, everything else via the
/// shortest round-tripping representation.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[cfg(feature = "serde")]
impl Serialize for RawValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RawValue::Number(n) if n.is_finite() => {
                if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            RawValue::Number(n) => serializer.collect_str(n),
            RawValue::Text(s) => serializer.serialize_str(s),
            RawValue::Boolean(b) => serializer.serialize_bool(*b),
            RawValue::DateTime(_) => serializer.collect_str(self),
            RawValue::Empty => serializer.serialize_none(),
        }
    }
}

/// Inferred semantic type of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CellType {
    Number,
    Str,
    Bool,
    Datetime,
    Empty,
}

impl CellType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellType::Number => "number",
            CellType::Str => "str",
            CellType::Bool => "bool",
            CellType::Datetime => "datetime",
            CellType::Empty => "empty",
        }
    }
}

impl Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn serial_1900_handles_phantom_leap_day() {
        let sys = DateSystem::Excel1900;
        assert_eq!(serial_to_datetime(1.0, sys), Some(ymd(1900, 1, 1)));
        assert_eq!(serial_to_datetime(59.0, sys), Some(ymd(1900, 2, 28)));
        assert_eq!(serial_to_datetime(60.0, sys), Some(ymd(1900, 2, 28)));
        assert_eq!(serial_to_datetime(61.0, sys), Some(ymd(1900, 3, 1)));
        assert_eq!(serial_to_datetime(45_322.0, sys), Some(ymd(2024, 1, 31)));
    }

    #[test]
    fn serial_1904_and_time_of_day() {
        assert_eq!(
            serial_to_datetime(0.0, DateSystem::Excel1904),
            Some(ymd(1904, 1, 1))
        );
        let noon = serial_to_datetime(45_322.5, DateSystem::Excel1900).unwrap();
        assert_eq!(noon.to_string(), "2024-01-31 12:00:00");
    }

    #[test]
    fn serial_out_of_range_is_none() {
        assert_eq!(serial_to_datetime(-1.0, DateSystem::Excel1900), None);
        assert_eq!(serial_to_datetime(f64::NAN, DateSystem::Excel1900), None);
        assert_eq!(serial_to_datetime(3e6, DateSystem::Excel1900), None);
    }

    #[test]
    fn display_forms() {
        assert_eq!(RawValue::Number(12.0).to_string(), "12");
        assert_eq!(RawValue::Number(3.5).to_string(), "3.5");
        assert_eq!(RawValue::Boolean(true).to_string(), "TRUE");
        assert_eq!(
            RawValue::DateTime(ymd(2024, 1, 31)).to_string(),
            "2024-01-31T00:00:00"
        );
        assert!(RawValue::Text(String::new()).is_blank());
        assert!(!RawValue::Number(0.0).is_blank());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_forms() {
        let v = serde_json::to_value(vec![
            RawValue::Number(4.0),
            RawValue::Number(0.25),
            RawValue::Text("x".into()),
            RawValue::Empty,
            RawValue::Number(f64::INFINITY),
        ])
        .unwrap();
        assert_eq!(v, serde_json::json!([4, 0.25, "x", null, "inf"]));
        assert_eq!(
            serde_json::to_value(CellType::Str).unwrap(),
            serde_json::json!("str")
        );
    }
}
