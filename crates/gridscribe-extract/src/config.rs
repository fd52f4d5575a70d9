//! Extraction options.
//!
//! Options can be built in code, deserialized from JSON or YAML, or read from
//! flat key/value pairs as submitted by a form. Every path rejects unknown
//! keys and runs [`ExtractOptions::validate`] before returning.

use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, Result};

pub const DEFAULT_CHUNK_MAX_CELLS: i64 = 400;
/// Upper bound on `chunk_max_cells`; larger caps are almost certainly typos.
pub const MAX_CHUNK_MAX_CELLS: i64 = 1_000_000;

/// Every key accepted by [`ExtractOptions`].
pub const KNOWN_OPTIONS: &[&str] = &[
    "include_formulas",
    "include_cells",
    "include_comments",
    "include_named_ranges",
    "include_excel_tables",
    "include_inferred_sections",
    "chunk_max_cells",
    "section_gap_tolerance",
    "section_value_cells",
    "detect_tables",
    "max_threads",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractOptions {
    /// Emit formulas (`f`), per-cell dependencies and lineage.
    pub include_formulas: bool,
    /// Emit the per-sheet cell map.
    pub include_cells: bool,
    /// Emit comments and hyperlinks.
    pub include_comments: bool,
    pub include_named_ranges: bool,
    /// Emit tables and their chunks.
    pub include_excel_tables: bool,
    /// Emit inferred text sections and their chunks.
    pub include_inferred_sections: bool,
    /// Hard cap on member cells per chunk.
    pub chunk_max_cells: i64,
    /// Fully empty rows/columns tolerated between cells of one section.
    pub section_gap_tolerance: u32,
    /// Group non-text cells outside tables into sections too. When off,
    /// those cells are listed as unchunked.
    pub section_value_cells: bool,
    /// Infer tables on sheets that declare none.
    pub detect_tables: bool,
    /// Size of a dedicated worker pool; `None` uses the global rayon pool.
    pub max_threads: Option<usize>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            include_formulas: true,
            include_cells: true,
            include_comments: true,
            include_named_ranges: true,
            include_excel_tables: true,
            include_inferred_sections: true,
            chunk_max_cells: DEFAULT_CHUNK_MAX_CELLS,
            section_gap_tolerance: 0,
            section_value_cells: false,
            detect_tables: true,
            max_threads: None,
        }
    }
}

impl ExtractOptions {
    /// Parse options from a JSON object.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_str(json)?;
        if let Some(map) = raw.as_object() {
            check_known(map.keys().map(String::as_str))?;
        }
        let opts: ExtractOptions = serde_json::from_value(raw)?;
        opts.validate()?;
        Ok(opts)
    }

    /// Parse options from a YAML mapping.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let raw: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        if let Some(map) = raw.as_mapping() {
            check_known(map.keys().filter_map(serde_yaml::Value::as_str))?;
        }
        let opts: ExtractOptions = serde_yaml::from_value(raw)?;
        opts.validate()?;
        Ok(opts)
    }

    /// Build options from flat string pairs, starting from the defaults.
    ///
    /// Booleans accept `true/false`, `1/0`, `yes/no` and `on/off`. An empty
    /// `max_threads` means "use the global pool".
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut opts = ExtractOptions::default();
        for (key, value) in pairs {
            let value = value.trim();
            match key {
                "include_formulas" => opts.include_formulas = parse_flag("include_formulas", value)?,
                "include_cells" => opts.include_cells = parse_flag("include_cells", value)?,
                "include_comments" => opts.include_comments = parse_flag("include_comments", value)?,
                "include_named_ranges" => {
                    opts.include_named_ranges = parse_flag("include_named_ranges", value)?
                }
                "include_excel_tables" => {
                    opts.include_excel_tables = parse_flag("include_excel_tables", value)?
                }
                "include_inferred_sections" => {
                    opts.include_inferred_sections = parse_flag("include_inferred_sections", value)?
                }
                "section_value_cells" => {
                    opts.section_value_cells = parse_flag("section_value_cells", value)?
                }
                "detect_tables" => opts.detect_tables = parse_flag("detect_tables", value)?,
                "chunk_max_cells" => {
                    opts.chunk_max_cells = value.parse().map_err(|_| {
                        ExtractError::invalid("chunk_max_cells", format!("`{value}` is not an integer"))
                    })?
                }
                "section_gap_tolerance" => {
                    opts.section_gap_tolerance = value.parse().map_err(|_| {
                        ExtractError::invalid(
                            "section_gap_tolerance",
                            format!("`{value}` is not a non-negative integer"),
                        )
                    })?
                }
                "max_threads" if value.is_empty() => opts.max_threads = None,
                "max_threads" => {
                    opts.max_threads = Some(value.parse().map_err(|_| {
                        ExtractError::invalid("max_threads", format!("`{value}` is not an integer"))
                    })?)
                }
                other => return Err(ExtractError::UnknownOption(other.to_string())),
            }
        }
        opts.validate()?;
        Ok(opts)
    }

    /// Check ranges. Called by every constructor and by `Extractor::new`.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_max_cells <= 0 {
            return Err(ExtractError::invalid(
                "chunk_max_cells",
                format!("must be positive, got {}", self.chunk_max_cells),
            ));
        }
        if self.chunk_max_cells > MAX_CHUNK_MAX_CELLS {
            return Err(ExtractError::invalid(
                "chunk_max_cells",
                format!(
                    "must be at most {MAX_CHUNK_MAX_CELLS}, got {}",
                    self.chunk_max_cells
                ),
            ));
        }
        if self.max_threads == Some(0) {
            return Err(ExtractError::invalid("max_threads", "must be at least 1"));
        }
        Ok(())
    }

    /// The validated chunk cap.
    pub fn chunk_cap(&self) -> usize {
        self.chunk_max_cells.clamp(1, MAX_CHUNK_MAX_CELLS) as usize
    }
}

fn check_known<'a>(mut keys: impl Iterator<Item = &'a str>) -> Result<()> {
    match keys.find(|k| !KNOWN_OPTIONS.contains(k)) {
        Some(unknown) => Err(ExtractError::UnknownOption(unknown.to_string())),
        None => Ok(()),
    }
}

fn parse_flag(option: &'static str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ExtractError::invalid(
            option,
            format!("`{value}` is not a boolean"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let opts = ExtractOptions::default();
        opts.validate().unwrap();
        assert_eq!(opts.chunk_cap(), 400);
        assert_eq!(opts.section_gap_tolerance, 0);
    }

    #[test]
    fn non_positive_cap_is_rejected() {
        for cap in [0, -5] {
            let opts = ExtractOptions {
                chunk_max_cells: cap,
                ..Default::default()
            };
            match opts.validate() {
                Err(ExtractError::InvalidOption { option, .. }) => {
                    assert_eq!(option, "chunk_max_cells")
                }
                other => panic!("unexpected result: {other:?}"),
            }
        }
    }

    #[test]
    fn oversized_cap_is_rejected() {
        let opts = ExtractOptions {
            chunk_max_cells: MAX_CHUNK_MAX_CELLS + 1,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn json_unknown_key_is_reported_by_name() {
        let err = ExtractOptions::from_json_str(r#"{"include_charts": true}"#).unwrap_err();
        match err {
            ExtractError::UnknownOption(name) => assert_eq!(name, "include_charts"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn json_partial_object_keeps_defaults() {
        let opts =
            ExtractOptions::from_json_str(r#"{"chunk_max_cells": 5, "include_cells": false}"#)
                .unwrap();
        assert_eq!(opts.chunk_cap(), 5);
        assert!(!opts.include_cells);
        assert!(opts.include_formulas);
    }

    #[test]
    fn yaml_round_trip() {
        let yaml = "chunk_max_cells: 50\nsection_gap_tolerance: 1\ndetect_tables: false\n";
        let opts = ExtractOptions::from_yaml_str(yaml).unwrap();
        assert_eq!(opts.chunk_max_cells, 50);
        assert_eq!(opts.section_gap_tolerance, 1);
        assert!(!opts.detect_tables);
        assert!(ExtractOptions::from_yaml_str("chunk_max_cells: 0\n").is_err());
    }

    #[test]
    fn form_pairs() {
        let opts = ExtractOptions::from_pairs([
            ("include_comments", "off"),
            ("chunk_max_cells", " 12 "),
            ("max_threads", ""),
        ])
        .unwrap();
        assert!(!opts.include_comments);
        assert_eq!(opts.chunk_cap(), 12);
        assert_eq!(opts.max_threads, None);

        assert!(matches!(
            ExtractOptions::from_pairs([("include_cells", "maybe")]),
            Err(ExtractError::InvalidOption { .. })
        ));
        assert!(matches!(
            ExtractOptions::from_pairs([("verbose", "1")]),
            Err(ExtractError::UnknownOption(_))
        ));
        assert!(ExtractOptions::from_pairs([("max_threads", "0")]).is_err());
    }
}
