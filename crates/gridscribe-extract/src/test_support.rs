use std::collections::BTreeMap;

use gridscribe_common::{Address, RawValue};

use crate::classify::{TypeHints, classify};
use crate::model::Cell;

pub(crate) fn t(s: &str) -> RawValue {
    RawValue::Text(s.to_string())
}

pub(crate) fn n(x: f64) -> RawValue {
    RawValue::Number(x)
}

pub(crate) fn addr(s: &str) -> Address {
    Address::parse(s).unwrap()
}

/// Occupied-cell map from `(address, value)` pairs.
pub(crate) fn grid(entries: &[(&str, RawValue)]) -> BTreeMap<Address, Cell> {
    entries
        .iter()
        .map(|(a, v)| {
            let address = addr(a);
            let cell_type = classify(v, TypeHints::default());
            (address, Cell::new(address, v.clone(), cell_type))
        })
        .collect()
}
