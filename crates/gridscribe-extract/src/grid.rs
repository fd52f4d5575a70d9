//! Index-addressed helpers shared by table detection and section inference.

use std::collections::BTreeMap;

use gridscribe_common::{Address, CellRange};

/// Union-find over `0..n` with path halving and union by rank.
#[derive(Debug, Clone)]
pub(crate) struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    pub(crate) fn new(n: usize) -> Self {
        DisjointSet {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub(crate) fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    pub(crate) fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] = self.rank[ra].saturating_add(1);
            }
        }
    }

    /// Members of every set, each set ascending, sets ordered by their
    /// smallest member.
    pub(crate) fn groups(&mut self) -> Vec<Vec<usize>> {
        let mut by_root: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        let mut first_of_root: Vec<Option<usize>> = vec![None; self.parent.len()];
        for i in 0..self.parent.len() {
            let root = self.find(i);
            let key = *first_of_root[root].get_or_insert(i);
            by_root.entry(key).or_default().push(i);
        }
        by_root.into_values().collect()
    }
}

/// Smallest rectangle covering `cells`.
pub(crate) fn bounding_box<I: IntoIterator<Item = Address>>(cells: I) -> Option<CellRange> {
    let mut iter = cells.into_iter();
    let first = iter.next()?;
    let mut bounds = CellRange::single(first);
    for addr in iter {
        bounds.include(addr);
    }
    Some(bounds)
}

/// Keys of `map` inside row `row` between columns `first..=last`.
pub(crate) fn row_slice<V>(
    map: &BTreeMap<Address, V>,
    row: u32,
    first: u32,
    last: u32,
) -> impl Iterator<Item = (&Address, &V)> {
    map.range(Address { row, col: first }..=Address { row, col: last })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_are_ordered_by_smallest_member() {
        let mut ds = DisjointSet::new(6);
        ds.union(4, 1);
        ds.union(5, 3);
        ds.union(3, 0);
        assert_eq!(ds.groups(), vec![vec![0, 3, 5], vec![1, 4], vec![2]]);
    }

    #[test]
    fn long_union_chains_stay_flat() {
        let mut ds = DisjointSet::new(100_000);
        for i in 1..100_000 {
            ds.union(i - 1, i);
        }
        assert_eq!(ds.find(99_999), ds.find(0));
        assert_eq!(ds.groups().len(), 1);
    }

    #[test]
    fn bounding_box_of_scattered_cells() {
        let cells = ["C2", "A5", "B1"].map(|s| Address::parse(s).unwrap());
        assert_eq!(bounding_box(cells).unwrap().to_string(), "A1:C5");
        assert!(bounding_box(std::iter::empty()).is_none());
    }
}
