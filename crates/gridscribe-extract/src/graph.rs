//! Workbook-wide dependency graph and cycle detection.
//!
//! Vertices are cells and ranges; each formula cell gets one edge per
//! distinct reference. Ranges stay single vertices. For cycle analysis a
//! range vertex reads every formula cell it covers, so `A1 = SUM(A1:A3)`
//! is reported as a self-reference.

use std::collections::BTreeMap;

use gridscribe_common::{Address, CellRange};
use gridscribe_parse::FormulaRef;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

pub type VertexId = usize;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Vertex {
    Cell { sheet: String, address: Address },
    Range { sheet: String, range: CellRange },
}

impl Vertex {
    fn from_ref(home: &str, r: &FormulaRef) -> Self {
        let sheet = r.resolved_sheet(home).to_string();
        match r {
            FormulaRef::Cell { address, .. } => Vertex::Cell {
                sheet,
                address: *address,
            },
            FormulaRef::Range { range, .. } => Vertex::Range {
                sheet,
                range: *range,
            },
        }
    }
}

impl From<&Vertex> for FormulaRef {
    fn from(vertex: &Vertex) -> Self {
        match vertex {
            Vertex::Cell { sheet, address } => FormulaRef::Cell {
                sheet: Some(sheet.clone()),
                address: *address,
            },
            Vertex::Range { sheet, range } => FormulaRef::Range {
                sheet: Some(sheet.clone()),
                range: *range,
            },
        }
    }
}

/// One formula cell reading one cell or range. The target is always
/// sheet-qualified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyEdge {
    pub source: (String, Address),
    pub target: FormulaRef,
}

/// Formula cells that depend on each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    /// Formula cells in the cycle, sorted by sheet then address.
    pub cells: Vec<(String, Address)>,
    /// A single formula cell reading itself, directly or via a range.
    pub self_reference: bool,
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
    vertices: Vec<Vertex>,
    ids: FxHashMap<Vertex, VertexId>,
    dependencies: Vec<SmallVec<[VertexId; 4]>>,
    /// Formula cells per sheet, row-major, for range expansion.
    formula_cells: FxHashMap<String, BTreeMap<Address, VertexId>>,
}

const UNVISITED: usize = usize::MAX;

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, vertex: Vertex) -> VertexId {
        if let Some(&id) = self.ids.get(&vertex) {
            return id;
        }
        let id = self.vertices.len();
        self.vertices.push(vertex.clone());
        self.dependencies.push(SmallVec::new());
        self.ids.insert(vertex, id);
        id
    }

    /// Record the references of one formula cell. Sheet names are matched
    /// exactly, so `refs` should already carry the workbook's spelling.
    pub fn add_formula(&mut self, sheet: &str, address: Address, refs: &[FormulaRef]) {
        let source = self.intern(Vertex::Cell {
            sheet: sheet.to_string(),
            address,
        });
        self.formula_cells
            .entry(sheet.to_string())
            .or_default()
            .insert(address, source);
        for r in refs {
            let target = self.intern(Vertex::from_ref(sheet, r));
            if !self.dependencies[source].contains(&target) {
                self.dependencies[source].push(target);
            }
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.dependencies.iter().map(SmallVec::len).sum()
    }

    /// Direct dependencies of a cell, in the order they were added.
    pub fn dependencies_of(&self, sheet: &str, address: Address) -> Vec<&Vertex> {
        let key = Vertex::Cell {
            sheet: sheet.to_string(),
            address,
        };
        match self.ids.get(&key) {
            Some(&id) => self.dependencies[id]
                .iter()
                .map(|&d| &self.vertices[d])
                .collect(),
            None => Vec::new(),
        }
    }

    /// Every stored edge, grouped by source in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = DependencyEdge> + '_ {
        self.dependencies
            .iter()
            .enumerate()
            .flat_map(move |(source, targets)| {
                let source = match &self.vertices[source] {
                    Vertex::Cell { sheet, address } => Some((sheet.clone(), *address)),
                    Vertex::Range { .. } => None,
                };
                source.into_iter().flat_map(move |source| {
                    targets.iter().map(move |&t| DependencyEdge {
                        source: source.clone(),
                        target: FormulaRef::from(&self.vertices[t]),
                    })
                })
            })
    }

    /// Successor lists with range vertices expanded to the formula cells
    /// they cover.
    fn successors(&self) -> Vec<SmallVec<[VertexId; 4]>> {
        let mut succ = self.dependencies.clone();
        for (id, vertex) in self.vertices.iter().enumerate() {
            let Vertex::Range { sheet, range } = vertex else {
                continue;
            };
            let Some(cells) = self.formula_cells.get(sheet) else {
                continue;
            };
            for (addr, &cell_id) in cells.range(range.start..=range.end) {
                if range.contains(*addr) {
                    succ[id].push(cell_id);
                }
            }
        }
        succ
    }

    /// Tarjan's strongly connected components, iterative so that long
    /// reference chains cannot overflow the stack.
    fn tarjan_scc(succ: &[SmallVec<[VertexId; 4]>]) -> Vec<Vec<VertexId>> {
        let n = succ.len();
        let mut index = vec![UNVISITED; n];
        let mut lowlink = vec![0usize; n];
        let mut on_stack = vec![false; n];
        let mut stack: Vec<VertexId> = Vec::new();
        let mut frames: Vec<(VertexId, usize)> = Vec::new();
        let mut counter = 0usize;
        let mut sccs = Vec::new();

        for root in 0..n {
            if index[root] != UNVISITED {
                continue;
            }
            index[root] = counter;
            lowlink[root] = counter;
            counter += 1;
            stack.push(root);
            on_stack[root] = true;
            frames.push((root, 0));

            while let Some(frame) = frames.last_mut() {
                let (v, next_edge) = *frame;
                if let Some(&w) = succ[v].get(next_edge) {
                    frame.1 += 1;
                    if index[w] == UNVISITED {
                        index[w] = counter;
                        lowlink[w] = counter;
                        counter += 1;
                        stack.push(w);
                        on_stack[w] = true;
                        frames.push((w, 0));
                    } else if on_stack[w] {
                        lowlink[v] = lowlink[v].min(index[w]);
                    }
                    continue;
                }

                frames.pop();
                if let Some(&(parent, _)) = frames.last() {
                    lowlink[parent] = lowlink[parent].min(lowlink[v]);
                }
                if lowlink[v] == index[v] {
                    let mut scc = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack[w] = false;
                        scc.push(w);
                        if w == v {
                            break;
                        }
                    }
                    sccs.push(scc);
                }
            }
        }
        sccs
    }

    /// All cycles among formula cells, in a deterministic order.
    pub fn find_cycles(&self) -> Vec<Cycle> {
        let succ = self.successors();
        let mut cycles: Vec<Cycle> = Self::tarjan_scc(&succ)
            .into_iter()
            .filter_map(|scc| {
                let is_cycle = scc.len() > 1 || succ[scc[0]].contains(&scc[0]);
                if !is_cycle {
                    return None;
                }
                let mut cells: Vec<(String, Address)> = scc
                    .iter()
                    .filter_map(|&id| match &self.vertices[id] {
                        Vertex::Cell { sheet, address }
                            if self
                                .formula_cells
                                .get(sheet)
                                .is_some_and(|m| m.contains_key(address)) =>
                        {
                            Some((sheet.clone(), *address))
                        }
                        _ => None,
                    })
                    .collect();
                cells.sort();
                let self_reference = cells.len() == 1;
                (!cells.is_empty()).then_some(Cycle {
                    cells,
                    self_reference,
                })
            })
            .collect();
        cycles.sort_by(|a, b| a.cells.cmp(&b.cells));
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridscribe_parse::extract_references;

    fn a(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    fn add(graph: &mut DependencyGraph, sheet: &str, cell: &str, formula: &str) {
        let refs = extract_references(formula).unwrap();
        graph.add_formula(sheet, a(cell), &refs.refs);
    }

    #[test]
    fn one_edge_per_distinct_reference() {
        let mut g = DependencyGraph::new();
        add(&mut g, "S", "B2", "=A1+A1+SUM(C1:C3)+Other!A1");
        assert_eq!(g.edge_count(), 3);
        let deps = g.dependencies_of("S", a("B2"));
        assert!(deps.contains(&&Vertex::Cell {
            sheet: "Other".into(),
            address: a("A1")
        }));
        assert!(deps.contains(&&Vertex::Range {
            sheet: "S".into(),
            range: CellRange::parse("C1:C3").unwrap()
        }));

        let targets: Vec<String> = g.edges().map(|e| e.target.to_string()).collect();
        assert_eq!(targets, ["S!A1", "S!C1:C3", "Other!A1"]);
        assert!(g.edges().all(|e| e.source == ("S".to_string(), a("B2"))));
    }

    #[test]
    fn acyclic_chain_has_no_cycles() {
        let mut g = DependencyGraph::new();
        add(&mut g, "S", "A2", "=A1");
        add(&mut g, "S", "A3", "=A2");
        add(&mut g, "S", "A4", "=SUM(A1:A3)");
        assert!(g.find_cycles().is_empty());
    }

    #[test]
    fn detects_cross_sheet_cycle() {
        let mut g = DependencyGraph::new();
        add(&mut g, "S", "A1", "=T!B1+1");
        add(&mut g, "T", "B1", "=S!A1*2");
        add(&mut g, "S", "C1", "=A1");
        let cycles = g.find_cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(
            cycles[0].cells,
            vec![("S".to_string(), a("A1")), ("T".to_string(), a("B1"))]
        );
        assert!(!cycles[0].self_reference);
    }

    #[test]
    fn self_reference_direct_and_through_range() {
        let mut g = DependencyGraph::new();
        add(&mut g, "S", "A1", "=A1+1");
        add(&mut g, "S", "B5", "=SUM(B1:B9)");
        let cycles = g.find_cycles();
        assert_eq!(cycles.len(), 2);
        assert!(cycles.iter().all(|c| c.self_reference));
    }

    #[test]
    fn long_chain_does_not_recurse() {
        let mut g = DependencyGraph::new();
        for row in 2..=50_000u32 {
            g.add_formula(
                "S",
                Address { row, col: 1 },
                &[FormulaRef::Cell {
                    sheet: None,
                    address: Address { row: row - 1, col: 1 },
                }],
            );
        }
        assert!(g.find_cycles().is_empty());
        assert_eq!(g.vertex_count(), 50_000);
    }
}
