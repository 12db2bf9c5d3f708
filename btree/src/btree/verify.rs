//! Whole-tree consistency check.
//!
//! Walks the tree one level at a time from the root and reports every
//! problem it finds instead of stopping at the first. Storage failures
//! still abort the walk; a node that fails to decode is reported and its
//! subtree skipped.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use crate::btree::codec::NodeError;
use crate::btree::node::{MAX_TREE_DEPTH, NodeKind};
use crate::btree::store::Access;
use crate::btree::tree::{BTree, BTreeError};
use crate::storage::io::{BlockProvider, NodeNumber};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Compare keys within nodes and against parent bounds.
    pub check_key_order: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            check_key_order: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    Corrupt { node: NodeNumber, error: NodeError },
    FreeCount { recorded: u32, counted: u64 },
    NotAllocated { node: NodeNumber },
    WrongKind { node: NodeNumber, expected: NodeKind, found: NodeKind },
    WrongHeight { node: NodeNumber, expected: u16, found: u8 },
    EmptyNode { node: NodeNumber },
    Cycle { node: NodeNumber },
    BrokenLink {
        node: NodeNumber,
        link: &'static str,
        expected: NodeNumber,
        found: NodeNumber,
    },
    KeyOrder { node: NodeNumber, index: usize },
    /// Keys fall outside the range the parent assigns to the node.
    KeyBounds { node: NodeNumber },
    LeafEnd {
        field: &'static str,
        expected: NodeNumber,
        found: NodeNumber,
    },
    LeafCount { recorded: u32, counted: u64 },
    Depth { recorded: u16, counted: u16 },
    /// Nodes marked in use that nothing refers to.
    Leaked { allocated: u64, reachable: u64 },
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupt { node, error } => write!(f, "node {node} is corrupt: {error}"),
            Self::FreeCount { recorded, counted } => {
                write!(f, "header says {recorded} free nodes, bitmap says {counted}")
            }
            Self::NotAllocated { node } => write!(f, "node {node} is in use but marked free"),
            Self::WrongKind {
                node,
                expected,
                found,
            } => write!(f, "node {node} is a {found} node, expected {expected}"),
            Self::WrongHeight {
                node,
                expected,
                found,
            } => write!(f, "node {node} has height {found}, expected {expected}"),
            Self::EmptyNode { node } => write!(f, "node {node} has no records"),
            Self::Cycle { node } => write!(f, "node {node} is reachable twice"),
            Self::BrokenLink {
                node,
                link,
                expected,
                found,
            } => write!(f, "node {node} {link} link is {found}, expected {expected}"),
            Self::KeyOrder { node, index } => {
                write!(f, "node {node} key {index} is not above the previous key")
            }
            Self::KeyBounds { node } => write!(f, "node {node} keys are outside its parent's range"),
            Self::LeafEnd {
                field,
                expected,
                found,
            } => write!(f, "{field} is {found}, expected {expected}"),
            Self::LeafCount { recorded, counted } => {
                write!(f, "header says {recorded} leaf records, found {counted}")
            }
            Self::Depth { recorded, counted } => {
                write!(f, "header says depth {recorded}, found {counted} levels")
            }
            Self::Leaked {
                allocated,
                reachable,
            } => write!(f, "{allocated} nodes in use but only {reachable} reachable"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub problems: Vec<Problem>,
    pub nodes_visited: u64,
    pub leaf_records: u64,
    pub allocated_nodes: u64,
}

impl VerifyReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

/// A node queued for the next level with the key range its parent gives it.
struct Pending {
    node: NodeNumber,
    /// `None` along the leftmost spine, whose keys may sort below the
    /// parent's first key.
    low: Option<Vec<u8>>,
    high: Option<Vec<u8>>,
}

impl<P: BlockProvider> BTree<P> {
    /// Check the whole tree.
    pub fn verify(&mut self, options: VerifyOptions) -> Result<VerifyReport, BTreeError> {
        let mut report = VerifyReport::default();
        let total = u64::from(self.control.total_nodes);

        let allocated = self.map.count_allocated(&mut self.store, &self.control)?;
        report.allocated_nodes = allocated;
        if allocated + u64::from(self.control.free_nodes) != total {
            report.problems.push(Problem::FreeCount {
                recorded: self.control.free_nodes,
                counted: total - allocated.min(total),
            });
        }

        let mut reachable = 1;
        let map_nodes: Vec<NodeNumber> = self.map.segments().iter().map(|segment| segment.node).collect();
        for &node in map_nodes.iter().filter(|&&node| node != 0) {
            reachable += 1;
            self.check_allocated(node, &mut report)?;
        }
        self.check_allocated(0, &mut report)?;

        reachable += self.verify_levels(options, &mut report)?;
        if allocated != reachable {
            report.problems.push(Problem::Leaked {
                allocated,
                reachable,
            });
        }

        if report.is_clean() {
            tracing::debug!(nodes = report.nodes_visited, "tree verified");
        } else {
            tracing::warn!(problems = report.problems.len(), "tree verification found problems");
        }
        Ok(report)
    }

    fn check_allocated(&mut self, node: NodeNumber, report: &mut VerifyReport) -> Result<(), BTreeError> {
        if !self.map.is_allocated(&mut self.store, &self.control, node)? {
            report.problems.push(Problem::NotAllocated { node });
        }
        Ok(())
    }

    /// Walk from the root level by level. Returns the number of tree nodes
    /// reached.
    fn verify_levels(&mut self, options: VerifyOptions, report: &mut VerifyReport) -> Result<u64, BTreeError> {
        let control = self.control.clone();
        if control.root_node == 0 {
            for (field, found) in [("first leaf", control.first_leaf), ("last leaf", control.last_leaf)] {
                if found != 0 {
                    report.problems.push(Problem::LeafEnd {
                        field,
                        expected: 0,
                        found,
                    });
                }
            }
            if control.tree_depth != 0 {
                report.problems.push(Problem::Depth {
                    recorded: control.tree_depth,
                    counted: 0,
                });
            }
            if control.leaf_records != 0 {
                report.problems.push(Problem::LeafCount {
                    recorded: control.leaf_records,
                    counted: 0,
                });
            }
            return Ok(0);
        }

        let limits = control.limits();
        let layout = limits.layout;
        let mut seen = HashSet::new();
        let mut level = vec![Pending {
            node: control.root_node,
            low: None,
            high: None,
        }];
        let mut height = control.tree_depth;
        let mut levels = 0u16;

        while !level.is_empty() {
            levels += 1;
            if levels > u16::from(MAX_TREE_DEPTH) {
                report.problems.push(Problem::Depth {
                    recorded: control.tree_depth,
                    counted: levels,
                });
                break;
            }

            let mut next_level = Vec::new();
            let mut order = Vec::with_capacity(level.len());
            let mut leaf_level = false;

            for pending in level {
                let number = pending.node;
                if !seen.insert(number) {
                    report.problems.push(Problem::Cycle { node: number });
                    continue;
                }
                report.nodes_visited += 1;
                self.check_allocated(number, report)?;

                let node = match self.store.acquire(number, limits, Access::Read) {
                    Ok(node) => node,
                    Err(BTreeError::Corruption(error)) => {
                        report.problems.push(Problem::Corrupt { node: number, error });
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                let expected = if height <= 1 { NodeKind::Leaf } else { NodeKind::Index };
                if node.kind() != expected {
                    report.problems.push(Problem::WrongKind {
                        node: number,
                        expected,
                        found: node.kind(),
                    });
                    continue;
                }
                if u16::from(node.height()) != height {
                    report.problems.push(Problem::WrongHeight {
                        node: number,
                        expected: height,
                        found: node.height(),
                    });
                }
                order.push((number, node.backward_link(), node.forward_link()));

                let count = usize::from(node.num_records());
                if count == 0 {
                    report.problems.push(Problem::EmptyNode { node: number });
                    continue;
                }

                let schema = self.store.schema();
                if options.check_key_order {
                    for index in 1..count {
                        let previous = layout.key(node.record(index - 1));
                        let current = layout.key(node.record(index));
                        if schema.compare(current, previous) != Ordering::Greater {
                            report.problems.push(Problem::KeyOrder { node: number, index });
                        }
                    }
                    let first = layout.key(node.record(0));
                    let last = layout.key(node.record(count - 1));
                    let below = pending
                        .low
                        .as_deref()
                        .is_some_and(|low| schema.compare(first, low) == Ordering::Less);
                    let above = pending
                        .high
                        .as_deref()
                        .is_some_and(|high| schema.compare(last, high) != Ordering::Less);
                    if below || above {
                        report.problems.push(Problem::KeyBounds { node: number });
                    }
                }

                match node.kind() {
                    NodeKind::Leaf => {
                        leaf_level = true;
                        report.leaf_records += count as u64;
                    }
                    _ => {
                        for index in 0..count {
                            let record = node.record(index);
                            let low = if index == 0 && pending.low.is_none() {
                                None
                            } else {
                                Some(layout.key(record).to_vec())
                            };
                            let high = if index + 1 < count {
                                Some(layout.key(node.record(index + 1)).to_vec())
                            } else {
                                pending.high.clone()
                            };
                            next_level.push(Pending {
                                node: layout.child(record),
                                low,
                                high,
                            });
                        }
                    }
                }
            }

            check_links(&order, report);
            if leaf_level {
                let first = order.first().map_or(0, |entry| entry.0);
                let last = order.last().map_or(0, |entry| entry.0);
                for (field, expected, found) in [
                    ("first leaf", first, control.first_leaf),
                    ("last leaf", last, control.last_leaf),
                ] {
                    if expected != found {
                        report.problems.push(Problem::LeafEnd {
                            field,
                            expected,
                            found,
                        });
                    }
                }
            }

            level = next_level;
            height = height.saturating_sub(1);
        }

        if levels != control.tree_depth {
            report.problems.push(Problem::Depth {
                recorded: control.tree_depth,
                counted: levels,
            });
        }
        if report.leaf_records != u64::from(control.leaf_records) {
            report.problems.push(Problem::LeafCount {
                recorded: control.leaf_records,
                counted: report.leaf_records,
            });
        }
        Ok(seen.len() as u64)
    }
}

/// Nodes on one level must form a doubly linked list in key order.
fn check_links(order: &[(NodeNumber, NodeNumber, NodeNumber)], report: &mut VerifyReport) {
    for (i, &(node, backward, forward)) in order.iter().enumerate() {
        let expected_back = if i == 0 { 0 } else { order[i - 1].0 };
        let expected_forward = order.get(i + 1).map_or(0, |entry| entry.0);
        if backward != expected_back {
            report.problems.push(Problem::BrokenLink {
                node,
                link: "backward",
                expected: expected_back,
                found: backward,
            });
        }
        if forward != expected_forward {
            report.problems.push(Problem::BrokenLink {
                node,
                link: "forward",
                expected: expected_forward,
                found: forward,
            });
        }
    }
}
