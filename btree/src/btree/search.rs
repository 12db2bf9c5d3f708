//! Key search.
//!
//! A search first tries the cached hint: if the hinted node is still a leaf
//! and the key lands strictly inside it (or in the sibling leaf the key
//! spills into), the answer comes without touching the index levels.
//! Anything less certain falls back to a full descent from the root, which
//! also records the path that insert and delete need to rebalance.

use std::cmp::Ordering;

use crate::btree::codec::NodeError;
use crate::btree::control::{ControlBlock, Hint};
use crate::btree::node::{MAX_TREE_DEPTH, Node, NodeKind};
use crate::btree::record::RecordLayout;
use crate::btree::schema::KeySchema;
use crate::btree::store::{Access, NodeStore};
use crate::btree::tree::BTreeError;
use crate::storage::io::{BlockProvider, NodeNumber};

/// One step of a root-to-leaf descent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathEntry {
    pub node: NodeNumber,
    /// Record followed in an index node, or the key's position in the leaf.
    pub index: u16,
}

/// Nodes visited on the way down, root first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreePath {
    entries: Vec<PathEntry>,
}

impl TreePath {
    fn push(&mut self, entry: PathEntry) -> Result<(), NodeError> {
        if self.entries.len() >= usize::from(MAX_TREE_DEPTH) {
            return Err(NodeError::DepthExceeded { node: entry.node });
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<PathEntry> {
        self.entries.pop()
    }

    #[must_use]
    pub fn entries(&self) -> &[PathEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where a key is, or where it would go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub found: bool,
    /// Leaf holding the record or its insertion point; 0 for an empty tree.
    pub node: NodeNumber,
    pub index: u16,
    /// Descent path. Hint hits only record the leaf.
    pub path: TreePath,
}

impl SearchResult {
    fn at_leaf(found: bool, node: NodeNumber, index: usize) -> Self {
        let index = to_index(index);
        Self {
            found,
            node,
            index,
            path: TreePath {
                entries: vec![PathEntry { node, index }],
            },
        }
    }
}

// Record positions are bounded by num_records, a u16.
#[allow(clippy::cast_possible_truncation)]
const fn to_index(index: usize) -> u16 {
    index as u16
}

/// Binary search within one node: `Ok(i)` on an exact match, `Err(i)` with
/// the insertion point otherwise.
pub fn search_node(
    node: &Node,
    layout: RecordLayout,
    schema: &dyn KeySchema,
    key: &[u8],
) -> Result<usize, usize> {
    let (mut low, mut high) = (0, usize::from(node.num_records()));
    while low < high {
        let mid = low + (high - low) / 2;
        match schema.compare(key, layout.key(node.record(mid))) {
            Ordering::Less => high = mid,
            Ordering::Greater => low = mid + 1,
            Ordering::Equal => return Ok(mid),
        }
    }
    Err(low)
}

/// A hint is worth trying only if it names a real, non-header node.
#[must_use]
pub const fn is_hint_valid(control: &ControlBlock, hint: &Hint) -> bool {
    hint.node != 0 && hint.node < control.total_nodes
}

/// Search using `hint` if possible, else a full descent.
pub fn locate<P: BlockProvider>(
    store: &mut NodeStore<P>,
    control: &mut ControlBlock,
    key: &[u8],
    hint: Option<Hint>,
) -> Result<SearchResult, BTreeError> {
    if let Some(hint) = hint.filter(|hint| is_hint_valid(control, hint)) {
        control.stats.hint_checks += 1;
        if let Some(result) = try_hint(store, control, key, hint)? {
            control.stats.hint_hits += 1;
            return Ok(result);
        }
        control.stats.hint_misses += 1;
    }
    descend(store, control, key)
}

fn try_hint<P: BlockProvider>(
    store: &mut NodeStore<P>,
    control: &mut ControlBlock,
    key: &[u8],
    hint: Hint,
) -> Result<Option<SearchResult>, BTreeError> {
    let limits = control.limits();
    let node = match store.acquire(hint.node, limits, Access::Hinted) {
        Ok(node) => node,
        // The hinted node may have been freed and reused since.
        Err(BTreeError::Corruption(_)) => return Ok(None),
        Err(e) => return Err(e),
    };
    if node.kind() != NodeKind::Leaf || node.num_records() == 0 {
        return Ok(None);
    }
    let count = usize::from(node.num_records());
    let schema = store.schema();

    if hint.write_count == control.write_count && usize::from(hint.index) < count {
        let candidate = limits.layout.key(node.record(usize::from(hint.index)));
        if schema.compare(key, candidate) == Ordering::Equal {
            return Ok(Some(SearchResult::at_leaf(true, hint.node, usize::from(hint.index))));
        }
    }

    let index = match search_node(&node, limits.layout, schema, key) {
        Ok(index) => return Ok(Some(SearchResult::at_leaf(true, hint.node, index))),
        Err(index) if index > 0 && index < count => {
            return Ok(Some(SearchResult::at_leaf(false, hint.node, index)));
        }
        Err(index) => index,
    };

    // The key sorts before or after everything here; look next door.
    let sibling = if index == 0 {
        node.backward_link()
    } else {
        node.forward_link()
    };
    drop(node);
    if sibling == 0 {
        return Ok(None);
    }

    let node = store.acquire(sibling, limits, Access::Read)?;
    if node.kind() != NodeKind::Leaf || node.num_records() == 0 {
        return Ok(None);
    }
    let count = usize::from(node.num_records());
    match search_node(&node, limits.layout, store.schema(), key) {
        Ok(index) => {
            control.stats.sibling_hits += 1;
            Ok(Some(SearchResult::at_leaf(true, sibling, index)))
        }
        Err(index) if index > 0 && index < count => {
            control.stats.sibling_hits += 1;
            Ok(Some(SearchResult::at_leaf(false, sibling, index)))
        }
        Err(_) => Ok(None),
    }
}

/// Full descent from the root, recording the path.
pub fn descend<P: BlockProvider>(
    store: &mut NodeStore<P>,
    control: &mut ControlBlock,
    key: &[u8],
) -> Result<SearchResult, BTreeError> {
    control.stats.descents += 1;
    let limits = control.limits();
    let mut path = TreePath::default();
    let mut current = control.root_node;
    if current == 0 {
        return Ok(SearchResult {
            found: false,
            node: 0,
            index: 0,
            path,
        });
    }

    let mut level = control.tree_depth;
    loop {
        let node = store.acquire(current, limits, Access::Read)?;
        if u16::from(node.height()) != level {
            return Err(BTreeError::Corruption(NodeError::HeightMismatch {
                node: current,
                expected: level,
                found: node.height(),
            }));
        }

        let position = search_node(&node, limits.layout, store.schema(), key);
        match node.kind() {
            NodeKind::Leaf => {
                let (found, index) = match position {
                    Ok(index) => (true, index),
                    Err(index) => (false, index),
                };
                path.push(PathEntry {
                    node: current,
                    index: to_index(index),
                })?;
                return Ok(SearchResult {
                    found,
                    node: current,
                    index: to_index(index),
                    path,
                });
            }
            NodeKind::Index => {
                if node.num_records() == 0 {
                    return Err(BTreeError::Corruption(NodeError::EmptyIndexNode { node: current }));
                }
                // Follow the last child whose key is not above the search key.
                let index = match position {
                    Ok(index) => index,
                    Err(index) => index.saturating_sub(1),
                };
                path.push(PathEntry {
                    node: current,
                    index: to_index(index),
                })?;
                current = limits.layout.child(node.record(index));
                level = level.saturating_sub(1);
            }
            found @ (NodeKind::Header | NodeKind::Map) => {
                return Err(BTreeError::Corruption(NodeError::UnexpectedKind {
                    node: current,
                    expected: if level == 1 { NodeKind::Leaf } else { NodeKind::Index },
                    found,
                }));
            }
        }
    }
}
