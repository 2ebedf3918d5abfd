//! N-ary tree (forest) over a [`Mem`].
//!
//! Every node carries its parent, first/last child and sibling links, so
//! positional child access, appends, prepends and unlinking never need a
//! separate child array. Removing a node removes its whole subtree without
//! recursion or an explicit stack: the walk always descends to the first
//! leaf, removes it, and continues from its next sibling or its parent.

use bedrock_alloc::{AllocError, Mem};
use smallvec::SmallVec;

use crate::slab::{Handle, Slab};
use crate::vec::MemVec;

/// Identifier of a tree node. Stale once the node is removed.
pub type NodeId = Handle;

/// Children lists up to this length are returned without allocating.
const INLINE_CHILDREN: usize = 8;

struct Node<T> {
    value: T,
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    prev_sibling: Option<NodeId>,
    next_sibling: Option<NodeId>,
    child_count: usize,
}

impl<T> Node<T> {
    fn new(value: T, parent: Option<NodeId>) -> Self {
        Self {
            value,
            parent,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
            child_count: 0,
        }
    }
}

/// A forest of ordered n-ary trees whose nodes come from a [`Mem`].
pub struct MemTree<'m, T> {
    nodes: Slab<'m, Node<T>>,
    roots: MemVec<'m, NodeId>,
}

impl<'m, T> MemTree<'m, T> {
    /// Create an empty forest drawing memory from `mem`.
    pub fn new(mem: &'m dyn Mem) -> Self {
        Self {
            nodes: Slab::new(mem),
            roots: MemVec::new(mem),
        }
    }

    /// Total number of nodes across all trees.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` when the forest has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Start a new tree holding `value` at its root.
    pub fn add_root(&mut self, value: T) -> Result<NodeId, AllocError> {
        self.roots.reserve(1)?;
        let id = self.nodes.insert(Node::new(value, None))?;
        self.roots.push(id)?;
        Ok(id)
    }

    /// Root nodes in creation order.
    pub fn roots(&self) -> &[NodeId] {
        self.roots.as_slice()
    }

    /// `true` if `node` is live.
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(node)
    }

    /// Value stored at `node`.
    pub fn get(&self, node: NodeId) -> Option<&T> {
        self.nodes.get(node).map(|n| &n.value)
    }

    /// Mutable variant of `get`.
    pub fn get_mut(&mut self, node: NodeId) -> Option<&mut T> {
        self.nodes.get_mut(node).map(|n| &mut n.value)
    }

    /// Parent of `node`; `None` for roots and stale ids.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node)?.parent
    }

    /// Number of direct children, or `None` for a stale id.
    pub fn child_count(&self, node: NodeId) -> Option<usize> {
        self.nodes.get(node).map(|n| n.child_count)
    }

    /// The `index`-th child of `parent`.
    pub fn child(&self, parent: NodeId, index: usize) -> Option<NodeId> {
        let node = self.nodes.get(parent)?;
        if index >= node.child_count {
            return None;
        }
        if index < node.child_count / 2 {
            let mut cursor = node.first_child?;
            for _ in 0..index {
                cursor = self.nodes.get(cursor)?.next_sibling?;
            }
            Some(cursor)
        } else {
            let mut cursor = node.last_child?;
            for _ in index + 1..node.child_count {
                cursor = self.nodes.get(cursor)?.prev_sibling?;
            }
            Some(cursor)
        }
    }

    /// Direct children of `parent` in order. Empty for a stale id.
    pub fn children(&self, parent: NodeId) -> SmallVec<[NodeId; INLINE_CHILDREN]> {
        let mut out = SmallVec::new();
        let mut cursor = self.nodes.get(parent).and_then(|n| n.first_child);
        while let Some(id) = cursor {
            out.push(id);
            cursor = self.nodes.get(id).and_then(|n| n.next_sibling);
        }
        out
    }

    /// Add `value` as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, value: T) -> Result<NodeId, AllocError> {
        let count = self.child_count(parent).ok_or(AllocError::StaleHandle)?;
        self.insert_child(parent, count, value)
    }

    /// Add `value` as the first child of `parent`.
    pub fn prepend_child(&mut self, parent: NodeId, value: T) -> Result<NodeId, AllocError> {
        self.insert_child(parent, 0, value)
    }

    /// Insert `value` so that it becomes child number `index` of `parent`.
    ///
    /// Fails with [`AllocError::StaleHandle`] if `parent` is not live and
    /// [`AllocError::IndexOutOfBounds`] if `index` exceeds the child count.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        index: usize,
        value: T,
    ) -> Result<NodeId, AllocError> {
        let (count, last) = self
            .nodes
            .get(parent)
            .map(|n| (n.child_count, n.last_child))
            .ok_or(AllocError::StaleHandle)?;
        if index > count {
            return Err(AllocError::IndexOutOfBounds { index, len: count });
        }
        let next = if index == count {
            None
        } else {
            self.child(parent, index)
        };
        let prev = match next {
            Some(next) => self.nodes.get(next).and_then(|n| n.prev_sibling),
            None => last,
        };

        let mut node = Node::new(value, Some(parent));
        node.prev_sibling = prev;
        node.next_sibling = next;
        let id = self.nodes.insert(node)?;

        match prev {
            Some(prev) => self.with_node(prev, |n| n.next_sibling = Some(id)),
            None => self.with_node(parent, |n| n.first_child = Some(id)),
        }
        match next {
            Some(next) => self.with_node(next, |n| n.prev_sibling = Some(id)),
            None => self.with_node(parent, |n| n.last_child = Some(id)),
        }
        self.with_node(parent, |n| n.child_count += 1);
        Ok(id)
    }

    /// Remove child number `index` of `parent` together with its subtree
    /// and return the child's value.
    pub fn remove_child(&mut self, parent: NodeId, index: usize) -> Result<T, AllocError> {
        let count = self.child_count(parent).ok_or(AllocError::StaleHandle)?;
        let child = self
            .child(parent, index)
            .ok_or(AllocError::IndexOutOfBounds { index, len: count })?;
        self.remove(child)
    }

    /// Remove `node` and everything below it, returning `node`'s value.
    ///
    /// Ids of every removed node become stale.
    pub fn remove(&mut self, node: NodeId) -> Result<T, AllocError> {
        if !self.nodes.contains(node) {
            return Err(AllocError::StaleHandle);
        }
        self.unlink(node);

        let mut current = node;
        loop {
            while let Some(child) = self.nodes.get(current).and_then(|n| n.first_child) {
                current = child;
            }
            if current == node {
                break;
            }
            let Some(leaf) = self.nodes.remove(current) else {
                break;
            };
            let Some(parent) = leaf.parent else {
                break;
            };
            self.with_node(parent, |n| {
                n.first_child = leaf.next_sibling;
                if leaf.next_sibling.is_none() {
                    n.last_child = None;
                }
                n.child_count -= 1;
            });
            current = leaf.next_sibling.unwrap_or(parent);
        }

        self.nodes
            .remove(node)
            .map(|n| n.value)
            .ok_or(AllocError::StaleHandle)
    }

    /// Drop every tree. Outstanding ids become stale.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
    }

    /// `node` and its descendants in depth-first pre-order.
    pub fn descendants(&self, node: NodeId) -> Descendants<'_, 'm, T> {
        Descendants {
            tree: self,
            start: node,
            next: self.nodes.contains(node).then_some(node),
        }
    }

    /// Detach `node` from its parent's child chain, or from the root list.
    fn unlink(&mut self, node: NodeId) {
        let Some((parent, prev, next)) = self
            .nodes
            .get(node)
            .map(|n| (n.parent, n.prev_sibling, n.next_sibling))
        else {
            return;
        };
        match parent {
            Some(parent) => {
                match prev {
                    Some(prev) => self.with_node(prev, |n| n.next_sibling = next),
                    None => self.with_node(parent, |n| n.first_child = next),
                }
                match next {
                    Some(next) => self.with_node(next, |n| n.prev_sibling = prev),
                    None => self.with_node(parent, |n| n.last_child = prev),
                }
                self.with_node(parent, |n| n.child_count -= 1);
            }
            None => {
                if let Some(at) = self.roots.iter().position(|&root| root == node) {
                    let _ = self.roots.remove(at);
                }
            }
        }
        self.with_node(node, |n| {
            n.parent = None;
            n.prev_sibling = None;
            n.next_sibling = None;
        });
    }

    fn with_node(&mut self, id: NodeId, f: impl FnOnce(&mut Node<T>)) {
        if let Some(node) = self.nodes.get_mut(id) {
            f(node);
        }
    }
}

/// Pre-order walk below one node; see [`MemTree::descendants`].
pub struct Descendants<'a, 'm, T> {
    tree: &'a MemTree<'m, T>,
    start: NodeId,
    next: Option<NodeId>,
}

impl<T> Iterator for Descendants<'_, '_, T> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        let nodes = &self.tree.nodes;
        let node = nodes.get(current)?;
        self.next = node.first_child.or_else(|| {
            let mut cursor = current;
            loop {
                if cursor == self.start {
                    return None;
                }
                let n = nodes.get(cursor)?;
                if let Some(sibling) = n.next_sibling {
                    return Some(sibling);
                }
                cursor = n.parent?;
            }
        });
        Some(current)
    }
}
