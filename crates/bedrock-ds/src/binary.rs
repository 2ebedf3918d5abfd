//! Binary tree over a [`Mem`].

use bedrock_alloc::{AllocError, Mem};

use crate::slab::Slab;
use crate::tree::NodeId;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

struct Node<T> {
    value: T,
    parent: Option<NodeId>,
    left: Option<NodeId>,
    right: Option<NodeId>,
}

/// Binary tree with a single root whose nodes come from a [`Mem`].
///
/// Setting a child (or the root) that is already occupied replaces the
/// whole existing subtree.
pub struct MemBinaryTree<'m, T> {
    nodes: Slab<'m, Node<T>>,
    root: Option<NodeId>,
}

impl<'m, T> MemBinaryTree<'m, T> {
    /// Create an empty tree drawing memory from `mem`.
    pub fn new(mem: &'m dyn Mem) -> Self {
        Self {
            nodes: Slab::new(mem),
            root: None,
        }
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` when there is no root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The root node.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Value stored at `node`.
    pub fn get(&self, node: NodeId) -> Option<&T> {
        self.nodes.get(node).map(|n| &n.value)
    }

    /// Mutable variant of `get`.
    pub fn get_mut(&mut self, node: NodeId) -> Option<&mut T> {
        self.nodes.get_mut(node).map(|n| &mut n.value)
    }

    /// Left child of `node`.
    pub fn left(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node)?.left
    }

    /// Right child of `node`.
    pub fn right(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node)?.right
    }

    /// Parent of `node`; `None` for the root and stale ids.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node)?.parent
    }

    /// Put `value` at the root, dropping any existing tree.
    pub fn set_root(&mut self, value: T) -> Result<NodeId, AllocError> {
        let id = self.nodes.insert(Node {
            value,
            parent: None,
            left: None,
            right: None,
        })?;
        if let Some(old) = self.root.replace(id) {
            self.remove_subtree(old);
        }
        Ok(id)
    }

    /// Put `value` as the left child of `parent`, replacing any existing
    /// left subtree.
    pub fn set_left(&mut self, parent: NodeId, value: T) -> Result<NodeId, AllocError> {
        self.set_child(parent, Side::Left, value)
    }

    /// Put `value` as the right child of `parent`, replacing any existing
    /// right subtree.
    pub fn set_right(&mut self, parent: NodeId, value: T) -> Result<NodeId, AllocError> {
        self.set_child(parent, Side::Right, value)
    }

    /// Detach and drop the subtree rooted at `node`, returning `node`'s
    /// value. Ids of every removed node become stale.
    pub fn take_subtree(&mut self, node: NodeId) -> Result<T, AllocError> {
        let parent = self
            .nodes
            .get(node)
            .map(|n| n.parent)
            .ok_or(AllocError::StaleHandle)?;
        match parent {
            Some(parent) => {
                if let Some(p) = self.nodes.get_mut(parent) {
                    if p.left == Some(node) {
                        p.left = None;
                    } else if p.right == Some(node) {
                        p.right = None;
                    }
                }
            }
            None => self.root = None,
        }
        self.remove_subtree(node).ok_or(AllocError::StaleHandle)
    }

    /// Drop every node. Outstanding ids become stale.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
    }

    fn set_child(&mut self, parent: NodeId, side: Side, value: T) -> Result<NodeId, AllocError> {
        if !self.nodes.contains(parent) {
            return Err(AllocError::StaleHandle);
        }
        let id = self.nodes.insert(Node {
            value,
            parent: Some(parent),
            left: None,
            right: None,
        })?;
        let old = self.nodes.get_mut(parent).and_then(|p| match side {
            Side::Left => p.left.replace(id),
            Side::Right => p.right.replace(id),
        });
        if let Some(old) = old {
            self.remove_subtree(old);
        }
        Ok(id)
    }

    /// Remove an already detached subtree leaf by leaf.
    fn remove_subtree(&mut self, top: NodeId) -> Option<T> {
        let mut current = top;
        loop {
            while let Some(child) = self.nodes.get(current).and_then(|n| n.left.or(n.right)) {
                current = child;
            }
            if current == top {
                break;
            }
            let leaf = self.nodes.remove(current)?;
            let parent = leaf.parent?;
            let p = self.nodes.get_mut(parent)?;
            if p.left == Some(current) {
                p.left = None;
            } else {
                p.right = None;
            }
            current = parent;
        }
        self.nodes.remove(top).map(|n| n.value)
    }
}
