//! Doubly linked list over a [`Mem`].
//!
//! Nodes live in a [`Slab`]; links are [`Handle`]s rather than pointers.
//! Positional access walks from whichever end is closer. Handles returned
//! by the inserting methods give O(1) access to a node until it is
//! removed.

use bedrock_alloc::{AllocError, Mem};

use crate::slab::{Handle, Slab};

struct Node<T> {
    value: T,
    prev: Option<Handle>,
    next: Option<Handle>,
}

/// Doubly linked list whose nodes come from a [`Mem`].
pub struct MemList<'m, T> {
    nodes: Slab<'m, Node<T>>,
    head: Option<Handle>,
    tail: Option<Handle>,
}

impl<'m, T> MemList<'m, T> {
    /// Create an empty list drawing memory from `mem`.
    pub fn new(mem: &'m dyn Mem) -> Self {
        Self {
            nodes: Slab::new(mem),
            head: None,
            tail: None,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` when there are no elements.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add `value` at the end.
    pub fn append(&mut self, value: T) -> Result<Handle, AllocError> {
        self.insert(self.len(), value)
    }

    /// Add `value` at the front.
    pub fn prepend(&mut self, value: T) -> Result<Handle, AllocError> {
        self.insert(0, value)
    }

    /// Insert `value` so that it ends up at position `index`.
    ///
    /// `index == len` appends. Anything larger fails with
    /// [`AllocError::IndexOutOfBounds`].
    pub fn insert(&mut self, index: usize, value: T) -> Result<Handle, AllocError> {
        let len = self.len();
        if index > len {
            return Err(AllocError::IndexOutOfBounds { index, len });
        }
        let next = if index == len { None } else { self.handle_at(index) };
        let prev = match next {
            Some(next) => self.nodes.get(next).and_then(|node| node.prev),
            None => self.tail,
        };
        let handle = self.nodes.insert(Node { value, prev, next })?;
        self.set_next(prev, Some(handle));
        self.set_prev(next, Some(handle));
        Ok(handle)
    }

    /// Value at position `index`.
    pub fn get(&self, index: usize) -> Option<&T> {
        let handle = self.handle_at(index)?;
        self.nodes.get(handle).map(|node| &node.value)
    }

    /// Mutable variant of `get`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        let handle = self.handle_at(index)?;
        self.nodes.get_mut(handle).map(|node| &mut node.value)
    }

    /// Remove and return the value at `index`.
    pub fn remove(&mut self, index: usize) -> Result<T, AllocError> {
        let handle = self.handle_at(index).ok_or(AllocError::IndexOutOfBounds {
            index,
            len: self.len(),
        })?;
        self.remove_handle(handle)
    }

    /// Handle of the node at `index`.
    pub fn handle_at(&self, index: usize) -> Option<Handle> {
        let len = self.len();
        if index >= len {
            return None;
        }
        if index < len / 2 {
            let mut cursor = self.head?;
            for _ in 0..index {
                cursor = self.nodes.get(cursor)?.next?;
            }
            Some(cursor)
        } else {
            let mut cursor = self.tail?;
            for _ in index + 1..len {
                cursor = self.nodes.get(cursor)?.prev?;
            }
            Some(cursor)
        }
    }

    /// Value behind a node handle.
    pub fn get_handle(&self, handle: Handle) -> Option<&T> {
        self.nodes.get(handle).map(|node| &node.value)
    }

    /// Mutable variant of `get_handle`.
    pub fn get_handle_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.nodes.get_mut(handle).map(|node| &mut node.value)
    }

    /// Unlink and return the node behind `handle`.
    pub fn remove_handle(&mut self, handle: Handle) -> Result<T, AllocError> {
        let node = self.nodes.remove(handle).ok_or(AllocError::StaleHandle)?;
        self.set_next(node.prev, node.next);
        self.set_prev(node.next, node.prev);
        Ok(node.value)
    }

    /// Front value.
    pub fn first(&self) -> Option<&T> {
        self.get_handle(self.head?)
    }

    /// Back value.
    pub fn last(&self) -> Option<&T> {
        self.get_handle(self.tail?)
    }

    /// Drop every node. Outstanding handles become stale.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.head = None;
        self.tail = None;
    }

    /// Values from front to back.
    pub fn iter(&self) -> Iter<'_, 'm, T> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    /// Point `node`'s forward link (or the head, for `None`) at `next`.
    fn set_next(&mut self, node: Option<Handle>, next: Option<Handle>) {
        match node {
            Some(handle) => {
                if let Some(node) = self.nodes.get_mut(handle) {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
    }

    /// Point `node`'s backward link (or the tail, for `None`) at `prev`.
    fn set_prev(&mut self, node: Option<Handle>, prev: Option<Handle>) {
        match node {
            Some(handle) => {
                if let Some(node) = self.nodes.get_mut(handle) {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }
}

/// Front-to-back iterator; see [`MemList::iter`].
pub struct Iter<'a, 'm, T> {
    list: &'a MemList<'m, T>,
    cursor: Option<Handle>,
}

impl<'a, T> Iterator for Iter<'a, '_, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let node = self.list.nodes.get(self.cursor?)?;
        self.cursor = node.next;
        Some(&node.value)
    }
}

impl<'a, 'm, T> IntoIterator for &'a MemList<'m, T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, 'm, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
