// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Recency list backing [`Lru`](crate::Lru).
//!
//! A doubly-linked list whose nodes live in a growable slab and reference each other by
//! index. Removed slots are chained into a free list through their `next` link.

#![expect(
    clippy::cast_possible_truncation,
    reason = "NodeIndex is u32, which is sufficient for expected entry counts"
)]

/// Index type for list nodes.
pub type NodeIndex = u32;

/// Sentinel value indicating no node.
const NULL_INDEX: NodeIndex = NodeIndex::MAX;

#[derive(Debug)]
struct Node<V> {
    entry: Option<(String, V)>,
    prev: NodeIndex,
    next: NodeIndex,
}

impl<V> Node<V> {
    const fn vacant() -> Self {
        Self {
            entry: None,
            prev: NULL_INDEX,
            next: NULL_INDEX,
        }
    }
}

/// Slab-backed list ordered from most recently used (head) to least recently used (tail).
#[derive(Debug)]
pub struct NodeList<V> {
    nodes: Vec<Node<V>>,
    head: Option<NodeIndex>,
    tail: Option<NodeIndex>,
    free_head: Option<NodeIndex>,
}

impl<V> NodeList<V> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            nodes: Vec::new(),
            head: None,
            tail: None,
            free_head: None,
        }
    }

    /// Number of allocated slots, vacant or not.
    #[cfg(test)]
    pub fn slots(&self) -> usize {
        self.nodes.len()
    }

    pub const fn tail(&self) -> Option<NodeIndex> {
        self.tail
    }

    pub fn value(&self, idx: NodeIndex) -> Option<&V> {
        self.nodes.get(idx as usize)?.entry.as_ref().map(|(_, value)| value)
    }

    /// Stores `key`/`value` in a free slot and links it at the head.
    pub fn push_front(&mut self, key: String, value: V) -> NodeIndex {
        let idx = self.alloc();
        self.nodes[idx as usize].entry = Some((key, value));
        self.link_front(idx);
        idx
    }

    /// Swaps the value held by an occupied slot, returning the previous one.
    pub fn replace(&mut self, idx: NodeIndex, value: V) -> Option<V> {
        let (_, slot) = self.nodes.get_mut(idx as usize)?.entry.as_mut()?;
        Some(std::mem::replace(slot, value))
    }

    pub fn move_to_front(&mut self, idx: NodeIndex) {
        if self.head == Some(idx) {
            return;
        }
        self.detach(idx);
        self.link_front(idx);
    }

    /// Detaches an occupied slot and returns it to the free list.
    pub fn unlink(&mut self, idx: NodeIndex) -> Option<(String, V)> {
        let entry = self.nodes.get_mut(idx as usize)?.entry.take()?;
        self.detach(idx);
        self.nodes[idx as usize].next = self.free_head.unwrap_or(NULL_INDEX);
        self.free_head = Some(idx);
        Some(entry)
    }

    /// Iterates over occupied slots from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let node = &self.nodes[cursor? as usize];
            cursor = (node.next != NULL_INDEX).then_some(node.next);
            node.entry.as_ref().map(|(key, value)| (key.as_str(), value))
        })
    }

    fn alloc(&mut self) -> NodeIndex {
        if let Some(idx) = self.free_head {
            let next_free = self.nodes[idx as usize].next;
            self.free_head = (next_free != NULL_INDEX).then_some(next_free);
            self.nodes[idx as usize].next = NULL_INDEX;
            idx
        } else {
            self.nodes.push(Node::vacant());
            (self.nodes.len() - 1) as NodeIndex
        }
    }

    fn link_front(&mut self, idx: NodeIndex) {
        let old_head = self.head;
        {
            let node = &mut self.nodes[idx as usize];
            node.prev = NULL_INDEX;
            node.next = old_head.unwrap_or(NULL_INDEX);
        }
        if let Some(old_head) = old_head {
            self.nodes[old_head as usize].prev = idx;
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn detach(&mut self, idx: NodeIndex) {
        let (prev, next) = {
            let node = &self.nodes[idx as usize];
            (node.prev, node.next)
        };

        if prev == NULL_INDEX {
            self.head = (next != NULL_INDEX).then_some(next);
        } else {
            self.nodes[prev as usize].next = next;
        }

        if next == NULL_INDEX {
            self.tail = (prev != NULL_INDEX).then_some(prev);
        } else {
            self.nodes[next as usize].prev = prev;
        }

        let node = &mut self.nodes[idx as usize];
        node.prev = NULL_INDEX;
        node.next = NULL_INDEX;
    }
}
