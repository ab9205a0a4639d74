//! Intrusive doubly linked list threaded through slab slots.
//!
//! The list owns no nodes. Each node embeds a [`Links`] pair and lives in a
//! [`Slab`] shared with other structures (the same entry is also a member of
//! a hash chain). The list itself only records head, tail and length, so
//! moving an entry from one list to another is two O(1) splices and never
//! allocates.
//!
//! ```text
//!   head ─► [id_1] ◄──► [id_2] ◄──► [id_3] ◄── tail
//!   (oldest)                        (newest)
//! ```
//!
//! A node must be a member of at most one list at a time. That is the
//! caller's contract; the list does not track membership.

use crate::slab::{Slab, SlotId};

/// Previous/next links embedded in a list node.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Links {
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

/// A value that can be threaded onto a [`List`].
pub(crate) trait Linked {
    fn links(&self) -> &Links;
    fn links_mut(&mut self) -> &mut Links;
}

#[derive(Debug, Default)]
pub(crate) struct List {
    head: Option<SlotId>,
    tail: Option<SlotId>,
    len: usize,
}

impl List {
    pub(crate) const fn new() -> Self {
        List {
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Oldest member of the list.
    #[inline]
    pub(crate) fn front(&self) -> Option<SlotId> {
        self.head
    }

    /// Appends `id` at the tail (newest end).
    pub(crate) fn push_back<T: Linked>(&mut self, nodes: &mut Slab<T>, id: SlotId) {
        let old_tail = self.tail;
        *nodes[id].links_mut() = Links {
            prev: old_tail,
            next: None,
        };
        match old_tail {
            Some(tail) => nodes[tail].links_mut().next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
    }

    /// Detaches `id` from the list. `id` must currently be a member.
    pub(crate) fn unlink<T: Linked>(&mut self, nodes: &mut Slab<T>, id: SlotId) {
        let Links { prev, next } = *nodes[id].links();
        match prev {
            Some(prev) => nodes[prev].links_mut().next = next,
            None => {
                debug_assert_eq!(self.head, Some(id), "unlinking a node that is not in this list");
                self.head = next;
            }
        }
        match next {
            Some(next) => nodes[next].links_mut().prev = prev,
            None => {
                debug_assert_eq!(self.tail, Some(id), "unlinking a node that is not in this list");
                self.tail = prev;
            }
        }
        *nodes[id].links_mut() = Links::default();
        self.len -= 1;
    }

    /// Walks the list from oldest to newest.
    pub(crate) fn iter<'a, T: Linked>(&self, nodes: &'a Slab<T>) -> Iter<'a, T> {
        Iter {
            nodes,
            current: self.head,
            remaining: self.len,
        }
    }
}

pub(crate) struct Iter<'a, T> {
    nodes: &'a Slab<T>,
    current: Option<SlotId>,
    remaining: usize,
}

impl<T: Linked> Iterator for Iter<'_, T> {
    type Item = SlotId;

    fn next(&mut self) -> Option<SlotId> {
        // `remaining` bounds the walk so a corrupted cycle cannot hang the
        // invariant checker.
        if self.remaining == 0 {
            return None;
        }
        let id = self.current?;
        self.current = self.nodes.get(id)?.links().next;
        self.remaining -= 1;
        Some(id)
    }
}
