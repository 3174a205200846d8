//! Intrusive ordering of instructions and basic blocks
//!
//! Nodes live in the module's arenas and carry their own `prev`/`next`
//! links plus a non-owning `parent` back-reference. The container (a block
//! for instructions, a function for blocks) only records the two ends and
//! the length, so every link operation is O(1).

use serde::{Deserialize, Serialize};

/// Per-node links stored inline in the arena entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Links<K, P> {
    pub(crate) parent: Option<P>,
    pub(crate) prev: Option<K>,
    pub(crate) next: Option<K>,
}

impl<K, P> Default for Links<K, P> {
    fn default() -> Self {
        Self { parent: None, prev: None, next: None }
    }
}

/// Arena that can hand out the links of a node
pub(crate) trait NodeStore<K, P> {
    fn links(&self, key: K) -> &Links<K, P>;
    fn links_mut(&mut self, key: K) -> &mut Links<K, P>;
}

/// Head of a doubly-linked list owned by a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Chain<K> {
    first: Option<K>,
    last: Option<K>,
    len: usize,
}

impl<K> Default for Chain<K> {
    fn default() -> Self {
        Self { first: None, last: None, len: 0 }
    }
}

impl<K: Copy + PartialEq> Chain<K> {
    pub(crate) fn first(&self) -> Option<K> {
        self.first
    }

    pub(crate) fn last(&self) -> Option<K> {
        self.last
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Link a detached node at the tail
    pub(crate) fn push_back<P: Copy, S: NodeStore<K, P> + ?Sized>(&mut self, store: &mut S, parent: P, key: K) {
        let old_last = self.last;
        {
            let links = store.links_mut(key);
            links.parent = Some(parent);
            links.prev = old_last;
            links.next = None;
        }
        match old_last {
            Some(last) => store.links_mut(last).next = Some(key),
            None => self.first = Some(key),
        }
        self.last = Some(key);
        self.len += 1;
    }

    /// Link a detached node immediately before `anchor`, which must be in this chain
    pub(crate) fn insert_before<P: Copy, S: NodeStore<K, P> + ?Sized>(
        &mut self,
        store: &mut S,
        parent: P,
        anchor: K,
        key: K,
    ) {
        let before = store.links(anchor).prev;
        {
            let links = store.links_mut(key);
            links.parent = Some(parent);
            links.prev = before;
            links.next = Some(anchor);
        }
        store.links_mut(anchor).prev = Some(key);
        match before {
            Some(prev) => store.links_mut(prev).next = Some(key),
            None => self.first = Some(key),
        }
        self.len += 1;
    }

    /// Detach a node from this chain, leaving it without parent or neighbours
    pub(crate) fn unlink<P, S: NodeStore<K, P> + ?Sized>(&mut self, store: &mut S, key: K) {
        let (prev, next) = {
            let links = store.links_mut(key);
            let pair = (links.prev.take(), links.next.take());
            links.parent = None;
            pair
        };
        match prev {
            Some(prev) => store.links_mut(prev).next = next,
            None => self.first = next,
        }
        match next {
            Some(next) => store.links_mut(next).prev = prev,
            None => self.last = prev,
        }
        self.len -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Arena(Vec<Links<usize, u8>>);

    impl NodeStore<usize, u8> for Arena {
        fn links(&self, key: usize) -> &Links<usize, u8> {
            &self.0[key]
        }

        fn links_mut(&mut self, key: usize) -> &mut Links<usize, u8> {
            &mut self.0[key]
        }
    }

    fn collect(chain: &Chain<usize>, arena: &Arena) -> Vec<usize> {
        let mut out = Vec::new();
        let mut cursor = chain.first();
        while let Some(key) = cursor {
            out.push(key);
            cursor = arena.links(key).next;
        }
        out
    }

    #[test]
    fn test_push_insert_unlink() {
        let mut arena = Arena((0..4).map(|_| Links::default()).collect());
        let mut chain = Chain::default();

        chain.push_back(&mut arena, 7, 0);
        chain.push_back(&mut arena, 7, 2);
        chain.insert_before(&mut arena, 7, 2, 1);
        chain.insert_before(&mut arena, 7, 0, 3);

        assert_eq!(collect(&chain, &arena), vec![3, 0, 1, 2]);
        assert_eq!(chain.len(), 4);
        assert_eq!(chain.first(), Some(3));
        assert_eq!(chain.last(), Some(2));
        assert_eq!(arena.links(1).parent, Some(7));

        chain.unlink(&mut arena, 3);
        chain.unlink(&mut arena, 2);
        assert_eq!(collect(&chain, &arena), vec![0, 1]);
        assert_eq!(chain.last(), Some(1));
        assert_eq!(arena.links(1).next, None);
        assert_eq!(arena.links(3).parent, None);

        chain.unlink(&mut arena, 0);
        chain.unlink(&mut arena, 1);
        assert_eq!(chain.len(), 0);
        assert_eq!(chain.first(), None);
        assert_eq!(chain.last(), None);
    }
}
