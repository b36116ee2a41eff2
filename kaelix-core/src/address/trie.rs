//! Segment-indexed reverse index from addresses to matching patterns.

use super::{Segment, WildcardConfiguration};
use std::collections::{HashMap, HashSet};

#[derive(Debug)]
struct Node<T> {
    values: Vec<T>,
    literals: HashMap<String, Node<T>>,
    single: Option<Box<Node<T>>>,
    any: Option<Box<Node<T>>>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self { values: Vec::new(), literals: HashMap::new(), single: None, any: None }
    }
}

impl<T> Node<T> {
    fn is_empty(&self) -> bool {
        self.values.is_empty()
            && self.literals.is_empty()
            && self.single.is_none()
            && self.any.is_none()
    }

    fn remove_where(
        &mut self,
        path: &[Segment<'_>],
        predicate: &mut dyn FnMut(&T) -> bool,
    ) -> Option<T> {
        let Some((first, rest)) = path.split_first() else {
            let index = self.values.iter().position(|v| predicate(v))?;
            return Some(self.values.remove(index));
        };

        match first {
            Segment::Literal(word) => {
                let child = self.literals.get_mut(*word)?;
                let removed = child.remove_where(rest, predicate);
                if child.is_empty() {
                    self.literals.remove(*word);
                }
                removed
            },
            Segment::SingleWord => Self::remove_boxed(&mut self.single, rest, predicate),
            Segment::AnyWords => Self::remove_boxed(&mut self.any, rest, predicate),
        }
    }

    fn remove_boxed(
        slot: &mut Option<Box<Self>>,
        rest: &[Segment<'_>],
        predicate: &mut dyn FnMut(&T) -> bool,
    ) -> Option<T> {
        let child = slot.as_mut()?;
        let removed = child.remove_where(rest, predicate);
        if child.is_empty() {
            *slot = None;
        }
        removed
    }
}

/// Trie of address patterns keyed by word.
///
/// Nodes branch on a literal word, the single-word wildcard, or the
/// any-words wildcard. Values attached to one node keep insertion order.
#[derive(Debug)]
pub struct AddressTrie<T> {
    root: Node<T>,
    config: WildcardConfiguration,
    len: usize,
}

impl<T> AddressTrie<T> {
    /// Create an empty trie using `config` to split patterns and addresses.
    #[must_use]
    pub fn new(config: WildcardConfiguration) -> Self {
        Self { root: Node::default(), config, len: 0 }
    }

    /// Wildcard syntax in use.
    #[must_use]
    pub const fn config(&self) -> &WildcardConfiguration {
        &self.config
    }

    /// Number of stored values.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check for no stored values.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Attach `value` to the node for `pattern`, creating nodes as needed.
    pub fn insert(&mut self, pattern: &str, value: T) {
        let mut node = &mut self.root;
        for segment in self.config.segments(pattern) {
            node = match segment {
                Segment::Literal(word) => node.literals.entry(word.to_string()).or_default(),
                Segment::SingleWord => node.single.get_or_insert_with(Box::default),
                Segment::AnyWords => node.any.get_or_insert_with(Box::default),
            };
        }
        node.values.push(value);
        self.len += 1;
    }

    /// Remove the first value at `pattern` satisfying `predicate`.
    ///
    /// Nodes left without values or children are pruned.
    pub fn remove_where(&mut self, pattern: &str, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        let path: Vec<Segment<'_>> = self.config.segments(pattern).collect();
        let removed = self.root.remove_where(&path, &mut predicate);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// Values attached exactly at `pattern` (not wildcard matches).
    #[must_use]
    pub fn get(&self, pattern: &str) -> &[T] {
        let mut node = &self.root;
        for segment in self.config.segments(pattern) {
            let next = match segment {
                Segment::Literal(word) => node.literals.get(word),
                Segment::SingleWord => node.single.as_deref(),
                Segment::AnyWords => node.any.as_deref(),
            };
            match next {
                Some(next) => node = next,
                None => return &[],
            }
        }
        &node.values
    }

    /// Every value whose pattern matches the concrete `address`.
    ///
    /// Walks literal, then single-word, then any-words children with an
    /// explicit work list. An any-words node is entered at every remaining
    /// position, and each (node, position) state is visited once, so every
    /// node contributes its values at most once.
    #[must_use]
    pub fn lookup(&self, address: &str) -> Vec<&T> {
        let words: Vec<&str> = self.config.words(address).collect();
        let n = words.len();

        let mut result = Vec::new();
        let mut visited: HashSet<(*const Node<T>, usize)> = HashSet::new();
        let mut stack: Vec<(&Node<T>, usize)> = vec![(&self.root, 0)];

        while let Some((node, index)) = stack.pop() {
            if !visited.insert((node as *const Node<T>, index)) {
                continue;
            }
            if index == n {
                result.extend(node.values.iter());
            }

            // pushed in reverse so literal matches are explored first
            if let Some(any) = node.any.as_deref() {
                for position in (index..=n).rev() {
                    stack.push((any, position));
                }
            }
            if index < n {
                if let Some(single) = node.single.as_deref() {
                    stack.push((single, index + 1));
                }
                if let Some(literal) = node.literals.get(words[index]) {
                    stack.push((literal, index + 1));
                }
            }
        }
        result
    }

    /// Iterate every stored value.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        let mut stack = vec![&self.root];
        let mut out = Vec::with_capacity(self.len);
        while let Some(node) = stack.pop() {
            out.extend(node.values.iter());
            stack.extend(node.literals.values());
            stack.extend(node.single.as_deref());
            stack.extend(node.any.as_deref());
        }
        out.into_iter()
    }
}

impl<T> Default for AddressTrie<T> {
    fn default() -> Self {
        Self::new(WildcardConfiguration::default())
    }
}
