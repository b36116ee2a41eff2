//! Single pattern/address matching.

use super::{Segment, WildcardConfiguration};
use smallvec::SmallVec;

/// Test `address` against `pattern` with the default wildcard syntax.
///
/// ```rust
/// use kaelix_core::address::matches;
///
/// assert!(matches("a.*", "a.b"));
/// assert!(matches("a.#", "a"));
/// assert!(!matches("*.b.*", "a.c.c"));
/// ```
#[must_use]
pub fn matches(pattern: &str, address: &str) -> bool {
    matches_with(&WildcardConfiguration::default(), pattern, address)
}

/// Test `address` against `pattern` with an explicit wildcard syntax.
///
/// Tracks the set of address positions reachable after each pattern segment.
/// A `#` extends every reachable position to all later ones, which covers
/// each split point once instead of backtracking over them.
#[must_use]
pub fn matches_with(config: &WildcardConfiguration, pattern: &str, address: &str) -> bool {
    if !config.enabled {
        return pattern == address;
    }
    let words: SmallVec<[&str; 8]> = config.words(address).collect();
    let n = words.len();

    let mut reachable = vec![false; n + 1];
    let mut next = vec![false; n + 1];
    reachable[0] = true;

    for segment in config.segments(pattern) {
        next.fill(false);
        match segment {
            Segment::Literal(literal) => {
                for i in 0..n {
                    next[i + 1] = reachable[i] && words[i] == literal;
                }
            },
            Segment::SingleWord => {
                next[1..].copy_from_slice(&reachable[..n]);
            },
            Segment::AnyWords => {
                let mut seen = false;
                for (slot, &here) in next.iter_mut().zip(&reachable) {
                    seen |= here;
                    *slot = seen;
                }
            },
        }
        std::mem::swap(&mut reachable, &mut next);
        if !reachable.contains(&true) {
            return false;
        }
    }
    reachable[n]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_word() {
        assert!(matches("a.*", "a.b"));
        assert!(!matches("a.*", "a.b.c"));
        assert!(!matches("a.*", "a"));
        assert!(matches("*.b.*", "a.b.c"));
        assert!(!matches("*.b.*", "a.c.c"));
    }

    #[test]
    fn test_any_words() {
        assert!(matches("a.#", "a"));
        assert!(matches("a.#", "a.b.c.d"));
        assert!(matches("#", "anything.at.all"));
        assert!(matches("#", "x"));
        assert!(matches("#.b", "b"));
        assert!(matches("#.b", "a.a.b"));
        assert!(!matches("#.b", "a.b.c"));
    }

    #[test]
    fn test_any_words_needs_split_search() {
        assert!(matches("a.#.b.#.c", "a.b.x.b.c"));
        assert!(matches("a.#.b.*", "a.x.b.y.b.z"));
        assert!(!matches("a.#.b.*", "a.x.b"));
        assert!(matches("#.#", "a"));
        assert!(matches("a.#.#", "a"));
    }

    #[test]
    fn test_literals() {
        assert!(matches("a.b", "a.b"));
        assert!(!matches("a.b", "a.bc"));
        assert!(!matches("a.b", "a.b.c"));
        assert!(!matches("a*", "ab"));
    }

    #[test]
    fn test_disabled_wildcards() {
        let config = WildcardConfiguration { enabled: false, ..Default::default() };
        assert!(!matches_with(&config, "a.*", "a.b"));
        assert!(matches_with(&config, "a.*", "a.*"));
    }
}
