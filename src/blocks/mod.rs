//! Relations between lists of content identifiers.
//!
//! `got` is always the actual listing, `want` the expected one. The four
//! relations cover the two independent choices a test makes:
//!
//! | exact | ordered | relation |
//! |-------|---------|----------|
//! | no  | no  | [`set_contains`] |
//! | yes | no  | [`set_equals`] |
//! | no  | yes | [`ordered_subset_contains`] |
//! | yes | yes | [`array_equals`] |
//!
//! Decoding a payload into identifiers is left to a [`BlockLister`].

use std::collections::HashSet;
use std::fmt::{self, Display};
use std::hash::Hash;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::check::{Check, Outcome};

/// An opaque content identifier. Equality is the only meaningful operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Every element of `want` appears somewhere in `got`.
pub fn set_contains<T: Eq + Hash + Display>(got: &[T], want: &[T]) -> Outcome {
    let present: HashSet<&T> = got.iter().collect();
    match want.iter().find(|id| !present.contains(id)) {
        Some(missing) => Outcome::fail(format!("missing identifier {missing}")),
        None => Outcome::pass(),
    }
}

/// Mutual containment; order and duplicates are ignored.
pub fn set_equals<T: Eq + Hash + Display>(got: &[T], want: &[T]) -> Outcome {
    let outcome = set_contains(got, want);
    if !outcome.success {
        return outcome;
    }
    let expected: HashSet<&T> = want.iter().collect();
    match got.iter().find(|id| !expected.contains(id)) {
        Some(extra) => Outcome::fail(format!("unexpected identifier {extra}")),
        None => Outcome::pass(),
    }
}

/// Same length and same element at every index.
pub fn array_equals<T: Eq + Display>(got: &[T], want: &[T]) -> Outcome {
    if got.len() != want.len() {
        return Outcome::fail(format!("length mismatch: {} != {}", got.len(), want.len()));
    }
    match got.iter().zip(want).position(|(a, b)| a != b) {
        Some(i) => Outcome::fail(format!("mismatch at index {i}: {} != {}", got[i], want[i])),
        None => Outcome::pass(),
    }
}

/// `want` is a subsequence of `got`: same relative order, gaps allowed.
pub fn ordered_subset_contains<T: Eq + Display>(got: &[T], want: &[T]) -> Outcome {
    let mut j = 0;
    for id in got {
        if j == want.len() {
            break;
        }
        if *id == want[j] {
            j += 1;
        }
    }

    match want.get(j) {
        Some(missing) => Outcome::fail(format!("missing identifier {missing}")),
        None => Outcome::pass(),
    }
}

/// Pick the relation matching the two flags.
pub fn relation<T: Eq + Hash + Display>(exact: bool, ordered: bool) -> fn(&[T], &[T]) -> Outcome {
    match (exact, ordered) {
        (false, false) => set_contains,
        (true, false) => set_equals,
        (false, true) => ordered_subset_contains,
        (true, true) => array_equals,
    }
}

pub type ListingError = Box<dyn std::error::Error + Send + Sync>;

/// Lists the identifiers found in an encoded payload.
pub trait BlockLister: Send + Sync {
    /// Every block in the payload, in stream order.
    fn list_blocks(&self, payload: &[u8]) -> Result<Vec<Identifier>, ListingError>;

    /// Declared roots. Formats without roots report none.
    fn list_roots(&self, _payload: &[u8]) -> Result<Vec<Identifier>, ListingError> {
        Ok(Vec::new())
    }
}

/// Builds a body check from the blocks and roots a payload must carry.
///
/// ```ignore
/// let body = BlockExpectation::new(lister)
///     .has_blocks(["root", "a", "b"])
///     .has_root("root")
///     .in_that_order()
///     .exactly()
///     .into_check();
/// ```
#[derive(Clone)]
pub struct BlockExpectation {
    lister: Arc<dyn BlockLister>,
    blocks: Vec<Identifier>,
    roots: Vec<Identifier>,
    exact: bool,
    ordered: bool,
}

impl BlockExpectation {
    pub fn new(lister: Arc<dyn BlockLister>) -> Self {
        Self {
            lister,
            blocks: Vec::new(),
            roots: Vec::new(),
            exact: false,
            ordered: false,
        }
    }

    pub fn has_block(mut self, id: impl Into<Identifier>) -> Self {
        self.blocks.push(id.into());
        self
    }

    pub fn has_blocks<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Identifier>,
    {
        self.blocks.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn has_root(mut self, id: impl Into<Identifier>) -> Self {
        self.roots.push(id.into());
        self
    }

    pub fn has_roots<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Identifier>,
    {
        self.roots.extend(ids.into_iter().map(Into::into));
        self
    }

    /// No blocks or roots beyond the listed ones.
    pub fn exactly(mut self) -> Self {
        self.exact = true;
        self
    }

    /// Blocks must appear in the listed order.
    pub fn in_that_order(mut self) -> Self {
        self.ordered = true;
        self
    }

    pub fn evaluate(&self, payload: &[u8]) -> Outcome {
        let got = match self.lister.list_blocks(payload) {
            Ok(got) => got,
            Err(err) => return Outcome::fail(format!("failed to list blocks: {err}")),
        };
        let outcome = relation(self.exact, self.ordered)(&got, &self.blocks);
        if !outcome.success {
            return outcome;
        }

        if self.roots.is_empty() && !self.exact {
            return Outcome::pass();
        }
        let roots = match self.lister.list_roots(payload) {
            Ok(roots) => roots,
            Err(err) => return Outcome::fail(format!("failed to list roots: {err}")),
        };
        let outcome = relation(self.exact, false)(&roots, &self.roots);
        if outcome.success {
            outcome
        } else {
            Outcome::fail(format!("roots: {}", outcome.message()))
        }
    }

    pub fn into_check(self) -> Check<[u8]> {
        Check::verify(move |payload: &[u8]| self.evaluate(payload))
    }
}

impl fmt::Debug for BlockExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockExpectation")
            .field("blocks", &self.blocks)
            .field("roots", &self.roots)
            .field("exact", &self.exact)
            .field("ordered", &self.ordered)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<Identifier> {
        values.iter().copied().map(Identifier::from).collect()
    }

    /// One identifier per line; the first line is the root.
    struct LineLister;

    impl BlockLister for LineLister {
        fn list_blocks(&self, payload: &[u8]) -> Result<Vec<Identifier>, ListingError> {
            let text = std::str::from_utf8(payload)?;
            Ok(text.lines().map(Identifier::from).collect())
        }

        fn list_roots(&self, payload: &[u8]) -> Result<Vec<Identifier>, ListingError> {
            Ok(self.list_blocks(payload)?.into_iter().take(1).collect())
        }
    }

    #[test]
    fn set_contains_scenarios() {
        assert!(set_contains(&ids(&["A", "B", "C"]), &ids(&["B", "A"])).success);

        let outcome = set_contains(&ids(&["A", "B"]), &ids(&["C"]));
        assert!(!outcome.success);
        assert_eq!(outcome.reason.as_deref(), Some("missing identifier C"));

        assert!(set_contains(&ids(&["hello"]), &ids(&[])).success);
        assert!(set_contains(&ids(&["hello", "world"]), &ids(&["hello"])).success);
    }

    #[test]
    fn set_equals_is_mutual() {
        assert!(!set_equals(&ids(&["hello"]), &ids(&[])).success);
        assert!(set_equals(&ids(&["hello", "world"]), &ids(&["world", "hello"])).success);
        assert!(set_equals(&ids(&["a", "a", "b"]), &ids(&["b", "a"])).success);
        assert!(!set_equals(&ids(&["hello"]), &ids(&["world"])).success);
        assert!(!set_equals(&ids(&["hello", "world"]), &ids(&["hello"])).success);
    }

    #[test]
    fn set_equals_names_the_unexpected_identifier() {
        let outcome = set_equals(&ids(&["a", "b", "extra"]), &ids(&["b", "a"]));
        assert_eq!(outcome.reason.as_deref(), Some("unexpected identifier extra"));

        let want: Vec<String> = (0..20_000).map(|i| format!("bafy{i}")).collect();
        let mut got = want.clone();
        got.reverse();
        assert!(set_equals(&got, &want).success);
        got.push("bafy-extra".to_string());
        assert!(!set_equals(&got, &want).success);
    }

    #[test]
    fn array_equals_reports_position() {
        assert!(array_equals(&ids(&["a", "b"]), &ids(&["a", "b"])).success);

        let outcome = array_equals(&ids(&["a"]), &ids(&[]));
        assert_eq!(outcome.reason.as_deref(), Some("length mismatch: 1 != 0"));

        let outcome = array_equals(&ids(&["a", "b"]), &ids(&["b", "a"]));
        assert_eq!(outcome.reason.as_deref(), Some("mismatch at index 0: a != b"));
    }

    #[test]
    fn ordered_subset_scenarios() {
        assert!(
            ordered_subset_contains(&ids(&["W", "A", "X", "B", "Y"]), &ids(&["A", "B"])).success
        );

        let outcome = ordered_subset_contains(&ids(&["B", "A"]), &ids(&["A", "B"]));
        assert!(!outcome.success);
        assert_eq!(outcome.reason.as_deref(), Some("missing identifier B"));

        assert!(ordered_subset_contains(&ids(&[]), &ids(&[])).success);
        assert!(!ordered_subset_contains(&ids(&[]), &ids(&["A"])).success);
    }

    #[test]
    fn relations_are_generic() {
        assert!(set_contains(&[1, 2, 3], &[3]).success);
        assert!(ordered_subset_contains(&["x", "y", "z"], &["x", "z"]).success);
    }

    #[test]
    fn relation_laws_hold() {
        let samples = [
            ids(&[]),
            ids(&["A"]),
            ids(&["A", "B"]),
            ids(&["B", "A"]),
            ids(&["A", "B", "A"]),
            ids(&["C", "A", "B"]),
        ];
        for a in &samples {
            for b in &samples {
                if array_equals(a, b).success {
                    assert!(set_equals(a, b).success);
                }
                if set_equals(a, b).success {
                    assert!(set_contains(a, b).success && set_contains(b, a).success);
                }
                if ordered_subset_contains(a, b).success {
                    assert!(set_contains(a, b).success);
                }
            }
        }
    }

    #[test]
    fn relation_selects_by_flags() {
        let got = ids(&["A", "B", "C"]);
        let want = ids(&["C", "A"]);
        assert!(relation(false, false)(&got, &want).success);
        assert!(!relation(true, false)(&got, &want).success);
        assert!(!relation(false, true)(&got, &want).success);
        assert!(!relation(true, true)(&got, &want).success);
        assert!(relation(true, true)(&got, &got).success);
    }

    #[test]
    fn block_expectation_defaults_to_subset() {
        let payload = b"root\na\nb\nsub\nleaf";
        let lister: Arc<dyn BlockLister> = Arc::new(LineLister);

        let check = BlockExpectation::new(lister.clone()).has_blocks(["b", "root"]).into_check();
        assert!(check.evaluate(payload).success);

        let check = BlockExpectation::new(lister.clone()).into_check();
        assert!(check.evaluate(payload).success);

        let check = BlockExpectation::new(lister).exactly().into_check();
        assert!(!check.evaluate(payload).success);
    }

    #[test]
    fn block_expectation_exact_and_ordered() {
        let payload = b"root\na\nb";
        let lister: Arc<dyn BlockLister> = Arc::new(LineLister);

        let exact = BlockExpectation::new(lister.clone())
            .has_blocks(["root", "a", "b"])
            .has_root("root")
            .in_that_order()
            .exactly();
        assert!(exact.evaluate(payload).success);

        let reordered = BlockExpectation::new(lister.clone())
            .has_blocks(["a", "root", "b"])
            .has_root("root")
            .in_that_order()
            .exactly();
        let outcome = reordered.evaluate(payload);
        assert_eq!(outcome.reason.as_deref(), Some("mismatch at index 0: root != a"));

        let wrong_root = BlockExpectation::new(lister)
            .has_blocks(["root", "a", "b"])
            .has_root("a")
            .exactly();
        let outcome = wrong_root.evaluate(payload);
        assert_eq!(outcome.reason.as_deref(), Some("roots: missing identifier a"));
    }

    #[test]
    fn listing_failures_become_failing_outcomes() {
        let check = BlockExpectation::new(Arc::new(LineLister))
            .has_block("a")
            .into_check();
        let outcome = check.evaluate(&[0xff, 0xfe]);
        assert!(!outcome.success);
        assert!(outcome.reason.unwrap().starts_with("failed to list blocks"));
    }

    #[test]
    fn identifiers_serialize_as_strings() {
        let id = Identifier::new("bafyA");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"bafyA\"");
        let back: Identifier = serde_json::from_str("\"bafyA\"").unwrap();
        assert_eq!(back, id);
    }
}
