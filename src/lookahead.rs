//! Lookahead sets.

use std::collections::BTreeSet;
use std::fmt::{self, Debug};

use crate::rule::{RuleId, RuleSet};

/// The set of things that may follow a point in a derivation.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct LookaheadSet {
    /// Terminals of the owning rule set.
    pub terminals: BTreeSet<RuleId>,
    /// The end of the input.
    pub end_of_text: bool,
    /// Placeholder for "whatever may follow the enclosing context". Replaced by
    /// [`resolve`](LookaheadSet::resolve) as the context becomes known; a guard that still
    /// holds it at parse time can not be decided statically and always passes.
    pub up: bool,
    /// Anything at all, e.g. the first leaf of an embedded grammar.
    pub any: bool,
}

impl LookaheadSet {
    /// The empty set.
    pub fn empty() -> Self {
        LookaheadSet::default()
    }

    /// Only the context placeholder.
    pub fn up() -> Self {
        LookaheadSet {
            up: true,
            ..LookaheadSet::default()
        }
    }

    /// Only end-of-text.
    pub fn end_of_text() -> Self {
        LookaheadSet {
            end_of_text: true,
            ..LookaheadSet::default()
        }
    }

    /// Anything.
    pub fn any() -> Self {
        LookaheadSet {
            any: true,
            ..LookaheadSet::default()
        }
    }

    /// A single terminal.
    pub fn terminal(t: RuleId) -> Self {
        LookaheadSet {
            terminals: BTreeSet::from([t]),
            ..LookaheadSet::default()
        }
    }

    /// Whether the set admits nothing.
    pub fn is_empty(&self) -> bool {
        self.terminals.is_empty() && !self.end_of_text && !self.up && !self.any
    }

    /// Whether a guard with this set must pass without looking at the input.
    pub fn is_unconstrained(&self) -> bool {
        self.up || self.any
    }

    /// Add everything in `other`; returns whether anything was added.
    pub fn union_with(&mut self, other: &LookaheadSet) -> bool {
        let before = (self.terminals.len(), self.end_of_text, self.up, self.any);
        self.terminals.extend(other.terminals.iter().copied());
        self.end_of_text |= other.end_of_text;
        self.up |= other.up;
        self.any |= other.any;
        before != (self.terminals.len(), self.end_of_text, self.up, self.any)
    }

    /// Replace the context placeholder by `context`.
    pub fn resolve(&self, context: &LookaheadSet) -> LookaheadSet {
        if !self.up {
            return self.clone();
        }
        let mut r = LookaheadSet {
            up: false,
            ..self.clone()
        };
        r.union_with(context);
        r
    }

    /// Display names of the members, resolved against `rules`.
    pub fn names(&self, rules: &RuleSet) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self.terminals.iter().map(|&t| rules.rule(t).tag().to_string()).collect();
        if self.end_of_text {
            names.insert(crate::EOT_TAG.to_string());
        }
        names
    }
}

impl Debug for LookaheadSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        let mut set = f.debug_set();
        set.entries(self.terminals.iter());
        if self.end_of_text {
            set.entry(&format_args!("<EOT>"));
        }
        if self.up {
            set.entry(&format_args!("<UP>"));
        }
        if self.any {
            set.entry(&format_args!("<ANY>"));
        }
        set.finish()
    }
}
