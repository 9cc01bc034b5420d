//! Per-parse options: lookahead guards, ambiguity reporting and a hook for the derivations
//! that disambiguation throws away.
//!
//! Every method has a default, so a caller overrides only what it cares about.
use crate::rule::RuleId;

/// A node of the parse tree where disambiguation discarded derivations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAmbiguity {
    /// The rule of the node.
    pub rule: RuleId,
    /// The tag of that rule.
    pub tag: String,
    /// Start offset of the node.
    pub start: usize,
    /// End offset of the node, trailing skip included.
    pub end: usize,
    /// Option indices of the derivations kept.
    pub kept: Vec<usize>,
    /// Option indices of the derivations discarded.
    pub dropped: Vec<usize>,
}

/// Options consulted by [`crate::Automaton::parse_with`].
pub trait Config {
    /// `lookahead_guards` returns true if the lookahead sets computed for HEIGHT, GRAFT and
    /// GOAL transitions should be checked against the input before a transition is taken.
    ///
    /// Guards only prune heads that could never reach the goal, so turning them off does not
    /// change which inputs are accepted or the trees that are produced. It does change how much
    /// work a parse does, and the expected sets reported for a failed parse become coarser.
    fn lookahead_guards(&self) -> bool {
        true
    }

    /// `report_ambiguities` returns true if every node of the finished parse tree that still
    /// holds more than one derivation should be reported as a warning.
    fn report_ambiguities(&self) -> bool {
        false
    }

    /// `on_resolved_ambiguity` is called for every node where the choice policy discarded
    /// derivations, in the order the nodes were finalised.
    fn on_resolved_ambiguity(&self, _resolved: &ResolvedAmbiguity) {}
}

/// Guards on, no reporting, no hook. Used by [`crate::Automaton::parse`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfig {
    _private: (),
}

impl DefaultConfig {
    /// The configuration every plain `parse` runs with.
    pub fn new() -> Self {
        DefaultConfig { _private: () }
    }
}

impl Config for DefaultConfig {}
