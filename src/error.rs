//! Errors raised while a rule set or an automaton is being constructed.
//!
//! These are fatal: an automaton is never produced for a malformed grammar, so parsing is never
//! attempted. Ordinary syntax errors in parsed input are reported as
//! [`LanguageIssue`](crate::LanguageIssue)s instead.

use miette::Diagnostic;
use thiserror::Error;

/// A grammar could not be turned into a rule set or an automaton.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// The requested goal rule does not exist in the rule set.
    #[error("goal rule '{0}' not found")]
    #[diagnostic(
        code(lcglr::build::goal_not_found),
        help("the goal must be the tag of a rule defined in the rule set")
    )]
    GoalRuleNotFound(String),

    /// A concatenation or choice was declared without any items.
    #[error("rule '{0}' has an empty right-hand side")]
    #[diagnostic(
        code(lcglr::build::empty_rhs),
        help("use an explicit empty rule for a rule that matches nothing")
    )]
    EmptyRhs(String),

    /// A literal terminal with no text; it would match everywhere without consuming input.
    #[error("literal terminal '{0}' has no text")]
    #[diagnostic(code(lcglr::build::empty_literal))]
    EmptyLiteral(String),

    /// Two rules share one tag.
    #[error("rule '{0}' is defined more than once")]
    #[diagnostic(code(lcglr::build::duplicate_rule))]
    DuplicateRule(String),

    /// A rule refers to a tag that is not defined.
    #[error("rule '{rule}' refers to unknown rule '{reference}'")]
    #[diagnostic(code(lcglr::build::unknown_rule))]
    UnknownRule {
        /// The rule holding the reference.
        rule: String,
        /// The tag that could not be resolved.
        reference: String,
    },

    /// A pattern terminal is not a valid regular expression.
    #[error("invalid pattern for terminal '{rule}': {message}")]
    #[diagnostic(code(lcglr::build::invalid_pattern))]
    InvalidPattern {
        /// The terminal's tag.
        rule: String,
        /// The message reported by the regex compiler.
        message: String,
    },

    /// A list rule whose bounds cannot be satisfied.
    #[error("rule '{rule}' has invalid multiplicity {min}..{max}")]
    #[diagnostic(
        code(lcglr::build::invalid_multiplicity),
        help("the maximum must be at least 1 and not less than the minimum")
    )]
    InvalidMultiplicity {
        /// The list rule's tag.
        rule: String,
        /// The declared minimum.
        min: usize,
        /// The declared maximum.
        max: usize,
    },

    /// A rule reachable from the goal can never derive a finite string of terminals.
    #[error("rule '{rule}' never terminates: every derivation recurses without reaching a terminal")]
    #[diagnostic(
        code(lcglr::build::non_terminating),
        help("give the rule an alternative that does not refer back to itself")
    )]
    NonTerminating {
        /// The first offending rule in rule-number order.
        rule: String,
    },
}
