//! This crate provides a scannerless, left-corner GLR parser runtime. A grammar, expressed as a
//! normalised [`RuleSet`], is turned into a lazily built [`Automaton`] for one goal rule; parsing
//! an input with the automaton yields a [`SharedPackedParseTree`] holding every accepted
//! derivation, with a preferred one selected at every node by the grammar's choice policy.
//!
//! To use this crate, declare rules with a [`RuleSetBuilder`], call [`build`] with the tag of the
//! goal rule, and then [`parse`] inputs with the resulting automaton:
//!
//! ```
//! use lcglr::{ChoiceKind, Item, RuleSetBuilder};
//! use std::sync::Arc;
//!
//! let mut b = RuleSetBuilder::new();
//! b.choice("expr", ChoiceKind::PriorityLongest, [Item::rule("v"), Item::rule("add"), Item::rule("mul")]);
//! b.concatenation("add", [Item::rule("expr"), Item::literal("+"), Item::rule("expr")]);
//! b.concatenation("mul", [Item::rule("expr"), Item::literal("*"), Item::rule("expr")]);
//! b.pattern("v", "[a-z]");
//! let rules = Arc::new(b.build().unwrap());
//!
//! let automaton = lcglr::build(rules, "expr").unwrap();
//! let result = lcglr::parse(&automaton, "a+b*c");
//! let tree = result.sppt.unwrap();
//! assert_eq!(tree.root().children()[0].tag(), "add");
//! ```
//!
//! Parsing never fails with an `Err`: rejected inputs produce a [`ParseResult`] without a tree
//! and with a [`LanguageIssue`] at the furthest offset any parse head reached.

#![deny(missing_docs)]

pub mod config;
pub use config::{Config, DefaultConfig, ResolvedAmbiguity};

mod automaton;
mod builder;
mod error;
mod gss;
mod issue;
mod lookahead;
mod parser;
pub mod position;
mod rule;
mod scanner;
mod sppt;

pub use automaton::{Action, Automaton, Closure, LookaheadMode, ParserState, StateId, Transition};
pub use builder::{Item, RuleSetBuilder, EMPTY_TAG};
pub use error::BuildError;
pub use issue::{InputLocation, IssueKind, LanguageIssue, LineIndex, Phase};
pub use lookahead::LookaheadSet;
pub use parser::{CompletionItem, CompletionKind, ParseResult};
pub use position::RulePosition;
pub use rule::{ChoiceKind, ListKind, Multiplicity, Rhs, RuleId, RuleKind, RuleSet, RuntimeRule, TerminalKind};
pub use scanner::{LeafToken, UNKNOWN_TAG};
pub use sppt::{NodeId, SharedPackedParseTree, SpptNode};

use std::sync::Arc;

#[cfg(test)]
mod tests;

/// The name under which end-of-text appears in expected sets.
pub const EOT_TAG: &str = "<EOT>";

/// Validate `rule_set` for the goal rule `goal` and create its automaton.
pub fn build(rule_set: Arc<RuleSet>, goal: &str) -> Result<Arc<Automaton>, BuildError> {
    Automaton::build(rule_set, goal)
}

/// Parse `input` with `automaton` and the default configuration.
pub fn parse(automaton: &Automaton, input: &str) -> ParseResult {
    automaton.parse(input)
}

/// Split `input` into leaf tokens of `rule_set` without parsing it.
pub fn scan(rule_set: &RuleSet, input: &str) -> Vec<LeafToken> {
    rule_set.scan(input)
}

/// The terminals that may follow `input[..offset]` in the language of `automaton`.
pub fn expected_terminals_at(automaton: &Automaton, input: &str, offset: usize) -> Vec<CompletionItem> {
    automaton.expected_terminals_at(input, offset)
}
