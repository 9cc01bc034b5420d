//! The immutable, normalised rule model.
//!
//! A [`RuleSet`] is an arena of [`RuntimeRule`]s. Everything else in the crate refers to a rule
//! by its [`RuleId`], the rule's index in that arena; names are only resolved once, by the
//! [`RuleSetBuilder`](crate::RuleSetBuilder).

use regex_automata::meta::Regex;
use regex_automata::{Anchored, Input};
use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use crate::scanner::{self, LeafToken};
use crate::LanguageIssue;

/// The number of a rule within its rule set.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleId(pub(crate) usize);

impl RuleId {
    /// The augmented goal rule `<GOAL> = goal` that every automaton adds on top of its rule set.
    /// It never appears in a rule set.
    pub const GOAL: RuleId = RuleId(usize::MAX);

    /// The index of the rule in its rule set.
    pub fn index(self) -> usize {
        self.0
    }
}

impl Debug for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        if *self == RuleId::GOAL {
            f.write_str("#GOAL")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// How a choice resolves two derivations of the same span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceKind {
    /// Prefer the derivation whose children reach furthest, then the lower option index.
    LongestPriority,
    /// Prefer the lower option index, then the derivation whose children reach furthest.
    PriorityLongest,
    /// All options have equal priority; only the longest-match rule discards derivations.
    Ambiguous,
}

/// The shape of a list rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    /// `item*`, `item+`, `item{n..m}`.
    Multi,
    /// `[item / separator]*`: items alternate with separators.
    Separated {
        /// The separator rule.
        separator: RuleId,
    },
}

/// The bounds of a list rule. A `max` of `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Multiplicity {
    /// The minimum number of items.
    pub min: usize,
    /// The maximum number of items, if bounded.
    pub max: Option<usize>,
}

impl Multiplicity {
    /// Whether `count` items are enough to end the list.
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min && self.max.map_or(true, |max| count <= max)
    }

    /// Whether a list holding `count` items may take another one.
    pub fn has_room(&self, count: usize) -> bool {
        self.max.map_or(true, |max| count < max)
    }
}

impl Display for Multiplicity {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self.max {
            Some(max) => write!(f, "{{{}..{}}}", self.min, max),
            None => write!(f, "{{{}..}}", self.min),
        }
    }
}

/// The right-hand side of a non-terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rhs {
    /// Matches nothing; parsed as the single zero-width `marker` leaf.
    Empty {
        /// The empty-marker terminal owned by this rule.
        marker: RuleId,
    },
    /// The items in order. Has exactly one option, number 0.
    Concatenation {
        /// The items.
        items: Vec<RuleId>,
    },
    /// Option `i` is the single item `items[i]`.
    Choice {
        /// How competing options are resolved.
        kind: ChoiceKind,
        /// One item per option.
        items: Vec<RuleId>,
    },
    /// A repetition of `item`. Option 0 takes at least one item; option 1 (present only when
    /// the minimum is 0) is the zero-width `empty` marker.
    List {
        /// Multi or separated.
        kind: ListKind,
        /// The repeated rule.
        item: RuleId,
        /// The item bounds.
        range: Multiplicity,
        /// The empty-marker terminal, when the list may be empty.
        empty: Option<RuleId>,
    },
}

impl Rhs {
    /// The child rules referenced by this right-hand side. For separated lists the item comes
    /// first and the separator second.
    pub fn items(&self) -> Vec<RuleId> {
        match self {
            Rhs::Empty { marker } => vec![*marker],
            Rhs::Concatenation { items } | Rhs::Choice { items, .. } => items.clone(),
            Rhs::List { kind, item, empty, .. } => {
                let mut items = vec![*item];
                if let ListKind::Separated { separator } = kind {
                    items.push(*separator);
                }
                items.extend(*empty);
                items
            }
        }
    }

    /// The number of options.
    pub fn option_count(&self) -> usize {
        match self {
            Rhs::Choice { items, .. } => items.len(),
            Rhs::List { empty: Some(_), .. } => 2,
            _ => 1,
        }
    }

    /// The choice kind, if this is a choice.
    pub fn choice_kind(&self) -> Option<ChoiceKind> {
        match self {
            Rhs::Choice { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// The list bounds, if this is a list.
    pub fn list_range(&self) -> Option<Multiplicity> {
        match self {
            Rhs::List { range, .. } => Some(*range),
            _ => None,
        }
    }
}

/// What a terminal matches.
#[derive(Debug, Clone)]
pub enum TerminalKind {
    /// Exact text.
    Literal(String),
    /// A regular expression, anchored at the scan position.
    Pattern {
        /// The expression as written in the grammar.
        source: String,
        /// The compiled expression. Searches start at the scan position but see the whole text,
        /// so boundary assertions look at what precedes it.
        regex: Regex,
    },
    /// The zero-width leaf standing for an empty rule or an empty list.
    Empty {
        /// The rule owning the marker.
        owner: RuleId,
    },
    /// The goal of another, separately compiled rule set.
    Embedded {
        /// The embedded rule set.
        rule_set: Arc<RuleSet>,
        /// The goal within the embedded rule set.
        goal: RuleId,
    },
}

impl TerminalKind {
    /// Match this terminal at `pos`, returning the end offset of the match.
    ///
    /// Embedded terminals are not scanned; they are parsed by a nested automaton.
    pub fn match_at(&self, text: &str, pos: usize) -> Option<usize> {
        match self {
            TerminalKind::Literal(value) => text[pos..].starts_with(value.as_str()).then(|| pos + value.len()),
            TerminalKind::Pattern { regex, .. } => {
                let input = Input::new(text).range(pos..).anchored(Anchored::Yes);
                regex.search(&input).map(|m| m.end())
            }
            TerminalKind::Empty { .. } => Some(pos),
            TerminalKind::Embedded { .. } => None,
        }
    }
}

/// Terminal or non-terminal.
#[derive(Debug, Clone)]
pub enum RuleKind {
    /// A leaf of the parse tree.
    Terminal(TerminalKind),
    /// A rule with a right-hand side.
    NonTerminal(Rhs),
}

/// One rule of a rule set.
#[derive(Debug, Clone)]
pub struct RuntimeRule {
    pub(crate) rule_set: usize,
    pub(crate) number: RuleId,
    pub(crate) tag: String,
    pub(crate) kind: RuleKind,
    pub(crate) is_skip: bool,
}

impl RuntimeRule {
    /// The id of the owning rule set.
    pub fn rule_set_id(&self) -> usize {
        self.rule_set
    }

    /// The rule's number within its rule set.
    pub fn number(&self) -> RuleId {
        self.number
    }

    /// The display name of the rule.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Terminal or non-terminal, with the kind-specific payload.
    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }

    /// Skip rules (whitespace, comments) are tried at every position and never expected.
    pub fn is_skip(&self) -> bool {
        self.is_skip
    }

    /// Whether this rule is a terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, RuleKind::Terminal(_))
    }

    /// Whether this rule is a non-terminal.
    pub fn is_non_terminal(&self) -> bool {
        matches!(self.kind, RuleKind::NonTerminal(_))
    }

    /// Whether this rule is an empty marker.
    pub fn is_empty_marker(&self) -> bool {
        matches!(self.kind, RuleKind::Terminal(TerminalKind::Empty { .. }))
    }

    /// Whether this rule is an embedded goal of another rule set.
    pub fn is_embedded(&self) -> bool {
        matches!(self.kind, RuleKind::Terminal(TerminalKind::Embedded { .. }))
    }

    /// Whether this rule is a literal terminal.
    pub fn is_literal(&self) -> bool {
        matches!(self.kind, RuleKind::Terminal(TerminalKind::Literal(_)))
    }

    /// Whether this rule is a pattern terminal.
    pub fn is_pattern(&self) -> bool {
        matches!(self.kind, RuleKind::Terminal(TerminalKind::Pattern { .. }))
    }

    /// The right-hand side, for non-terminals.
    pub fn rhs(&self) -> Option<&Rhs> {
        match &self.kind {
            RuleKind::NonTerminal(rhs) => Some(rhs),
            RuleKind::Terminal(_) => None,
        }
    }

    /// The terminal payload, for terminals.
    pub fn terminal(&self) -> Option<&TerminalKind> {
        match &self.kind {
            RuleKind::Terminal(t) => Some(t),
            RuleKind::NonTerminal(_) => None,
        }
    }

    /// Match this rule, as a terminal, at `pos`. Non-terminals never match.
    pub fn match_at(&self, text: &str, pos: usize) -> Option<usize> {
        self.terminal().and_then(|t| t.match_at(text, pos))
    }
}

impl PartialEq for RuntimeRule {
    fn eq(&self, other: &Self) -> bool {
        (self.rule_set, self.number) == (other.rule_set, other.number)
    }
}

impl Eq for RuntimeRule {}

impl Display for RuntimeRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        f.write_str(&self.tag)
    }
}

/// A finalised, immutable grammar.
///
/// Rule sets are produced by [`RuleSetBuilder::build`](crate::RuleSetBuilder::build) and can not
/// be extended afterwards, so cached automaton states can never go stale.
#[derive(Debug)]
pub struct RuleSet {
    pub(crate) id: usize,
    pub(crate) rules: Vec<RuntimeRule>,
    pub(crate) by_tag: BTreeMap<String, RuleId>,
    pub(crate) skip: Vec<RuleId>,
}

impl RuleSet {
    /// Start building a rule set.
    pub fn builder() -> crate::RuleSetBuilder {
        crate::RuleSetBuilder::new()
    }

    /// The process-unique id of this rule set.
    pub fn id(&self) -> usize {
        self.id
    }

    /// The rule with the given number.
    ///
    /// Panics when the id does not belong to this rule set.
    pub fn rule(&self, id: RuleId) -> &RuntimeRule {
        match self.rules.get(id.0) {
            Some(rule) => rule,
            None => panic!("rule {:?} does not belong to rule set {}", id, self.id),
        }
    }

    /// All rules, in number order.
    pub fn rules(&self) -> &[RuntimeRule] {
        &self.rules
    }

    /// Look up a rule by tag.
    pub fn find(&self, tag: &str) -> Option<RuleId> {
        self.by_tag.get(tag).copied()
    }

    /// The skip terminals.
    pub fn skip_rules(&self) -> &[RuleId] {
        &self.skip
    }

    /// The terminals that can be scanned directly: literals and patterns, skip rules included.
    pub fn scannable_terminals(&self) -> impl Iterator<Item = &RuntimeRule> {
        self.rules.iter().filter(|r| r.is_literal() || r.is_pattern())
    }

    /// Split `text` into leaves without parsing it.
    pub fn scan(&self, text: &str) -> Vec<LeafToken> {
        scanner::scan(self, text).0
    }

    /// Like [`scan`](RuleSet::scan), also reporting unmatched text as scan errors.
    pub fn scan_checked(&self, text: &str) -> (Vec<LeafToken>, Vec<LanguageIssue>) {
        scanner::scan(self, text)
    }
}
