//! Construction of [`RuleSet`]s.
//!
//! The builder is where names are resolved: rules refer to each other by tag while they are
//! declared, and [`RuleSetBuilder::build`] turns every reference into a [`RuleId`]. Anonymous
//! literals and patterns are interned by their text, so `'+'` written in two rules is one
//! terminal.

use regex_automata::meta::Regex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::rule::{ChoiceKind, ListKind, Multiplicity, Rhs, RuleId, RuleKind, RuleSet, RuntimeRule, TerminalKind};
use crate::BuildError;

static NEXT_RULE_SET_ID: AtomicUsize = AtomicUsize::new(0);

/// The tag given to empty-marker terminals.
pub const EMPTY_TAG: &str = "<EMPTY>";

/// A reference to a rule inside a right-hand side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    /// A rule declared in the same builder, by tag.
    Rule(String),
    /// An anonymous literal terminal.
    Literal(String),
    /// An anonymous pattern terminal.
    Pattern(String),
}

impl Item {
    /// A reference to a declared rule.
    pub fn rule(tag: impl Into<String>) -> Item {
        Item::Rule(tag.into())
    }

    /// An anonymous literal.
    pub fn literal(value: impl Into<String>) -> Item {
        Item::Literal(value.into())
    }

    /// An anonymous pattern.
    pub fn pattern(source: impl Into<String>) -> Item {
        Item::Pattern(source.into())
    }
}

#[derive(Debug)]
enum PendingList {
    Multi,
    Separated(Item),
}

#[derive(Debug)]
enum PendingBody {
    Literal(String),
    Pattern(String),
    Embedded(Arc<RuleSet>, String),
    Empty,
    Concatenation(Vec<Item>),
    Choice(ChoiceKind, Vec<Item>),
    List {
        kind: PendingList,
        item: Item,
        range: Multiplicity,
    },
}

#[derive(Debug)]
struct PendingRule {
    tag: String,
    is_skip: bool,
    body: PendingBody,
}

/// Collects rule declarations and produces a validated [`RuleSet`].
#[derive(Debug, Default)]
pub struct RuleSetBuilder {
    rules: Vec<PendingRule>,
}

impl RuleSetBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        RuleSetBuilder { rules: vec![] }
    }

    fn push(&mut self, tag: impl Into<String>, is_skip: bool, body: PendingBody) -> &mut Self {
        self.rules.push(PendingRule {
            tag: tag.into(),
            is_skip,
            body,
        });
        self
    }

    /// `tag = items...`
    pub fn concatenation(&mut self, tag: impl Into<String>, items: impl IntoIterator<Item = Item>) -> &mut Self {
        let items = items.into_iter().collect();
        self.push(tag, false, PendingBody::Concatenation(items))
    }

    /// `tag = a | b | ...`
    pub fn choice(
        &mut self,
        tag: impl Into<String>,
        kind: ChoiceKind,
        items: impl IntoIterator<Item = Item>,
    ) -> &mut Self {
        let items = items.into_iter().collect();
        self.push(tag, false, PendingBody::Choice(kind, items))
    }

    /// `tag = item{min..max}`; `None` leaves the maximum unbounded.
    pub fn multi(&mut self, tag: impl Into<String>, min: usize, max: Option<usize>, item: Item) -> &mut Self {
        self.push(
            tag,
            false,
            PendingBody::List {
                kind: PendingList::Multi,
                item,
                range: Multiplicity { min, max },
            },
        )
    }

    /// `tag = [item / separator]{min..max}`.
    pub fn separated_list(
        &mut self,
        tag: impl Into<String>,
        min: usize,
        max: Option<usize>,
        item: Item,
        separator: Item,
    ) -> &mut Self {
        self.push(
            tag,
            false,
            PendingBody::List {
                kind: PendingList::Separated(separator),
                item,
                range: Multiplicity { min, max },
            },
        )
    }

    /// `tag = item?`, lowered to a list of zero or one items.
    pub fn optional(&mut self, tag: impl Into<String>, item: Item) -> &mut Self {
        self.multi(tag, 0, Some(1), item)
    }

    /// `tag = ;`
    pub fn empty(&mut self, tag: impl Into<String>) -> &mut Self {
        self.push(tag, false, PendingBody::Empty)
    }

    /// A named literal terminal.
    pub fn literal(&mut self, tag: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push(tag, false, PendingBody::Literal(value.into()))
    }

    /// A named pattern terminal.
    pub fn pattern(&mut self, tag: impl Into<String>, source: impl Into<String>) -> &mut Self {
        self.push(tag, false, PendingBody::Pattern(source.into()))
    }

    /// A literal skip terminal.
    pub fn skip_literal(&mut self, tag: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push(tag, true, PendingBody::Literal(value.into()))
    }

    /// A pattern skip terminal, e.g. whitespace or comments.
    pub fn skip_pattern(&mut self, tag: impl Into<String>, source: impl Into<String>) -> &mut Self {
        self.push(tag, true, PendingBody::Pattern(source.into()))
    }

    /// A terminal standing for the rule `goal` of another rule set.
    pub fn embedded(&mut self, tag: impl Into<String>, rule_set: Arc<RuleSet>, goal: impl Into<String>) -> &mut Self {
        self.push(tag, false, PendingBody::Embedded(rule_set, goal.into()))
    }

    /// Resolve every reference and produce the rule set.
    pub fn build(self) -> Result<RuleSet, BuildError> {
        let id = NEXT_RULE_SET_ID.fetch_add(1, Ordering::Relaxed);
        let mut resolver = Resolver {
            rule_set: id,
            next: self.rules.len(),
            by_tag: BTreeMap::new(),
            literals: BTreeMap::new(),
            patterns: BTreeMap::new(),
            extra: vec![],
        };
        for (ix, rule) in self.rules.iter().enumerate() {
            if resolver.by_tag.insert(rule.tag.clone(), RuleId(ix)).is_some() {
                return Err(BuildError::DuplicateRule(rule.tag.clone()));
            }
            // Named terminals double as the interned form of their text, unless they are skip
            // rules: a skip rule must never be expected by a non-skip position.
            match &rule.body {
                PendingBody::Literal(value) if !rule.is_skip => {
                    resolver.literals.entry(value.clone()).or_insert(RuleId(ix));
                }
                PendingBody::Pattern(source) if !rule.is_skip => {
                    resolver.patterns.entry(source.clone()).or_insert(RuleId(ix));
                }
                _ => {}
            }
        }

        let mut rules = Vec::with_capacity(self.rules.len());
        let mut skip = vec![];
        for (ix, rule) in self.rules.into_iter().enumerate() {
            let number = RuleId(ix);
            let kind = resolver.resolve(number, &rule.tag, rule.body)?;
            if rule.is_skip {
                skip.push(number);
            }
            rules.push(RuntimeRule {
                rule_set: id,
                number,
                tag: rule.tag,
                kind,
                is_skip: rule.is_skip,
            });
        }
        rules.extend(resolver.extra);
        Ok(RuleSet {
            id,
            rules,
            by_tag: resolver.by_tag,
            skip,
        })
    }
}

struct Resolver {
    rule_set: usize,
    next: usize,
    by_tag: BTreeMap<String, RuleId>,
    literals: BTreeMap<String, RuleId>,
    patterns: BTreeMap<String, RuleId>,
    extra: Vec<RuntimeRule>,
}

impl Resolver {
    fn add(&mut self, tag: String, kind: RuleKind) -> RuleId {
        let number = RuleId(self.next);
        self.next += 1;
        self.extra.push(RuntimeRule {
            rule_set: self.rule_set,
            number,
            tag,
            kind,
            is_skip: false,
        });
        number
    }

    fn compile(tag: &str, source: &str) -> Result<Regex, BuildError> {
        Regex::new(source).map_err(|e| BuildError::InvalidPattern {
            rule: tag.to_string(),
            message: e.to_string(),
        })
    }

    fn item(&mut self, owner: &str, item: Item) -> Result<RuleId, BuildError> {
        match item {
            Item::Rule(tag) => self.by_tag.get(&tag).copied().ok_or_else(|| BuildError::UnknownRule {
                rule: owner.to_string(),
                reference: tag,
            }),
            Item::Literal(value) => {
                if let Some(&id) = self.literals.get(&value) {
                    return Ok(id);
                }
                if value.is_empty() {
                    return Err(BuildError::EmptyLiteral(owner.to_string()));
                }
                let id = self.add(
                    format!("'{}'", value),
                    RuleKind::Terminal(TerminalKind::Literal(value.clone())),
                );
                self.literals.insert(value, id);
                Ok(id)
            }
            Item::Pattern(source) => {
                if let Some(&id) = self.patterns.get(&source) {
                    return Ok(id);
                }
                let tag = format!("\"{}\"", source);
                let regex = Self::compile(&tag, &source)?;
                let id = self.add(tag, RuleKind::Terminal(TerminalKind::Pattern { source: source.clone(), regex }));
                self.patterns.insert(source, id);
                Ok(id)
            }
        }
    }

    fn empty_marker(&mut self, owner: RuleId) -> RuleId {
        self.add(EMPTY_TAG.to_string(), RuleKind::Terminal(TerminalKind::Empty { owner }))
    }

    fn resolve(&mut self, number: RuleId, tag: &str, body: PendingBody) -> Result<RuleKind, BuildError> {
        let kind = match body {
            PendingBody::Literal(value) => {
                if value.is_empty() {
                    return Err(BuildError::EmptyLiteral(tag.to_string()));
                }
                RuleKind::Terminal(TerminalKind::Literal(value))
            }
            PendingBody::Pattern(source) => {
                let regex = Self::compile(tag, &source)?;
                RuleKind::Terminal(TerminalKind::Pattern { source, regex })
            }
            PendingBody::Embedded(rule_set, goal) => {
                let goal = rule_set.find(&goal).ok_or_else(|| BuildError::UnknownRule {
                    rule: tag.to_string(),
                    reference: goal.clone(),
                })?;
                RuleKind::Terminal(TerminalKind::Embedded { rule_set, goal })
            }
            PendingBody::Empty => RuleKind::NonTerminal(Rhs::Empty {
                marker: self.empty_marker(number),
            }),
            PendingBody::Concatenation(items) => {
                if items.is_empty() {
                    return Err(BuildError::EmptyRhs(tag.to_string()));
                }
                let items = items
                    .into_iter()
                    .map(|i| self.item(tag, i))
                    .collect::<Result<Vec<_>, _>>()?;
                RuleKind::NonTerminal(Rhs::Concatenation { items })
            }
            PendingBody::Choice(kind, items) => {
                if items.is_empty() {
                    return Err(BuildError::EmptyRhs(tag.to_string()));
                }
                let items = items
                    .into_iter()
                    .map(|i| self.item(tag, i))
                    .collect::<Result<Vec<_>, _>>()?;
                RuleKind::NonTerminal(Rhs::Choice { kind, items })
            }
            PendingBody::List { kind, item, range } => {
                if let Some(max) = range.max {
                    if max == 0 || max < range.min {
                        return Err(BuildError::InvalidMultiplicity {
                            rule: tag.to_string(),
                            min: range.min,
                            max,
                        });
                    }
                }
                let item = self.item(tag, item)?;
                let kind = match kind {
                    PendingList::Multi => ListKind::Multi,
                    PendingList::Separated(separator) => ListKind::Separated {
                        separator: self.item(tag, separator)?,
                    },
                };
                let empty = (range.min == 0).then(|| self.empty_marker(number));
                RuleKind::NonTerminal(Rhs::List {
                    kind,
                    item,
                    range,
                    empty,
                })
            }
        };
        Ok(kind)
    }
}
