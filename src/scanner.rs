//! The on-demand scanner.
//!
//! There is no tokenisation pass: the parser asks whether one particular terminal matches at one
//! particular offset, and only for the terminals the automaton expects there. Results are cached
//! per parse, since many heads tend to ask the same question.

use std::collections::BTreeMap;

use crate::issue::{IssueKind, LanguageIssue, LineIndex, Phase};
use crate::rule::{RuleId, RuleSet};
use crate::InputLocation;

/// The tag of the tokens [`RuleSet::scan`] produces for text no terminal matches.
pub const UNKNOWN_TAG: &str = "<UNKNOWN>";

/// A piece of input matched by one terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafToken {
    /// The terminal, or `None` for unmatched text.
    pub rule: Option<RuleId>,
    /// The terminal's tag.
    pub tag: String,
    /// Whether the terminal is a skip rule.
    pub is_skip: bool,
    /// Where the token is.
    pub location: InputLocation,
    /// The text of the token.
    pub matched_text: String,
}

/// Per-parse matching state for one input.
#[derive(Debug)]
pub(crate) struct Scanner<'a> {
    rule_set: &'a RuleSet,
    text: &'a str,
    matches: BTreeMap<(RuleId, usize), Option<usize>>,
    skips: BTreeMap<usize, Option<(RuleId, usize)>>,
}

impl<'a> Scanner<'a> {
    pub fn new(rule_set: &'a RuleSet, text: &'a str) -> Self {
        Scanner {
            rule_set,
            text,
            matches: BTreeMap::new(),
            skips: BTreeMap::new(),
        }
    }

    /// The end of the match of `terminal` at `position`.
    pub fn match_terminal(&mut self, terminal: RuleId, position: usize) -> Option<usize> {
        if position > self.text.len() {
            return None;
        }
        let (rule_set, text) = (self.rule_set, self.text);
        *self
            .matches
            .entry((terminal, position))
            .or_insert_with(|| rule_set.rule(terminal).match_at(text, position))
    }

    /// Whether any of `terminals` matches at `position`.
    pub fn any_matches(&mut self, terminals: impl IntoIterator<Item = RuleId>, position: usize) -> bool {
        terminals.into_iter().any(|t| self.match_terminal(t, position).is_some())
    }

    /// The longest non-empty skip match at `position`.
    fn skip_at(&mut self, position: usize) -> Option<(RuleId, usize)> {
        if let Some(&cached) = self.skips.get(&position) {
            return cached;
        }
        let rule_set = self.rule_set;
        let candidates = rule_set.skip_rules().iter().copied();
        let found = self.longest_match(position, candidates);
        self.skips.insert(position, found);
        found
    }

    /// All skip leaves starting at `position`, longest match first, as `(rule, start, end)`.
    pub fn skip_from(&mut self, mut position: usize) -> Vec<(RuleId, usize, usize)> {
        let mut skipped = vec![];
        while let Some((rule, end)) = self.skip_at(position) {
            skipped.push((rule, position, end));
            position = end;
        }
        skipped
    }

    /// The longest non-empty match among `candidates` at `position`. Ties go to literals, then
    /// to the earlier candidate.
    pub fn longest_match(&mut self, position: usize, candidates: impl IntoIterator<Item = RuleId>) -> Option<(RuleId, usize)> {
        let mut best: Option<(RuleId, usize, bool)> = None;
        for t in candidates {
            let Some(end) = self.match_terminal(t, position) else {
                continue;
            };
            if end == position {
                continue;
            }
            let literal = self.rule_set.rule(t).is_literal();
            let better = match best {
                None => true,
                Some((_, best_end, best_literal)) => end > best_end || (end == best_end && literal && !best_literal),
            };
            if better {
                best = Some((t, end, literal));
            }
        }
        best.map(|(t, end, _)| (t, end))
    }
}

/// Split `text` into the longest tokens of `rule_set`'s literals and patterns.
pub(crate) fn scan(rule_set: &RuleSet, text: &str) -> (Vec<LeafToken>, Vec<LanguageIssue>) {
    let lines = LineIndex::new(text);
    let mut scanner = Scanner::new(rule_set, text);
    let terminals: Vec<RuleId> = rule_set.scannable_terminals().map(|r| r.number()).collect();
    let mut tokens = vec![];
    let mut issues = vec![];
    let mut unknown_from: Option<usize> = None;
    let mut position = 0;

    let mut flush_unknown = |from: Option<usize>, to: usize, tokens: &mut Vec<LeafToken>| {
        if let Some(from) = from {
            let location = lines.location(from, to - from);
            issues.push(LanguageIssue {
                kind: IssueKind::Error,
                phase: Phase::Scan,
                location,
                message: format!("Unknown text '{}'", &text[from..to]),
                expected: Default::default(),
            });
            tokens.push(LeafToken {
                rule: None,
                tag: UNKNOWN_TAG.to_string(),
                is_skip: false,
                location,
                matched_text: text[from..to].to_string(),
            });
        }
    };

    while position < text.len() {
        match scanner.longest_match(position, terminals.iter().copied()) {
            Some((rule, end)) => {
                flush_unknown(unknown_from.take(), position, &mut tokens);
                let r = rule_set.rule(rule);
                tokens.push(LeafToken {
                    rule: Some(rule),
                    tag: r.tag().to_string(),
                    is_skip: r.is_skip(),
                    location: lines.location(position, end - position),
                    matched_text: text[position..end].to_string(),
                });
                position = end;
            }
            None => {
                unknown_from.get_or_insert(position);
                position += text[position..].chars().next().map_or(1, char::len_utf8);
            }
        }
    }
    flush_unknown(unknown_from.take(), position, &mut tokens);
    (tokens, issues)
}
