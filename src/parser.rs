//! The left-corner GLR parse loop.
//!
//! A parse keeps its heads (growing nodes that still expect something) grouped by input offset
//! and always advances the lowest offset first. A head first tries its WIDTH transitions; every
//! completed item is then propagated to the growing node that was waiting for it through the
//! automaton's HEIGHT, GRAFT and GOAL transitions. Propagation is driven by a work queue rather
//! than recursion.

use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use crate::automaton::{Action, Automaton, LookaheadMode, Transition};
use crate::config::{Config, DefaultConfig};
use crate::gss::{Child, CompleteId, GrowingId, Gss};
use crate::issue::{context_at, IssueKind, LanguageIssue, LineIndex, Phase};
use crate::lookahead::LookaheadSet;
use crate::position::{RulePosition, START};
use crate::rule::{Multiplicity, RuleId, TerminalKind};
use crate::scanner::Scanner;
use crate::sppt::{self, SharedPackedParseTree};
use crate::EOT_TAG;

/// The outcome of a parse.
#[derive(Debug)]
pub struct ParseResult {
    /// The parse tree, when the input was accepted.
    pub sppt: Option<SharedPackedParseTree>,
    /// Errors when the input was rejected; warnings otherwise.
    pub issues: Vec<LanguageIssue>,
}

impl ParseResult {
    /// Whether the input was accepted.
    pub fn is_success(&self) -> bool {
        self.sppt.is_some()
    }

    /// The error issues.
    pub fn errors(&self) -> impl Iterator<Item = &LanguageIssue> {
        self.issues.iter().filter(|i| i.kind == IssueKind::Error)
    }

    /// The warning issues.
    pub fn warnings(&self) -> impl Iterator<Item = &LanguageIssue> {
        self.issues.iter().filter(|i| i.kind == IssueKind::Warning)
    }
}

/// What kind of thing a [`CompletionItem`] offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CompletionKind {
    /// Fixed text.
    Literal,
    /// Text matching a pattern.
    Pattern,
    /// The start of an embedded grammar.
    Embedded,
    /// The input may end here.
    EndOfText,
}

/// Something that may come next at an offset of an input.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CompletionItem {
    /// What is offered.
    pub kind: CompletionKind,
    /// The tag of the terminal.
    pub tag: String,
    /// The literal text, for literals.
    pub text: Option<String>,
}

impl Automaton {
    /// Parse `input` with the default configuration.
    pub fn parse(&self, input: &str) -> ParseResult {
        self.parse_with(input, &DefaultConfig::new())
    }

    /// Parse `input`.
    pub fn parse_with(&self, input: &str, config: &dyn Config) -> ParseResult {
        let text: Arc<str> = Arc::from(input);
        let mut run = ParseRun::new(self, &text, 0, config);
        run.run();
        run.finish()
    }

    /// The terminals that may follow `input[..offset]`.
    ///
    /// Panics when `offset` is past the end of `input` or not on a char boundary.
    pub fn expected_terminals_at(&self, input: &str, offset: usize) -> Vec<CompletionItem> {
        assert!(
            input.is_char_boundary(offset),
            "offset {} is not a char boundary of a {}-byte input",
            offset,
            input.len()
        );
        let text: Arc<str> = Arc::from(&input[..offset]);
        let config = DefaultConfig::new();
        let mut run = ParseRun::new(self, &text, 0, &config);
        run.collect_at = Some(offset);
        run.run();

        let rule_set = self.rule_set();
        let mut items: BTreeSet<CompletionItem> = run
            .collected
            .iter()
            .map(|&t| {
                let rule = rule_set.rule(t);
                let (kind, text) = match rule.terminal() {
                    Some(TerminalKind::Literal(value)) => (CompletionKind::Literal, Some(value.clone())),
                    Some(TerminalKind::Embedded { .. }) => (CompletionKind::Embedded, None),
                    _ => (CompletionKind::Pattern, None),
                };
                CompletionItem {
                    kind,
                    tag: rule.tag().to_string(),
                    text,
                }
            })
            .collect();
        if run.accepted.contains_key(&offset) {
            items.insert(CompletionItem {
                kind: CompletionKind::EndOfText,
                tag: EOT_TAG.to_string(),
                text: None,
            });
        }
        items.into_iter().collect()
    }
}

/// The furthest point any head reached, and what was expected there.
#[derive(Debug, Default)]
struct Failure {
    reached: bool,
    position: usize,
    terminals: BTreeSet<RuleId>,
    end_of_text: bool,
    foreign: BTreeSet<String>,
}

impl Failure {
    fn at(&mut self, position: usize) -> bool {
        if !self.reached || position > self.position {
            *self = Failure {
                reached: true,
                position,
                ..Failure::default()
            };
        }
        position == self.position
    }

    fn record(&mut self, position: usize, terminals: impl IntoIterator<Item = RuleId>, end_of_text: bool) {
        if self.at(position) {
            self.terminals.extend(terminals);
            self.end_of_text |= end_of_text;
        }
    }

    fn record_names(&mut self, position: usize, names: BTreeSet<String>) {
        if self.at(position) {
            self.foreign.extend(names);
        }
    }
}

/// A completed item on its way to the growing node that was waiting for it.
#[derive(Debug)]
struct Task {
    rule: RuleId,
    start: usize,
    next: usize,
    children: Vec<Child>,
    caller: GrowingId,
}

/// The state of one parse.
pub(crate) struct ParseRun<'a> {
    automaton: &'a Automaton,
    config: &'a dyn Config,
    text: &'a Arc<str>,
    start: usize,
    scanner: Scanner<'a>,
    gss: Gss,
    heads: BTreeMap<usize, Vec<GrowingId>>,
    tasks: VecDeque<Task>,
    propagated: BTreeSet<(CompleteId, GrowingId)>,
    accepted: BTreeMap<usize, Vec<Child>>,
    failure: Failure,
    max_num_heads: usize,
    nested: BTreeMap<(RuleId, usize), Vec<(usize, usize)>>,
    nested_issues: Vec<LanguageIssue>,
    collect_at: Option<usize>,
    collected: BTreeSet<RuleId>,
}

impl<'a> ParseRun<'a> {
    pub fn new(automaton: &'a Automaton, text: &'a Arc<str>, start: usize, config: &'a dyn Config) -> Self {
        ParseRun {
            automaton,
            config,
            text,
            start,
            scanner: Scanner::new(automaton.rule_set(), text),
            gss: Gss::default(),
            heads: BTreeMap::new(),
            tasks: VecDeque::new(),
            propagated: BTreeSet::new(),
            accepted: BTreeMap::new(),
            failure: Failure::default(),
            max_num_heads: 0,
            nested: BTreeMap::new(),
            nested_issues: vec![],
            collect_at: None,
            collected: BTreeSet::new(),
        }
    }

    pub fn run(&mut self) {
        let start_state = self.automaton.start_state();
        let mut leading = vec![];
        let first = self.skip_after(self.start, &mut leading);
        let instance = self.gss.instance(RuleId::GOAL, 0, self.start);
        let (root, _) = self.gss.growing(instance, start_state, 0, first);
        self.gss.add_derivation(root, None, leading);
        self.heads.entry(first).or_default().push(root);

        while let Some((position, batch)) = self.heads.pop_first() {
            self.max_num_heads = self.max_num_heads.max(batch.len());
            trace!("offset {}: {} heads", position, batch.len());
            for head in batch {
                self.width(head);
                while let Some(task) = self.tasks.pop_front() {
                    self.propagate(task);
                }
            }
        }
    }

    /// Turn the run into a result: the tree for the longest accepted span, or the furthest
    /// failure.
    pub fn finish(mut self) -> ParseResult {
        let accepted = self.accepted.keys().next_back().copied();
        let result = match accepted {
            Some(end) => {
                let (tree, mut issues) = self.tree_at(end);
                issues.append(&mut self.nested_issues);
                ParseResult {
                    sppt: Some(tree),
                    issues,
                }
            }
            None => ParseResult {
                sppt: None,
                issues: vec![self.failure_issue()],
            },
        };
        debug!(
            "parsed {} bytes for goal '{}': success={}, max heads {}, {} growing nodes, {} complete nodes",
            self.text.len() - self.start,
            self.automaton.tag(self.automaton.goal()),
            result.is_success(),
            self.max_num_heads,
            self.gss.growing.len(),
            self.gss.completes.len()
        );
        result
    }

    fn tree_at(&self, end: usize) -> (SharedPackedParseTree, Vec<LanguageIssue>) {
        let roots = self.accepted.get(&end).map_or(&[][..], Vec::as_slice);
        sppt::finalize(
            &self.gss,
            self.automaton.rule_set(),
            self.text,
            roots,
            self.max_num_heads,
            self.config,
        )
    }

    fn failure_issue(&self) -> LanguageIssue {
        let position = if self.failure.reached {
            self.failure.position
        } else {
            self.start
        };
        let mut expected: BTreeSet<String> = self
            .failure
            .terminals
            .iter()
            .map(|&t| self.automaton.rule_set().rule(t).tag().to_string())
            .collect();
        if self.failure.end_of_text {
            expected.insert(EOT_TAG.to_string());
        }
        expected.extend(self.failure.foreign.iter().cloned());
        let length = self.text[position..].chars().next().map_or(0, char::len_utf8);
        let names: Vec<&str> = expected.iter().map(String::as_str).collect();
        LanguageIssue {
            kind: IssueKind::Error,
            phase: Phase::Parse,
            location: LineIndex::new(self.text).location(position, length),
            message: format!("Failed to match {{{}}} at: {}", names.join(", "), context_at(self.text, position)),
            expected,
        }
    }

    /// Push the skip leaves that follow `end`; returns the offset after them.
    fn skip_after(&mut self, end: usize, children: &mut Vec<Child>) -> usize {
        let mut after = end;
        for (rule, start, skip_end) in self.scanner.skip_from(end) {
            children.push(Child::Leaf(self.gss.leaf(rule, start, skip_end, true, false)));
            after = skip_end;
        }
        after
    }

    fn guard(&mut self, lookahead: &LookaheadSet, position: usize) -> bool {
        if !self.config.lookahead_guards() || lookahead.is_unconstrained() || self.collect_at == Some(position) {
            return true;
        }
        if lookahead.end_of_text && position == self.text.len() {
            return true;
        }
        if self.scanner.any_matches(lookahead.terminals.iter().copied(), position) {
            return true;
        }
        self.failure
            .record(position, lookahead.terminals.iter().copied(), lookahead.end_of_text);
        false
    }

    fn list_range(&self, rule: RuleId, option: usize) -> Option<Multiplicity> {
        match option {
            0 => self.automaton.rhs(rule).and_then(|rhs| rhs.list_range()),
            _ => None,
        }
    }

    /// Whether the growing node's rule may end here.
    fn can_complete(&self, node: GrowingId) -> bool {
        let node = &self.gss.growing[node.0];
        let instance = &self.gss.instances[node.instance.0];
        node.state.has_end()
            && self
                .list_range(instance.rule, instance.option)
                .map_or(true, |range| range.accepts(node.count))
    }

    /// Whether the growing node may consume anything more.
    fn can_continue(&self, node: GrowingId) -> bool {
        let node = &self.gss.growing[node.0];
        let instance = &self.gss.instances[node.instance.0];
        if node.state.expecting().is_none() {
            return false;
        }
        self.list_range(instance.rule, instance.option)
            .map_or(true, |range| range.has_room(node.count))
    }

    fn width(&mut self, head: GrowingId) {
        if !self.can_continue(head) {
            return;
        }
        let node = &self.gss.growing[head.0];
        let (state, position) = (node.state.clone(), node.next);
        let automaton = self.automaton;
        let transitions = automaton.width_transitions(&state);
        for transition in transitions.iter() {
            let terminal = automaton.state_by_id(transition.to).rule();
            let rule = automaton.rule_set().rule(terminal);
            if self.collect_at == Some(position) && !rule.is_empty_marker() {
                self.collected.insert(terminal);
            }
            if transition.action == Action::Embed {
                self.embed(head, terminal, position, transition);
                continue;
            }
            let Some(end) = self.scanner.match_terminal(terminal, position) else {
                self.failure.record(position, [terminal], false);
                continue;
            };
            let is_empty = rule.is_empty_marker();
            let mut children = vec![Child::Leaf(self.gss.leaf(terminal, position, end, false, is_empty))];
            let next = if is_empty {
                end
            } else {
                self.skip_after(end, &mut children)
            };
            if self.guard(&transition.lookahead, next) {
                self.tasks.push_back(Task {
                    rule: terminal,
                    start: position,
                    next,
                    children,
                    caller: head,
                });
            }
        }
    }

    fn embed(&mut self, head: GrowingId, terminal: RuleId, position: usize, transition: &Transition) {
        let ends = match self.nested.get(&(terminal, position)) {
            Some(ends) => ends.clone(),
            None => {
                let ends = self.run_nested(terminal, position);
                self.nested.insert((terminal, position), ends.clone());
                ends
            }
        };
        for (end, tree) in ends {
            let mut children = vec![Child::Embedded(tree)];
            let next = self.skip_after(end, &mut children);
            if self.guard(&transition.lookahead, next) {
                self.tasks.push_back(Task {
                    rule: terminal,
                    start: position,
                    next,
                    children,
                    caller: head,
                });
            }
        }
    }

    /// Parse the embedded grammar of `terminal` at `position`. Returns one (end, tree index)
    /// pair per span the embedded goal can cover.
    fn run_nested(&mut self, terminal: RuleId, position: usize) -> Vec<(usize, usize)> {
        let automaton = self.automaton;
        let Some(inner) = automaton.embedded_automaton(terminal) else {
            return vec![];
        };
        trace!(
            "embedded '{}' at offset {}",
            automaton.rule_set().rule(terminal).tag(),
            position
        );
        let mut run = ParseRun::new(inner, self.text, position, self.config);
        run.collect_at = self.collect_at;
        run.run();
        if run.failure.reached {
            let issue = run.failure_issue();
            self.failure.record_names(issue.location.position, issue.expected);
        }
        if run.accepted.is_empty() {
            return vec![];
        }
        let mut ends = vec![];
        for &end in run.accepted.keys() {
            let (tree, mut issues) = run.tree_at(end);
            self.nested_issues.append(&mut issues);
            self.gss.embedded.push((terminal, Arc::new(tree)));
            ends.push((end, self.gss.embedded.len() - 1));
        }
        self.nested_issues.append(&mut run.nested_issues);
        ends
    }

    fn enqueue(&mut self, complete: CompleteId, caller: GrowingId) {
        if self.propagated.insert((complete, caller)) {
            let c = &self.gss.completes[complete.0];
            self.tasks.push_back(Task {
                rule: c.rule,
                start: c.start,
                next: c.end,
                children: vec![Child::Complete(complete)],
                caller,
            });
        }
    }

    fn propagate(&mut self, task: Task) {
        let caller_state = self.gss.growing[task.caller.0].state.clone();
        let transitions = self.automaton.completion_transitions(&caller_state, task.rule);
        for transition in transitions.iter() {
            match transition.action {
                Action::Goal => {
                    if self.automaton.mode() == LookaheadMode::EndOfText && task.next != self.text.len() {
                        self.failure.record(task.next, std::iter::empty::<RuleId>(), true);
                        continue;
                    }
                    if self.guard(&transition.lookahead, task.next) {
                        self.accept(&task);
                    }
                }
                Action::Graft => {
                    if self.guard(&transition.lookahead, task.next) {
                        self.graft(&task, transition);
                    }
                }
                Action::Height => {
                    if self.guard(&transition.lookahead, task.next) {
                        self.height(&task, transition);
                    }
                }
                Action::Width | Action::Embed => {}
            }
        }
    }

    fn accept(&mut self, task: &Task) {
        let root = &self.gss.growing[task.caller.0];
        let mut children: Vec<Child> = root
            .derivations
            .first()
            .map(|d| d.children.clone())
            .unwrap_or_default();
        children.extend(task.children.iter().copied());
        self.accepted.entry(task.next).or_insert(children);
    }

    /// Attach the completed item to its caller, advancing the caller's rule.
    fn graft(&mut self, task: &Task, transition: &Transition) {
        let caller = &self.gss.growing[task.caller.0];
        let (instance, count) = (caller.instance, caller.count);
        let Some(rp) = caller.state.expecting() else {
            return;
        };
        let inst = &self.gss.instances[instance.0];
        let counts = self
            .automaton
            .rhs(inst.rule)
            .map_or(false, |rhs| rp.counts_as_list_item(rhs));
        let range = self.list_range(inst.rule, inst.option);
        if let Some(range) = range {
            // Zero-width items can only help to reach the minimum.
            if counts && task.start == task.next && count >= range.min {
                return;
            }
            if counts && !range.has_room(count) {
                return;
            }
        }
        let count = count + usize::from(counts);
        let state = self.automaton.state_by_id(transition.to);
        let (node, new) = self.gss.growing(instance, state, bucket(range, count), task.next);
        self.gss.add_derivation(node, Some(task.caller), task.children.clone());
        if new {
            self.arrive(node);
        }
    }

    /// Start the parent rule whose first item is the completed one.
    fn height(&mut self, task: &Task, transition: &Transition) {
        let state = self.automaton.state_by_id(transition.to);
        let (rule, option) = (state.rule(), state.option());
        let counts = self
            .automaton
            .rhs(rule)
            .map_or(false, |rhs| RulePosition::new(rule, option, START).counts_as_list_item(rhs));
        let range = self.list_range(rule, option);
        if let Some(range) = range {
            if counts && task.start == task.next && range.min == 0 {
                return;
            }
        }
        let instance = self.gss.instance(rule, option, task.start);
        let (node, new) = self
            .gss
            .growing(instance, state, bucket(range, usize::from(counts)), task.next);
        self.gss.add_derivation(node, None, task.children.clone());
        if self.gss.add_caller(instance, task.caller) {
            let completions = self.gss.instances[instance.0].completions.clone();
            for complete in completions {
                self.enqueue(complete, task.caller);
            }
        }
        if new {
            self.arrive(node);
        }
    }

    /// A growing node has been created: complete its rule and/or make it a head.
    fn arrive(&mut self, node: GrowingId) {
        if self.can_complete(node) {
            let g = &self.gss.growing[node.0];
            let (instance, next) = (g.instance, g.next);
            let inst = &self.gss.instances[instance.0];
            let (rule, option, start) = (inst.rule, inst.option, inst.start);
            let complete = self.gss.complete(rule, start, next, option, node);
            if self.gss.add_completion(instance, complete) {
                let callers = self.gss.instances[instance.0].callers.clone();
                for caller in callers {
                    self.enqueue(complete, caller);
                }
            }
        }
        if self.can_continue(node) {
            let next = self.gss.growing[node.0].next;
            self.heads.entry(next).or_default().push(node);
        }
    }
}

/// The count a growing node is keyed by. Past the minimum, counts of an unbounded list are
/// interchangeable.
fn bucket(range: Option<Multiplicity>, count: usize) -> usize {
    match range {
        Some(Multiplicity { min, max: None }) => count.min(min),
        Some(_) => count,
        None => 0,
    }
}
