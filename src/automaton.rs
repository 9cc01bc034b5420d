//! The left-corner automaton.
//!
//! States are sets of [`RulePosition`]s and are built lazily, the first time a parse reaches
//! them. For each expected item the automaton computes a [`Closure`]: the rules and terminals
//! that can be its left corner, together with the lookahead that may follow each of them.
//! Transitions out of a state are computed from closures on first use and then frozen.
//!
//! Everything an automaton caches sits behind a lock or a `OnceCell`, so one automaton can serve
//! any number of concurrent parses.

use log::debug;
use once_cell::sync::OnceCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::{self, Write as _};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::lookahead::LookaheadSet;
use crate::position::{RulePosition, END, START};
use crate::rule::{ListKind, Rhs, RuleId, RuleKind, RuleSet, TerminalKind};
use crate::BuildError;

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// The index of a state within its automaton.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct StateId(pub(crate) usize);

impl StateId {
    /// The index of the state.
    pub fn index(self) -> usize {
        self.0
    }
}

/// What a transition does to a parse head.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Action {
    /// Shift a terminal.
    Width,
    /// Start a parent rule whose first item is the completed rule.
    Height,
    /// Attach the completed rule to the caller that expected it.
    Graft,
    /// The goal rule is complete: accept.
    Goal,
    /// Parse an embedded grammar as if it were a terminal.
    Embed,
}

/// An edge of the automaton.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Transition {
    /// For WIDTH and EMBED the head's state; otherwise the state of the completed rule.
    pub from: StateId,
    /// The state reached.
    pub to: StateId,
    /// What the transition does.
    pub action: Action,
    /// The guard: something in this set must follow at the position reached.
    pub lookahead: LookaheadSet,
}

/// How the goal of an automaton is followed.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum LookaheadMode {
    /// The goal must span the whole input.
    EndOfText,
    /// The goal may be followed by anything; used for embedded grammars.
    Open,
}

/// One node of the automaton.
#[derive(Debug)]
pub struct ParserState {
    id: StateId,
    rule_positions: Vec<RulePosition>,
    width: OnceCell<Arc<[Transition]>>,
    completions: RwLock<BTreeMap<RuleId, Arc<[Transition]>>>,
}

impl ParserState {
    fn new(id: StateId, rule_positions: Vec<RulePosition>) -> Self {
        ParserState {
            id,
            rule_positions,
            width: OnceCell::new(),
            completions: RwLock::new(BTreeMap::new()),
        }
    }

    /// The state's id.
    pub fn id(&self) -> StateId {
        self.id
    }

    /// The rule positions, sorted. They always share one rule and option.
    pub fn rule_positions(&self) -> &[RulePosition] {
        &self.rule_positions
    }

    /// The rule being recognised.
    pub fn rule(&self) -> RuleId {
        self.rule_positions[0].rule
    }

    /// The option being recognised.
    pub fn option(&self) -> usize {
        self.rule_positions[0].option
    }

    /// The position that still expects an item, if any.
    pub fn expecting(&self) -> Option<RulePosition> {
        self.rule_positions.iter().copied().find(|rp| !rp.is_at_end())
    }

    /// Whether the rule may be complete in this state.
    pub fn has_end(&self) -> bool {
        self.rule_positions.iter().any(RulePosition::is_at_end)
    }
}

/// The left-corner closure of one expected item.
#[derive(Debug)]
pub struct Closure {
    item: RuleId,
    rules: BTreeSet<RuleId>,
    terminals: BTreeSet<RuleId>,
    parents: BTreeMap<RuleId, Vec<RulePosition>>,
    follow: BTreeMap<RuleId, LookaheadSet>,
}

impl Closure {
    /// The expected item the closure was computed for.
    pub fn item(&self) -> RuleId {
        self.item
    }

    /// Non-terminals that can be recognised, bottom-up, as the left corner of the item.
    pub fn rules(&self) -> &BTreeSet<RuleId> {
        &self.rules
    }

    /// Terminals that can start the item.
    pub fn terminals(&self) -> &BTreeSet<RuleId> {
        &self.terminals
    }

    /// The option starts whose first item is `rule`.
    pub fn parents_of(&self, rule: RuleId) -> &[RulePosition] {
        self.parents.get(&rule).map_or(&[], Vec::as_slice)
    }

    /// What may follow a completed `rule` before the item itself is complete. Holds the `up`
    /// placeholder wherever the item's own follow set applies.
    pub fn follow_of(&self, rule: RuleId) -> LookaheadSet {
        self.follow.get(&rule).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct StateTable {
    by_positions: BTreeMap<Vec<RulePosition>, StateId>,
    states: Vec<Arc<ParserState>>,
}

/// The lazily built automaton for one goal of one rule set.
#[derive(Debug)]
pub struct Automaton {
    rule_set: Arc<RuleSet>,
    goal: RuleId,
    goal_rhs: Rhs,
    mode: LookaheadMode,
    first: Vec<(LookaheadSet, bool)>,
    embedded: BTreeMap<RuleId, Arc<Automaton>>,
    states: RwLock<StateTable>,
    closures: RwLock<BTreeMap<RuleId, Arc<Closure>>>,
    start: StateId,
}

impl Automaton {
    /// Validate the rule set for the goal `goal` and create its automaton.
    pub fn build(rule_set: Arc<RuleSet>, goal: &str) -> Result<Arc<Automaton>, BuildError> {
        Automaton::build_with_mode(rule_set, goal, LookaheadMode::EndOfText)
    }

    /// Like [`build`](Automaton::build), choosing what may follow the goal.
    pub fn build_with_mode(
        rule_set: Arc<RuleSet>,
        goal: &str,
        mode: LookaheadMode,
    ) -> Result<Arc<Automaton>, BuildError> {
        let goal = rule_set
            .find(goal)
            .ok_or_else(|| BuildError::GoalRuleNotFound(goal.to_string()))?;
        Automaton::for_goal(rule_set, goal, mode)
    }

    fn for_goal(rule_set: Arc<RuleSet>, goal: RuleId, mode: LookaheadMode) -> Result<Arc<Automaton>, BuildError> {
        let reachable = reachable_from(&rule_set, goal);
        check_productive(&rule_set, &reachable)?;
        let unreachable: Vec<&str> = rule_set
            .rules()
            .iter()
            .filter(|r| r.is_non_terminal() && !reachable.contains(&r.number()))
            .map(|r| r.tag())
            .collect();
        if !unreachable.is_empty() {
            debug!("rules unreachable from goal '{}': {:?}", rule_set.rule(goal), unreachable);
        }

        let mut embedded = BTreeMap::new();
        for &r in reachable.iter() {
            if let Some(TerminalKind::Embedded { rule_set: inner, goal: inner_goal }) = rule_set.rule(r).terminal() {
                embedded.insert(r, Automaton::for_goal(inner.clone(), *inner_goal, LookaheadMode::Open)?);
            }
        }

        let first = first_sets(&rule_set);
        let mut automaton = Automaton {
            goal_rhs: Rhs::Concatenation { items: vec![goal] },
            rule_set,
            goal,
            mode,
            first,
            embedded,
            states: RwLock::new(StateTable::default()),
            closures: RwLock::new(BTreeMap::new()),
            start: StateId(0),
        };
        automaton.start = automaton.state(vec![RulePosition::new(RuleId::GOAL, 0, START)]).id;
        debug!(
            "automaton for goal '{}' of rule set {}: {} reachable rules, {} embedded",
            automaton.rule_set.rule(goal),
            automaton.rule_set.id(),
            reachable.len(),
            automaton.embedded.len()
        );
        Ok(Arc::new(automaton))
    }

    /// The rule set the automaton was built for.
    pub fn rule_set(&self) -> &Arc<RuleSet> {
        &self.rule_set
    }

    /// The goal rule.
    pub fn goal(&self) -> RuleId {
        self.goal
    }

    /// What may follow the goal.
    pub fn mode(&self) -> LookaheadMode {
        self.mode
    }

    /// The automaton of an embedded terminal.
    pub fn embedded_automaton(&self, rule: RuleId) -> Option<&Arc<Automaton>> {
        self.embedded.get(&rule)
    }

    /// The right-hand side of `rule`, including the augmented goal rule.
    pub fn rhs(&self, rule: RuleId) -> Option<&Rhs> {
        if rule == RuleId::GOAL {
            Some(&self.goal_rhs)
        } else {
            self.rule_set.rule(rule).rhs()
        }
    }

    /// The display name of `rule`, including the augmented goal rule.
    pub fn tag(&self, rule: RuleId) -> &str {
        if rule == RuleId::GOAL {
            "<GOAL>"
        } else {
            self.rule_set.rule(rule).tag()
        }
    }

    /// The FIRST set of `rule` and whether it derives the empty string.
    pub fn first_set(&self, rule: RuleId) -> (&LookaheadSet, bool) {
        let (set, nullable) = &self.first[rule.0];
        (set, *nullable)
    }

    /// The state a parse starts in.
    pub fn start_state(&self) -> Arc<ParserState> {
        self.state_by_id(self.start)
    }

    /// The number of states built so far.
    pub fn state_count(&self) -> usize {
        read(&self.states).states.len()
    }

    /// The state with the given id.
    pub fn state_by_id(&self, id: StateId) -> Arc<ParserState> {
        read(&self.states).states[id.0].clone()
    }

    /// The state for a set of rule positions, created on first request.
    pub fn state(&self, mut positions: Vec<RulePosition>) -> Arc<ParserState> {
        positions.sort();
        positions.dedup();
        let found = read(&self.states).by_positions.get(&positions).copied();
        if let Some(id) = found {
            return self.state_by_id(id);
        }
        let mut table = write(&self.states);
        if let Some(&id) = table.by_positions.get(&positions) {
            return table.states[id.0].clone();
        }
        let id = StateId(table.states.len());
        let state = Arc::new(ParserState::new(id, positions.clone()));
        table.states.push(state.clone());
        table.by_positions.insert(positions, id);
        state
    }

    /// What may follow the item consumed at `rp`, within `rp`'s own option. Holds `up` when the
    /// option may end afterwards.
    pub fn follow_in_rule(&self, rp: RulePosition) -> LookaheadSet {
        match self.rhs(rp.rule) {
            Some(rhs) => first_from(&self.first, rhs, rp.next(rhs)),
            None => LookaheadSet::up(),
        }
    }

    /// What may follow the item consumed at `rp`, with the augmented goal resolved.
    fn context_follow(&self, rp: RulePosition) -> LookaheadSet {
        if rp.rule == RuleId::GOAL {
            match self.mode {
                LookaheadMode::EndOfText => LookaheadSet::end_of_text(),
                LookaheadMode::Open => LookaheadSet::any(),
            }
        } else {
            self.follow_in_rule(rp)
        }
    }

    /// The closure of an expected item.
    pub fn closure(&self, item: RuleId) -> Arc<Closure> {
        if let Some(closure) = read(&self.closures).get(&item) {
            return closure.clone();
        }
        let closure = Arc::new(self.compute_closure(item));
        write(&self.closures).entry(item).or_insert(closure).clone()
    }

    fn compute_closure(&self, item: RuleId) -> Closure {
        let mut rules = BTreeSet::new();
        let mut terminals = BTreeSet::new();
        let mut parents: BTreeMap<RuleId, Vec<RulePosition>> = BTreeMap::new();
        let mut seen = BTreeSet::from([item]);
        let mut todo = VecDeque::from([item]);
        while let Some(r) = todo.pop_front() {
            match self.rhs(r) {
                None => {
                    terminals.insert(r);
                }
                Some(rhs) => {
                    rules.insert(r);
                    for rp in RulePosition::first_positions(r, rhs) {
                        if let Some(first) = rp.item(rhs) {
                            parents.entry(first).or_default().push(rp);
                            if seen.insert(first) {
                                todo.push_back(first);
                            }
                        }
                    }
                }
            }
        }

        // Lookahead propagation: a left corner is followed by the rest of its parent's option,
        // and by whatever follows the parent when that rest can be empty.
        let mut follow = BTreeMap::from([(item, LookaheadSet::up())]);
        let limit = (seen.len() + 1) * (self.rule_set.rules().len() + 4);
        let mut rounds = 0;
        loop {
            let mut changed = false;
            for (first, rps) in parents.iter() {
                for rp in rps.iter() {
                    let context = follow.get(&rp.rule).cloned().unwrap_or_default();
                    let la = self.follow_in_rule(*rp).resolve(&context);
                    changed |= follow.entry(*first).or_default().union_with(&la);
                }
            }
            if !changed {
                break;
            }
            rounds += 1;
            assert!(rounds <= limit, "lookahead propagation for {:?} did not converge", item);
        }

        Closure {
            item,
            rules,
            terminals,
            parents,
            follow,
        }
    }

    /// The WIDTH and EMBED transitions out of `state`: every terminal that can start the item
    /// the state expects. Literals come first, then patterns, empty markers and embedded goals.
    pub fn width_transitions(&self, state: &ParserState) -> Arc<[Transition]> {
        state.width.get_or_init(|| Arc::from(self.compute_width(state))).clone()
    }

    fn compute_width(&self, state: &ParserState) -> Vec<Transition> {
        let Some(rp) = state.expecting() else {
            return vec![];
        };
        let Some(item) = self.rhs(rp.rule).and_then(|rhs| rp.item(rhs)) else {
            return vec![];
        };
        let closure = self.closure(item);
        let context = self.context_follow(rp);
        let mut candidates: Vec<RuleId> = closure.terminals().iter().copied().collect();
        candidates.sort_by_key(|&t| (self.scan_rank(t), t));
        candidates
            .into_iter()
            .map(|t| Transition {
                from: state.id,
                to: self.state(vec![RulePosition::leaf(t)]).id,
                action: if self.rule_set.rule(t).is_embedded() {
                    Action::Embed
                } else {
                    Action::Width
                },
                lookahead: closure.follow_of(t).resolve(&context),
            })
            .collect()
    }

    fn scan_rank(&self, t: RuleId) -> u8 {
        match self.rule_set.rule(t).terminal() {
            Some(TerminalKind::Literal(_)) => 0,
            Some(TerminalKind::Pattern { .. }) => 1,
            Some(TerminalKind::Empty { .. }) => 2,
            Some(TerminalKind::Embedded { .. }) | None => 3,
        }
    }

    /// The HEIGHT, GRAFT and GOAL transitions taken when `completed` has been recognised in the
    /// context of `caller`.
    pub fn completion_transitions(&self, caller: &ParserState, completed: RuleId) -> Arc<[Transition]> {
        if let Some(transitions) = read(&caller.completions).get(&completed) {
            return transitions.clone();
        }
        let transitions: Arc<[Transition]> = Arc::from(self.compute_completions(caller, completed));
        write(&caller.completions).entry(completed).or_insert(transitions).clone()
    }

    fn compute_completions(&self, caller: &ParserState, completed: RuleId) -> Vec<Transition> {
        let Some(rp) = caller.expecting() else {
            return vec![];
        };
        let Some(rhs) = self.rhs(rp.rule) else {
            return vec![];
        };
        let Some(item) = rp.item(rhs) else {
            return vec![];
        };
        let from = self.state(vec![RulePosition::leaf(completed)]).id;
        let context = self.context_follow(rp);
        let mut transitions = vec![];
        if completed == item {
            transitions.push(Transition {
                from,
                to: self.state(rp.next(rhs)).id,
                action: if rp.rule == RuleId::GOAL {
                    Action::Goal
                } else {
                    Action::Graft
                },
                lookahead: context.clone(),
            });
        }
        let closure = self.closure(item);
        for &parent in closure.parents_of(completed) {
            let Some(parent_rhs) = self.rhs(parent.rule) else {
                continue;
            };
            let lookahead = self
                .follow_in_rule(parent)
                .resolve(&closure.follow_of(parent.rule))
                .resolve(&context);
            transitions.push(Transition {
                from,
                to: self.state(parent.next(parent_rhs)).id,
                action: Action::Height,
                lookahead,
            });
        }
        transitions
    }

    /// Render the states and transitions built so far in graphviz format.
    pub fn to_dot(&self) -> String {
        let states: Vec<Arc<ParserState>> = read(&self.states).states.clone();
        let mut out = String::new();
        out.push_str(
            r#"digraph G {
    node [
        shape="box",
        style="rounded",
        penwidth=1,
        width=2.0
    ];
"#,
        );
        for state in states.iter() {
            let _ = write!(out, "    s{}[label=<", state.id.0);
            for rp in state.rule_positions() {
                let _ = write!(out, "{}|{}", self.tag(rp.rule), rp.option);
                match rp.position {
                    END => out.push_str(" •END"),
                    p => {
                        let _ = write!(out, " •{}", p);
                    }
                }
                out.push_str("<br />");
            }
            out.push_str(">]\n");
            let mut edges: Vec<Transition> = state.width.get().map(|t| t.to_vec()).unwrap_or_default();
            for transitions in read(&state.completions).values() {
                edges.extend(transitions.iter().cloned());
            }
            for t in edges {
                let _ = writeln!(
                    out,
                    "    s{} -> s{} [label=<{:?} {}>]",
                    state.id.0,
                    t.to.0,
                    t.action,
                    DisplayLookahead(self, &t.lookahead)
                );
            }
        }
        out.push_str("}\n");
        out
    }
}

struct DisplayLookahead<'a>(&'a Automaton, &'a LookaheadSet);

impl fmt::Display for DisplayLookahead<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        let mut names: Vec<String> = self.1.names(&self.0.rule_set).into_iter().collect();
        if self.1.up {
            names.push("UP".to_string());
        }
        if self.1.any {
            names.push("ANY".to_string());
        }
        // graphviz labels are html-like
        let joined = names.join(",").replace('<', "&lt;").replace('>', "&gt;");
        write!(f, "[{}]", joined)
    }
}

/// FIRST of whatever can be recognised from `positions` onwards within one option. The result
/// holds `up` when the end of the option can be reached without consuming anything.
pub(crate) fn first_from(first: &[(LookaheadSet, bool)], rhs: &Rhs, positions: Vec<RulePosition>) -> LookaheadSet {
    let mut result = LookaheadSet::empty();
    let mut seen = BTreeSet::new();
    let mut todo = positions;
    while let Some(rp) = todo.pop() {
        if !seen.insert(rp) {
            continue;
        }
        match rp.item(rhs) {
            None => result.up = true,
            Some(item) => {
                let (set, nullable) = &first[item.0];
                result.union_with(set);
                if *nullable {
                    todo.extend(rp.next(rhs));
                }
            }
        }
    }
    result
}

/// Compute the FIRST sets of a rule set: for every rule, the terminals that can start it and
/// whether it can derive the empty string.
pub(crate) fn first_sets(rules: &RuleSet) -> Vec<(LookaheadSet, bool)> {
    let mut r: Vec<(LookaheadSet, bool)> = rules
        .rules()
        .iter()
        .map(|rule| match rule.kind() {
            RuleKind::Terminal(TerminalKind::Empty { .. }) => (LookaheadSet::empty(), true),
            RuleKind::Terminal(TerminalKind::Embedded { .. }) => (LookaheadSet::any(), false),
            RuleKind::Terminal(_) => (LookaheadSet::terminal(rule.number()), false),
            RuleKind::NonTerminal(_) => (LookaheadSet::empty(), false),
        })
        .collect();
    loop {
        let mut changed = false;
        for rule in rules.rules() {
            let Some(rhs) = rule.rhs() else {
                continue;
            };
            let mut set = LookaheadSet::empty();
            let mut nullable = false;
            for rp in RulePosition::first_positions(rule.number(), rhs) {
                let mut option_first = first_from(&r, rhs, vec![rp]);
                nullable |= option_first.up;
                option_first.up = false;
                set.union_with(&option_first);
            }
            let entry = &mut r[rule.number().0];
            if entry.0.union_with(&set) {
                changed = true;
            }
            if nullable && !entry.1 {
                entry.1 = true;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    r
}

fn reachable_from(rules: &RuleSet, goal: RuleId) -> BTreeSet<RuleId> {
    let mut seen = BTreeSet::from([goal]);
    let mut todo = vec![goal];
    while let Some(r) = todo.pop() {
        if let Some(rhs) = rules.rule(r).rhs() {
            for item in rhs.items() {
                if seen.insert(item) {
                    todo.push(item);
                }
            }
        }
    }
    seen
}

/// Every reachable rule must be able to derive some finite string of terminals.
fn check_productive(rules: &RuleSet, reachable: &BTreeSet<RuleId>) -> Result<(), BuildError> {
    let mut productive: Vec<bool> = rules.rules().iter().map(|r| r.is_terminal()).collect();
    loop {
        let mut changed = false;
        for rule in rules.rules() {
            let ix = rule.number().0;
            if productive[ix] {
                continue;
            }
            let Some(rhs) = rule.rhs() else {
                continue;
            };
            let p = |r: &RuleId| productive[r.0];
            let now = match rhs {
                Rhs::Empty { .. } => true,
                Rhs::Concatenation { items } => items.iter().all(p),
                Rhs::Choice { items, .. } => items.iter().any(p),
                Rhs::List { kind, item, range, .. } => {
                    range.min == 0
                        || (p(item)
                            && match kind {
                                ListKind::Separated { separator } => range.min < 2 || p(separator),
                                ListKind::Multi => true,
                            })
                }
            };
            if now {
                productive[ix] = true;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    match reachable.iter().find(|r| !productive[r.0]) {
        Some(&r) => Err(BuildError::NonTerminating {
            rule: rules.rule(r).tag().to_string(),
        }),
        None => Ok(()),
    }
}
