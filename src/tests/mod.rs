use super::*;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

macro_rules! map {
    ($($l: expr => $r: expr),*) => ({
        let mut r = BTreeMap::new();
        $(r.insert($l, $r);)*
        r
    });
}

macro_rules! coll {
    ($($x: expr),*) => (vec!($($x),*).into_iter().collect());
    () => (None.into_iter().collect());
}

mod parser;
mod rules;

fn rules(declare: impl FnOnce(&mut RuleSetBuilder)) -> Arc<RuleSet> {
    let mut b = RuleSetBuilder::new();
    declare(&mut b);
    Arc::new(b.build().unwrap())
}

fn automaton(goal: &str, declare: impl FnOnce(&mut RuleSetBuilder)) -> Arc<Automaton> {
    build(rules(declare), goal).unwrap()
}

/// `expr = v | add | mul` with priority over length, so `+` binds looser than `*`. The shorter,
/// higher priority left operand wins, so both operators group to the right.
fn expr_grammar() -> Arc<Automaton> {
    expr_grammar_with(ChoiceKind::PriorityLongest)
}

fn expr_grammar_with(kind: ChoiceKind) -> Arc<Automaton> {
    automaton("expr", |b| {
        b.choice("expr", kind, [Item::rule("v"), Item::rule("add"), Item::rule("mul")]);
        b.concatenation("add", [Item::rule("expr"), Item::literal("+"), Item::rule("expr")]);
        b.concatenation("mul", [Item::rule("expr"), Item::literal("*"), Item::rule("expr")]);
        b.pattern("v", "[a-z]");
    })
}

/// `a = 'x'{2..5}`
fn bounded_list() -> Arc<Automaton> {
    automaton("a", |b| {
        b.multi("a", 2, Some(5), Item::literal("x"));
    })
}

/// `list = [n / ',']*`
fn number_list() -> Arc<Automaton> {
    automaton("list", |b| {
        b.separated_list("list", 0, None, Item::rule("n"), Item::literal(","));
        b.pattern("n", "[0-9]+");
    })
}

/// `s = a | b` where both derive the same text.
fn same_text_choice(kind: ChoiceKind) -> Arc<Automaton> {
    automaton("s", |b| {
        b.choice("s", kind, [Item::rule("a"), Item::rule("b")]);
        b.concatenation("a", [Item::literal("x")]);
        b.concatenation("b", [Item::literal("x")]);
    })
}

/// Any rule, named or anonymous, by tag.
fn id(rule_set: &RuleSet, tag: &str) -> RuleId {
    rule_set
        .rules()
        .iter()
        .find(|r| r.tag() == tag)
        .map(RuntimeRule::number)
        .unwrap_or_else(|| panic!("no rule '{}'", tag))
}

fn preferred(automaton: &Automaton, input: &str) -> String {
    let result = automaton.parse(input);
    match result.sppt {
        Some(tree) => tree.to_string_preferred(),
        None => panic!("'{}' was rejected: {:?}", input, result.issues),
    }
}

/// The offset and expected set of a rejected input.
fn failure(automaton: &Automaton, input: &str) -> (usize, BTreeSet<String>) {
    let result = automaton.parse(input);
    assert!(result.sppt.is_none(), "'{}' was accepted", input);
    assert_eq!(result.issues.len(), 1);
    let issue = &result.issues[0];
    assert_eq!(issue.kind, IssueKind::Error);
    assert_eq!(issue.phase, Phase::Parse);
    (issue.location.position, issue.expected.clone())
}

#[derive(Default)]
struct Recording {
    no_guards: bool,
    report: bool,
    resolved: RefCell<Vec<ResolvedAmbiguity>>,
}

impl Config for Recording {
    fn lookahead_guards(&self) -> bool {
        !self.no_guards
    }

    fn report_ambiguities(&self) -> bool {
        self.report
    }

    fn on_resolved_ambiguity(&self, resolved: &ResolvedAmbiguity) {
        self.resolved.borrow_mut().push(resolved.clone());
    }
}
