use super::*;
use crate::position::{END, LIST_ITEM, LIST_SEPARATOR, START};
use miette::Diagnostic;

fn build_error(declare: impl FnOnce(&mut RuleSetBuilder)) -> BuildError {
    let mut b = RuleSetBuilder::new();
    declare(&mut b);
    b.build().err().expect("the rule set should have been rejected")
}

#[test]
fn test_duplicate_rule() {
    let err = build_error(|b| {
        b.literal("a", "x");
        b.literal("a", "y");
    });
    assert_eq!(err, BuildError::DuplicateRule("a".to_string()));
    assert_eq!(err.to_string(), "rule 'a' is defined more than once");
    assert_eq!(err.code().unwrap().to_string(), "lcglr::build::duplicate_rule");
}

#[test]
fn test_unknown_rule() {
    let err = build_error(|b| {
        b.concatenation("s", [Item::literal("a"), Item::rule("missing")]);
    });
    assert_eq!(
        err,
        BuildError::UnknownRule {
            rule: "s".to_string(),
            reference: "missing".to_string()
        }
    );
}

#[test]
fn test_empty_right_hand_sides() {
    let err = build_error(|b| {
        b.concatenation("s", Vec::new());
    });
    assert_eq!(err, BuildError::EmptyRhs("s".to_string()));
    let err = build_error(|b| {
        b.choice("c", ChoiceKind::LongestPriority, Vec::new());
    });
    assert_eq!(err, BuildError::EmptyRhs("c".to_string()));
}

#[test]
fn test_empty_literals() {
    let err = build_error(|b| {
        b.concatenation("s", [Item::literal("")]);
    });
    assert_eq!(err, BuildError::EmptyLiteral("s".to_string()));
    let err = build_error(|b| {
        b.literal("nothing", "");
    });
    assert_eq!(err, BuildError::EmptyLiteral("nothing".to_string()));
}

#[test]
fn test_invalid_pattern() {
    let err = build_error(|b| {
        b.pattern("p", "(");
    });
    assert!(matches!(err, BuildError::InvalidPattern { ref rule, .. } if rule == "p"), "{:?}", err);
}

#[test]
fn test_invalid_multiplicity() {
    let err = build_error(|b| {
        b.multi("l", 3, Some(2), Item::literal("x"));
    });
    assert_eq!(
        err,
        BuildError::InvalidMultiplicity {
            rule: "l".to_string(),
            min: 3,
            max: 2
        }
    );
    let err = build_error(|b| {
        b.separated_list("l", 0, Some(0), Item::literal("x"), Item::literal(","));
    });
    assert!(matches!(err, BuildError::InvalidMultiplicity { max: 0, .. }));
}

#[test]
fn test_goal_rule_not_found() {
    let rule_set = rules(|b| {
        b.literal("a", "a");
    });
    let err = build(rule_set, "nope").err();
    assert_eq!(err, Some(BuildError::GoalRuleNotFound("nope".to_string())));
}

#[test]
fn test_non_terminating_rules() {
    let rule_set = rules(|b| {
        b.concatenation("s", [Item::rule("s"), Item::literal("x")]);
    });
    assert_eq!(
        build(rule_set, "s").err(),
        Some(BuildError::NonTerminating { rule: "s".to_string() })
    );

    let rule_set = rules(|b| {
        b.concatenation("a", [Item::rule("b")]);
        b.concatenation("b", [Item::rule("a")]);
    });
    assert_eq!(
        build(rule_set, "b").err(),
        Some(BuildError::NonTerminating { rule: "a".to_string() })
    );
}

#[test]
fn test_unreachable_rules_are_not_checked() {
    let rule_set = rules(|b| {
        b.concatenation("s", [Item::literal("x")]);
        b.concatenation("junk", [Item::rule("junk")]);
    });
    assert!(build(rule_set, "s").is_ok());
}

#[test]
fn test_literals_are_interned() {
    let rule_set = rules(|b| {
        b.concatenation("s", [Item::literal("+"), Item::rule("plus"), Item::literal("+")]);
        b.concatenation("t", [Item::pattern("[0-9]+"), Item::pattern("[0-9]+")]);
        b.literal("plus", "+");
    });
    let plus = rule_set.find("plus").unwrap();
    let s = rule_set.rule(rule_set.find("s").unwrap());
    assert_eq!(s.rhs().unwrap().items(), vec![plus, plus, plus]);
    let t = rule_set.rule(rule_set.find("t").unwrap());
    let items = t.rhs().unwrap().items();
    assert_eq!(items[0], items[1]);
    assert_eq!(rule_set.rule(items[0]).tag(), "\"[0-9]+\"");
    assert!(rule_set.rule(items[0]).is_pattern());
}

#[test]
fn test_skip_literals_are_not_interned() {
    let rule_set = rules(|b| {
        b.concatenation("s", [Item::literal(";")]);
        b.skip_literal("SEMI", ";");
    });
    let s = rule_set.rule(rule_set.find("s").unwrap());
    let item = s.rhs().unwrap().items()[0];
    assert_ne!(Some(item), rule_set.find("SEMI"));
    assert_eq!(rule_set.skip_rules(), &[rule_set.find("SEMI").unwrap()][..]);
    assert!(rule_set.rule(rule_set.find("SEMI").unwrap()).is_skip());
}

#[test]
fn test_empty_markers() {
    let rule_set = rules(|b| {
        b.empty("e");
        b.multi("l", 0, None, Item::literal("x"));
        b.multi("m", 1, None, Item::literal("x"));
    });
    let e = rule_set.find("e").unwrap();
    let Some(Rhs::Empty { marker }) = rule_set.rule(e).rhs() else {
        panic!("'e' should be an empty rule");
    };
    assert_eq!(rule_set.rule(*marker).tag(), EMPTY_TAG);
    assert!(matches!(rule_set.rule(*marker).terminal(), Some(TerminalKind::Empty { owner }) if *owner == e));

    let l = rule_set.rule(rule_set.find("l").unwrap()).rhs().unwrap();
    assert!(matches!(l, Rhs::List { empty: Some(_), .. }));
    assert_eq!(l.option_count(), 2);
    let m = rule_set.rule(rule_set.find("m").unwrap()).rhs().unwrap();
    assert!(matches!(m, Rhs::List { empty: None, .. }));
    assert_eq!(m.option_count(), 1);
}

#[test]
fn test_rule_sets_have_distinct_ids() {
    let a = rules(|b| {
        b.literal("a", "a");
    });
    let b = rules(|b| {
        b.literal("a", "a");
    });
    assert_ne!(a.id(), b.id());
    assert!(a.rules().iter().all(|r| r.rule_set_id() == a.id()));
}

#[test]
fn test_multiplicity() {
    let range = Multiplicity { min: 2, max: Some(5) };
    assert!(!range.accepts(1));
    assert!(range.accepts(2));
    assert!(range.accepts(5));
    assert!(!range.accepts(6));
    assert!(range.has_room(4));
    assert!(!range.has_room(5));
    assert_eq!(range.to_string(), "{2..5}");

    let unbounded = Multiplicity { min: 0, max: None };
    assert!(unbounded.accepts(0));
    assert!(unbounded.has_room(1000));
    assert_eq!(unbounded.to_string(), "{0..}");
}

#[test]
fn test_list_positions() {
    let rule_set = rules(|b| {
        b.multi("multi", 2, Some(5), Item::literal("x"));
        b.separated_list("sep", 1, None, Item::literal("x"), Item::literal(","));
        b.optional("opt", Item::literal("x"));
    });
    let at = |tag: &str, position| RulePosition::new(rule_set.find(tag).unwrap(), 0, position);
    let rhs = |tag: &str| rule_set.rule(rule_set.find(tag).unwrap()).rhs().unwrap();
    let x = id(&rule_set, "'x'");
    let comma = id(&rule_set, "','");

    assert_eq!(at("multi", START).item(rhs("multi")), Some(x));
    assert_eq!(
        at("multi", START).next(rhs("multi")),
        vec![at("multi", LIST_ITEM), at("multi", END)]
    );
    assert!(at("multi", LIST_ITEM).counts_as_list_item(rhs("multi")));

    assert_eq!(at("sep", LIST_ITEM).item(rhs("sep")), Some(comma));
    assert_eq!(at("sep", LIST_ITEM).next(rhs("sep")), vec![at("sep", LIST_SEPARATOR)]);
    assert_eq!(at("sep", LIST_SEPARATOR).item(rhs("sep")), Some(x));
    assert!(!at("sep", LIST_ITEM).counts_as_list_item(rhs("sep")));
    assert!(at("sep", LIST_SEPARATOR).counts_as_list_item(rhs("sep")));

    assert_eq!(at("opt", START).next(rhs("opt")), vec![at("opt", END)]);
    assert_eq!(at("opt", END).item(rhs("opt")), None);
    assert!(at("opt", END).next(rhs("opt")).is_empty());
}

#[test]
fn test_lookahead_resolution() {
    let rule_set = rules(|b| {
        b.concatenation("s", [Item::literal("a"), Item::literal("b")]);
    });
    let (a, b) = (id(&rule_set, "'a'"), id(&rule_set, "'b'"));

    let mut set = LookaheadSet::terminal(a);
    set.up = true;
    let resolved = set.resolve(&LookaheadSet::terminal(b));
    assert_eq!(resolved.terminals, coll![a, b]);
    assert!(!resolved.up);
    assert_eq!(LookaheadSet::terminal(a).resolve(&LookaheadSet::end_of_text()), LookaheadSet::terminal(a));

    let mut union = LookaheadSet::empty();
    assert!(union.is_empty());
    assert!(union.union_with(&LookaheadSet::end_of_text()));
    assert!(!union.union_with(&LookaheadSet::end_of_text()));
    assert!(!union.is_unconstrained());
    assert!(LookaheadSet::any().is_unconstrained());

    let mut names_of = LookaheadSet::terminal(b);
    names_of.end_of_text = true;
    assert_eq!(names_of.names(&rule_set), coll!["'b'".to_string(), EOT_TAG.to_string()]);
}
