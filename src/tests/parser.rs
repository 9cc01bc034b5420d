use super::*;
use rstest::rstest;

#[rstest]
#[case("", Err(0))]
#[case("x", Err(1))]
#[case("xx", Ok(2))]
#[case("xxx", Ok(3))]
#[case("xxxx", Ok(4))]
#[case("xxxxx", Ok(5))]
#[case("xxxxxx", Err(5))]
fn test_bounded_list(#[case] input: &str, #[case] expected: Result<usize, usize>) {
    let a = bounded_list();
    match expected {
        Ok(items) => {
            let result = a.parse(input);
            let tree = result.sppt.expect("the input should be accepted");
            assert!(result.issues.is_empty());
            assert_eq!(tree.root().tag(), "a");
            assert_eq!(tree.root().children().len(), items);
            assert_eq!(tree.max_num_heads(), 1);
        }
        Err(position) => {
            let (at, expected) = failure(&a, input);
            assert_eq!(at, position);
            let name = if input.len() > 5 { EOT_TAG } else { "'x'" };
            assert_eq!(expected, coll![name.to_string()]);
        }
    }
}

#[test]
fn test_bounded_list_tree() {
    assert_eq!(preferred(&bounded_list(), "xxx"), "a { 'x' 'x' 'x' }");
}

#[test]
fn test_priority_and_associativity() {
    let a = expr_grammar();
    assert_eq!(
        preferred(&a, "a+b*c"),
        "expr|1 { add { expr { v : 'a' } '+' expr|2 { mul { expr { v : 'b' } '*' expr { v : 'c' } } } } }"
    );
    assert_eq!(
        preferred(&a, "a+b+c"),
        "expr|1 { add { expr { v : 'a' } '+' expr|1 { add { expr { v : 'b' } '+' expr { v : 'c' } } } } }"
    );
    assert_eq!(preferred(&a, "a"), "expr { v : 'a' }");
}

#[rstest]
#[case(
    ChoiceKind::PriorityLongest,
    "expr|2 { mul { expr { v : 'a' } '*' expr|2 { mul { expr { v : 'b' } '*' expr { v : 'c' } } } } }"
)]
#[case(
    ChoiceKind::LongestPriority,
    "expr|2 { mul { expr|2 { mul { expr { v : 'a' } '*' expr { v : 'b' } } } '*' expr { v : 'c' } } }"
)]
fn test_associativity_follows_choice_kind(#[case] kind: ChoiceKind, #[case] expected: &str) {
    let a = expr_grammar_with(kind);
    assert_eq!(preferred(&a, "a*b*c"), expected);
    // Both kinds rank `add` above `mul` at the root.
    assert_eq!(a.parse("a+b*c").sppt.unwrap().root().children()[0].tag(), "add");
    assert_eq!(a.parse("a*b+c").sppt.unwrap().root().children()[0].tag(), "add");
}

#[test]
fn test_max_num_heads() {
    let tree = expr_grammar().parse("a+b*c").sppt.unwrap();
    assert_eq!(tree.max_num_heads(), 2);
}

#[test]
fn test_failure() {
    let a = expr_grammar();
    let result = a.parse("a+");
    assert!(!result.is_success());
    let issue = result.errors().next().unwrap();
    assert_eq!(issue.location.position, 2);
    assert_eq!((issue.location.line, issue.location.column), (1, 3));
    assert_eq!(issue.expected, coll!["v".to_string()]);
    assert_eq!(issue.message, "Failed to match {v} at: a+^");
    assert_eq!(result.warnings().count(), 0);

    let (at, expected) = failure(&a, "a+b c");
    assert_eq!(at, 3);
    assert_eq!(expected, coll!["'*'".to_string(), "'+'".to_string(), EOT_TAG.to_string()]);

    let (at, expected) = failure(&a, "");
    assert_eq!(at, 0);
    assert_eq!(expected, coll!["v".to_string()]);
}

#[test]
fn test_failure_after_newlines() {
    let a = automaton("s", |b| {
        b.concatenation("s", [Item::literal("a"), Item::literal("b")]);
        b.skip_pattern("WS", r"\s+");
    });
    let result = a.parse("a\n\nc");
    let issue = &result.issues[0];
    assert_eq!(issue.location.position, 3);
    assert_eq!((issue.location.line, issue.location.column), (3, 1));
    assert_eq!(issue.expected, coll!["'b'".to_string()]);
    assert!(issue.to_string().starts_with("error (Parse) at 3:1: Failed to match {'b'}"));
}

#[test]
fn test_empty_rule() {
    let a = automaton("a", |b| {
        b.empty("a");
    });
    let result = a.parse("");
    assert!(result.issues.is_empty());
    let tree = result.sppt.unwrap();
    assert_eq!(tree.to_string_preferred(), "a { <EMPTY> }");
    assert!(tree.root().children()[0].is_empty_marker());
    assert_eq!((tree.start(), tree.end()), (0, 0));

    let (at, expected) = failure(&a, "x");
    assert_eq!(at, 0);
    assert_eq!(expected, coll![EOT_TAG.to_string()]);
}

#[test]
fn test_optional() {
    let a = automaton("s", |b| {
        b.concatenation("s", [Item::literal("a"), Item::rule("opt"), Item::literal("c")]);
        b.optional("opt", Item::literal("b"));
    });
    assert_eq!(preferred(&a, "ac"), "s { 'a' opt|1 { <EMPTY> } 'c' }");
    assert_eq!(preferred(&a, "abc"), "s { 'a' opt { 'b' } 'c' }");
    let (at, expected) = failure(&a, "abbc");
    assert_eq!(at, 2);
    assert_eq!(expected, coll!["'c'".to_string()]);
}

#[test]
fn test_separated_list() {
    let a = number_list();
    assert_eq!(
        preferred(&a, "1,22,3"),
        "list { n : '1' ',' n : '22' ',' n : '3' }"
    );
    assert_eq!(preferred(&a, "7"), "list { n : '7' }");
    assert_eq!(preferred(&a, ""), "list|1 { <EMPTY> }");

    let (at, expected) = failure(&a, "1,");
    assert_eq!(at, 2);
    assert_eq!(expected, coll!["n".to_string()]);
}

#[test]
fn test_repeated_list() {
    let a = automaton("s", |b| {
        b.multi("s", 1, None, Item::rule("w"));
        b.pattern("w", "[a-z]+");
        b.skip_pattern("WS", " +");
    });
    let tree = a.parse("ab cd  ef").sppt.unwrap();
    let words: Vec<&str> = tree
        .root()
        .non_skip_children()
        .iter()
        .map(|c| c.matched_text().trim_end())
        .collect();
    assert_eq!(words, vec!["ab", "cd", "ef"]);
    assert_eq!(tree.leaf_text(), "ab cd  ef");
    assert_eq!(tree.non_skip_text(), "abcdef");
}

#[test]
fn test_skip_leaves() {
    let a = automaton("s", |b| {
        b.concatenation("s", [Item::literal("a"), Item::literal("b")]);
        b.skip_pattern("WS", r"\s+");
    });
    let tree = a.parse(" a b ").sppt.unwrap();
    assert_eq!(tree.to_string_preferred(), "WS : ' ' s { 'a' WS : ' ' 'b' WS : ' ' }");
    assert_eq!(tree.roots().len(), 2);
    assert!(tree.roots()[0].is_skip());
    assert_eq!(tree.root().tag(), "s");
    assert_eq!((tree.start(), tree.end()), (0, 5));
    assert_eq!(tree.leaf_text(), " a b ");
    assert_eq!(tree.root().non_skip_text(), "ab");
}

#[test]
fn test_unit_cycle() {
    let a = automaton("a", |b| {
        b.choice("a", ChoiceKind::LongestPriority, [Item::rule("b"), Item::literal("x")]);
        b.concatenation("b", [Item::rule("a")]);
    });
    let tree = a.parse("x").sppt.unwrap();
    assert_eq!(tree.to_string_all(), "a|1 { 'x' }");
}

#[test]
fn test_right_recursion() {
    let a = automaton("s", |b| {
        b.choice("s", ChoiceKind::PriorityLongest, [Item::rule("more"), Item::literal("a")]);
        b.concatenation("more", [Item::literal("a"), Item::rule("s")]);
    });
    assert_eq!(
        preferred(&a, "aaa"),
        "s { more { 'a' s { more { 'a' s|1 { 'a' } } } } }"
    );
}

fn bracketed() -> Arc<Automaton> {
    let inner = rules(|b| {
        b.multi("e", 1, None, Item::literal("x"));
    });
    automaton("s", |b| {
        b.concatenation("s", [Item::literal("["), Item::rule("inner"), Item::literal("]")]);
        b.embedded("inner", inner, "e");
    })
}

#[test]
fn test_embedded() {
    let a = bracketed();
    let tree = a.parse("[xx]").sppt.unwrap();
    assert_eq!(tree.to_string_preferred(), "s { '[' inner { e { 'x' 'x' } } ']' }");
    assert_eq!(tree.leaf_text(), "[xx]");

    let embedded = tree.root().children()[1];
    assert!(embedded.is_embedded());
    assert_eq!((embedded.start(), embedded.end()), (1, 3));
    let nested = embedded.embedded_tree().unwrap();
    assert_eq!(nested.root().tag(), "e");
    assert_eq!(nested.root().children().len(), 2);
}

#[test]
fn test_embedded_failure() {
    let a = bracketed();
    let (at, expected) = failure(&a, "[]");
    assert_eq!(at, 1);
    assert_eq!(expected, coll!["'x'".to_string()]);

    // The embedded grammar could have gone on where the outer one failed.
    let (at, expected) = failure(&a, "[xy]");
    assert_eq!(at, 2);
    assert_eq!(expected, coll!["'x'".to_string(), "']'".to_string()]);
}

#[test]
fn test_expected_terminals_at() {
    let a = expr_grammar();
    let items = expected_terminals_at(&a, "a", 1);
    let tags: Vec<(CompletionKind, &str)> = items.iter().map(|i| (i.kind, i.tag.as_str())).collect();
    assert_eq!(
        tags,
        vec![
            (CompletionKind::Literal, "'*'"),
            (CompletionKind::Literal, "'+'"),
            (CompletionKind::EndOfText, EOT_TAG)
        ]
    );
    assert_eq!(items[1].text.as_deref(), Some("+"));

    let items = a.expected_terminals_at("a+b", 2);
    assert_eq!(
        items,
        vec![CompletionItem {
            kind: CompletionKind::Pattern,
            tag: "v".to_string(),
            text: None
        }]
    );
    assert_eq!(a.expected_terminals_at("", 0), items);
    assert!(a.expected_terminals_at("a*+", 3).is_empty());
}

#[test]
fn test_expected_terminals_in_lists() {
    let a = bounded_list();
    let x = |eot: bool| {
        let mut items = vec![CompletionItem {
            kind: CompletionKind::Literal,
            tag: "'x'".to_string(),
            text: Some("x".to_string()),
        }];
        if eot {
            items.push(CompletionItem {
                kind: CompletionKind::EndOfText,
                tag: EOT_TAG.to_string(),
                text: None,
            });
        }
        items
    };
    assert_eq!(a.expected_terminals_at("x", 1), x(false));
    assert_eq!(a.expected_terminals_at("xxx", 3), x(true));
    assert_eq!(a.expected_terminals_at("xxxxx", 5), vec![x(true).pop().unwrap()]);
}

#[test]
fn test_guards_do_not_change_results() {
    let a = expr_grammar();
    let unguarded = Recording {
        no_guards: true,
        ..Recording::default()
    };
    for input in ["a", "a+b*c", "a*b+c*d", "a+b+c+d"] {
        let guarded = a.parse(input).sppt.unwrap();
        let plain = a.parse_with(input, &unguarded).sppt.unwrap();
        assert_eq!(guarded, plain, "{}", input);
        assert_eq!(guarded.to_string_all(), plain.to_string_all());
    }
    let result = a.parse_with("a+", &unguarded);
    assert!(!result.is_success());
    assert_eq!(result.issues[0].expected, coll!["v".to_string()]);
}

#[test]
fn test_concurrent_parses() {
    fn assert_shareable<T: Send + Sync>() {}
    assert_shareable::<Automaton>();
    assert_shareable::<SharedPackedParseTree>();

    let a = expr_grammar();
    let inputs = ["a+b*c", "a*b+c", "a+b+c*d", "a", "a+", "a*b*c*d"];
    let expected: Vec<Option<String>> = inputs
        .iter()
        .map(|i| expr_grammar().parse(i).sppt.map(|t| t.to_string_preferred()))
        .collect();
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let a = a.clone();
                scope.spawn(move || {
                    inputs
                        .iter()
                        .map(|i| a.parse(i).sppt.map(|t| t.to_string_preferred()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}

#[test]
fn test_concurrent_parses_on_cold_automatons() {
    let inputs: Vec<String> = (0..24)
        .map(|n| {
            let mut input = String::from("a");
            for i in 0..(n % 7) {
                input.push(if (n + i) % 3 == 0 { '*' } else { '+' });
                input.push((b'a' + ((n + i) % 26) as u8) as char);
            }
            input
        })
        .collect();
    let reference = expr_grammar();
    let expected: Vec<String> = inputs
        .iter()
        .map(|i| reference.parse(i).sppt.unwrap().to_string_preferred())
        .collect();

    for _ in 0..25 {
        let a = expr_grammar();
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|t| {
                    let (a, inputs) = (&a, &inputs);
                    scope.spawn(move || {
                        (0..inputs.len())
                            .map(|k| (k + t * 3) % inputs.len())
                            .map(|k| (k, a.parse(&inputs[k]).sppt.unwrap().to_string_preferred()))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            for handle in handles {
                for (k, tree) in handle.join().unwrap() {
                    assert_eq!(tree, expected[k], "{}", inputs[k]);
                }
            }
        });
        assert_eq!(a.state_count(), reference.state_count());
    }
}

#[test]
fn test_lib_entry_points() {
    let a = expr_grammar();
    let result = parse(&a, "a*b");
    assert!(result.is_success());
    assert_eq!(result.sppt.unwrap().root().children()[0].tag(), "mul");
}
