use clap::Parser;
use lcglr::{ChoiceKind, Item, RuleSet, RuleSetBuilder};
use miette::miette;
use std::sync::Arc;

/// Parse an arithmetic expression with a built-in grammar and print its parse tree.
#[derive(Debug, Parser)]
#[command(name = "lcglr-demo", version)]
struct Args {
    /// The expression to parse, e.g. "a + b * c".
    input: String,

    /// Print every derivation kept, not only the preferred one.
    #[arg(long)]
    all: bool,

    /// Print the terminals that may follow the input up to this byte offset instead of parsing.
    #[arg(long, value_name = "OFFSET")]
    expected: Option<usize>,

    /// Print the automaton states built by the parse in graphviz format.
    #[arg(long)]
    dot: bool,
}

fn grammar() -> miette::Result<RuleSet> {
    let mut b = RuleSetBuilder::new();
    b.choice(
        "expr",
        ChoiceKind::PriorityLongest,
        [Item::rule("var"), Item::rule("group"), Item::rule("add"), Item::rule("mul")],
    );
    b.concatenation("group", [Item::literal("("), Item::rule("expr"), Item::literal(")")]);
    b.concatenation("add", [Item::rule("expr"), Item::literal("+"), Item::rule("expr")]);
    b.concatenation("mul", [Item::rule("expr"), Item::literal("*"), Item::rule("expr")]);
    b.pattern("var", "[a-z]+");
    b.skip_pattern("WS", r"\s+");
    Ok(b.build()?)
}

fn main() -> miette::Result<()> {
    let args = Args::parse();
    let rules = Arc::new(grammar()?);
    let automaton = lcglr::build(rules, "expr")?;

    if let Some(offset) = args.expected {
        if !args.input.is_char_boundary(offset) {
            return Err(miette!("offset {} is not within the input", offset));
        }
        for item in lcglr::expected_terminals_at(&automaton, &args.input, offset) {
            match item.text {
                Some(text) => println!("{:?} {} '{}'", item.kind, item.tag, text),
                None => println!("{:?} {}", item.kind, item.tag),
            }
        }
        return Ok(());
    }

    let result = lcglr::parse(&automaton, &args.input);
    for issue in result.issues.iter() {
        eprintln!("{}", issue);
    }
    if args.dot {
        println!("{}", automaton.to_dot());
    }
    let tree = result.sppt.ok_or_else(|| miette!("input rejected"))?;
    if args.all {
        println!("{}", tree.to_string_all());
    } else {
        println!("{}", tree.to_string_preferred());
    }
    Ok(())
}
