//! The shared packed parse tree.
//!
//! A finished parse is turned into a tree in four steps. The complete nodes reachable from the
//! accepted root are materialised, expanding every growing node into its child sequences. Then
//! cycles through unit derivations are cut, the choice policy selects the surviving alternatives
//! of every node, and finally the nodes still reachable are copied into a compact arena.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::{self, Display};
use std::rc::Rc;
use std::sync::Arc;

use crate::builder::EMPTY_TAG;
use crate::config::{Config, ResolvedAmbiguity};
use crate::gss::{Child, GrowingId, Gss};
use crate::issue::{IssueKind, LanguageIssue, LineIndex, Phase};
use crate::rule::{ChoiceKind, RuleId, RuleSet, TerminalKind};

/// The index of a node within its tree.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId(usize);

impl NodeId {
    /// The index of the node.
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Alternative {
    option: usize,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
enum NodeData {
    Leaf {
        rule: RuleId,
        start: usize,
        end: usize,
        is_skip: bool,
        is_empty: bool,
    },
    Branch {
        rule: RuleId,
        start: usize,
        end: usize,
        alternatives: Vec<Alternative>,
    },
    Embedded {
        rule: RuleId,
        tree: Arc<SharedPackedParseTree>,
    },
}

impl NodeData {
    fn rule(&self) -> RuleId {
        match self {
            NodeData::Leaf { rule, .. } | NodeData::Branch { rule, .. } | NodeData::Embedded { rule, .. } => *rule,
        }
    }

    fn span(&self) -> (usize, usize) {
        match self {
            NodeData::Leaf { start, end, .. } | NodeData::Branch { start, end, .. } => (*start, *end),
            NodeData::Embedded { tree, .. } => (tree.start(), tree.end()),
        }
    }

    fn is_skip(&self) -> bool {
        matches!(self, NodeData::Leaf { is_skip: true, .. })
    }

    fn alternatives(&self) -> &[Alternative] {
        match self {
            NodeData::Branch { alternatives, .. } => alternatives,
            _ => &[],
        }
    }
}

/// The result of a successful parse: every accepted derivation of the input, sharing common
/// sub-derivations, with a preferred derivation chosen at every node.
#[derive(Debug, Clone)]
pub struct SharedPackedParseTree {
    rule_set: Arc<RuleSet>,
    text: Arc<str>,
    nodes: Vec<NodeData>,
    roots: Vec<NodeId>,
    max_num_heads: usize,
}

impl SharedPackedParseTree {
    /// The rule set the tree was parsed with.
    pub fn rule_set(&self) -> &Arc<RuleSet> {
        &self.rule_set
    }

    /// The whole input the tree was parsed from.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Where the tree starts.
    pub fn start(&self) -> usize {
        self.roots.first().map_or(0, |&r| self.nodes[r.0].span().0)
    }

    /// Where the tree ends, trailing skip included.
    pub fn end(&self) -> usize {
        self.roots.last().map_or(0, |&r| self.nodes[r.0].span().1)
    }

    /// The node of the goal rule.
    pub fn root(&self) -> SpptNode<'_> {
        let id = self
            .roots
            .iter()
            .copied()
            .find(|&r| !self.nodes[r.0].is_skip())
            .unwrap_or(self.roots[0]);
        self.node(id)
    }

    /// The top-level nodes: leading skip leaves, then the goal (or, for a terminal goal, the
    /// goal leaf and its trailing skip).
    pub fn roots(&self) -> Vec<SpptNode<'_>> {
        self.roots.iter().map(|&id| self.node(id)).collect()
    }

    /// The node with the given id.
    pub fn node(&self, id: NodeId) -> SpptNode<'_> {
        SpptNode { tree: self, id }
    }

    /// The number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The largest number of heads the parser processed at one offset.
    pub fn max_num_heads(&self) -> usize {
        self.max_num_heads
    }

    /// Whether some node kept more than one derivation.
    pub fn is_ambiguous(&self) -> bool {
        self.nodes.iter().any(|n| n.alternatives().len() > 1)
    }

    /// The text of the leaves of the preferred derivation, skip leaves included. For a tree of a
    /// whole input this is the input.
    pub fn leaf_text(&self) -> String {
        let mut out = String::new();
        for &root in self.roots.iter() {
            self.push_leaf_text(root, true, &mut out);
        }
        out
    }

    /// The text of the non-skip leaves of the preferred derivation.
    pub fn non_skip_text(&self) -> String {
        let mut out = String::new();
        for &root in self.roots.iter() {
            self.push_leaf_text(root, false, &mut out);
        }
        out
    }

    fn push_leaf_text(&self, id: NodeId, with_skip: bool, out: &mut String) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            match &self.nodes[id.0] {
                NodeData::Leaf { start, end, is_skip, .. } => {
                    if with_skip || !is_skip {
                        out.push_str(&self.text[*start..*end]);
                    }
                }
                NodeData::Branch { alternatives, .. } => {
                    stack.extend(alternatives[0].children.iter().rev());
                }
                NodeData::Embedded { tree, .. } => {
                    for &root in tree.roots.iter() {
                        tree.push_leaf_text(root, with_skip, out);
                    }
                }
            }
        }
    }

    /// A dump of the tree with every alternative.
    pub fn to_string_all(&self) -> String {
        self.dump(true)
    }

    /// A dump of the preferred derivation.
    pub fn to_string_preferred(&self) -> String {
        self.dump(false)
    }

    fn dump(&self, all: bool) -> String {
        let mut out = String::new();
        for (i, &root) in self.roots.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            self.write_node(root, all, &mut out);
        }
        out
    }

    fn write_node(&self, id: NodeId, all: bool, out: &mut String) {
        match &self.nodes[id.0] {
            NodeData::Leaf {
                rule,
                start,
                end,
                is_empty,
                ..
            } => {
                let r = self.rule_set.rule(*rule);
                let text = &self.text[*start..*end];
                if *is_empty {
                    out.push_str(EMPTY_TAG);
                } else if matches!(r.terminal(), Some(TerminalKind::Literal(v)) if r.tag() == format!("'{}'", v)) {
                    out.push_str(r.tag());
                } else {
                    out.push_str(r.tag());
                    out.push_str(" : '");
                    out.push_str(&escape(text));
                    out.push('\'');
                }
            }
            NodeData::Branch { rule, alternatives, .. } => {
                let shown = if all { &alternatives[..] } else { &alternatives[..1] };
                if shown.len() > 1 {
                    out.push_str("⟪ ");
                }
                for (i, alternative) in shown.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" ▶ ");
                    }
                    out.push_str(self.rule_set.rule(*rule).tag());
                    if alternative.option > 0 {
                        out.push_str(&format!("|{}", alternative.option));
                    }
                    out.push_str(" {");
                    for &child in alternative.children.iter() {
                        out.push(' ');
                        self.write_node(child, all, out);
                    }
                    out.push_str(" }");
                }
                if shown.len() > 1 {
                    out.push_str(" ⟫");
                }
            }
            NodeData::Embedded { rule, tree } => {
                out.push_str(self.rule_set.rule(*rule).tag());
                out.push_str(" { ");
                out.push_str(&tree.dump(all));
                out.push_str(" }");
            }
        }
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

impl Display for SharedPackedParseTree {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        f.write_str(&self.to_string_all())
    }
}

/// Trees are equal when their nodes have the same rules, spans and alternatives.
impl PartialEq for SharedPackedParseTree {
    fn eq(&self, other: &Self) -> bool {
        if self.rule_set.id() != other.rule_set.id() || self.roots.len() != other.roots.len() {
            return false;
        }
        let mut stack: Vec<(NodeId, NodeId)> = self.roots.iter().copied().zip(other.roots.iter().copied()).collect();
        let mut seen = BTreeSet::new();
        while let Some((a, b)) = stack.pop() {
            if !seen.insert((a, b)) {
                continue;
            }
            let (x, y) = (&self.nodes[a.0], &other.nodes[b.0]);
            if x.rule() != y.rule() || x.span() != y.span() {
                return false;
            }
            match (x, y) {
                (NodeData::Leaf { is_skip: s1, is_empty: e1, .. }, NodeData::Leaf { is_skip: s2, is_empty: e2, .. }) => {
                    let (start, end) = x.span();
                    if s1 != s2 || e1 != e2 || self.text[start..end] != other.text[start..end] {
                        return false;
                    }
                }
                (NodeData::Branch { alternatives: xs, .. }, NodeData::Branch { alternatives: ys, .. }) => {
                    if xs.len() != ys.len() {
                        return false;
                    }
                    for (p, q) in xs.iter().zip(ys.iter()) {
                        if p.option != q.option || p.children.len() != q.children.len() {
                            return false;
                        }
                        stack.extend(p.children.iter().copied().zip(q.children.iter().copied()));
                    }
                }
                (NodeData::Embedded { tree: t1, .. }, NodeData::Embedded { tree: t2, .. }) => {
                    if t1 != t2 {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        true
    }
}

impl Eq for SharedPackedParseTree {}

/// A node of a [`SharedPackedParseTree`].
#[derive(Copy, Clone)]
pub struct SpptNode<'t> {
    tree: &'t SharedPackedParseTree,
    id: NodeId,
}

impl<'t> SpptNode<'t> {
    fn data(&self) -> &'t NodeData {
        &self.tree.nodes[self.id.0]
    }

    /// The node's id within its tree.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The node's rule.
    pub fn rule(&self) -> RuleId {
        self.data().rule()
    }

    /// The tag of the node's rule.
    pub fn tag(&self) -> &'t str {
        self.tree.rule_set.rule(self.rule()).tag()
    }

    /// Start offset.
    pub fn start(&self) -> usize {
        self.data().span().0
    }

    /// End offset. For branches this includes trailing skip.
    pub fn end(&self) -> usize {
        self.data().span().1
    }

    /// The input covered by the node.
    pub fn matched_text(&self) -> &'t str {
        &self.tree.text[self.start()..self.end()]
    }

    /// The text of the non-skip leaves under the node, following preferred derivations.
    pub fn non_skip_text(&self) -> String {
        let mut out = String::new();
        self.tree.push_leaf_text(self.id, false, &mut out);
        out
    }

    /// Whether the node is a leaf.
    pub fn is_leaf(&self) -> bool {
        matches!(self.data(), NodeData::Leaf { .. })
    }

    /// Whether the node is a skip leaf.
    pub fn is_skip(&self) -> bool {
        self.data().is_skip()
    }

    /// Whether the node is an empty marker.
    pub fn is_empty_marker(&self) -> bool {
        matches!(self.data(), NodeData::Leaf { is_empty: true, .. })
    }

    /// Whether the node is the tree of an embedded grammar.
    pub fn is_embedded(&self) -> bool {
        matches!(self.data(), NodeData::Embedded { .. })
    }

    /// The embedded tree, for embedded nodes.
    pub fn embedded_tree(&self) -> Option<&'t SharedPackedParseTree> {
        match self.data() {
            NodeData::Embedded { tree, .. } => Some(tree),
            _ => None,
        }
    }

    /// The option of the preferred derivation; 0 for leaves.
    pub fn option(&self) -> usize {
        self.data().alternatives().first().map_or(0, |a| a.option)
    }

    /// The number of derivations kept.
    pub fn alternative_count(&self) -> usize {
        self.data().alternatives().len()
    }

    /// Whether more than one derivation was kept.
    pub fn is_ambiguous(&self) -> bool {
        self.alternative_count() > 1
    }

    /// The children of the preferred derivation.
    pub fn children(&self) -> Vec<SpptNode<'t>> {
        self.data()
            .alternatives()
            .first()
            .map(|a| self.nodes(&a.children))
            .unwrap_or_default()
    }

    /// The children of the preferred derivation, without skip leaves.
    pub fn non_skip_children(&self) -> Vec<SpptNode<'t>> {
        self.children().into_iter().filter(|c| !c.is_skip()).collect()
    }

    /// Every derivation kept, as (option, children) pairs.
    pub fn alternatives(&self) -> Vec<(usize, Vec<SpptNode<'t>>)> {
        self.data()
            .alternatives()
            .iter()
            .map(|a| (a.option, self.nodes(&a.children)))
            .collect()
    }

    fn nodes(&self, ids: &[NodeId]) -> Vec<SpptNode<'t>> {
        ids.iter().map(|&id| self.tree.node(id)).collect()
    }
}

impl fmt::Debug for SpptNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "{}[{}..{}]", self.tag(), self.start(), self.end())
    }
}

/// A piece of the child sequence of a growing node, linked to the pieces on its left.
struct Chain {
    children: Vec<Child>,
    prev: Option<Rc<Chain>>,
}

impl Chain {
    fn flatten(&self) -> Vec<Child> {
        let mut segments = vec![&self.children];
        let mut at = self.prev.as_deref();
        while let Some(chain) = at {
            segments.push(&chain.children);
            at = chain.prev.as_deref();
        }
        segments.into_iter().rev().flatten().copied().collect()
    }
}

/// A node under construction. `created` orders branch nodes by when the parser created them.
struct Draft {
    data: NodeData,
    created: usize,
}

struct Materialiser<'g> {
    gss: &'g Gss,
    drafts: Vec<Draft>,
    by_child: BTreeMap<Child, NodeId>,
    sequences: BTreeMap<GrowingId, Rc<Vec<Rc<Chain>>>>,
    todo: VecDeque<(usize, NodeId)>,
}

impl<'g> Materialiser<'g> {
    fn node(&mut self, child: Child) -> NodeId {
        if let Some(&id) = self.by_child.get(&child) {
            return id;
        }
        let gss = self.gss;
        let id = NodeId(self.drafts.len());
        let (data, created) = match child {
            Child::Leaf(leaf) => {
                let l = &gss.leaves[leaf.0];
                let data = NodeData::Leaf {
                    rule: l.rule,
                    start: l.start,
                    end: l.end,
                    is_skip: l.is_skip,
                    is_empty: l.is_empty,
                };
                (data, 0)
            }
            Child::Embedded(ix) => {
                let (rule, tree) = &gss.embedded[ix];
                let data = NodeData::Embedded {
                    rule: *rule,
                    tree: tree.clone(),
                };
                (data, 0)
            }
            Child::Complete(complete) => {
                let c = &gss.completes[complete.0];
                self.todo.push_back((complete.0, id));
                let data = NodeData::Branch {
                    rule: c.rule,
                    start: c.start,
                    end: c.end,
                    alternatives: vec![],
                };
                (data, complete.0)
            }
        };
        self.drafts.push(Draft { data, created });
        self.by_child.insert(child, id);
        id
    }

    /// Every child sequence of a growing node.
    fn sequences(&mut self, node: GrowingId) -> Rc<Vec<Rc<Chain>>> {
        let gss = self.gss;
        let mut stack = vec![node];
        let mut in_progress = BTreeSet::new();
        while let Some(&top) = stack.last() {
            if self.sequences.contains_key(&top) {
                stack.pop();
                continue;
            }
            let derivations = &gss.growing[top.0].derivations;
            let pending: Vec<GrowingId> = derivations
                .iter()
                .filter_map(|d| d.left)
                .filter(|left| !self.sequences.contains_key(left))
                .collect();
            if pending.is_empty() {
                let mut chains = vec![];
                for d in derivations.iter() {
                    match d.left {
                        None => chains.push(Rc::new(Chain {
                            children: d.children.clone(),
                            prev: None,
                        })),
                        Some(left) => {
                            for prev in self.sequences[&left].iter() {
                                chains.push(Rc::new(Chain {
                                    children: d.children.clone(),
                                    prev: Some(prev.clone()),
                                }));
                            }
                        }
                    }
                }
                self.sequences.insert(top, Rc::new(chains));
                in_progress.remove(&top);
                stack.pop();
            } else {
                in_progress.insert(top);
                for left in pending {
                    assert!(
                        !in_progress.contains(&left),
                        "cyclic derivation through growing node {:?}",
                        left
                    );
                    stack.push(left);
                }
            }
        }
        self.sequences[&node].clone()
    }

    fn run(&mut self, roots: &[Child]) -> Vec<NodeId> {
        let gss = self.gss;
        let roots: Vec<NodeId> = roots.iter().map(|&c| self.node(c)).collect();
        while let Some((complete, id)) = self.todo.pop_front() {
            let mut alternatives: Vec<Alternative> = vec![];
            for &(option, growing) in gss.completes[complete].alternatives.iter() {
                for chain in self.sequences(growing).iter() {
                    let children = chain.flatten().into_iter().map(|c| self.node(c)).collect();
                    let alternative = Alternative { option, children };
                    if !alternatives.contains(&alternative) {
                        alternatives.push(alternative);
                    }
                }
            }
            if let NodeData::Branch { alternatives: slot, .. } = &mut self.drafts[id.0].data {
                *slot = alternatives;
            }
        }
        roots
    }
}

/// Drop every alternative that closes a cycle of same-span nodes. An alternative is dropped when
/// it has a same-span child created no earlier than its node, from which the node can be reached
/// again over same-span edges. The alternative a node was created with never has such a child,
/// so every node keeps at least one alternative.
fn remove_cycles(drafts: &mut [Draft]) {
    let same_span_children = |drafts: &[Draft], id: NodeId| -> Vec<NodeId> {
        let span = drafts[id.0].data.span();
        drafts[id.0]
            .data
            .alternatives()
            .iter()
            .flat_map(|a| a.children.iter().copied())
            .filter(|c| matches!(drafts[c.0].data, NodeData::Branch { .. }) && drafts[c.0].data.span() == span)
            .collect()
    };
    let reaches = |drafts: &[Draft], from: NodeId, to: NodeId| -> bool {
        let mut seen = BTreeSet::from([from]);
        let mut todo = vec![from];
        while let Some(n) = todo.pop() {
            if n == to {
                return true;
            }
            for c in same_span_children(drafts, n) {
                if seen.insert(c) {
                    todo.push(c);
                }
            }
        }
        false
    };

    let mut drops: Vec<(NodeId, usize)> = vec![];
    for ix in 0..drafts.len() {
        let id = NodeId(ix);
        let span = drafts[ix].data.span();
        for (a, alternative) in drafts[ix].data.alternatives().iter().enumerate() {
            let closes_cycle = alternative.children.iter().any(|&c| {
                matches!(drafts[c.0].data, NodeData::Branch { .. })
                    && drafts[c.0].data.span() == span
                    && drafts[c.0].created >= drafts[ix].created
                    && reaches(drafts, c, id)
            });
            if closes_cycle {
                drops.push((id, a));
            }
        }
    }
    for (id, a) in drops.into_iter().rev() {
        if let NodeData::Branch { alternatives, .. } = &mut drafts[id.0].data {
            alternatives.remove(a);
        }
    }
}

/// The option a node is derived with once its own policy has run. At a choice node every
/// alternative covers the same text, so this is the lowest option left after cycle removal.
fn preferred_option(data: &NodeData) -> usize {
    data.alternatives().iter().map(|a| a.option).min().unwrap_or(0)
}

/// Order two child sequences of one node by their first pair of non-skip children ending at
/// different offsets. The later end wins, unless both children derive one prioritised choice
/// rule from the same start: then that choice's own policy decides between them.
fn compare_children(a: &Alternative, b: &Alternative, drafts: &[Draft], rule_set: &RuleSet) -> Ordering {
    let non_skip = |alt: &Alternative| -> Vec<NodeId> {
        alt.children
            .iter()
            .copied()
            .filter(|c| !drafts[c.0].data.is_skip())
            .collect()
    };
    let first_difference = non_skip(a)
        .into_iter()
        .zip(non_skip(b))
        .map(|(x, y)| (&drafts[x.0].data, &drafts[y.0].data))
        .find(|(x, y)| x.span().1 != y.span().1);
    let (x, y) = match first_difference {
        Some(pair) => pair,
        None => return Ordering::Equal,
    };
    let longer = y.span().1.cmp(&x.span().1);
    let by_priority = || preferred_option(x).cmp(&preferred_option(y));
    if x.rule() != y.rule() || x.span().0 != y.span().0 {
        return longer;
    }
    match rule_set.rule(x.rule()).rhs().and_then(|rhs| rhs.choice_kind()) {
        Some(ChoiceKind::PriorityLongest) => by_priority().then(longer),
        Some(ChoiceKind::LongestPriority) => longer.then_with(by_priority),
        _ => longer,
    }
}

/// Order two alternatives of one node; `Less` means `a` is preferred.
fn compare(kind: Option<ChoiceKind>, a: &Alternative, b: &Alternative, drafts: &[Draft], rule_set: &RuleSet) -> Ordering {
    let priority = |alt: &Alternative| match kind {
        Some(ChoiceKind::LongestPriority | ChoiceKind::PriorityLongest) => alt.option,
        _ => 0,
    };
    let longest = || compare_children(a, b, drafts, rule_set);
    match kind {
        Some(ChoiceKind::PriorityLongest) => priority(a).cmp(&priority(b)).then_with(longest),
        Some(ChoiceKind::LongestPriority) => longest().then_with(|| priority(a).cmp(&priority(b))),
        _ => longest(),
    }
}

/// Apply the choice policy to every node.
fn disambiguate(drafts: &mut [Draft], rule_set: &RuleSet, config: &dyn Config) {
    for ix in 0..drafts.len() {
        let (rule, (start, end)) = (drafts[ix].data.rule(), drafts[ix].data.span());
        let alternatives = drafts[ix].data.alternatives().to_vec();
        if alternatives.len() < 2 {
            continue;
        }
        let kind = rule_set.rule(rule).rhs().and_then(|rhs| rhs.choice_kind());
        let mut best = &alternatives[0];
        for alternative in alternatives.iter().skip(1) {
            if compare(kind, alternative, best, drafts, rule_set) == Ordering::Less {
                best = alternative;
            }
        }
        let (mut kept, dropped): (Vec<Alternative>, Vec<Alternative>) = alternatives
            .iter()
            .cloned()
            .partition(|a| compare(kind, a, best, drafts, rule_set) == Ordering::Equal);
        kept.sort_by_key(|a| a.option);
        if !dropped.is_empty() {
            config.on_resolved_ambiguity(&ResolvedAmbiguity {
                rule,
                tag: rule_set.rule(rule).tag().to_string(),
                start,
                end,
                kept: kept.iter().map(|a| a.option).collect(),
                dropped: dropped.iter().map(|a| a.option).collect(),
            });
        }
        if let NodeData::Branch { alternatives, .. } = &mut drafts[ix].data {
            *alternatives = kept;
        }
    }
}

/// Copy the nodes reachable from `roots` into a fresh arena.
fn compact(drafts: Vec<Draft>, roots: &[NodeId]) -> (Vec<NodeData>, Vec<NodeId>) {
    let mut mapping: BTreeMap<NodeId, NodeId> = BTreeMap::new();
    let mut order = vec![];
    let mut todo: VecDeque<NodeId> = VecDeque::new();
    for &root in roots {
        if !mapping.contains_key(&root) {
            mapping.insert(root, NodeId(order.len()));
            order.push(root);
            todo.push_back(root);
        }
    }
    while let Some(id) = todo.pop_front() {
        for alternative in drafts[id.0].data.alternatives() {
            for &child in alternative.children.iter() {
                if !mapping.contains_key(&child) {
                    mapping.insert(child, NodeId(order.len()));
                    order.push(child);
                    todo.push_back(child);
                }
            }
        }
    }
    let mut slots: Vec<Option<NodeData>> = drafts.into_iter().map(|d| Some(d.data)).collect();
    let nodes = order
        .iter()
        .filter_map(|id| slots[id.0].take())
        .map(|mut data| {
            if let NodeData::Branch { alternatives, .. } = &mut data {
                for alternative in alternatives.iter_mut() {
                    for child in alternative.children.iter_mut() {
                        *child = mapping[&*child];
                    }
                }
            }
            data
        })
        .collect();
    let roots = roots.iter().map(|r| mapping[r]).collect();
    (nodes, roots)
}

/// Build the tree for the accepted root children of a finished parse.
pub(crate) fn finalize(
    gss: &Gss,
    rule_set: &Arc<RuleSet>,
    text: &Arc<str>,
    roots: &[Child],
    max_num_heads: usize,
    config: &dyn Config,
) -> (SharedPackedParseTree, Vec<LanguageIssue>) {
    let mut materialiser = Materialiser {
        gss,
        drafts: vec![],
        by_child: BTreeMap::new(),
        sequences: BTreeMap::new(),
        todo: VecDeque::new(),
    };
    let roots = materialiser.run(roots);
    let mut drafts = materialiser.drafts;
    remove_cycles(&mut drafts);
    disambiguate(&mut drafts, rule_set, config);
    let (nodes, roots) = compact(drafts, &roots);
    let tree = SharedPackedParseTree {
        rule_set: rule_set.clone(),
        text: text.clone(),
        nodes,
        roots,
        max_num_heads,
    };

    let mut issues = vec![];
    if config.report_ambiguities() {
        let lines = LineIndex::new(text);
        for (ix, data) in tree.nodes.iter().enumerate() {
            let count = data.alternatives().len();
            if count > 1 {
                let node = tree.node(NodeId(ix));
                issues.push(LanguageIssue {
                    kind: IssueKind::Warning,
                    phase: Phase::Parse,
                    location: lines.location(node.start(), node.end() - node.start()),
                    message: format!("Ambiguous '{}': {} derivations of '{}'", node.tag(), count, node.matched_text()),
                    expected: BTreeSet::new(),
                });
            }
        }
    }
    (tree, issues)
}
