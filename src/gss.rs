//! The graph-structured stack of one parse.
//!
//! Four arenas, each with an index that merges equal keys:
//!
//! * leaves, keyed by (terminal, start);
//! * rule instances, keyed by (rule, option, start). An instance collects the growing nodes that
//!   called it and the complete nodes it produced, so a caller that shows up late still gets
//!   every completion;
//! * growing nodes, keyed by (instance, state, list count, next offset). Each derivation of a
//!   growing node points to the growing node on its left, which makes the node a packed set of
//!   child sequences;
//! * complete nodes, keyed by (rule, start, end). These become the nodes of the parse tree.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::automaton::{ParserState, StateId};
use crate::rule::RuleId;
use crate::sppt::SharedPackedParseTree;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub(crate) struct LeafId(pub usize);

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub(crate) struct InstanceId(pub usize);

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub(crate) struct GrowingId(pub usize);

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub(crate) struct CompleteId(pub usize);

/// One child of a derivation.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub(crate) enum Child {
    Leaf(LeafId),
    Complete(CompleteId),
    /// An index into [`Gss::embedded`].
    Embedded(usize),
}

#[derive(Debug)]
pub(crate) struct Leaf {
    pub rule: RuleId,
    pub start: usize,
    pub end: usize,
    pub is_skip: bool,
    pub is_empty: bool,
}

#[derive(Debug)]
pub(crate) struct Instance {
    pub rule: RuleId,
    pub option: usize,
    pub start: usize,
    pub callers: Vec<GrowingId>,
    caller_set: BTreeSet<GrowingId>,
    pub completions: Vec<CompleteId>,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Derivation {
    pub left: Option<GrowingId>,
    pub children: Vec<Child>,
}

#[derive(Debug)]
pub(crate) struct Growing {
    pub instance: InstanceId,
    pub state: Arc<ParserState>,
    pub count: usize,
    pub next: usize,
    pub derivations: Vec<Derivation>,
}

#[derive(Debug)]
pub(crate) struct Complete {
    pub rule: RuleId,
    pub start: usize,
    pub end: usize,
    /// (option, growing node) pairs, in the order they were found.
    pub alternatives: Vec<(usize, GrowingId)>,
}

#[derive(Debug, Default)]
pub(crate) struct Gss {
    pub leaves: Vec<Leaf>,
    leaf_index: BTreeMap<(RuleId, usize), LeafId>,
    pub instances: Vec<Instance>,
    instance_index: BTreeMap<(RuleId, usize, usize), InstanceId>,
    pub growing: Vec<Growing>,
    growing_index: BTreeMap<(InstanceId, StateId, usize, usize), GrowingId>,
    pub completes: Vec<Complete>,
    complete_index: BTreeMap<(RuleId, usize, usize), CompleteId>,
    /// Embedded trees with the outer terminal they were parsed for.
    pub embedded: Vec<(RuleId, Arc<SharedPackedParseTree>)>,
}

impl Gss {
    pub fn leaf(&mut self, rule: RuleId, start: usize, end: usize, is_skip: bool, is_empty: bool) -> LeafId {
        if let Some(&id) = self.leaf_index.get(&(rule, start)) {
            return id;
        }
        let id = LeafId(self.leaves.len());
        self.leaves.push(Leaf {
            rule,
            start,
            end,
            is_skip,
            is_empty,
        });
        self.leaf_index.insert((rule, start), id);
        id
    }

    pub fn instance(&mut self, rule: RuleId, option: usize, start: usize) -> InstanceId {
        if let Some(&id) = self.instance_index.get(&(rule, option, start)) {
            return id;
        }
        let id = InstanceId(self.instances.len());
        self.instances.push(Instance {
            rule,
            option,
            start,
            callers: vec![],
            caller_set: BTreeSet::new(),
            completions: vec![],
        });
        self.instance_index.insert((rule, option, start), id);
        id
    }

    /// Returns whether `caller` is new to the instance.
    pub fn add_caller(&mut self, instance: InstanceId, caller: GrowingId) -> bool {
        let instance = &mut self.instances[instance.0];
        if instance.caller_set.insert(caller) {
            instance.callers.push(caller);
            true
        } else {
            false
        }
    }

    /// Returns whether `complete` is new to the instance.
    pub fn add_completion(&mut self, instance: InstanceId, complete: CompleteId) -> bool {
        let instance = &mut self.instances[instance.0];
        if instance.completions.contains(&complete) {
            false
        } else {
            instance.completions.push(complete);
            true
        }
    }

    /// The growing node for the key, and whether it was created by this call.
    pub fn growing(&mut self, instance: InstanceId, state: Arc<ParserState>, count: usize, next: usize) -> (GrowingId, bool) {
        let key = (instance, state.id(), count, next);
        if let Some(&id) = self.growing_index.get(&key) {
            return (id, false);
        }
        let id = GrowingId(self.growing.len());
        self.growing.push(Growing {
            instance,
            state,
            count,
            next,
            derivations: vec![],
        });
        self.growing_index.insert(key, id);
        (id, true)
    }

    pub fn add_derivation(&mut self, node: GrowingId, left: Option<GrowingId>, children: Vec<Child>) {
        let derivation = Derivation { left, children };
        let derivations = &mut self.growing[node.0].derivations;
        if !derivations.contains(&derivation) {
            derivations.push(derivation);
        }
    }

    /// Record that `node` completes `rule` over `start..end` with `option`.
    pub fn complete(&mut self, rule: RuleId, start: usize, end: usize, option: usize, node: GrowingId) -> CompleteId {
        let id = match self.complete_index.get(&(rule, start, end)) {
            Some(&id) => id,
            None => {
                let id = CompleteId(self.completes.len());
                self.completes.push(Complete {
                    rule,
                    start,
                    end,
                    alternatives: vec![],
                });
                self.complete_index.insert((rule, start, end), id);
                id
            }
        };
        let alternatives = &mut self.completes[id.0].alternatives;
        if !alternatives.contains(&(option, node)) {
            alternatives.push((option, node));
        }
        id
    }
}
