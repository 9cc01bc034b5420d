//! Rule positions: "at position P within option O of rule R".
//!
//! Every function here is a pure function of the rule model, which is what allows automaton
//! states to be memoised by their positions.

use std::fmt::{self, Debug};

use crate::rule::{ListKind, Rhs, RuleId};

/// Before the first item.
pub const START: usize = 0;
/// After the last item.
pub const END: usize = usize::MAX;
/// List pseudo-position: just after an item.
pub const LIST_ITEM: usize = 1;
/// Separated-list pseudo-position: just after a separator.
pub const LIST_SEPARATOR: usize = 2;

/// The list option that takes at least one item.
pub const LIST_ITEMS_OPTION: usize = 0;
/// The list option that matches the empty marker.
pub const LIST_EMPTY_OPTION: usize = 1;

/// A point within one option of one rule.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RulePosition {
    /// The rule.
    pub rule: RuleId,
    /// The option within the rule.
    pub option: usize,
    /// The position within the option.
    pub position: usize,
}

impl RulePosition {
    /// Create a rule position.
    pub fn new(rule: RuleId, option: usize, position: usize) -> Self {
        RulePosition { rule, option, position }
    }

    /// The position at which a leaf, already complete, sits.
    pub fn leaf(rule: RuleId) -> Self {
        RulePosition::new(rule, 0, END)
    }

    /// Whether the option has been fully recognised.
    pub fn is_at_end(&self) -> bool {
        self.position == END
    }

    /// Whether this is the start of an option.
    pub fn is_at_start(&self) -> bool {
        self.position == START
    }

    /// The start position of every option of a rule with right-hand side `rhs`.
    pub fn first_positions(rule: RuleId, rhs: &Rhs) -> Vec<RulePosition> {
        (0..rhs.option_count())
            .map(|option| RulePosition::new(rule, option, START))
            .collect()
    }

    /// The item expected at this position, or `None` at the end.
    pub fn item(&self, rhs: &Rhs) -> Option<RuleId> {
        if self.is_at_end() {
            return None;
        }
        match rhs {
            Rhs::Empty { marker } => (self.position == START).then_some(*marker),
            Rhs::Concatenation { items } => items.get(self.position).copied(),
            Rhs::Choice { items, .. } => match self.position {
                START => items.get(self.option).copied(),
                _ => None,
            },
            Rhs::List { kind, item, empty, .. } => match (self.option, kind, self.position) {
                (LIST_EMPTY_OPTION, _, START) => *empty,
                (LIST_EMPTY_OPTION, _, _) => None,
                (_, ListKind::Multi, START | LIST_ITEM) => Some(*item),
                (_, ListKind::Separated { .. }, START | LIST_SEPARATOR) => Some(*item),
                (_, ListKind::Separated { separator }, LIST_ITEM) => Some(*separator),
                _ => None,
            },
        }
    }

    /// The positions reachable by consuming the item expected here.
    ///
    /// For lists more than one position is returned: after an item the list may end or go on.
    /// Whether either is allowed for a particular number of items is decided while parsing.
    pub fn next(&self, rhs: &Rhs) -> Vec<RulePosition> {
        let at = |position| RulePosition::new(self.rule, self.option, position);
        if self.is_at_end() {
            return vec![];
        }
        match rhs {
            Rhs::Empty { .. } | Rhs::Choice { .. } => vec![at(END)],
            Rhs::Concatenation { items } => {
                if self.position + 1 < items.len() {
                    vec![at(self.position + 1)]
                } else {
                    vec![at(END)]
                }
            }
            Rhs::List { kind, range, .. } => {
                if self.option == LIST_EMPTY_OPTION {
                    return vec![at(END)];
                }
                let after_item = if range.max == Some(1) {
                    vec![at(END)]
                } else {
                    vec![at(LIST_ITEM), at(END)]
                };
                match (kind, self.position) {
                    (ListKind::Separated { .. }, LIST_ITEM) => vec![at(LIST_SEPARATOR)],
                    _ => after_item,
                }
            }
        }
    }

    /// Whether the item consumed at this position counts towards a list's multiplicity.
    pub fn counts_as_list_item(&self, rhs: &Rhs) -> bool {
        match rhs {
            Rhs::List { kind, .. } if self.option == LIST_ITEMS_OPTION => match kind {
                ListKind::Multi => matches!(self.position, START | LIST_ITEM),
                ListKind::Separated { .. } => matches!(self.position, START | LIST_SEPARATOR),
            },
            _ => false,
        }
    }
}

impl Debug for RulePosition {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self.position {
            END => write!(f, "{:?}|{}•END", self.rule, self.option),
            p => write!(f, "{:?}|{}•{}", self.rule, self.option, p),
        }
    }
}
