//! Interval arithmetic for nested-set mutations
//!
//! Pure functions: given snapshot rows, compute where a subject lands and
//! which range updates move the rest of the partition out of the way. The
//! engine applies the results through a `StoreTransaction`.
//!
//! Every mutation is expressed with three primitives:
//!
//! - **open gap** at position `p` of width `w`: every bound `>= p` moves by `+w`
//! - **carry** a subtree `[l, r]` by `d` (and its depths by `dd`)
//! - **close gap** after position `q` of width `w`: every bound `> q` moves by `-w`

use crate::db::{FieldDeltas, RangePredicate};
use crate::models::{Node, NodeId};

/// Width of a detached node
pub const LEAF_SPAN: i64 = 2;

/// Where a subject is placed, in coordinates taken before the gap opens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertionPoint {
    /// Left bound the subject will take
    pub position: i64,

    /// Depth the subject will take
    pub depth: i64,

    /// Parent the subject will link to
    pub parent_id: Option<NodeId>,
}

impl InsertionPoint {
    /// Rightmost child of `parent`: takes `parent.right`, one level deeper
    pub fn last_child_of(parent: &Node) -> Self {
        Self {
            position: parent.right,
            depth: parent.depth + 1,
            parent_id: Some(parent.id),
        }
    }

    /// Immediately before `reference`: takes `reference.left`, same level and parent
    pub fn before(reference: &Node) -> Self {
        Self {
            position: reference.left,
            depth: reference.depth,
            parent_id: reference.parent_id,
        }
    }
}

/// Range updates that make room for `width` units at `position`
///
/// Bounds equal to `position` move too, so when `position` is a parent's
/// right bound the parent grows around the new space.
pub fn open_gap(position: i64, width: i64) -> [(RangePredicate, FieldDeltas); 2] {
    [
        (RangePredicate::LeftFrom(position), FieldDeltas::left(width)),
        (RangePredicate::RightFrom(position), FieldDeltas::right(width)),
    ]
}

/// Range updates that remove `width` vacated units ending at `after`
pub fn close_gap(after: i64, width: i64) -> [(RangePredicate, FieldDeltas); 2] {
    [
        (RangePredicate::LeftFrom(after + 1), FieldDeltas::left(-width)),
        (RangePredicate::RightFrom(after + 1), FieldDeltas::right(-width)),
    ]
}

/// Relocation of an attached node and its subtree
///
/// Steps, all within one transaction:
/// 1. `open_gap(point.position, span)`
/// 2. carry `[moved_left, moved_right]` by `carry`, depths by `depth_delta`
/// 3. `close_gap(moved_right, span)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovePlan {
    /// Width of the moved subtree
    pub span: i64,

    /// Destination left bound before the old location is compacted
    pub position: i64,

    /// Bounds of the subtree once the gap is open
    pub moved_left: i64,
    pub moved_right: i64,

    /// Bound delta applied to every node of the subtree
    pub carry: i64,

    /// Depth delta applied to every node of the subtree
    ///
    /// Target depth minus current depth; the target depth is the parent's
    /// depth + 1 for a last child and the reference's depth for a sibling.
    pub depth_delta: i64,
}

impl MovePlan {
    /// Plan moving `node` to `point`
    ///
    /// `point` must lie outside `node`'s own interval; callers validate that
    /// before planning.
    pub fn new(node: &Node, point: &InsertionPoint) -> Self {
        let span = node.span();
        let (moved_left, moved_right) = if node.left >= point.position {
            (node.left + span, node.right + span)
        } else {
            (node.left, node.right)
        };

        Self {
            span,
            position: point.position,
            moved_left,
            moved_right,
            carry: point.position - moved_left,
            depth_delta: point.depth - node.depth,
        }
    }

    /// Range update carrying the subtree to its destination
    pub fn carry_update(&self) -> (RangePredicate, FieldDeltas) {
        (
            RangePredicate::Within {
                left: self.moved_left,
                right: self.moved_right,
            },
            FieldDeltas::shift(self.carry).with_depth(self.depth_delta),
        )
    }

    /// Left bound of the moved node once every step has run
    pub fn final_left(&self) -> i64 {
        if self.position > self.moved_right {
            self.position - self.span
        } else {
            self.position
        }
    }

    /// Whether the node ends up exactly where it started
    pub fn is_noop(&self, node: &Node) -> bool {
        self.final_left() == node.left && self.depth_delta == 0
    }
}
