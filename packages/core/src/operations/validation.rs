//! Pre-mutation checks for insert and move operations
//!
//! Each check runs twice: once on the caller's rows before a transaction is
//! opened, and once on the rows re-read inside the transaction before the
//! first write.

use crate::models::{InsertionSubject, NewNode, Node};
use crate::operations::ValidationError;

/// Detached payloads need a non-blank label
pub fn check_label(payload: &NewNode) -> Result<(), ValidationError> {
    if payload.is_blank() {
        return Err(ValidationError::BlankLabel);
    }
    Ok(())
}

/// Whether `node` may be relocated relative to `target`
///
/// Rejects a partition crossing and any destination inside `node`'s own
/// subtree (including `node` itself).
pub fn check_movable(node: &Node, target: &Node) -> Result<(), ValidationError> {
    if node.partition_key != target.partition_key {
        return Err(ValidationError::partition_mismatch(
            node.id,
            node.partition_key.as_str(),
            target.partition_key.as_str(),
        ));
    }

    if node.id == target.id || node.encloses(target) {
        return Err(ValidationError::MoveIntoOwnSubtree {
            node_id: node.id,
            target_id: target.id,
        });
    }

    Ok(())
}

/// A sibling can only be placed next to a non-root node
pub fn check_sibling_target(reference: &Node) -> Result<(), ValidationError> {
    if reference.is_root() {
        return Err(ValidationError::SiblingOfRoot {
            target_id: reference.id,
        });
    }
    Ok(())
}

/// Every check that does not need fresh rows
pub fn check_subject(subject: &InsertionSubject, target: &Node) -> Result<(), ValidationError> {
    match subject {
        InsertionSubject::Detached(payload) => check_label(payload),
        InsertionSubject::Existing(node) => check_movable(node, target),
    }
}
