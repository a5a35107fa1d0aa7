//! Structural invariant checks for a partition
//!
//! `verify_nodes` walks the rows of one partition in `left` order with a
//! stack of open ancestors and reports the first violation of:
//!
//! 1. `left < right` for every node
//! 2. intervals are disjoint or strictly nested (no partial overlap)
//! 3. a parent's interval is exactly its children plus its two boundary units
//! 4. `depth` is the parent's depth + 1 and `parent_id` names the enclosing node
//! 5. top-level rows are root sentinels (depth -1, no parent)
//!
//! Since children are checked against the innermost open interval, passing
//! the walk also proves that `left` order is a pre-order traversal.

use crate::models::{Node, ROOT_DEPTH};
use crate::operations::TreeError;

struct OpenInterval<'a> {
    node: &'a Node,
    /// Where the next child (or the closing bound) must start
    cursor: i64,
}

/// Check every interval invariant over the rows of one partition
pub fn verify_nodes(partition_key: &str, nodes: &[Node]) -> Result<(), TreeError> {
    let violation = |detail: String| Err(TreeError::invariant_violation(partition_key, detail));

    let mut ordered: Vec<&Node> = nodes.iter().collect();
    ordered.sort_by_key(|n| n.left);

    let mut open: Vec<OpenInterval<'_>> = Vec::new();

    for node in ordered {
        if node.partition_key != partition_key {
            return violation(format!(
                "node {} belongs to partition '{}'",
                node.id, node.partition_key
            ));
        }

        if node.left >= node.right {
            return violation(format!(
                "node {} has left {} >= right {}",
                node.id, node.left, node.right
            ));
        }

        while let Some(top) = open.last() {
            if top.node.right > node.left {
                break;
            }
            if top.cursor != top.node.right {
                return violation(format!(
                    "node {} ends at {} but its last child ends at {}",
                    top.node.id,
                    top.node.right,
                    top.cursor - 1
                ));
            }
            open.pop();
        }

        match open.last_mut() {
            Some(parent) => {
                if node.left <= parent.node.left || node.right >= parent.node.right {
                    return violation(format!(
                        "node {} [{}, {}] partially overlaps node {} [{}, {}]",
                        node.id,
                        node.left,
                        node.right,
                        parent.node.id,
                        parent.node.left,
                        parent.node.right
                    ));
                }
                if node.left != parent.cursor {
                    return violation(format!(
                        "gap before node {}: expected left {}, found {}",
                        node.id, parent.cursor, node.left
                    ));
                }
                if node.depth != parent.node.depth + 1 {
                    return violation(format!(
                        "node {} has depth {}, parent {} has depth {}",
                        node.id, node.depth, parent.node.id, parent.node.depth
                    ));
                }
                if node.parent_id != Some(parent.node.id) {
                    return violation(format!(
                        "node {} links to parent {:?} but is enclosed by node {}",
                        node.id, node.parent_id, parent.node.id
                    ));
                }
                parent.cursor = node.right + 1;
            }
            None => {
                if node.depth != ROOT_DEPTH || node.parent_id.is_some() {
                    return violation(format!(
                        "top-level node {} is not a root (depth {}, parent {:?})",
                        node.id, node.depth, node.parent_id
                    ));
                }
            }
        }

        open.push(OpenInterval {
            node,
            cursor: node.left + 1,
        });
    }

    while let Some(top) = open.pop() {
        if top.cursor != top.node.right {
            return violation(format!(
                "node {} ends at {} but its last child ends at {}",
                top.node.id,
                top.node.right,
                top.cursor - 1
            ));
        }
    }

    Ok(())
}
