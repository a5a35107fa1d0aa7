//! Data Models
//!
//! This module contains the data structures shared by the store adapters and
//! the tree engine:
//!
//! - `Node` - One attached row of a nested-set tree
//! - `NewNode` - Detached payload waiting for an interval
//! - `InsertionSubject` - New-or-existing argument of insert operations
//! - `NodePayload` - Fully-positioned row handed to the store on insert

mod node;

pub use node::{InsertionSubject, NewNode, Node, NodeId, NodePayload, ROOT_DEPTH};
