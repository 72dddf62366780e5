//! Tree node domain entities.

pub mod kind;
pub mod model;

pub use kind::NodeKind;
pub use model::{NewNode, Node};
