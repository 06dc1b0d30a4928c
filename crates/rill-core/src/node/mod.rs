//! 节点类型与节点实例。

pub mod instance;
pub mod registry;
pub mod ty;

pub use instance::{Node, NodeContext, NodeMeta, OpenContext};
pub use ty::{
    CloseFn, DisposeTypeFn, InitTypeFn, NodeType, NodeTypeBuilder, NodeTypeFlags, OpenFn,
};
