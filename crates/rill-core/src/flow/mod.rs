//! 静态流容器与分发协议。

pub(crate) mod container;
pub(crate) mod dispatch;
pub mod spec;

pub use spec::{ChildOptsSetFn, ConnSpec, Connection, ExportSpec, StaticFlowSpec};
