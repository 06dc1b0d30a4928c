//! # rill-core Prelude
//!
//! ## 定位（Why）
//! - 为上层 crate 提供一个稳定、浅路径的导入入口：节点实现方只需
//!   `use rill_core::prelude::*;` 即可获得构图、发包与错误处理的常用类型，
//!   避免业务代码里出现大量深层路径。
//!
//! ## 收录原则（What）
//! - 仅纳入跨模块高频依赖：包模型、端口与节点类型、静态流规格、错误体系
//!   与选项记录；边缘能力（Inspector 安装、调试输出、测试桩）仍走显式
//!   命名空间以保持依赖面受控。

pub use crate::error::{Error, ErrorCause, ErrorKind, FlowError, Result};
pub use crate::flow::StaticFlowSpec;
pub use crate::node::{Node, NodeContext, NodeMeta, NodeType, NodeTypeFlags, OpenContext};
pub use crate::options::{OptionValue, OptionsRecord, OptionsSchema};
pub use crate::packet::{Blob, Packet, PacketType, PacketTypeRef};
pub use crate::port::{PortInType, PortOutType, PORT_ERROR};
pub use crate::types::{
    DirectionVector, FloatRange, FloatRangeSpec, IntRange, IntRangeSpec, Location, Rgb, Timestamp,
};
