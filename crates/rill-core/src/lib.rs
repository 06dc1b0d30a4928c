#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![doc = "rill-core: 面向 Linux/嵌入式 IoT 的流式编程（FBP）运行时核心。"]
#![doc = ""]
#![doc = "== 执行模型 =="]
#![doc = "单线程协作式：外部 mainloop 独占线程，运行时完全在 mainloop 回调中执行；"]
#![doc = "`send` 与 `process` 同步完成，递归分发有深度上界，超限转入容器内部队列。"]
#![doc = ""]
#![doc = "== 内存分配依赖 =="]
#![doc = "`rill-core` 定位于 `no_std + alloc` 场景：包负载、选项记录与容器状态依赖"]
#![doc = "[`alloc`] 中的 `Box`、`Arc`、`Vec`。纯 `no_std`（无分配器）环境暂不支持。"]

extern crate alloc;

pub mod error;
pub mod flow;
pub mod inspector;
pub mod node;
pub mod observability;
pub mod options;
pub mod packet;
pub mod port;
pub mod prelude;
/// 测试桩命名空间，集中暴露官方维护的记录型 Inspector 与最小节点类型，
/// 供集成测试与基准复用。
pub mod test_stubs;
#[cfg(feature = "std")]
pub mod trace;
pub mod types;

pub use error::{Error, ErrorCause, ErrorKind, FlowError, Result};
pub use flow::{ConnSpec, Connection, ExportSpec, StaticFlowSpec};
pub use inspector::{ConnDesc, Inspector, NodeDesc};
pub use node::{
    Node, NodeContext, NodeMeta, NodeType, NodeTypeBuilder, NodeTypeFlags, OpenContext,
};
pub use observability::{LogRecord, LogSeverity, Logger, NoopLogger};
pub use options::{
    OptionDataType, OptionMember, OptionValue, OptionsRecord, OptionsSchema,
};
pub use packet::{
    Blob, ErrorPayload, FieldValue, HttpResponse, Packet, PacketMember, PacketType, PacketTypeRef,
    PacketValue,
};
pub use port::{PortConnectCb, PortInType, PortOutType, ProcessCb, PORT_ERROR};
pub use types::{
    DirectionVector, FloatRange, FloatRangeSpec, IntRange, IntRangeSpec, Location, Rgb, Timestamp,
};

#[cfg(feature = "inspector")]
pub use inspector::set_inspector;
#[cfg(feature = "std")]
pub use trace::TraceInspector;
