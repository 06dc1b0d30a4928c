//! 端口类型：方向、接纳的包类型与生命周期回调。
//!
//! # 设计背景（Why）
//! - 端口是节点类型的静态组成：输入端口承载 `process` 数据路径，
//!   两个方向都可挂接 connect/disconnect 生命周期回调。
//! - 回调使用普通函数指针：节点类型需要在运行期由容器规格批量构造，
//!   函数指针保持类型可克隆、可比较、零捕获。
//!
//! # 契约说明（What）
//! - 输入端口的 connect 回调在连接簿记可见**之后**被调用，disconnect 在
//!   移除**之前**被调用；回调失败则整个操作回滚，如同从未发生。
//! - 端口索引在节点生命周期内稳定；`PORT_ERROR` 是保留的错误输出口。

use core::any::Any;

use crate::error::Result;
use crate::node::NodeContext;
use crate::packet::{Packet, PacketTypeRef};

/// 保留的隐式错误输出端口索引（最大端口索引减一）。
pub const PORT_ERROR: u16 = u16::MAX - 1;

/// 输入端口的数据路径回调。
///
/// 参数依次为：节点上下文、实例私有数据、端口索引、入向 conn-id 与借用的包。
/// 包仅在调用期间有效，若需保留必须克隆（BLOB 为引用计数递增）。
pub type ProcessCb =
    fn(&mut NodeContext<'_>, &mut dyn Any, u16, u16, &Packet) -> Result<()>;

/// 端口连接/断开生命周期回调。
///
/// 参数依次为：节点上下文、实例私有数据、端口索引与该条边的 conn-id。
pub type PortConnectCb = fn(&mut NodeContext<'_>, &mut dyn Any, u16, u16) -> Result<()>;

/// 输入端口类型。
#[derive(Clone, Debug)]
pub struct PortInType {
    pub packet_type: PacketTypeRef,
    pub process: Option<ProcessCb>,
    pub connect: Option<PortConnectCb>,
    pub disconnect: Option<PortConnectCb>,
}

impl PortInType {
    /// 以接纳类型构造输入端口，回调全部缺省。
    pub fn new(packet_type: PacketTypeRef) -> Self {
        Self {
            packet_type,
            process: None,
            connect: None,
            disconnect: None,
        }
    }

    /// 挂接数据路径回调。
    pub fn with_process(mut self, process: ProcessCb) -> Self {
        self.process = Some(process);
        self
    }

    /// 挂接连接回调。
    pub fn with_connect(mut self, connect: PortConnectCb) -> Self {
        self.connect = Some(connect);
        self
    }

    /// 挂接断开回调。
    pub fn with_disconnect(mut self, disconnect: PortConnectCb) -> Self {
        self.disconnect = Some(disconnect);
        self
    }
}

/// 输出端口类型。
#[derive(Clone, Debug)]
pub struct PortOutType {
    pub packet_type: PacketTypeRef,
    pub connect: Option<PortConnectCb>,
    pub disconnect: Option<PortConnectCb>,
}

impl PortOutType {
    /// 以产出类型构造输出端口，回调全部缺省。
    pub fn new(packet_type: PacketTypeRef) -> Self {
        Self {
            packet_type,
            connect: None,
            disconnect: None,
        }
    }

    /// 挂接连接回调。
    pub fn with_connect(mut self, connect: PortConnectCb) -> Self {
        self.connect = Some(connect);
        self
    }

    /// 挂接断开回调。
    pub fn with_disconnect(mut self, disconnect: PortConnectCb) -> Self {
        self.disconnect = Some(disconnect);
        self
    }
}
