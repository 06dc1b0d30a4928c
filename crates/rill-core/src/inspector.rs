//! 进程级 Inspector 钩子集。
//!
//! # 设计背景（Why）
//! - 图生命周期（节点开闭、边装拆）与包事件（发送、投递）需要一个可插拔
//!   的进程级观察者；未启用时分发热路径不允许出现任何额外成本。
//! - 消除开销的手段是编译期的：`inspector` Feature 关闭时，所有调用点
//!   连同参数构造一起被编译掉；启用时也只是一次单例的空指针检查。
//!
//! # 契约约束（What）
//! - 单例在首次 `send` 之前安装、且只安装一次；之后的安装请求被忽略。
//! - 钩子拿到的都是借用视图：不得改写流程状态，不得在钩子内调用 `send`。
//! - `did_*` 在状态提交之后触发，`will_*` 在状态变更之前触发。

use crate::options::OptionsRecord;
use crate::packet::Packet;

#[cfg(feature = "inspector")]
use spin::Once;

/// 节点的借用描述：标识、类型名与嵌套深度（祖先容器数量）。
#[derive(Clone, Copy, Debug)]
pub struct NodeDesc<'a> {
    pub id: Option<&'a str>,
    pub type_name: &'a str,
    pub depth: usize,
}

impl NodeDesc<'_> {
    /// 展示用标识：无 id 的节点以 `<anon>` 呈现。
    pub fn display_id(&self) -> &str {
        self.id.unwrap_or("<anon>")
    }
}

/// 一条边的借用描述。
#[derive(Clone, Copy, Debug)]
pub struct ConnDesc<'a> {
    pub src: NodeDesc<'a>,
    pub src_port: u16,
    pub src_type: &'a str,
    pub dst: NodeDesc<'a>,
    pub dst_port: u16,
    pub dst_type: &'a str,
    pub conn_id: u16,
}

/// 六个可选钩子；默认实现全部为空操作。
#[allow(unused_variables)]
pub trait Inspector: Sync {
    /// 节点构造完成（`type.open` 之前）。
    fn did_open_node(&self, node: &NodeDesc<'_>, opts: &OptionsRecord) {}

    /// 节点即将关闭。
    fn will_close_node(&self, node: &NodeDesc<'_>) {}

    /// 一条边安装完毕。
    fn did_connect_port(&self, conn: &ConnDesc<'_>) {}

    /// 一条边即将被移除。
    fn will_disconnect_port(&self, conn: &ConnDesc<'_>) {}

    /// 源节点即将发送一个包。
    fn will_send_packet(&self, src: &NodeDesc<'_>, port: u16, packet: &Packet) {}

    /// 一个包即将投递给目的端口的 `process`。
    fn will_deliver_packet(&self, dst: &NodeDesc<'_>, port: u16, conn_id: u16, packet: &Packet) {}
}

#[cfg(feature = "inspector")]
static INSPECTOR: Once<&'static dyn Inspector> = Once::new();

/// 安装进程级 Inspector。
///
/// # 契约说明（What）
/// - 只允许在首次 `send` 之前安装一次；返回是否真正生效。
/// - 单例一经安装不再改变，运行期不提供热替换语义。
#[cfg(feature = "inspector")]
pub fn set_inspector(inspector: &'static dyn Inspector) -> bool {
    let mut installed = false;
    INSPECTOR.call_once(|| {
        installed = true;
        inspector
    });
    installed
}

/// 当前生效的 Inspector。
#[cfg(feature = "inspector")]
pub fn inspector() -> Option<&'static dyn Inspector> {
    INSPECTOR.get().copied()
}

/// 运行时内部的钩子调用点。Feature 关闭时全部为空函数，连同调用处的
/// 参数构造一起被编译器消除。
pub(crate) mod hooks {
    use super::*;

    #[cfg(feature = "inspector")]
    pub(crate) fn did_open_node(node: &NodeDesc<'_>, opts: &OptionsRecord) {
        if let Some(inspector) = super::inspector() {
            inspector.did_open_node(node, opts);
        }
    }

    #[cfg(feature = "inspector")]
    pub(crate) fn will_close_node(node: &NodeDesc<'_>) {
        if let Some(inspector) = super::inspector() {
            inspector.will_close_node(node);
        }
    }

    #[cfg(feature = "inspector")]
    pub(crate) fn did_connect_port(conn: &ConnDesc<'_>) {
        if let Some(inspector) = super::inspector() {
            inspector.did_connect_port(conn);
        }
    }

    #[cfg(feature = "inspector")]
    pub(crate) fn will_disconnect_port(conn: &ConnDesc<'_>) {
        if let Some(inspector) = super::inspector() {
            inspector.will_disconnect_port(conn);
        }
    }

    #[cfg(feature = "inspector")]
    pub(crate) fn will_send_packet(src: &NodeDesc<'_>, port: u16, packet: &Packet) {
        if let Some(inspector) = super::inspector() {
            inspector.will_send_packet(src, port, packet);
        }
    }

    #[cfg(feature = "inspector")]
    pub(crate) fn will_deliver_packet(
        dst: &NodeDesc<'_>,
        port: u16,
        conn_id: u16,
        packet: &Packet,
    ) {
        if let Some(inspector) = super::inspector() {
            inspector.will_deliver_packet(dst, port, conn_id, packet);
        }
    }

    #[cfg(not(feature = "inspector"))]
    pub(crate) fn did_open_node(_node: &NodeDesc<'_>, _opts: &OptionsRecord) {}

    #[cfg(not(feature = "inspector"))]
    pub(crate) fn will_close_node(_node: &NodeDesc<'_>) {}

    #[cfg(not(feature = "inspector"))]
    pub(crate) fn did_connect_port(_conn: &ConnDesc<'_>) {}

    #[cfg(not(feature = "inspector"))]
    pub(crate) fn will_disconnect_port(_conn: &ConnDesc<'_>) {}

    #[cfg(not(feature = "inspector"))]
    pub(crate) fn will_send_packet(_src: &NodeDesc<'_>, _port: u16, _packet: &Packet) {}

    #[cfg(not(feature = "inspector"))]
    pub(crate) fn will_deliver_packet(
        _dst: &NodeDesc<'_>,
        _port: u16,
        _conn_id: u16,
        _packet: &Packet,
    ) {}
}
