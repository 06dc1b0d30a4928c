//! 测试桩命名空间：集中提供记录型 Inspector 与最小节点类型包。
//!
//! # 设计定位（Why）
//! - 集成测试与基准反复需要“发一个整数、收一个整数”的最小图元素；
//!   统一维护避免在各测试文件里重复定义，接口演进时获得单点编译错误。
//! - Inspector 单例全进程只安装一次，记录型实现把事件流收进内存，
//!   测试按节点 id 前缀切分各自的子序列。
//!
//! # 使用方式（How）
//! - `let recorder = test_stubs::install_recorder();` 后构图运行，
//!   以 `recorder.events_about("sa_")` 读取本测试相关的事件序列；
//! - 节点类型经 [`int_generator`]、[`int_sink`] 等访问器获取，
//!   同名访问器总是返回同一类型句柄。

use alloc::boxed::Box;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::Any;

use spin::{Mutex, Once};

use crate::error::{ErrorKind, FlowError, Result};
use crate::inspector::{ConnDesc, Inspector, NodeDesc};
use crate::node::{Node, NodeContext, NodeMeta, NodeType, OpenContext};
use crate::options::{OptionsRecord, OptionsSchema};
use crate::packet::{ty, Packet};
use crate::port::{PortInType, PortOutType};
use crate::types::IntRange;

/// 记录型 Inspector 捕获的事件。
#[derive(Clone, Debug, PartialEq)]
pub enum InspectorEvent {
    NodeOpened {
        id: String,
        depth: usize,
    },
    NodeClosed {
        id: String,
        depth: usize,
    },
    Connected {
        src: String,
        src_port: u16,
        dst: String,
        dst_port: u16,
        conn_id: u16,
    },
    Disconnected {
        src: String,
        src_port: u16,
        dst: String,
        dst_port: u16,
        conn_id: u16,
    },
    Sent {
        id: String,
        port: u16,
        packet: String,
    },
    Delivered {
        id: String,
        port: u16,
        conn_id: u16,
        packet: String,
        depth: usize,
    },
}

impl InspectorEvent {
    fn mentions(&self, prefix: &str) -> bool {
        match self {
            Self::NodeOpened { id, .. }
            | Self::NodeClosed { id, .. }
            | Self::Sent { id, .. }
            | Self::Delivered { id, .. } => id.starts_with(prefix),
            Self::Connected { src, dst, .. } | Self::Disconnected { src, dst, .. } => {
                src.starts_with(prefix) || dst.starts_with(prefix)
            }
        }
    }
}

/// 把全部钩子事件收进内存的 Inspector。
#[derive(Default)]
pub struct RecordingInspector {
    events: Mutex<Vec<InspectorEvent>>,
}

impl RecordingInspector {
    /// 事件流快照。
    pub fn events(&self) -> Vec<InspectorEvent> {
        self.events.lock().clone()
    }

    /// 只保留涉及指定节点 id 前缀的事件。
    ///
    /// 测试并行运行时共享同一单例；各测试使用独有前缀即可互不干扰。
    pub fn events_about(&self, prefix: &str) -> Vec<InspectorEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.mentions(prefix))
            .cloned()
            .collect()
    }
}

fn owned_id(desc: &NodeDesc<'_>) -> String {
    desc.display_id().to_string()
}

impl Inspector for RecordingInspector {
    fn did_open_node(&self, node: &NodeDesc<'_>, _opts: &OptionsRecord) {
        self.events.lock().push(InspectorEvent::NodeOpened {
            id: owned_id(node),
            depth: node.depth,
        });
    }

    fn will_close_node(&self, node: &NodeDesc<'_>) {
        self.events.lock().push(InspectorEvent::NodeClosed {
            id: owned_id(node),
            depth: node.depth,
        });
    }

    fn did_connect_port(&self, conn: &ConnDesc<'_>) {
        self.events.lock().push(InspectorEvent::Connected {
            src: owned_id(&conn.src),
            src_port: conn.src_port,
            dst: owned_id(&conn.dst),
            dst_port: conn.dst_port,
            conn_id: conn.conn_id,
        });
    }

    fn will_disconnect_port(&self, conn: &ConnDesc<'_>) {
        self.events.lock().push(InspectorEvent::Disconnected {
            src: owned_id(&conn.src),
            src_port: conn.src_port,
            dst: owned_id(&conn.dst),
            dst_port: conn.dst_port,
            conn_id: conn.conn_id,
        });
    }

    fn will_send_packet(&self, src: &NodeDesc<'_>, port: u16, packet: &Packet) {
        self.events.lock().push(InspectorEvent::Sent {
            id: owned_id(src),
            port,
            packet: format!("{packet}"),
        });
    }

    fn will_deliver_packet(&self, dst: &NodeDesc<'_>, port: u16, conn_id: u16, packet: &Packet) {
        self.events.lock().push(InspectorEvent::Delivered {
            id: owned_id(dst),
            port,
            conn_id,
            packet: format!("{packet}"),
            depth: dst.depth,
        });
    }
}

/// 安装（或复用）进程级记录型 Inspector。
#[cfg(feature = "inspector")]
pub fn install_recorder() -> &'static RecordingInspector {
    static RECORDER: Once<RecordingInspector> = Once::new();
    let recorder = RECORDER.call_once(RecordingInspector::default);
    let _ = crate::inspector::set_inspector(recorder);
    recorder
}

struct GeneratorData {
    value: IntRange,
}

fn generator_open(
    _ty: &NodeType,
    _ctx: &OpenContext<'_>,
    opts: &OptionsRecord,
) -> Result<Box<dyn Any>> {
    Ok(Box::new(GeneratorData {
        value: opts.int("value").unwrap_or_else(|| IntRange::of(0)),
    }))
}

fn generator_out_connect(
    ctx: &mut NodeContext<'_>,
    data: &mut dyn Any,
    _port: u16,
    _conn_id: u16,
) -> Result<()> {
    let Some(data) = data.downcast_ref::<GeneratorData>() else {
        return Err(FlowError::new(ErrorKind::NotFound, "generator data missing"));
    };
    ctx.send(0, Packet::new_irange(data.value))
}

fn generator_tick(
    ctx: &mut NodeContext<'_>,
    data: &mut dyn Any,
    _port: u16,
    _conn_id: u16,
    _packet: &Packet,
) -> Result<()> {
    let Some(data) = data.downcast_ref::<GeneratorData>() else {
        return Err(FlowError::new(ErrorKind::NotFound, "generator data missing"));
    };
    ctx.send(0, Packet::new_irange(data.value))
}

/// 整数源：`value` 选项给定 IRANGE 值；输出口被连接或收到 tick 时发出。
pub fn int_generator() -> Arc<NodeType> {
    static TY: Once<Arc<NodeType>> = Once::new();
    TY.call_once(|| {
        NodeType::builder("int-generator")
            .category("test/source")
            .options(OptionsSchema::builder().int_value("value", 0).build())
            .open(generator_open)
            .port_in(PortInType::new(ty::any().clone()).with_process(generator_tick))
            .port_out(PortOutType::new(ty::irange().clone()).with_connect(generator_out_connect))
            .build()
    })
    .clone()
}

static INT_SINK_LOG: Mutex<Vec<(String, i32, u16)>> = Mutex::new(Vec::new());

fn int_sink_process(
    ctx: &mut NodeContext<'_>,
    _data: &mut dyn Any,
    _port: u16,
    conn_id: u16,
    packet: &Packet,
) -> Result<()> {
    let value = packet.as_irange()?;
    INT_SINK_LOG.lock().push((
        ctx.meta().id().unwrap_or("<anon>").to_string(),
        value.val,
        conn_id,
    ));
    Ok(())
}

/// 整数汇：把收到的 (节点 id, 值, conn-id) 记入进程级日志。
pub fn int_sink() -> Arc<NodeType> {
    static TY: Once<Arc<NodeType>> = Once::new();
    TY.call_once(|| {
        NodeType::builder("int-sink")
            .category("test/sink")
            .port_in(PortInType::new(ty::irange().clone()).with_process(int_sink_process))
            .build()
    })
    .clone()
}

/// 指定 id 前缀的整数汇接收记录。
pub fn int_sink_received(prefix: &str) -> Vec<(String, i32, u16)> {
    INT_SINK_LOG
        .lock()
        .iter()
        .filter(|(id, _, _)| id.starts_with(prefix))
        .cloned()
        .collect()
}

static ANY_SINK_LOG: Mutex<Vec<(String, String, u16)>> = Mutex::new(Vec::new());

fn any_sink_process(
    ctx: &mut NodeContext<'_>,
    _data: &mut dyn Any,
    _port: u16,
    conn_id: u16,
    packet: &Packet,
) -> Result<()> {
    ANY_SINK_LOG.lock().push((
        ctx.meta().id().unwrap_or("<anon>").to_string(),
        format!("{packet}"),
        conn_id,
    ));
    Ok(())
}

/// 通配汇：记录任意包的规范文本渲染。
pub fn any_sink() -> Arc<NodeType> {
    static TY: Once<Arc<NodeType>> = Once::new();
    TY.call_once(|| {
        NodeType::builder("any-sink")
            .category("test/sink")
            .port_in(PortInType::new(ty::any().clone()).with_process(any_sink_process))
            .build()
    })
    .clone()
}

/// 指定 id 前缀的通配汇接收记录。
pub fn any_sink_received(prefix: &str) -> Vec<(String, String, u16)> {
    ANY_SINK_LOG
        .lock()
        .iter()
        .filter(|(id, _, _)| id.starts_with(prefix))
        .cloned()
        .collect()
}

fn forwarder_process(
    ctx: &mut NodeContext<'_>,
    _data: &mut dyn Any,
    _port: u16,
    _conn_id: u16,
    packet: &Packet,
) -> Result<()> {
    ctx.send(0, packet.clone())
}

/// 转发器：把输入原样重发到输出口 0。
pub fn forwarder() -> Arc<NodeType> {
    static TY: Once<Arc<NodeType>> = Once::new();
    TY.call_once(|| {
        NodeType::builder("forwarder")
            .category("test/filter")
            .port_in(PortInType::new(ty::any().clone()).with_process(forwarder_process))
            .port_out(PortOutType::new(ty::any().clone()))
            .build()
    })
    .clone()
}

struct ErrorEmitterData {
    code: i32,
    message: String,
}

fn error_emitter_open(
    _ty: &NodeType,
    _ctx: &OpenContext<'_>,
    opts: &OptionsRecord,
) -> Result<Box<dyn Any>> {
    Ok(Box::new(ErrorEmitterData {
        code: opts.int("code").map(|r| r.val).unwrap_or(-1),
        message: opts.string("message").unwrap_or("").to_string(),
    }))
}

fn error_emitter_process(
    ctx: &mut NodeContext<'_>,
    data: &mut dyn Any,
    _port: u16,
    _conn_id: u16,
    _packet: &Packet,
) -> Result<()> {
    let Some(data) = data.downcast_ref::<ErrorEmitterData>() else {
        return Err(FlowError::new(ErrorKind::NotFound, "emitter data missing"));
    };
    ctx.send_error(data.code, data.message.clone())
}

/// 错误源：收到任意触发包即在保留错误端口上发出 (code, message)。
pub fn error_emitter() -> Arc<NodeType> {
    static TY: Once<Arc<NodeType>> = Once::new();
    TY.call_once(|| {
        NodeType::builder("error-emitter")
            .category("test/source")
            .options(
                OptionsSchema::builder()
                    .int_value("code", -1)
                    .string("message", "")
                    .build(),
            )
            .open(error_emitter_open)
            .port_in(PortInType::new(ty::any().clone()).with_process(error_emitter_process))
            .build()
    })
    .clone()
}

fn broken_open(
    _ty: &NodeType,
    _ctx: &OpenContext<'_>,
    _opts: &OptionsRecord,
) -> Result<Box<dyn Any>> {
    Err(FlowError::new(
        ErrorKind::OutOfMemory,
        "broken node refuses to open",
    ))
}

/// 构造必败的节点类型：`open` 固定返回 OutOfMemory，用于回退路径测试。
pub fn broken() -> Arc<NodeType> {
    static TY: Once<Arc<NodeType>> = Once::new();
    TY.call_once(|| {
        NodeType::builder("broken")
            .category("test/source")
            .open(broken_open)
            .port_out(PortOutType::new(ty::irange().clone()))
            .build()
    })
    .clone()
}

/// 借用容器实例的指定子节点。
///
/// 仅供测试内省：运行中的分发绝不应与此同时持有子节点借用。
pub fn with_child<R>(container: &Node, idx: u16, f: impl FnOnce(&Node) -> R) -> Option<R> {
    let state = container.container_state()?;
    let cell = state.child(idx).ok()?;
    let node = cell.try_borrow().ok()?;
    Some(f(&node))
}

/// 容器实例的子节点数量；非容器返回 `None`。
pub fn child_count(container: &Node) -> Option<usize> {
    Some(container.container_state()?.children_len())
}

/// 只读访问容器连接表（含 conn-id），供不变式断言使用。
pub fn connections_of(container: &Node) -> Option<Vec<crate::flow::Connection>> {
    let state = container.container_state()?;
    Some(state.connections().to_vec())
}

/// 借用子节点元信息，核对父侧槽位。
pub fn child_meta<R>(container: &Node, idx: u16, f: impl FnOnce(&NodeMeta) -> R) -> Option<R> {
    with_child(container, idx, |node| f(node.meta()))
}
