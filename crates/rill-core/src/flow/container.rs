//! 静态流容器：子节点装配、连接簿记与拆除。
//!
//! # 设计背景（Why）
//! - 容器实例状态（[`ContainerState`]）装在节点私有数据里，子节点以
//!   `RefCell` 存放：运行时是单线程协作式的，内部可变性让同步递归分发
//!   无需 `unsafe`，重入（环路投递回正在处理的节点）则降级进待投队列。
//! - 连接表来自预排序的静态规格，逐边 `active` 标志使“连接回调里发包只
//!   路由到已完全安装的边”这一语义自然成立。
//!
//! # 契约说明（What）
//! - 装配失败按相反顺序完整回退：先断开已装的边（逆序），再关闭已建的
//!   子节点（逆序），最后让容器 `open` 失败向上冒泡。
//! - 拆除每个子节点的顺序：`will_close_node` → 逆 conn-id 断边（每条边
//!   `will_disconnect_port` 先于移除）→ 父侧移除通知 → `type.close`。

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::Any;
use core::cell::{Cell, RefCell};

use crate::error::{ErrorKind, FlowError, Result};
use crate::inspector::{self, ConnDesc};
use crate::node::{Node, NodeContext, NodeMeta, NodeType, OpenContext};
use crate::observability::log_warn;
use crate::options::OptionsRecord;
use crate::packet::Packet;
use crate::port::PORT_ERROR;

use super::dispatch::{self, Frame};
use super::spec::{Connection, FlowSpecData};

/// 待投递条目：重入或超深分发被转入队列，由最外层分发帧排空。
#[derive(Debug)]
pub(crate) struct Pending {
    pub dst_idx: u16,
    pub dst_port: u16,
    pub conn_id: u16,
    pub packet: Packet,
}

/// 容器实例的运行状态。
#[derive(Debug)]
pub(crate) struct ContainerState {
    pub(crate) spec: Arc<FlowSpecData>,
    children: Vec<RefCell<Node>>,
    conn_active: Vec<Cell<bool>>,
    pending: RefCell<VecDeque<Pending>>,
}

impl ContainerState {
    /// 连接表（含未激活边；路由方负责检查 `conn_active`）。
    pub(crate) fn connections(&self) -> &[Connection] {
        &self.spec.connections
    }

    pub(crate) fn children_len(&self) -> usize {
        self.children.len()
    }

    pub(crate) fn child(&self, idx: u16) -> Result<&RefCell<Node>> {
        self.children.get(usize::from(idx)).ok_or_else(|| {
            FlowError::new(
                ErrorKind::NotFound,
                alloc::format!("container has no child {idx}"),
            )
        })
    }

    pub(crate) fn child_cell(&self, idx: usize) -> &RefCell<Node> {
        &self.children[idx]
    }

    pub(crate) fn conn_active(&self, ci: usize) -> bool {
        self.conn_active[ci].get()
    }

    fn set_conn_active(&self, ci: usize, active: bool) {
        self.conn_active[ci].set(active);
    }

    pub(crate) fn enqueue(&self, pending: Pending) {
        self.pending.borrow_mut().push_back(pending);
    }

    pub(crate) fn pop_pending(&self) -> Option<Pending> {
        self.pending.borrow_mut().pop_front()
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }
}

/// 容器类型数据：解析完毕的规格加按需解析的成员操作表。
#[derive(Debug)]
pub(crate) struct ContainerType {
    pub(crate) spec: Arc<FlowSpecData>,
    pub(crate) ops: ContainerOps,
}

/// 容器节点类型的成员操作表。
///
/// # 契约说明（What）
/// - `send`：子节点向兄弟转发包的入口（由分发器经帧链调用）；
/// - `add`：子节点构造完成后的登记通知；
/// - `remove`：子节点销毁前的移除通知。
#[derive(Clone, Copy)]
pub(crate) struct ContainerOps {
    pub send: fn(&Frame<'_>, u16, u16, Packet, usize) -> Result<()>,
    pub add: fn(&ContainerState, u16),
    pub remove: fn(&ContainerState, u16),
}

impl core::fmt::Debug for ContainerOps {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ContainerOps").finish_non_exhaustive()
    }
}

fn static_flow_add(_state: &ContainerState, _child: u16) {}

fn static_flow_remove(_state: &ContainerState, _child: u16) {}

/// 静态流容器的成员操作表。
pub(crate) fn static_flow_ops() -> ContainerOps {
    ContainerOps {
        send: dispatch::static_flow_send,
        add: static_flow_add,
        remove: static_flow_remove,
    }
}

/// 静态流容器的 `open` 回调。
///
/// # 执行步骤（How）
/// 1. 逐子节点解析选项（`child_opts_set` 可改写副本）并按节点实例协议构造；
/// 2. 全部子节点就绪后登记进固定数组并发出 `add` 通知；
/// 3. 顺序安装连接：目的端 connect 回调先于源端，成功后提交
///    `did_connect_port`；
/// 4. 任一步失败即按相反顺序回退并上抛错误。
pub(crate) fn container_open(
    ty: &NodeType,
    octx: &OpenContext<'_>,
    _opts: &OptionsRecord,
) -> Result<Box<dyn Any>> {
    let Some(container) = ty.container() else {
        return Err(FlowError::new(
            ErrorKind::NotFound,
            "container open on a non-container type",
        ));
    };
    let spec = &container.spec;

    let mut constructed: Vec<Node> = Vec::with_capacity(spec.children.len());
    for (idx, child) in spec.children.iter().enumerate() {
        let mut opts = child.opts.clone();
        if let Some(rewrite) = spec.child_opts_set {
            rewrite(idx as u16, &mut opts);
        }
        match Node::new_child(
            child.ty.clone(),
            Some(&child.name),
            &opts,
            Some(idx as u16),
            octx.depth() + 1,
        ) {
            Ok(node) => constructed.push(node),
            Err(err) => {
                for mut node in constructed.into_iter().rev() {
                    node.close();
                }
                return Err(err);
            }
        }
    }

    let state = ContainerState {
        spec: spec.clone(),
        children: constructed.into_iter().map(RefCell::new).collect(),
        conn_active: spec
            .connections
            .iter()
            .map(|_| Cell::new(false))
            .collect(),
        pending: RefCell::new(VecDeque::new()),
    };
    for idx in 0..state.children_len() {
        (container.ops.add)(&state, idx as u16);
    }

    for ci in 0..spec.connections.len() {
        if let Err(err) = connect_edge(&state, octx.meta(), ci) {
            for cj in (0..ci).rev() {
                disconnect_edge(&state, octx.meta(), cj, true);
            }
            teardown_children(&state, container, false);
            return Err(err);
        }
    }

    Ok(Box::new(state))
}

/// 静态流容器的 `close` 回调。
pub(crate) fn container_close(ty: &NodeType, _meta: &NodeMeta, data: Box<dyn Any>) {
    let Ok(state) = data.downcast::<ContainerState>() else {
        return;
    };
    let Some(container) = ty.container() else {
        return;
    };
    teardown_children(&state, container, true);
}

/// 逆序拆除全部子节点。`disconnect` 为假时表示边已在回退路径上断开。
fn teardown_children(state: &ContainerState, container: &ContainerType, disconnect: bool) {
    for idx in (0..state.children_len()).rev() {
        {
            let node = state.child_cell(idx).borrow();
            inspector::hooks::will_close_node(&node.meta().desc());
        }
        if disconnect {
            let conns = state.connections();
            for ci in (0..conns.len()).rev() {
                let conn = &conns[ci];
                let incident = usize::from(conn.src_idx) == idx || usize::from(conn.dst_idx) == idx;
                if incident && state.conn_active(ci) {
                    disconnect_edge_meta_less(state, ci);
                }
            }
        }
        (container.ops.remove)(state, idx as u16);
        state.child_cell(idx).borrow_mut().close_without_hook();
    }
}

/// 安装一条边：簿记先行提交（`did_connect_port` 紧随其后），再按目的端、
/// 源端的顺序执行连接回调；任何失败都把这条边还原为未安装。
fn connect_edge(state: &ContainerState, meta: &NodeMeta, ci: usize) -> Result<()> {
    let conn = &state.connections()[ci];
    state.set_conn_active(ci, true);
    emit_conn_event(state, conn, true);

    if let Err(err) = run_port_lifecycle(state, meta, conn, LifecycleSide::DstConnect) {
        emit_conn_event(state, conn, false);
        state.set_conn_active(ci, false);
        return Err(err);
    }
    if let Err(err) = run_port_lifecycle(state, meta, conn, LifecycleSide::SrcConnect) {
        // 目的端已成功，按“如同从未发生”的约定把它的簿记撤回。
        emit_conn_event(state, conn, false);
        if let Err(undo) = run_port_lifecycle(state, meta, conn, LifecycleSide::DstDisconnect) {
            log_warn!("flow", "rollback disconnect callback failed: {undo}");
        }
        state.set_conn_active(ci, false);
        return Err(err);
    }

    Ok(())
}

/// 断开一条边：`will_disconnect_port` 先于任何移除动作。
fn disconnect_edge(state: &ContainerState, meta: &NodeMeta, ci: usize, with_hook: bool) {
    let conn = &state.connections()[ci];
    if !state.conn_active(ci) {
        return;
    }
    if with_hook {
        emit_conn_event(state, conn, false);
    }
    if let Err(err) = run_port_lifecycle(state, meta, conn, LifecycleSide::SrcDisconnect) {
        log_warn!("flow", "source disconnect callback failed: {err}");
    }
    if let Err(err) = run_port_lifecycle(state, meta, conn, LifecycleSide::DstDisconnect) {
        log_warn!("flow", "destination disconnect callback failed: {err}");
    }
    state.set_conn_active(ci, false);
}

/// 拆除路径上的断边：此时容器元信息已不可用，回调仍需完整执行。
fn disconnect_edge_meta_less(state: &ContainerState, ci: usize) {
    let conn = &state.connections()[ci];
    emit_conn_event(state, conn, false);
    if let Err(err) = run_lifecycle_side(state, None, conn, LifecycleSide::SrcDisconnect) {
        log_warn!("flow", "source disconnect callback failed: {err}");
    }
    if let Err(err) = run_lifecycle_side(state, None, conn, LifecycleSide::DstDisconnect) {
        log_warn!("flow", "destination disconnect callback failed: {err}");
    }
    state.set_conn_active(ci, false);
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LifecycleSide {
    DstConnect,
    DstDisconnect,
    SrcConnect,
    SrcDisconnect,
}

fn run_port_lifecycle(
    state: &ContainerState,
    meta: &NodeMeta,
    conn: &Connection,
    side: LifecycleSide,
) -> Result<()> {
    run_lifecycle_side(state, Some(meta), conn, side)
}

fn run_lifecycle_side(
    state: &ContainerState,
    meta: Option<&NodeMeta>,
    conn: &Connection,
    side: LifecycleSide,
) -> Result<()> {
    let (idx, port, conn_id) = match side {
        LifecycleSide::DstConnect | LifecycleSide::DstDisconnect => {
            (conn.dst_idx, conn.dst_port, conn.dst_conn_id)
        }
        LifecycleSide::SrcConnect | LifecycleSide::SrcDisconnect => {
            (conn.src_idx, conn.src_port, conn.src_conn_id)
        }
    };

    let cell = state.child(idx)?;
    let Ok(mut node) = cell.try_borrow_mut() else {
        return Err(FlowError::new(
            ErrorKind::Busy,
            "port lifecycle callback on a node that is currently processing",
        ));
    };
    let (node_meta, data) = node.parts_mut();

    let callback = match side {
        LifecycleSide::DstConnect => node_meta.ty().port_in(port).and_then(|p| p.connect),
        LifecycleSide::DstDisconnect => node_meta.ty().port_in(port).and_then(|p| p.disconnect),
        LifecycleSide::SrcConnect => node_meta.ty().port_out(port).and_then(|p| p.connect),
        LifecycleSide::SrcDisconnect => node_meta.ty().port_out(port).and_then(|p| p.disconnect),
    };
    let Some(callback) = callback else {
        return Ok(());
    };
    let Some(data) = data.as_mut() else {
        return Err(FlowError::new(ErrorKind::NotFound, "node is already closed"));
    };

    match meta {
        Some(meta) => {
            let frame = Frame {
                state,
                meta,
                up: None,
            };
            let mut ctx = NodeContext::new(node_meta, Some(&frame), 0);
            callback(&mut ctx, &mut **data, port, conn_id)
        }
        None => {
            let mut ctx = NodeContext::new(node_meta, None, 0);
            callback(&mut ctx, &mut **data, port, conn_id)
        }
    }
}

/// 提交或撤销一条边的 Inspector 事件（`did_connect_port` / `will_disconnect_port`）。
fn emit_conn_event(state: &ContainerState, conn: &Connection, connect: bool) {
    let (Ok(src_cell), Ok(dst_cell)) = (state.child(conn.src_idx), state.child(conn.dst_idx))
    else {
        return;
    };
    let (Ok(src_node), Ok(dst_node)) = (src_cell.try_borrow(), dst_cell.try_borrow()) else {
        return;
    };
    let src_type = if conn.src_port == PORT_ERROR {
        crate::packet::ty::error().name()
    } else {
        src_node
            .ty()
            .port_out(conn.src_port)
            .map(|p| p.packet_type.name())
            .unwrap_or("?")
    };
    let dst_type = dst_node
        .ty()
        .port_in(conn.dst_port)
        .map(|p| p.packet_type.name())
        .unwrap_or("?");
    let desc = ConnDesc {
        src: src_node.meta().desc(),
        src_port: conn.src_port,
        src_type,
        dst: dst_node.meta().desc(),
        dst_port: conn.dst_port,
        dst_type,
        conn_id: conn.dst_conn_id,
    };
    if connect {
        inspector::hooks::did_connect_port(&desc);
    } else {
        inspector::hooks::will_disconnect_port(&desc);
    }
}

/// 容器导出输入口的 connect 适配：把生命周期转发给内部子端口。
pub(crate) fn exported_in_connect(
    ctx: &mut NodeContext<'_>,
    data: &mut dyn Any,
    port: u16,
    _conn_id: u16,
) -> Result<()> {
    forward_exported_lifecycle(ctx, data, port, ExportedSide::InConnect)
}

/// 容器导出输入口的 disconnect 适配。
pub(crate) fn exported_in_disconnect(
    ctx: &mut NodeContext<'_>,
    data: &mut dyn Any,
    port: u16,
    _conn_id: u16,
) -> Result<()> {
    forward_exported_lifecycle(ctx, data, port, ExportedSide::InDisconnect)
}

/// 容器导出输出口的 connect 适配。
pub(crate) fn exported_out_connect(
    ctx: &mut NodeContext<'_>,
    data: &mut dyn Any,
    port: u16,
    _conn_id: u16,
) -> Result<()> {
    forward_exported_lifecycle(ctx, data, port, ExportedSide::OutConnect)
}

/// 容器导出输出口的 disconnect 适配。
pub(crate) fn exported_out_disconnect(
    ctx: &mut NodeContext<'_>,
    data: &mut dyn Any,
    port: u16,
    _conn_id: u16,
) -> Result<()> {
    forward_exported_lifecycle(ctx, data, port, ExportedSide::OutDisconnect)
}

#[derive(Clone, Copy)]
enum ExportedSide {
    InConnect,
    InDisconnect,
    OutConnect,
    OutDisconnect,
}

fn forward_exported_lifecycle(
    ctx: &mut NodeContext<'_>,
    data: &mut dyn Any,
    port: u16,
    side: ExportedSide,
) -> Result<()> {
    let Some(state) = data.downcast_ref::<ContainerState>() else {
        return Err(FlowError::new(
            ErrorKind::NotFound,
            "container instance carries no flow state",
        ));
    };
    let export = match side {
        ExportedSide::InConnect | ExportedSide::InDisconnect => {
            state.spec.exported_in.get(usize::from(port))
        }
        ExportedSide::OutConnect | ExportedSide::OutDisconnect => {
            state.spec.exported_out.get(usize::from(port))
        }
    };
    let Some(export) = export else {
        return Err(FlowError::new(
            ErrorKind::InvalidPort,
            alloc::format!("container has no exported port {port}"),
        ));
    };

    let cell = state.child(export.child_idx)?;
    let Ok(mut node) = cell.try_borrow_mut() else {
        return Err(FlowError::new(
            ErrorKind::Busy,
            "exported port lifecycle on a busy inner node",
        ));
    };
    let (node_meta, node_data) = node.parts_mut();
    let callback = match side {
        ExportedSide::InConnect => node_meta
            .ty()
            .port_in(export.child_port)
            .and_then(|p| p.connect),
        ExportedSide::InDisconnect => node_meta
            .ty()
            .port_in(export.child_port)
            .and_then(|p| p.disconnect),
        ExportedSide::OutConnect => node_meta
            .ty()
            .port_out(export.child_port)
            .and_then(|p| p.connect),
        ExportedSide::OutDisconnect => node_meta
            .ty()
            .port_out(export.child_port)
            .and_then(|p| p.disconnect),
    };
    let Some(callback) = callback else {
        return Ok(());
    };
    let Some(node_data) = node_data.as_mut() else {
        return Err(FlowError::new(ErrorKind::NotFound, "inner node is already closed"));
    };

    let frame = Frame {
        state,
        meta: ctx.meta(),
        up: ctx.frame(),
    };
    let mut inner_ctx = NodeContext::new(node_meta, Some(&frame), 0);
    callback(&mut inner_ctx, &mut **node_data, export.child_port, export.conn_id)
}
