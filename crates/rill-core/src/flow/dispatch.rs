//! 分发协议：send/deliver、扇出克隆与嵌套导出路由。
//!
//! # 设计背景（Why）
//! - 投递在单线程里同步完成：`process` 里再次 `send` 构成递归分发。递归
//!   深度以 [`MAX_DISPATCH_DEPTH`] 为界，超限与重入统一转入容器的待投
//!   队列，由最外层分发帧排空——最外层 `send` 返回前队列必为空，因而
//!   “`process` 内发出的包先于原始 `send` 返回被观察到”的顺序保证成立。
//! - 父链不落盘：[`Frame`] 是分发期间栈上构造的借用链，子到父的回指
//!   随调用栈存在，天然不会延长父容器的生命周期。
//!
//! # 契约说明（What）
//! - 同一容器内按连接表顺序投递；扇出 ≥ 2 时每个额外目的地得到独立克隆
//!   （BLOB 仅递增引用计数），最后一个目的地消费原包。
//! - 经导出端口的转发只查间接表，不引入包拷贝。

use alloc::vec::Vec;

use crate::error::{ErrorKind, FlowError, Result};
use crate::inspector;
use crate::node::{NodeContext, NodeMeta};
use crate::observability::{log_info, log_warn};
use crate::packet::Packet;
use crate::port::PORT_ERROR;

use super::container::{ContainerState, Pending};

/// 同步递归分发的深度上限；超限的投递转入待投队列。
pub(crate) const MAX_DISPATCH_DEPTH: usize = 64;

/// 分发帧：当前容器状态、容器自身元信息与指向父帧的借用链。
#[derive(Clone, Copy)]
pub(crate) struct Frame<'a> {
    pub state: &'a ContainerState,
    pub meta: &'a NodeMeta,
    pub up: Option<&'a Frame<'a>>,
}

/// 经父容器的成员操作表转发一次子节点的 `send`。
pub(crate) fn container_send(
    frame: &Frame<'_>,
    src_idx: u16,
    src_port: u16,
    packet: Packet,
    depth: usize,
) -> Result<()> {
    match frame.meta.ty().container() {
        Some(container) => (container.ops.send)(frame, src_idx, src_port, packet, depth),
        None => Err(FlowError::new(
            ErrorKind::NotFound,
            "send through a parent that is not a container",
        )),
    }
}

fn next_packet(slot: &mut Option<Packet>, last: bool) -> Packet {
    if last {
        slot.take().unwrap_or_else(Packet::new_empty)
    } else {
        slot.as_ref().map(Packet::clone).unwrap_or_else(Packet::new_empty)
    }
}

/// 静态流容器的路由实现。
///
/// # 执行步骤（How）
/// 1. 排序不变式下二分定位 (src_idx, src_port) 的连续运行段，线性收集
///    活跃边；
/// 2. 叠加导出输出口的向上转发目标；
/// 3. 逐目的地投递（最后一个消费原包），投递失败记 WARN、继续投递并在
///    末尾上抛首个错误；
/// 4. 排空本容器的待投队列。
pub(crate) fn static_flow_send(
    frame: &Frame<'_>,
    src_idx: u16,
    src_port: u16,
    packet: Packet,
    depth: usize,
) -> Result<()> {
    let conns = frame.state.connections();
    let start = conns.partition_point(|c| (c.src_idx, c.src_port) < (src_idx, src_port));

    let mut local: Vec<usize> = Vec::new();
    let mut i = start;
    while i < conns.len() && conns[i].src_idx == src_idx && conns[i].src_port == src_port {
        if frame.state.conn_active(i) {
            local.push(i);
        }
        i += 1;
    }

    let exports: Vec<u16> = frame
        .state
        .spec
        .exported_out
        .iter()
        .enumerate()
        .filter(|(_, e)| e.child_idx == src_idx && e.child_port == src_port)
        .map(|(outer, _)| outer as u16)
        .collect();

    let total = local.len() + exports.len();
    if total == 0 {
        if src_port == PORT_ERROR {
            log_info!("flow", "error packet {packet} dropped: error port unconnected");
        }
        return Ok(());
    }

    let mut slot = Some(packet);
    let mut consumed = 0usize;
    let mut first_err: Option<FlowError> = None;

    for ci in local {
        consumed += 1;
        let pkt = next_packet(&mut slot, consumed == total);
        let conn = &conns[ci];
        if let Err(err) = deliver(frame, conn.dst_idx, conn.dst_port, conn.dst_conn_id, pkt, depth + 1)
        {
            log_warn!("flow", "delivery to child {} failed: {err}", conn.dst_idx);
            if first_err.is_none() {
                first_err = Some(err);
            }
        }
    }

    for outer_port in exports {
        consumed += 1;
        let pkt = next_packet(&mut slot, consumed == total);
        match (frame.up, frame.meta.parent_slot()) {
            (Some(up), Some(slot_idx)) => {
                if let Err(err) = container_send(up, slot_idx, outer_port, pkt, depth + 1) {
                    log_warn!("flow", "upward forward on port {outer_port} failed: {err}");
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
            _ => {
                log_info!(
                    "flow",
                    "packet {pkt} dropped at root exported output port {outer_port}"
                );
            }
        }
    }

    let drained = drain(frame);
    match first_err {
        Some(err) => Err(err),
        None => drained,
    }
}

/// 一次投递尝试的结局。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DeliverOutcome {
    /// 目的端口的 `process` 已同步执行完毕（或转交给了内层容器）。
    Done,
    /// 目的节点繁忙或深度超限，包已转入本容器的待投队列。
    Queued,
}

/// 向容器内的指定子端口投递一个包。
///
/// # 行为逻辑（How）
/// - 深度超限或目的节点正在处理（重入）时转入待投队列并返回
///   [`DeliverOutcome::Queued`]；
/// - 目的地是容器时按导出输入口的间接表递归进入，不触发中间投递事件；
/// - 叶端口先触发 `will_deliver_packet`，再调用 `process`（包按借用传入）。
pub(crate) fn deliver(
    frame: &Frame<'_>,
    dst_idx: u16,
    dst_port: u16,
    conn_id: u16,
    packet: Packet,
    depth: usize,
) -> Result<DeliverOutcome> {
    if depth > MAX_DISPATCH_DEPTH {
        frame.state.enqueue(Pending {
            dst_idx,
            dst_port,
            conn_id,
            packet,
        });
        return Ok(DeliverOutcome::Queued);
    }

    let cell = frame.state.child(dst_idx)?;
    let Ok(mut node) = cell.try_borrow_mut() else {
        frame.state.enqueue(Pending {
            dst_idx,
            dst_port,
            conn_id,
            packet,
        });
        return Ok(DeliverOutcome::Queued);
    };
    let node = &mut *node;
    let (meta, data) = node.parts_mut();
    let Some(data) = data.as_mut() else {
        return Err(FlowError::new(
            ErrorKind::NotFound,
            "destination node is closed",
        ));
    };

    if meta.ty().is_container() {
        let Some(state) = (**data).downcast_ref::<ContainerState>() else {
            return Err(FlowError::new(
                ErrorKind::NotFound,
                "container instance carries no flow state",
            ));
        };
        let inner = Frame {
            state,
            meta,
            up: Some(frame),
        };
        deliver_exported_in(&inner, dst_port, packet, depth)?;
        return Ok(DeliverOutcome::Done);
    }

    inspector::hooks::will_deliver_packet(&meta.desc(), dst_port, conn_id, &packet);
    if let Some(process) = meta.ty().port_in(dst_port).and_then(|p| p.process) {
        let mut ctx = NodeContext::new(meta, Some(frame), depth);
        process(&mut ctx, &mut **data, dst_port, conn_id, &packet)?;
    }
    Ok(DeliverOutcome::Done)
}

/// 把落在容器导出输入口上的包转交给指定的内部子端口。
pub(crate) fn deliver_exported_in(
    frame: &Frame<'_>,
    outer_port: u16,
    packet: Packet,
    depth: usize,
) -> Result<()> {
    let Some(export) = frame.state.spec.exported_in.get(usize::from(outer_port)) else {
        return Err(FlowError::new(
            ErrorKind::InvalidPort,
            alloc::format!("container has no exported input port {outer_port}"),
        ));
    };
    let result = deliver(
        frame,
        export.child_idx,
        export.child_port,
        export.conn_id,
        packet,
        depth + 1,
    )
    .map(|_| ());
    let drained = drain(frame);
    result.and(drained)
}

/// 排空容器的待投队列。
///
/// 排到队列为空或全部剩余目标都仍然繁忙为止：繁忙目标被重新入队，留给
/// 持有其借用的更外层分发帧，避免原地自旋。
pub(crate) fn drain(frame: &Frame<'_>) -> Result<()> {
    let mut stalled = 0usize;
    let mut first_err: Option<FlowError> = None;

    while let Some(pending) = frame.state.pop_pending() {
        match deliver(
            frame,
            pending.dst_idx,
            pending.dst_port,
            pending.conn_id,
            pending.packet,
            0,
        ) {
            Ok(DeliverOutcome::Done) => stalled = 0,
            Ok(DeliverOutcome::Queued) => {
                stalled += 1;
                if stalled >= frame.state.pending_len() {
                    break;
                }
            }
            Err(err) => {
                stalled = 0;
                log_warn!("flow", "queued delivery failed: {err}");
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
    }

    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
