//! 节点实例与回调上下文。

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use core::any::Any;

use crate::error::{ErrorKind, FlowError, Result};
use crate::flow::container::ContainerState;
use crate::flow::dispatch::{self, Frame};
use crate::inspector::{self, NodeDesc};
use crate::observability::log_info;
use crate::options::OptionsRecord;
use crate::packet::{Packet, PacketType};
use crate::port::PORT_ERROR;

use super::ty::NodeType;

/// 节点实例的只读元信息：类型、标识、父侧槽位与嵌套深度。
///
/// # 契约说明（What）
/// - `parent_slot` 是父容器登记的子索引（根节点为 `None`，对应
///   “`parent == null` 当且仅当根节点”的不变式）；
/// - `depth` 为祖先容器数量，供 Inspector 渲染嵌套层级。
#[derive(Debug)]
pub struct NodeMeta {
    ty: Arc<NodeType>,
    id: Option<String>,
    parent_slot: Option<u16>,
    depth: usize,
}

impl NodeMeta {
    /// 节点类型。
    pub fn ty(&self) -> &Arc<NodeType> {
        &self.ty
    }

    /// 节点标识；`None` 时以实例地址展示。
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// 父容器登记的子索引。
    pub fn parent_slot(&self) -> Option<u16> {
        self.parent_slot
    }

    /// 祖先容器数量。
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn desc(&self) -> NodeDesc<'_> {
        NodeDesc {
            id: self.id(),
            type_name: self.ty.name(),
            depth: self.depth,
        }
    }
}

/// `open` 回调可见的构造上下文。
pub struct OpenContext<'a> {
    meta: &'a NodeMeta,
}

impl OpenContext<'_> {
    /// 正在构造的节点的元信息。
    pub fn meta(&self) -> &NodeMeta {
        self.meta
    }

    /// 节点标识。
    pub fn id(&self) -> Option<&str> {
        self.meta.id()
    }

    /// 嵌套深度。
    pub fn depth(&self) -> usize {
        self.meta.depth()
    }
}

/// 节点回调期间可见的运行上下文：标识信息与 `send` 出口。
///
/// # 契约说明（What）
/// - [`NodeContext::send`] 是节点产生输出的唯一合法途径；包的所有权随调用
///   移交给运行时。
/// - 上下文仅在回调期间有效，不得保留。
pub struct NodeContext<'a> {
    meta: &'a NodeMeta,
    frame: Option<&'a Frame<'a>>,
    depth: usize,
}

impl<'a> NodeContext<'a> {
    pub(crate) fn new(meta: &'a NodeMeta, frame: Option<&'a Frame<'a>>, depth: usize) -> Self {
        Self { meta, frame, depth }
    }

    /// 本节点的元信息。
    pub fn meta(&self) -> &NodeMeta {
        self.meta
    }

    pub(crate) fn frame(&self) -> Option<&'a Frame<'a>> {
        self.frame
    }

    /// 在输出端口上发送一个包。
    ///
    /// # 契约说明（What）
    /// - **所有权**：`packet` 移交运行时；扇出时由分发器克隆。
    /// - **校验**：端口索引无效返回 [`ErrorKind::InvalidPort`]（并记 WARN）；
    ///   包类型与端口声明不符返回 [`ErrorKind::TypeMismatch`]，二者都不会
    ///   产生部分投递。
    /// - **错误端口**：`PORT_ERROR` 只接受错误包；无连接时静默丢弃并返回 `Ok`。
    pub fn send(&mut self, port: u16, packet: Packet) -> Result<()> {
        let port_type = if port == PORT_ERROR {
            crate::packet::ty::error()
        } else {
            match self.meta.ty().port_out(port) {
                Some(out) => &out.packet_type,
                None => {
                    let err = FlowError::new(
                        ErrorKind::InvalidPort,
                        alloc::format!(
                            "node type `{}` has no output port {port}",
                            self.meta.ty().name()
                        ),
                    );
                    crate::observability::log_warn!("flow", "{err}");
                    return Err(err);
                }
            }
        };
        if !PacketType::accepts(port_type, packet.ty()) {
            return Err(FlowError::new(
                ErrorKind::TypeMismatch,
                alloc::format!(
                    "port {port} of `{}` accepts `{}`, got `{}`",
                    self.meta.ty().name(),
                    port_type.name(),
                    packet.ty().name()
                ),
            ));
        }

        inspector::hooks::will_send_packet(&self.meta.desc(), port, &packet);

        match (self.frame, self.meta.parent_slot()) {
            (Some(frame), Some(slot)) => {
                dispatch::container_send(frame, slot, port, packet, self.depth + 1)
            }
            _ => {
                // 根层（无父容器）的输出没有去处，按丢弃处理。
                log_info!(
                    "flow",
                    "packet {packet} from parentless node dropped at port {port}"
                );
                Ok(())
            }
        }
    }

    /// 以 (code, message) 构造错误包并经保留的错误端口发出。
    pub fn send_error(&mut self, code: i32, message: impl Into<String>) -> Result<()> {
        self.send(PORT_ERROR, Packet::new_error(code, message))
    }
}

/// 运行中的节点实例。
///
/// # 设计背景（Why）
/// - 容器独占拥有子节点（`Vec<RefCell<Node>>`）；子到父的回指不以指针存储，
///   而是在分发期间以借用的栈上帧链传递——回指在类型系统层面不可能延长
///   父节点的生命周期。
///
/// # 生命周期（What）
/// - 构造顺序：分配元信息 → 复制 id → Inspector `did_open_node` →
///   `type.open`；`open` 失败则按相反顺序回退（`will_close_node` → 释放）。
/// - 析构顺序：Inspector `will_close_node` → `type.close` → 释放。
pub struct Node {
    meta: NodeMeta,
    data: Option<Box<dyn Any>>,
}

impl core::fmt::Debug for Node {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Node")
            .field("meta", &self.meta)
            .field("open", &self.data.is_some())
            .finish()
    }
}

impl Node {
    /// 以解析完毕的选项构造根层节点实例。
    pub fn new(ty: Arc<NodeType>, id: Option<&str>, opts: &OptionsRecord) -> Result<Self> {
        Self::new_child(ty, id, opts, None, 0)
    }

    pub(crate) fn new_child(
        ty: Arc<NodeType>,
        id: Option<&str>,
        opts: &OptionsRecord,
        parent_slot: Option<u16>,
        depth: usize,
    ) -> Result<Self> {
        ty.ensure_init()?;

        let meta = NodeMeta {
            ty,
            id: id.map(String::from),
            parent_slot,
            depth,
        };
        inspector::hooks::did_open_node(&meta.desc(), opts);

        let data: Box<dyn Any> = match meta.ty().open_fn() {
            Some(open) => {
                let ty = meta.ty().clone();
                match open(&ty, &OpenContext { meta: &meta }, opts) {
                    Ok(data) => data,
                    Err(err) => {
                        inspector::hooks::will_close_node(&meta.desc());
                        return Err(err);
                    }
                }
            }
            None => Box::new(()),
        };

        Ok(Self {
            meta,
            data: Some(data),
        })
    }

    /// 节点元信息。
    pub fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    /// 节点标识。
    pub fn id(&self) -> Option<&str> {
        self.meta.id()
    }

    /// 节点类型。
    pub fn ty(&self) -> &Arc<NodeType> {
        &self.meta.ty
    }

    /// 借用实例私有数据并向下转型。
    pub fn data_ref<T: 'static>(&self) -> Option<&T> {
        self.data.as_ref()?.downcast_ref::<T>()
    }

    pub(crate) fn parts_mut(&mut self) -> (&NodeMeta, &mut Option<Box<dyn Any>>) {
        (&self.meta, &mut self.data)
    }

    pub(crate) fn container_state(&self) -> Option<&ContainerState> {
        self.data.as_ref()?.downcast_ref::<ContainerState>()
    }

    /// 宿主侧注入：向本节点的输入端口投递一个包。
    ///
    /// # 行为逻辑（How）
    /// - 容器节点按导出输入口的间接表路由到内部子节点，不产生额外拷贝；
    /// - 叶节点直接调用端口的 `process` 回调，入向 conn-id 记 0。
    pub fn process(&mut self, port: u16, packet: &Packet) -> Result<()> {
        let (meta, data) = self.parts_mut();
        let Some(port_type) = meta.ty().port_in(port).map(|p| p.packet_type.clone()) else {
            return Err(FlowError::new(
                ErrorKind::InvalidPort,
                alloc::format!("node type `{}` has no input port {port}", meta.ty().name()),
            ));
        };
        if !PacketType::accepts(&port_type, packet.ty()) {
            return Err(FlowError::new(
                ErrorKind::TypeMismatch,
                alloc::format!(
                    "input port {port} of `{}` accepts `{}`, got `{}`",
                    meta.ty().name(),
                    port_type.name(),
                    packet.ty().name()
                ),
            ));
        }
        let Some(data) = data.as_mut() else {
            return Err(FlowError::new(
                ErrorKind::NotFound,
                "node is already closed",
            ));
        };

        if meta.ty().is_container() {
            let Some(state) = data.downcast_ref::<ContainerState>() else {
                return Err(FlowError::new(
                    ErrorKind::NotFound,
                    "container instance carries no flow state",
                ));
            };
            let frame = Frame {
                state,
                meta,
                up: None,
            };
            return dispatch::deliver_exported_in(&frame, port, packet.clone(), 0);
        }

        inspector::hooks::will_deliver_packet(&meta.desc(), port, 0, packet);
        if let Some(process) = meta.ty().port_in(port).and_then(|p| p.process) {
            let mut ctx = NodeContext::new(meta, None, 0);
            process(&mut ctx, &mut **data, port, 0, packet)?;
        }
        Ok(())
    }

    /// 关闭节点：Inspector `will_close_node` → `type.close` → 释放私有数据。
    ///
    /// 幂等：重复调用为空操作。
    pub fn close(&mut self) {
        if self.data.is_none() {
            return;
        }
        inspector::hooks::will_close_node(&self.meta.desc());
        self.close_without_hook();
    }

    pub(crate) fn close_without_hook(&mut self) {
        if let Some(data) = self.data.take() {
            if let Some(close) = self.meta.ty().close_fn() {
                let ty = self.meta.ty().clone();
                close(&ty, &self.meta, data);
            }
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionsSchema;

    fn data_probe_open(
        _ty: &NodeType,
        _ctx: &OpenContext<'_>,
        opts: &OptionsRecord,
    ) -> Result<Box<dyn Any>> {
        Ok(Box::new(opts.int("seed").map(|r| r.val).unwrap_or(0)))
    }

    #[test]
    fn open_copies_what_it_needs_from_options() {
        let ty = NodeType::builder("probe/open-data")
            .options(OptionsSchema::builder().int_value("seed", 11).build())
            .open(data_probe_open)
            .build();

        let opts = ty.options().parse(["seed=42"]).unwrap();
        let node = Node::new(ty, Some("probe"), &opts).unwrap();
        // 选项记录归调用方所有，open 已复制需要的值。
        drop(opts);
        assert_eq!(node.data_ref::<i32>(), Some(&42));
    }

    #[test]
    fn close_is_idempotent() {
        let ty = NodeType::builder("probe/idempotent-close").build();
        let opts = ty.options().defaults();
        let mut node = Node::new(ty, None, &opts).unwrap();
        node.close();
        node.close();
        assert!(node.data_ref::<()>().is_none());
    }

    #[test]
    fn process_rejects_unknown_input_ports() {
        let ty = NodeType::builder("probe/no-ports").build();
        let opts = ty.options().defaults();
        let mut node = Node::new(ty, None, &opts).unwrap();
        let err = node.process(0, &Packet::new_empty()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPort);
    }
}
