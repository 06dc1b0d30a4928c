//! 静态流规格：子节点、连接表与导出端口的声明与校验。
//!
//! # 设计背景（Why）
//! - 连接表必须按 (src_idx, src_port, dst_idx, dst_port) 预排序：排序不变式
//!   让分发以二分定位运行段，也让 conn-id 在容器生命周期内保持稳定、稠密。
//! - C 风格的哨兵终结数组由切片长度取代；排序前置条件保留，未排序的规格
//!   在类型构造期即被拒绝。
//!
//! # 契约说明（What）
//! - `build_type` 校验：子索引与端口存在、端口类型兼容（`ANY` 通配）、
//!   连接表严格升序（完全相同的边视为重复连接）；
//! - 导出端口经间接表解析成容器自身的端口，类型取自内部子端口（导出不
//!   引入包拷贝）。

use alloc::borrow::Cow;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::error::{ErrorKind, FlowError, Result};
use crate::node::{DisposeTypeFn, NodeType, NodeTypeFlags};
use crate::options::OptionsRecord;
use crate::packet::{PacketType, PacketTypeRef};
use crate::port::{PortInType, PortOutType, PORT_ERROR};

use super::container::{self, ContainerType};

/// 一条连接的声明：同一容器内从输出端口到输入端口的有向边。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnSpec {
    pub src: u16,
    pub src_port: u16,
    pub dst: u16,
    pub dst_port: u16,
}

impl ConnSpec {
    fn key(&self) -> (u16, u16, u16, u16) {
        (self.src, self.src_port, self.dst, self.dst_port)
    }
}

/// 导出端口声明：把容器的某个端口别名到指定子节点的端口。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExportSpec {
    pub child: u16,
    pub port: u16,
}

/// 实例化时改写子节点选项的钩子。
pub type ChildOptsSetFn = fn(u16, &mut OptionsRecord);

/// 解析完毕的连接：声明字段加稠密 conn-id。
///
/// # 不变式（What）
/// - `src_conn_id` 在 (src_idx, src_port) 的出边序列内稠密、从 0 起；
/// - `dst_conn_id` 在 (dst_idx, dst_port) 的入边序列内稠密、从 0 起；
/// - 两者在容器生命周期内稳定。
#[derive(Clone, Copy, Debug)]
pub struct Connection {
    pub src_idx: u16,
    pub src_port: u16,
    pub dst_idx: u16,
    pub dst_port: u16,
    pub(crate) src_conn_id: u16,
    pub(crate) dst_conn_id: u16,
}

impl Connection {
    /// 出向 conn-id（源端口出边序列内的序号）。
    pub fn src_conn_id(&self) -> u16 {
        self.src_conn_id
    }

    /// 入向 conn-id（目的端口入边序列内的序号）。
    pub fn dst_conn_id(&self) -> u16 {
        self.dst_conn_id
    }
}

#[derive(Debug)]
pub(crate) struct ResolvedExport {
    pub child_idx: u16,
    pub child_port: u16,
    /// 导出输入口向内投递时使用的入向 conn-id。
    pub conn_id: u16,
}

#[derive(Debug)]
pub(crate) struct ChildSpec {
    pub ty: Arc<NodeType>,
    pub name: String,
    pub opts: OptionsRecord,
}

/// 解析完毕、可被容器类型共享的规格数据。
#[derive(Debug)]
pub(crate) struct FlowSpecData {
    pub children: Vec<ChildSpec>,
    pub connections: Vec<Connection>,
    pub exported_in: Vec<ResolvedExport>,
    pub exported_out: Vec<ResolvedExport>,
    pub child_opts_set: Option<ChildOptsSetFn>,
}

/// 静态流规格的声明构造器。
///
/// # 使用方式（How）
/// ```rust
/// use rill_core::flow::StaticFlowSpec;
/// use rill_core::test_stubs;
///
/// let ty = StaticFlowSpec::new()
///     .child_with_opts("src", test_stubs::int_generator(), &["value=7"])
///     .child("sink", test_stubs::int_sink())
///     .connect(0, 0, 1, 0)
///     .build_type("demo/pair")
///     .unwrap();
/// assert!(ty.is_container());
/// ```
#[derive(Default)]
pub struct StaticFlowSpec {
    children: Vec<(String, Arc<NodeType>, Vec<String>)>,
    connections: Vec<ConnSpec>,
    exported_in: Vec<ExportSpec>,
    exported_out: Vec<ExportSpec>,
    child_opts_set: Option<ChildOptsSetFn>,
    dispose_type: Option<DisposeTypeFn>,
}

impl StaticFlowSpec {
    /// 空规格。
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个子节点（无选项条目）。
    pub fn child(self, name: impl Into<String>, ty: Arc<NodeType>) -> Self {
        self.child_with_opts(name, ty, &[])
    }

    /// 追加一个带 `key=value` 选项条目的子节点。
    pub fn child_with_opts(
        mut self,
        name: impl Into<String>,
        ty: Arc<NodeType>,
        opts: &[&str],
    ) -> Self {
        self.children
            .push((name.into(), ty, opts.iter().map(|s| String::from(*s)).collect()));
        self
    }

    /// 追加一条连接。连接表必须按 (src, src_port, dst, dst_port) 升序给出。
    pub fn connect(mut self, src: u16, src_port: u16, dst: u16, dst_port: u16) -> Self {
        self.connections.push(ConnSpec {
            src,
            src_port,
            dst,
            dst_port,
        });
        self
    }

    /// 导出一个输入端口（外部索引即追加顺序）。
    pub fn export_in(mut self, child: u16, port: u16) -> Self {
        self.exported_in.push(ExportSpec { child, port });
        self
    }

    /// 导出一个输出端口（外部索引即追加顺序）。
    pub fn export_out(mut self, child: u16, port: u16) -> Self {
        self.exported_out.push(ExportSpec { child, port });
        self
    }

    /// 设置子节点选项改写钩子。
    pub fn child_opts_set(mut self, hook: ChildOptsSetFn) -> Self {
        self.child_opts_set = Some(hook);
        self
    }

    /// 设置类型级析构钩子。
    pub fn dispose_type(mut self, dispose: DisposeTypeFn) -> Self {
        self.dispose_type = Some(dispose);
        self
    }

    fn child_ty(&self, idx: u16) -> Result<&Arc<NodeType>> {
        self.children
            .get(usize::from(idx))
            .map(|(_, ty, _)| ty)
            .ok_or_else(|| {
                FlowError::new(
                    ErrorKind::NotFound,
                    alloc::format!("spec references missing child {idx}"),
                )
            })
    }

    fn out_port_type(&self, idx: u16, port: u16) -> Result<PacketTypeRef> {
        if port == PORT_ERROR {
            return Ok(crate::packet::ty::error().clone());
        }
        let ty = self.child_ty(idx)?;
        ty.port_out(port)
            .map(|p| p.packet_type.clone())
            .ok_or_else(|| {
                FlowError::new(
                    ErrorKind::InvalidPort,
                    alloc::format!("child {idx} (`{}`) has no output port {port}", ty.name()),
                )
            })
    }

    fn in_port_type(&self, idx: u16, port: u16) -> Result<PacketTypeRef> {
        let ty = self.child_ty(idx)?;
        ty.port_in(port)
            .map(|p| p.packet_type.clone())
            .ok_or_else(|| {
                FlowError::new(
                    ErrorKind::InvalidPort,
                    alloc::format!("child {idx} (`{}`) has no input port {port}", ty.name()),
                )
            })
    }

    /// 校验规格并派生容器节点类型。
    ///
    /// # 错误语义（What）
    /// - 连接表乱序：[`ErrorKind::InvalidPort`]（附带说明）；完全相同的边：
    ///   [`ErrorKind::AlreadyConnected`]；
    /// - 索引越界：[`ErrorKind::NotFound`] / [`ErrorKind::InvalidPort`]；
    /// - 端口类型不兼容：[`ErrorKind::TypeMismatch`]。
    pub fn build_type(self, name: impl Into<Cow<'static, str>>) -> Result<Arc<NodeType>> {
        // 排序与重复检查先行，后续二分定位依赖这一不变式。
        for window in self.connections.windows(2) {
            if window[0].key() == window[1].key() {
                return Err(FlowError::new(
                    ErrorKind::AlreadyConnected,
                    alloc::format!(
                        "duplicate connection {}:{} -> {}:{}",
                        window[0].src, window[0].src_port, window[0].dst, window[0].dst_port
                    ),
                ));
            }
            if window[0].key() > window[1].key() {
                return Err(FlowError::new(
                    ErrorKind::InvalidPort,
                    "connection array is not sorted by (src, src_port, dst, dst_port)",
                ));
            }
        }

        let mut src_counters: BTreeMap<(u16, u16), u16> = BTreeMap::new();
        let mut dst_counters: BTreeMap<(u16, u16), u16> = BTreeMap::new();
        let mut connections = Vec::with_capacity(self.connections.len());
        for conn in &self.connections {
            let src_type = self.out_port_type(conn.src, conn.src_port)?;
            let dst_type = self.in_port_type(conn.dst, conn.dst_port)?;
            if !PacketType::accepts(&dst_type, &src_type) {
                return Err(FlowError::new(
                    ErrorKind::TypeMismatch,
                    alloc::format!(
                        "connection {}:{} -> {}:{} carries `{}` into a `{}` port",
                        conn.src,
                        conn.src_port,
                        conn.dst,
                        conn.dst_port,
                        src_type.name(),
                        dst_type.name()
                    ),
                ));
            }

            let src_slot = src_counters.entry((conn.src, conn.src_port)).or_insert(0);
            let dst_slot = dst_counters.entry((conn.dst, conn.dst_port)).or_insert(0);
            connections.push(Connection {
                src_idx: conn.src,
                src_port: conn.src_port,
                dst_idx: conn.dst,
                dst_port: conn.dst_port,
                src_conn_id: *src_slot,
                dst_conn_id: *dst_slot,
            });
            *src_slot += 1;
            *dst_slot += 1;
        }

        // 导出端口解析：容器自身端口的类型取自内部子端口，解析失败即拒绝规格。
        let mut ports_in = Vec::with_capacity(self.exported_in.len());
        let mut exported_in = Vec::with_capacity(self.exported_in.len());
        for export in &self.exported_in {
            let inner_type = self.in_port_type(export.child, export.port)?;
            let table_edges = dst_counters
                .get(&(export.child, export.port))
                .copied()
                .unwrap_or(0);
            let sibling_exports = exported_in
                .iter()
                .filter(|r: &&ResolvedExport| {
                    r.child_idx == export.child && r.child_port == export.port
                })
                .count() as u16;
            exported_in.push(ResolvedExport {
                child_idx: export.child,
                child_port: export.port,
                conn_id: table_edges + sibling_exports,
            });
            ports_in.push(
                PortInType::new(inner_type)
                    .with_connect(container::exported_in_connect)
                    .with_disconnect(container::exported_in_disconnect),
            );
        }

        let mut ports_out = Vec::with_capacity(self.exported_out.len());
        let mut exported_out = Vec::with_capacity(self.exported_out.len());
        for export in &self.exported_out {
            let inner_type = self.out_port_type(export.child, export.port)?;
            exported_out.push(ResolvedExport {
                child_idx: export.child,
                child_port: export.port,
                conn_id: 0,
            });
            ports_out.push(
                PortOutType::new(inner_type)
                    .with_connect(container::exported_out_connect)
                    .with_disconnect(container::exported_out_disconnect),
            );
        }

        // 子节点选项在类型构造期解析完毕，实例化阶段只做克隆与改写。
        let mut children = Vec::with_capacity(self.children.len());
        for (name, ty, entries) in &self.children {
            let opts = ty
                .options()
                .parse(entries.iter().map(String::as_str))?;
            children.push(ChildSpec {
                ty: ty.clone(),
                name: name.clone(),
                opts,
            });
        }

        let data = Arc::new(FlowSpecData {
            children,
            connections,
            exported_in,
            exported_out,
            child_opts_set: self.child_opts_set,
        });

        let mut builder = NodeType::builder(name)
            .category("flow/container")
            .flags(NodeTypeFlags::CONTAINER)
            .open(container::container_open)
            .close(container::container_close)
            .container(ContainerType {
                spec: data,
                ops: container::static_flow_ops(),
            });
        for port in ports_in {
            builder = builder.port_in(port);
        }
        for port in ports_out {
            builder = builder.port_out(port);
        }
        if let Some(dispose) = self.dispose_type {
            builder = builder.dispose_type(dispose);
        }
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::ty;

    fn pair_types() -> (Arc<NodeType>, Arc<NodeType>) {
        let src = NodeType::builder("probe/out-int")
            .port_out(PortOutType::new(ty::irange().clone()))
            .build();
        let dst = NodeType::builder("probe/in-int")
            .port_in(PortInType::new(ty::irange().clone()))
            .build();
        (src, dst)
    }

    #[test]
    fn unsorted_connection_arrays_are_rejected() {
        let (src, dst) = pair_types();
        let err = StaticFlowSpec::new()
            .child("a", src.clone())
            .child("b", dst.clone())
            .child("c", dst)
            .connect(0, 0, 2, 0)
            .connect(0, 0, 1, 0)
            .build_type("probe/unsorted")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPort);
    }

    #[test]
    fn duplicate_edges_are_rejected() {
        let (src, dst) = pair_types();
        let err = StaticFlowSpec::new()
            .child("a", src)
            .child("b", dst)
            .connect(0, 0, 1, 0)
            .connect(0, 0, 1, 0)
            .build_type("probe/duplicate")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyConnected);
    }

    #[test]
    fn type_incompatible_edges_are_rejected() {
        let src = NodeType::builder("probe/out-string")
            .port_out(PortOutType::new(ty::string().clone()))
            .build();
        let dst = NodeType::builder("probe/in-int-strict")
            .port_in(PortInType::new(ty::irange().clone()))
            .build();
        let err = StaticFlowSpec::new()
            .child("a", src)
            .child("b", dst)
            .connect(0, 0, 1, 0)
            .build_type("probe/mismatch")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn conn_ids_are_dense_per_endpoint() {
        let (src, dst) = pair_types();
        let ty = StaticFlowSpec::new()
            .child("a", src.clone())
            .child("b", src)
            .child("c", dst)
            .connect(0, 0, 2, 0)
            .connect(1, 0, 2, 0)
            .build_type("probe/dense-ids")
            .unwrap();

        let spec = &ty.container().unwrap().spec;
        assert_eq!(spec.connections[0].src_conn_id(), 0);
        assert_eq!(spec.connections[0].dst_conn_id(), 0);
        assert_eq!(spec.connections[1].src_conn_id(), 0);
        assert_eq!(spec.connections[1].dst_conn_id(), 1);
    }

    #[test]
    fn exported_ports_resolve_inner_types() {
        let (src, dst) = pair_types();
        let ty = StaticFlowSpec::new()
            .child("a", src)
            .child("b", dst)
            .connect(0, 0, 1, 0)
            .export_in(1, 0)
            .export_out(0, 0)
            .build_type("probe/exported")
            .unwrap();

        assert!(ty.is_container());
        assert_eq!(ty.ports_in().len(), 1);
        assert_eq!(ty.ports_out().len(), 1);
        assert!(PacketType::same(
            &ty.ports_in()[0].packet_type,
            ty::irange()
        ));
        // 表内已有一条边指向 (1, 0)，导出输入口拿到下一个稠密 conn-id。
        assert_eq!(ty.container().unwrap().spec.exported_in[0].conn_id, 1);
    }

    #[test]
    fn missing_children_and_ports_are_rejected() {
        let (src, dst) = pair_types();
        let err = StaticFlowSpec::new()
            .child("a", src.clone())
            .child("b", dst.clone())
            .connect(0, 0, 5, 0)
            .build_type("probe/missing-child")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = StaticFlowSpec::new()
            .child("a", src)
            .child("b", dst)
            .connect(0, 3, 1, 0)
            .build_type("probe/missing-port")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPort);
    }
}
