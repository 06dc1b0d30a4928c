//! 节点类型描述符。
//!
//! # 设计背景（Why）
//! - 节点类型是数据驱动的记录而非 Trait 实现：容器类型需要在运行期由静态
//!   规格批量构造，函数指针加描述字段的形式保持类型可克隆、可内省。
//! - 原始 C ABI 的 `data_size`/`options_size` 字节数被 `Box<dyn Any>` 私有
//!   数据与 Schema 驱动的选项记录取代；端口数量以切片长度表达。
//!
//! # 契约说明（What）
//! - `init_type` 在每个类型上至多执行一次，由首次使用标志保护；
//! - `flags` 的 bit 0 标记容器类型，容器的成员操作表（send/add/remove）
//!   按需解析（见 [`crate::flow`]）。

use alloc::borrow::Cow;
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::Any;
use core::fmt;

use spin::Once;

use crate::error::Result;
use crate::flow::container::ContainerType;
use crate::options::{OptionsRecord, OptionsSchema};
use crate::port::{PortInType, PortOutType};

use super::instance::{NodeMeta, OpenContext};

/// 节点类型标志位。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeTypeFlags(u16);

impl NodeTypeFlags {
    /// 容器类型：实例持有子节点并在其间路由包。
    pub const CONTAINER: Self = Self(1);

    /// 由原始位构造。
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// 原始位。
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// 是否包含给定标志。
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// 实例构造回调：返回实例私有数据。
pub type OpenFn = fn(&NodeType, &OpenContext<'_>, &OptionsRecord) -> Result<Box<dyn Any>>;

/// 实例析构回调：接收被取出的私有数据。
pub type CloseFn = fn(&NodeType, &NodeMeta, Box<dyn Any>);

/// 一次性的类型级初始化回调。
pub type InitTypeFn = fn(&NodeType) -> Result<()>;

/// 类型级析构回调。
pub type DisposeTypeFn = fn(&NodeType);

/// 节点类型：名称、分类、端口表、选项 Schema 与生命周期回调。
pub struct NodeType {
    name: Cow<'static, str>,
    category: Cow<'static, str>,
    version: u16,
    flags: NodeTypeFlags,
    options: OptionsSchema,
    ports_in: Vec<PortInType>,
    ports_out: Vec<PortOutType>,
    open: Option<OpenFn>,
    close: Option<CloseFn>,
    init_type: Option<InitTypeFn>,
    dispose_type: Option<DisposeTypeFn>,
    init_guard: Once<()>,
    pub(crate) container: Option<ContainerType>,
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeType")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("version", &self.version)
            .field("flags", &self.flags)
            .field("ports_in", &self.ports_in.len())
            .field("ports_out", &self.ports_out.len())
            .finish_non_exhaustive()
    }
}

impl NodeType {
    /// 开始构造一个节点类型。
    pub fn builder(name: impl Into<Cow<'static, str>>) -> NodeTypeBuilder {
        NodeTypeBuilder {
            name: name.into(),
            category: Cow::Borrowed(""),
            version: 1,
            flags: NodeTypeFlags::default(),
            options: OptionsSchema::empty(),
            ports_in: Vec::new(),
            ports_out: Vec::new(),
            open: None,
            close: None,
            init_type: None,
            dispose_type: None,
            container: None,
        }
    }

    /// 类型名。
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 斜杠分隔的分类路径。
    pub fn category(&self) -> &str {
        &self.category
    }

    /// 类型版本。
    pub fn version(&self) -> u16 {
        self.version
    }

    /// 标志位。
    pub fn flags(&self) -> NodeTypeFlags {
        self.flags
    }

    /// 是否为容器类型。
    pub fn is_container(&self) -> bool {
        self.flags.contains(NodeTypeFlags::CONTAINER)
    }

    /// 选项 Schema。
    pub fn options(&self) -> &OptionsSchema {
        &self.options
    }

    /// 输入端口表。
    pub fn ports_in(&self) -> &[PortInType] {
        &self.ports_in
    }

    /// 输出端口表。
    pub fn ports_out(&self) -> &[PortOutType] {
        &self.ports_out
    }

    /// 按索引取输入端口。
    pub fn port_in(&self, port: u16) -> Option<&PortInType> {
        self.ports_in.get(usize::from(port))
    }

    /// 按索引取输出端口。保留的错误端口不在表内。
    pub fn port_out(&self, port: u16) -> Option<&PortOutType> {
        self.ports_out.get(usize::from(port))
    }

    pub(crate) fn open_fn(&self) -> Option<OpenFn> {
        self.open
    }

    pub(crate) fn close_fn(&self) -> Option<CloseFn> {
        self.close
    }

    pub(crate) fn dispose_type_fn(&self) -> Option<DisposeTypeFn> {
        self.dispose_type
    }

    pub(crate) fn container(&self) -> Option<&ContainerType> {
        self.container.as_ref()
    }

    /// 运行一次性的类型初始化；后续调用为空操作。
    pub(crate) fn ensure_init(self: &Arc<Self>) -> Result<()> {
        let mut result = Ok(());
        if let Some(init) = self.init_type {
            self.init_guard.call_once(|| {
                result = init(self);
            });
        }
        result
    }
}

/// 节点类型构造器。
pub struct NodeTypeBuilder {
    name: Cow<'static, str>,
    category: Cow<'static, str>,
    version: u16,
    flags: NodeTypeFlags,
    options: OptionsSchema,
    ports_in: Vec<PortInType>,
    ports_out: Vec<PortOutType>,
    open: Option<OpenFn>,
    close: Option<CloseFn>,
    init_type: Option<InitTypeFn>,
    dispose_type: Option<DisposeTypeFn>,
    container: Option<ContainerType>,
}

impl NodeTypeBuilder {
    /// 设置分类路径。
    pub fn category(mut self, category: impl Into<Cow<'static, str>>) -> Self {
        self.category = category.into();
        self
    }

    /// 设置版本。
    pub fn version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    /// 设置选项 Schema。
    pub fn options(mut self, options: OptionsSchema) -> Self {
        self.options = options;
        self
    }

    /// 追加一个输入端口。
    pub fn port_in(mut self, port: PortInType) -> Self {
        self.ports_in.push(port);
        self
    }

    /// 追加一个输出端口。
    pub fn port_out(mut self, port: PortOutType) -> Self {
        self.ports_out.push(port);
        self
    }

    /// 设置实例构造回调。
    pub fn open(mut self, open: OpenFn) -> Self {
        self.open = Some(open);
        self
    }

    /// 设置实例析构回调。
    pub fn close(mut self, close: CloseFn) -> Self {
        self.close = Some(close);
        self
    }

    /// 设置一次性类型初始化回调。
    pub fn init_type(mut self, init_type: InitTypeFn) -> Self {
        self.init_type = Some(init_type);
        self
    }

    /// 设置类型级析构回调。
    pub fn dispose_type(mut self, dispose_type: DisposeTypeFn) -> Self {
        self.dispose_type = Some(dispose_type);
        self
    }

    pub(crate) fn flags(mut self, flags: NodeTypeFlags) -> Self {
        self.flags = flags;
        self
    }

    pub(crate) fn container(mut self, container: ContainerType) -> Self {
        self.container = Some(container);
        self
    }

    /// 完成构造。
    pub fn build(self) -> Arc<NodeType> {
        Arc::new(NodeType {
            name: self.name,
            category: self.category,
            version: self.version,
            flags: self.flags,
            options: self.options,
            ports_in: self.ports_in,
            ports_out: self.ports_out,
            open: self.open,
            close: self.close,
            init_type: self.init_type,
            dispose_type: self.dispose_type,
            init_guard: Once::new(),
            container: self.container,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    static INIT_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counting_init(_ty: &NodeType) -> Result<()> {
        INIT_CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// `init_type` 由首次使用标志保护，同一类型至多执行一次。
    #[test]
    fn init_type_runs_at_most_once() {
        let ty = NodeType::builder("probe/init-once")
            .init_type(counting_init)
            .build();

        ty.ensure_init().unwrap();
        ty.ensure_init().unwrap();
        assert_eq!(INIT_CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn container_flag_is_bit_zero() {
        assert_eq!(NodeTypeFlags::CONTAINER.bits(), 1);
        let flags = NodeTypeFlags::from_bits(1);
        assert!(flags.contains(NodeTypeFlags::CONTAINER));
        assert!(!NodeTypeFlags::default().contains(NodeTypeFlags::CONTAINER));
    }
}
