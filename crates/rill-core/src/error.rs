use alloc::borrow::Cow;
use alloc::boxed::Box;
use core::fmt;

/// `rill-core` 中所有错误必须实现的 `no_std` 基础 Trait。
///
/// # 设计背景（Why）
/// - `std::error::Error` 在 `no_std` 环境中不可用，而流程图的开闭、连接与分发
///   路径都需要携带可回溯的底层原因，因此定义一个对象安全、与平台无关的错误抽象。
///
/// # 逻辑解析（How）
/// - 约束实现者提供 `Debug` 与 `Display`，便于日志与 Inspector 输出。
/// - `source` 方法递归返回链路上的上游错误，保持与 `std::error::Error::source`
///   一致的语义，从而兼容现有生态的错误处理约定。
///
/// # 契约说明（What）
/// - **前置条件**：实现类型必须是 `'static` 生命周期。
/// - **后置条件**：`source` 返回的引用生命周期受限于 `self`，以防悬垂引用。
///
/// # 设计取舍与风险（Trade-offs）
/// - 未引入 `Send + Sync` 约束，避免对单线程协作式运行时强加多余负担；
///   需要跨线程传递时请使用 [`ErrorCause`] 别名。
pub trait Error: fmt::Debug + fmt::Display {
    /// 返回当前错误的上游来源。
    fn source(&self) -> Option<&(dyn Error + 'static)>;
}

impl<E> Error for Box<E>
where
    E: Error + ?Sized,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        (**self).source()
    }
}

/// `ErrorCause` 封装底层原因，保持 `Send + Sync` 以方便在宿主侧聚合。
pub type ErrorCause = Box<dyn Error + Send + Sync + 'static>;

/// `Result` 为运行时统一的返回值别名。
///
/// # 契约说明（What）
/// - 默认错误类型为 [`FlowError`]；调用方若需自定义错误，可显式指定第二个泛型参数。
/// - 与标准库 `Result` 行为完全一致，可直接与 `?` 运算符协同工作。
pub type Result<T, E = FlowError> = core::result::Result<T, E>;

/// 运行时的稳定错误分类。
///
/// # 设计背景（Why）
/// - 开闭、连接、分发与选项解析各路径需要一个可机读的扁平错误码集合，
///   以便日志聚合与宿主侧自动化处置；文本日志中以小负整数呈现。
///
/// # 契约说明（What）
/// - 每个变体绑定一个稳定的负整数码值（见 [`ErrorKind::code`]），`Ok` 由
///   `Result::Ok` 表达，不设变体。
/// - 码值一经发布不再变更；新增变体只能追加更小的负数。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 端口索引越界或方向不符。
    InvalidPort,
    /// 包类型与端口声明不匹配。
    TypeMismatch,
    /// 重复安装同一条边。
    AlreadyConnected,
    /// 断开一条不存在的边。
    NotConnected,
    /// 分发或实例化过程中内存耗尽。
    OutOfMemory,
    /// 注册名与现有条目冲突且布局不同。
    AlreadyExists,
    /// 选项名不在节点类型的 Schema 中。
    UnknownOption,
    /// 同一选项名出现多次。
    DuplicateOption,
    /// 目标节点、类型或成员不存在。
    NotFound,
    /// 目标正在处理中，无法重入。
    Busy,
}

impl ErrorKind {
    /// 返回文本日志使用的稳定整数码。
    pub const fn code(self) -> i32 {
        match self {
            Self::InvalidPort => -1,
            Self::TypeMismatch => -2,
            Self::AlreadyConnected => -3,
            Self::NotConnected => -4,
            Self::OutOfMemory => -5,
            Self::AlreadyExists => -6,
            Self::UnknownOption => -7,
            Self::DuplicateOption => -8,
            Self::NotFound => -9,
            Self::Busy => -10,
        }
    }

    /// 返回稳定的语义名，供日志与 `Display` 使用。
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidPort => "invalid_port",
            Self::TypeMismatch => "type_mismatch",
            Self::AlreadyConnected => "already_connected",
            Self::NotConnected => "not_connected",
            Self::OutOfMemory => "out_of_memory",
            Self::AlreadyExists => "already_exists",
            Self::UnknownOption => "unknown_option",
            Self::DuplicateOption => "duplicate_option",
            Self::NotFound => "not_found",
            Self::Busy => "busy",
        }
    }
}

/// `FlowError` 表示运行时跨层共享的稳定错误域，是所有可观察错误的最终形态。
///
/// # 设计背景（Why）
/// - 节点开闭、容器装配、包分发与选项解析在不同层次产生的故障需要合流为统一
///   的错误码，以便日志与宿主告警系统执行精确的自动化治理。
/// - 运行时需兼容 `no_std + alloc` 场景，因此不依赖 `std::error::Error`，
///   而是复用 crate 内部定义的轻量 [`Error`] 抽象。
///
/// # 逻辑解析（How）
/// - 结构体以 Builder 风格方法叠加上下文信息（底层原因），并通过 `source()`
///   暴露完整链路。
/// - 分类 `kind` 承载稳定语义；`message` 面向排障人员。
///
/// # 契约说明（What）
/// - **前置条件**：`message` 不应包含敏感信息。
/// - **返回值**：构造函数返回拥有所有权的 `FlowError`，可安全跨线程移动。
/// - **后置条件**：除非显式调用 `with_cause`，错误不会包含底层原因。
#[derive(Debug)]
pub struct FlowError {
    kind: ErrorKind,
    message: Cow<'static, str>,
    cause: Option<ErrorCause>,
}

impl FlowError {
    /// 构造运行时错误。
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    /// 附带底层原因并返回新的错误。
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 以 `std::error::Error` 实现作为底层原因。
    ///
    /// # 契约说明（What）
    /// - **输入**：任意满足线程安全约束的标准库错误；
    /// - **后置条件**：该错误被包入适配层，随 `source()` 链一起暴露。
    #[cfg(feature = "std")]
    pub fn with_std_cause(
        self,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.with_cause(StdCause(cause))
    }

    /// 获取稳定错误分类。
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取文本日志使用的整数码。
    pub fn code(&self) -> i32 {
        self.kind.code()
    }

    /// 获取描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 获取底层原因。
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}({})] {}",
            self.kind.as_str(),
            self.kind.code(),
            self.message
        )
    }
}

impl Error for FlowError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|boxed| boxed.as_ref() as &(dyn Error + 'static))
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FlowError {}

/// 把标准库错误桥接进 crate 内部错误链的适配层。
#[cfg(feature = "std")]
struct StdCause<E>(E);

#[cfg(feature = "std")]
impl<E: std::error::Error> fmt::Debug for StdCause<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

#[cfg(feature = "std")]
impl<E: std::error::Error> fmt::Display for StdCause<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(feature = "std")]
impl<E: std::error::Error> Error for StdCause<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

const _: fn() = || {
    fn assert_error_traits<T: Error + Send + Sync + 'static>() {}

    assert_error_traits::<FlowError>();
};

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    /// 码值是对外契约的一部分，固定断言防止无意变更。
    #[test]
    fn error_codes_are_stable_negative_integers() {
        assert_eq!(ErrorKind::InvalidPort.code(), -1);
        assert_eq!(ErrorKind::TypeMismatch.code(), -2);
        assert_eq!(ErrorKind::AlreadyConnected.code(), -3);
        assert_eq!(ErrorKind::NotConnected.code(), -4);
        assert_eq!(ErrorKind::OutOfMemory.code(), -5);
        assert_eq!(ErrorKind::AlreadyExists.code(), -6);
        assert_eq!(ErrorKind::UnknownOption.code(), -7);
        assert_eq!(ErrorKind::DuplicateOption.code(), -8);
        assert_eq!(ErrorKind::NotFound.code(), -9);
        assert_eq!(ErrorKind::Busy.code(), -10);
    }

    #[test]
    fn display_carries_kind_code_and_message() {
        let err = FlowError::new(ErrorKind::TypeMismatch, "irange port got string");
        assert_eq!(format!("{err}"), "[type_mismatch(-2)] irange port got string");
    }

    /// 验证 cause 链可以通过 `source()` 完整回溯。
    #[test]
    fn cause_chain_is_reachable_through_source() {
        let inner = FlowError::new(ErrorKind::NotFound, "child index 3 out of range");
        let outer = FlowError::new(ErrorKind::InvalidPort, "port 9 undefined").with_cause(inner);

        let current: &dyn Error = &outer;
        let source = current.source().expect("outer error should expose cause");
        assert_eq!(format!("{source}"), "[not_found(-9)] child index 3 out of range");
        assert!(source.source().is_none(), "链路应在最内层终止");
    }
}
