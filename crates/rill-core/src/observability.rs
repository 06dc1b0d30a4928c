//! 运行时日志契约。
//!
//! # 设计缘起（Why）
//! - 核心在 `no_std + alloc` 轨道上不绑定任何日志后端，但分发、选项解析与
//!   错误端口等路径仍需输出 WARN/INFO 级别的排障信息。
//! - 参考外观（Facade）模式：核心只定义对象安全的最小契约，宿主负责接入
//!   自己的观测体系。
//!
//! # 总体结构（How）
//! - [`Logger`] Trait 定义唯一的 `log` 方法，入参为借用的 [`LogRecord`]。
//! - 进程级日志槽位通过 [`set_logger`] 一次性安装；未安装时全部日志落入
//!   [`NoopLogger`]，调用点无分支之外的开销。
//!
//! # 契约约束（What）
//! - **前置条件**：宿主安装的 Logger 必须满足 `Sync + 'static`。
//! - **后置条件**：`log` 不得回调运行时（尤其不得触发 `send`），避免重入。

use core::fmt;

use spin::Once;

/// 日志严重级别，从低到高排列。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogSeverity {
    /// 返回级别的稳定文本名。
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// 单条日志记录的借用视图。
///
/// # 契约说明（What）
/// - `target`：产生日志的子系统名（如 `"flow"`、`"options"`），便于过滤；
/// - `message`：已格式化完毕的文本，生命周期受限于调用栈。
#[derive(Debug)]
pub struct LogRecord<'a> {
    pub severity: LogSeverity,
    pub target: &'static str,
    pub message: &'a str,
}

/// 结构化日志的对象安全契约。
///
/// # 设计背景（Why）
/// - 与具体后端解耦：宿主可以桥接到 syslog、journald 或内存缓冲区。
///
/// # 风险提示（Trade-offs）
/// - 实现不得阻塞：日志调用发生在分发热路径旁路，阻塞会拖垮协作式调度。
pub trait Logger: Sync {
    /// 输出一条日志记录。
    fn log(&self, record: &LogRecord<'_>);
}

/// 丢弃一切输入的空 Logger，兼作未安装时的默认实现。
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _record: &LogRecord<'_>) {}
}

static LOGGER: Once<&'static dyn Logger> = Once::new();
static NOOP: NoopLogger = NoopLogger;

/// 安装进程级 Logger。只允许安装一次，后续调用被忽略并返回 `false`。
pub fn set_logger(logger: &'static dyn Logger) -> bool {
    let mut installed = false;
    LOGGER.call_once(|| {
        installed = true;
        logger
    });
    installed
}

/// 获取当前生效的 Logger；未安装时返回 [`NoopLogger`]。
pub fn logger() -> &'static dyn Logger {
    match LOGGER.get() {
        Some(logger) => *logger,
        None => &NOOP,
    }
}

/// 内部日志辅助：先格式化再下发，避免在 Trait 契约里携带 `fmt::Arguments`。
pub(crate) fn emit(severity: LogSeverity, target: &'static str, args: fmt::Arguments<'_>) {
    use alloc::string::ToString;

    let message = args.to_string();
    logger().log(&LogRecord {
        severity,
        target,
        message: &message,
    });
}

macro_rules! log_warn {
    ($target:expr, $($arg:tt)*) => {
        $crate::observability::emit(
            $crate::observability::LogSeverity::Warning,
            $target,
            core::format_args!($($arg)*),
        )
    };
}

macro_rules! log_info {
    ($target:expr, $($arg:tt)*) => {
        $crate::observability::emit(
            $crate::observability::LogSeverity::Info,
            $target,
            core::format_args!($($arg)*),
        )
    };
}

pub(crate) use {log_info, log_warn};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_logger_ignores_records() {
        NoopLogger.log(&LogRecord {
            severity: LogSeverity::Warning,
            target: "flow",
            message: "dropped packet",
        });
    }

    #[test]
    fn severity_names_are_stable() {
        assert_eq!(LogSeverity::Info.as_str(), "INFO");
        assert_eq!(LogSeverity::Warning.as_str(), "WARNING");
    }
}
