//! 进程级节点类型注册表。
//!
//! # 设计初衷（Why）
//! - 宿主以符号名获取内建节点类型，或登记自己的类型供静态规格引用；
//!   名称在注册表内唯一。
//!
//! # 契约说明（What）
//! - **前置条件**：类型名非空；
//! - **错误语义**：名称冲突返回 [`ErrorKind::AlreadyExists`]；
//! - **后置条件**：注册后的类型句柄可被任意多个容器规格共享。

use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::RwLock;

use crate::error::{ErrorKind, FlowError, Result};

use super::ty::NodeType;

static REGISTRY: RwLock<Vec<Arc<NodeType>>> = RwLock::new(Vec::new());

/// 登记一个节点类型。
pub fn register(ty: Arc<NodeType>) -> Result<()> {
    if ty.name().is_empty() {
        return Err(FlowError::new(
            ErrorKind::NotFound,
            "node type name must not be empty",
        ));
    }
    let mut table = REGISTRY.write();
    if table.iter().any(|existing| existing.name() == ty.name()) {
        return Err(FlowError::new(
            ErrorKind::AlreadyExists,
            alloc::format!("node type `{}` already registered", ty.name()),
        ));
    }
    table.push(ty);
    Ok(())
}

/// 按名称查找节点类型。
pub fn lookup(name: &str) -> Option<Arc<NodeType>> {
    REGISTRY
        .read()
        .iter()
        .find(|ty| ty.name() == name)
        .cloned()
}

/// 注销全部类型并运行各自的 `dispose_type` 钩子。
///
/// 供宿主在受控停机时调用；进程常驻场景可以从不调用。
pub fn dispose_all() {
    let drained: Vec<Arc<NodeType>> = {
        let mut table = REGISTRY.write();
        core::mem::take(&mut *table)
    };
    for ty in drained {
        if let Some(dispose) = ty.dispose_type_fn() {
            dispose(&ty);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType as NT;

    #[test]
    fn register_then_lookup_returns_the_same_type() {
        let ty = NT::builder("registry-probe/echo").build();
        register(ty.clone()).unwrap();
        let found = lookup("registry-probe/echo").expect("registered type must resolve");
        assert!(Arc::ptr_eq(&ty, &found));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        register(NT::builder("registry-probe/dup").build()).unwrap();
        let err = register(NT::builder("registry-probe/dup").build()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }
}
