//! 进程级包类型注册表。
//!
//! # 设计初衷（Why）
//! - 自定义节点需要声明新的包类型；组合（元组）类型按成员序列去重后全进程
//!   共享，使类型匹配保持为指针比较。
//! - 注册表拥有全部动态创建的描述符；Rust 进程静态量不运行析构，
//!   描述符生命周期即进程生命周期。
//!
//! # 契约说明（What）
//! - **前置条件**：注册名不得与内建类型或既有注册项冲突（布局相同的重复注册
//!   幂等返回既有描述符）；
//! - **后置条件**：返回的 [`PacketTypeRef`] 可跨模块自由克隆，指针同一性稳定。

use alloc::borrow::Cow;
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::RwLock;

use crate::error::{ErrorKind, FlowError, Result};

use super::ty::{self, PacketMember, PacketType, PacketTypeRef};

static REGISTRY: RwLock<Vec<PacketTypeRef>> = RwLock::new(Vec::new());

fn find_named(name: &str) -> Option<PacketTypeRef> {
    if let Some(builtin) = ty::builtins().iter().find(|t| t.name() == name) {
        return Some(PacketTypeRef::clone(builtin));
    }
    REGISTRY
        .read()
        .iter()
        .find(|t| t.name() == name)
        .cloned()
}

/// 按名称查找类型（内建优先）。
pub fn lookup(name: &str) -> Option<PacketTypeRef> {
    find_named(name)
}

/// 注册一个新的包类型。
///
/// # 契约说明（What）
/// - **输入**：稳定类型名与成员布局（由 [`crate::packet::members`] 构造）；
/// - **幂等性**：与既有条目名称相同且布局完全一致时返回既有描述符；
/// - **错误语义**：名称冲突但布局不同时返回 [`ErrorKind::AlreadyExists`]。
pub fn register(
    name: impl Into<Cow<'static, str>>,
    members: Vec<PacketMember>,
) -> Result<PacketTypeRef> {
    let name = name.into();
    let mut table = REGISTRY.write();

    if let Some(builtin) = ty::builtins().iter().find(|t| t.name() == name) {
        if builtin.members() == members.as_slice() {
            return Ok(PacketTypeRef::clone(builtin));
        }
        return Err(FlowError::new(
            ErrorKind::AlreadyExists,
            alloc::format!("packet type name `{name}` collides with a builtin"),
        ));
    }
    if let Some(existing) = table.iter().find(|t| t.name() == name) {
        if existing.members() == members.as_slice() {
            return Ok(existing.clone());
        }
        return Err(FlowError::new(
            ErrorKind::AlreadyExists,
            alloc::format!("packet type name `{name}` already registered with a different layout"),
        ));
    }

    let ty = Arc::new(PacketType::new(name, members, None));
    table.push(ty.clone());
    Ok(ty)
}

/// 构造（或复用）一个组合类型。
///
/// # 行为逻辑（How）
/// - 先按成员指针序列在注册表内查找结构相同的组合类型；命中即返回；
/// - 未命中时创建新的描述符并登记，类型名为 `composed:` 前缀加成员名。
///
/// # 契约说明（What）
/// - **前置条件**：成员序列非空；
/// - **后置条件**：结构相同的两次调用返回同一描述符（指针相等）。
pub fn composed(members: &[PacketTypeRef]) -> Result<PacketTypeRef> {
    if members.is_empty() {
        return Err(FlowError::new(
            ErrorKind::TypeMismatch,
            "composed packet type needs at least one member",
        ));
    }

    let mut table = REGISTRY.write();
    if let Some(existing) = table.iter().find(|t| {
        t.is_composed()
            && t.composed_members().len() == members.len()
            && t.composed_members()
                .iter()
                .zip(members)
                .all(|(a, b)| PacketType::same(a, b))
    }) {
        return Ok(existing.clone());
    }

    let ty = Arc::new(PacketType::new(
        ty::composed_name(members),
        Vec::new(),
        Some(members.to_vec()),
    ));
    table.push(ty.clone());
    Ok(ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::members;

    #[test]
    fn composed_construction_dedups_structurally_identical_tuples() {
        let a = composed(&[ty::string().clone(), ty::irange().clone()]).unwrap();
        let b = composed(&[ty::string().clone(), ty::irange().clone()]).unwrap();
        assert!(PacketType::same(&a, &b), "同构组合类型必须复用同一描述符");

        let c = composed(&[ty::irange().clone(), ty::string().clone()]).unwrap();
        assert!(!PacketType::same(&a, &c), "成员顺序不同即为不同类型");
        assert_eq!(a.name(), "composed:string,int");
    }

    #[test]
    fn composed_rejects_empty_member_list() {
        let err = composed(&[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn register_is_idempotent_for_identical_layouts() {
        let layout = || members([("celsius", "float"), ("sensor", "string")]);
        let first = register("temperature-reading", layout()).unwrap();
        let second = register("temperature-reading", layout()).unwrap();
        assert!(PacketType::same(&first, &second));
    }

    #[test]
    fn register_rejects_conflicting_layout_and_builtin_names() {
        register("pressure-reading", members([("pascal", "float")])).unwrap();
        let err = register("pressure-reading", members([("bar", "float")])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let err = register("string", members([("value", "int")])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }
}
