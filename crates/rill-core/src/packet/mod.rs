//! 类型化包模型：描述符、注册表与值载体。
//!
//! # 模块职责（Why）
//! - 把“类型描述”（[`ty`]、[`registry`]）与“值载体”（[`value`]、[`blob`]）
//!   分层：前者全进程唯一、按指针比较，后者是随连接流动的所有权值。
//!
//! # 使用方式（How）
//! - 内建类型经 `packet::ty::irange()` 等访问器获取；
//! - 自定义类型经 [`registry::register`]，组合类型经 [`registry::composed`]；
//! - 值经 `Packet::new_*` 构造、`as_*` 访问，文本渲染由 `Display` 给出。

pub mod blob;
pub mod display;
pub mod registry;
pub mod ty;
pub mod value;

use alloc::borrow::Cow;
use alloc::vec::Vec;

pub use blob::Blob;
pub use ty::{PacketMember, PacketType, PacketTypeRef};
pub use value::{ErrorPayload, FieldValue, HttpResponse, Packet, PacketValue};

/// 由 (名称, 文本类型) 数组构造成员布局，自动累加偏移。
pub fn members<const N: usize>(
    items: [(&'static str, &'static str); N],
) -> Vec<PacketMember> {
    ty::layout_members(
        items
            .into_iter()
            .map(|(name, data_type)| (Cow::Borrowed(name), Cow::Borrowed(data_type))),
    )
}
