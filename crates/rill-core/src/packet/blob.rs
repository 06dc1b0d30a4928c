//! 引用计数的不透明二进制负载。

use alloc::borrow::Cow;
use alloc::sync::Arc;
use alloc::vec::Vec;

/// BLOB 负载：引用计数的字节块，可声明一个生命周期严格覆盖自身的父块。
///
/// # 设计背景（Why）
/// - 传感器缓冲、协议帧等大块数据在扇出分发时不应逐目的地复制；克隆 Blob
///   只增加引用计数。
/// - 子块常是父块的切片视图或派生数据，父块必须活得比子块久——子块对父块
///   持强引用即可在类型系统层面保证该支配关系。
///
/// # 契约说明（What）
/// - 引用计数操作基于 `Arc`，原子安全；运行时整体仍假定单线程使用；
/// - 字节内容一经构造不可变；
/// - [`Blob::refcount`] 等于逻辑上持有该块的活跃包与直接借用数。
#[derive(Clone, Debug)]
pub struct Blob {
    inner: Arc<BlobInner>,
}

#[derive(Debug)]
struct BlobInner {
    bytes: Vec<u8>,
    blob_type: Cow<'static, str>,
    parent: Option<Blob>,
}

impl Blob {
    /// 以默认块类型 `"mem"` 包装一段字节。
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self::with_details(bytes, "mem", None)
    }

    /// 完整构造：字节、块类型标签与可选父块。
    pub fn with_details(
        bytes: impl Into<Vec<u8>>,
        blob_type: impl Into<Cow<'static, str>>,
        parent: Option<Blob>,
    ) -> Self {
        Self {
            inner: Arc::new(BlobInner {
                bytes: bytes.into(),
                blob_type: blob_type.into(),
                parent,
            }),
        }
    }

    /// 借用字节内容。
    pub fn as_bytes(&self) -> &[u8] {
        &self.inner.bytes
    }

    /// 字节长度。
    pub fn len(&self) -> usize {
        self.inner.bytes.len()
    }

    /// 是否为空块。
    pub fn is_empty(&self) -> bool {
        self.inner.bytes.is_empty()
    }

    /// 块类型标签。
    pub fn blob_type(&self) -> &str {
        &self.inner.blob_type
    }

    /// 父块（若有）。
    pub fn parent(&self) -> Option<&Blob> {
        self.inner.parent.as_ref()
    }

    /// 当前强引用计数。
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// 两个句柄是否指向同一底层块。
    pub fn same(a: &Blob, b: &Blob) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// 底层块地址，仅用于调试输出。
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_bumps_and_drop_releases_the_refcount() {
        let blob = Blob::new(*b"frame");
        assert_eq!(blob.refcount(), 1);

        let second = blob.clone();
        assert_eq!(blob.refcount(), 2);
        assert!(Blob::same(&blob, &second));

        drop(second);
        assert_eq!(blob.refcount(), 1);
    }

    /// 子块对父块持强引用：父块计数包含子块的那一份。
    #[test]
    fn child_keeps_parent_alive() {
        let parent = Blob::new(*b"payload");
        let child = Blob::with_details(*b"pay", "slice", Some(parent.clone()));

        assert_eq!(parent.refcount(), 2);
        assert_eq!(child.parent().map(Blob::as_bytes), Some(&b"payload"[..]));

        drop(parent);
        // 父块仍被子块持有。
        assert_eq!(child.parent().unwrap().refcount(), 1);
    }

    #[test]
    fn default_blob_type_is_mem() {
        assert_eq!(Blob::new(*b"x").blob_type(), "mem");
    }
}
