//! 包类型描述符与内建类型表。

use alloc::borrow::Cow;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Once;

/// 共享的包类型句柄。类型同一性按指针判定（参见 [`PacketType::same`]）。
pub type PacketTypeRef = Arc<PacketType>;

/// 包类型的成员描述（名称、文本类型、布局偏移与尺寸）。
///
/// # 契约说明（What）
/// - `offset`/`size` 是面向调试与宿主内省的描述性布局信息，由固定的
///   文本类型尺寸表累加得出，并不约束 Rust 侧的实际内存表示。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketMember {
    pub name: Cow<'static, str>,
    pub data_type: Cow<'static, str>,
    pub offset: u16,
    pub size: u16,
}

/// 文本类型到描述性尺寸的映射。
pub(crate) fn data_type_size(data_type: &str) -> u16 {
    match data_type {
        "boolean" | "byte" => 1,
        "int" => 4,
        "float" => 8,
        _ => 8,
    }
}

/// 由 (名称, 文本类型) 序列构造成员表，自动累加偏移。
pub(crate) fn layout_members(
    members: impl IntoIterator<Item = (Cow<'static, str>, Cow<'static, str>)>,
) -> Vec<PacketMember> {
    let mut offset = 0u16;
    members
        .into_iter()
        .map(|(name, data_type)| {
            let size = data_type_size(&data_type);
            let member = PacketMember {
                name,
                data_type,
                offset,
                size,
            };
            offset += size;
            member
        })
        .collect()
}

/// 包类型描述符。
///
/// # 设计背景（Why）
/// - 端口声明、连接校验与 Inspector 输出都以类型描述符为锚点；描述符必须
///   全进程唯一（内建类型懒初始化，自定义与组合类型经注册表去重），
///   使类型匹配退化为一次指针比较。
///
/// # 契约说明（What）
/// - `data_size == 0` 表示无负载类型（EMPTY、ANY）；
/// - `composed` 为 `Some` 时本类型是组合元组，成员顺序即寻址顺序；
/// - 描述符一经创建不可变。
#[derive(Debug)]
pub struct PacketType {
    name: Cow<'static, str>,
    data_size: u16,
    members: Vec<PacketMember>,
    composed: Option<Vec<PacketTypeRef>>,
}

impl PacketType {
    pub(crate) fn new(
        name: impl Into<Cow<'static, str>>,
        members: Vec<PacketMember>,
        composed: Option<Vec<PacketTypeRef>>,
    ) -> Self {
        let data_size = members
            .iter()
            .map(|m| m.offset + m.size)
            .max()
            .unwrap_or(if composed.is_some() { 8 } else { 0 });
        Self {
            name: name.into(),
            data_size,
            members,
            composed,
        }
    }

    /// 类型名。
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 负载的描述性字节数；无负载类型为 0。
    pub fn data_size(&self) -> u16 {
        self.data_size
    }

    /// 成员布局描述。
    pub fn members(&self) -> &[PacketMember] {
        &self.members
    }

    /// 本类型是否为组合元组。
    pub fn is_composed(&self) -> bool {
        self.composed.is_some()
    }

    /// 组合类型的成员类型序列；非组合类型返回空切片。
    pub fn composed_members(&self) -> &[PacketTypeRef] {
        self.composed.as_deref().unwrap_or(&[])
    }

    /// 指针同一性判定。注册表保证结构相同的描述符全进程唯一。
    pub fn same(a: &PacketTypeRef, b: &PacketTypeRef) -> bool {
        Arc::ptr_eq(a, b)
    }

    /// 端口接纳判定：`ANY` 通配双向成立，其余要求同一描述符。
    pub fn accepts(port_type: &PacketTypeRef, packet_type: &PacketTypeRef) -> bool {
        Self::same(port_type, packet_type)
            || Self::same(port_type, any())
            || Self::same(packet_type, any())
    }
}

fn builtin(
    cell: &'static Once<PacketTypeRef>,
    name: &'static str,
    members: &'static [(&'static str, &'static str)],
) -> &'static PacketTypeRef {
    cell.call_once(|| {
        Arc::new(PacketType::new(
            name,
            layout_members(
                members
                    .iter()
                    .map(|(n, t)| (Cow::Borrowed(*n), Cow::Borrowed(*t))),
            ),
            None,
        ))
    })
}

macro_rules! builtin_type {
    ($(#[$doc:meta])* $fn_name:ident, $cell:ident, $name:literal, [$(($m:literal, $t:literal)),*]) => {
        static $cell: Once<PacketTypeRef> = Once::new();

        $(#[$doc])*
        pub fn $fn_name() -> &'static PacketTypeRef {
            builtin(&$cell, $name, &[$(($m, $t)),*])
        }
    };
}

builtin_type!(
    /// 无负载占位包类型。
    empty, EMPTY, "empty", []
);
builtin_type!(
    /// 通配类型：被多态端口接受，自身不携带数据。
    any, ANY, "any", []
);
builtin_type!(
    /// 错误包类型（code + message），错误端口的唯一负载。
    error, ERROR, "error", [("code", "int"), ("message", "string")]
);
builtin_type!(
    /// 布尔包类型。
    boolean, BOOLEAN, "boolean", [("value", "boolean")]
);
builtin_type!(
    /// 单字节包类型。
    byte, BYTE, "byte", [("value", "byte")]
);
builtin_type!(
    /// 带边界整数包类型。
    irange, IRANGE, "int",
    [("val", "int"), ("min", "int"), ("max", "int"), ("step", "int")]
);
builtin_type!(
    /// 带边界浮点包类型。
    drange, DRANGE, "float",
    [("val", "float"), ("min", "float"), ("max", "float"), ("step", "float")]
);
builtin_type!(
    /// UTF-8 字符串包类型。
    string, STRING, "string", [("value", "string")]
);
builtin_type!(
    /// 引用计数的不透明二进制包类型。
    blob, BLOB, "blob", [("mem", "blob")]
);
builtin_type!(
    /// JSON 对象包类型，负载为原始 JSON 文本的 blob。
    json_object, JSON_OBJECT, "json-object", [("blob", "blob")]
);
builtin_type!(
    /// JSON 数组包类型，负载为原始 JSON 文本的 blob。
    json_array, JSON_ARRAY, "json-array", [("blob", "blob")]
);
builtin_type!(
    /// RGB 颜色包类型。
    rgb, RGB, "rgb",
    [("red", "byte"), ("green", "byte"), ("blue", "byte")]
);
builtin_type!(
    /// 三维方向向量包类型。
    direction_vector, DIRECTION_VECTOR, "direction-vector",
    [("x", "float"), ("y", "float"), ("z", "float")]
);
builtin_type!(
    /// 地理位置包类型。
    location, LOCATION, "location",
    [("latitude", "float"), ("longitude", "float"), ("altitude", "float")]
);
builtin_type!(
    /// UTC 时间戳包类型。
    timestamp, TIMESTAMP, "timestamp", [("secs", "int"), ("nanos", "int")]
);
builtin_type!(
    /// HTTP 响应包类型。
    http_response, HTTP_RESPONSE, "http-response",
    [
        ("response-code", "int"),
        ("url", "string"),
        ("content-type", "string"),
        ("content", "blob")
    ]
);

/// 全部内建类型的访问器列表，供注册表做名称冲突检查。
pub(crate) fn builtins() -> [&'static PacketTypeRef; 16] {
    [
        empty(),
        any(),
        error(),
        boolean(),
        byte(),
        irange(),
        drange(),
        string(),
        blob(),
        json_object(),
        json_array(),
        rgb(),
        direction_vector(),
        location(),
        timestamp(),
        http_response(),
    ]
}

/// 组合类型的约定名：`composed:` 前缀加逗号分隔的成员类型名。
pub(crate) fn composed_name(members: &[PacketTypeRef]) -> String {
    use core::fmt::Write;

    let mut name = String::from("composed:");
    for (idx, member) in members.iter().enumerate() {
        if idx > 0 {
            name.push(',');
        }
        let _ = write!(name, "{}", member.name());
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_descriptors_are_process_unique() {
        assert!(PacketType::same(irange(), irange()));
        assert!(!PacketType::same(irange(), drange()));
    }

    #[test]
    fn any_is_a_wildcard_in_both_directions() {
        assert!(PacketType::accepts(any(), irange()));
        assert!(PacketType::accepts(irange(), any()));
        assert!(!PacketType::accepts(irange(), string()));
    }

    #[test]
    fn member_layout_accumulates_offsets() {
        let members = error().members();
        assert_eq!(members[0].name, "code");
        assert_eq!(members[0].offset, 0);
        assert_eq!(members[0].size, 4);
        assert_eq!(members[1].name, "message");
        assert_eq!(members[1].offset, 4);
    }

    #[test]
    fn zero_payload_types_report_zero_size() {
        assert_eq!(empty().data_size(), 0);
        assert_eq!(any().data_size(), 0);
        assert!(irange().data_size() > 0);
    }
}
