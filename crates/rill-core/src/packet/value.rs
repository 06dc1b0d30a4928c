//! 包值：单一类型、单一负载的不可变载体。

use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{ErrorKind, FlowError, Result};
use crate::types::{DirectionVector, FloatRange, IntRange, Location, Rgb, Timestamp};

use super::blob::Blob;
use super::ty::{self, PacketType, PacketTypeRef};

/// 错误包负载：稳定整数码加人类可读消息。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorPayload {
    pub code: i32,
    pub message: String,
}

/// HTTP 响应包负载。
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub response_code: u16,
    pub url: String,
    pub content_type: String,
    pub headers: Vec<(String, String)>,
    pub content: Blob,
}

/// 自定义注册类型的字段值。
///
/// # 契约说明（What）
/// - 每个变体与一个成员文本类型一一对应（见 [`FieldValue::data_type`]），
///   构造自定义包时按注册布局逐位校验。
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Boolean(bool),
    Byte(u8),
    Int(i32),
    Float(f64),
    Str(String),
}

impl FieldValue {
    /// 返回变体对应的成员文本类型名。
    pub fn data_type(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Byte(_) => "byte",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
        }
    }
}

/// 包负载的带标签表示。
#[derive(Clone, Debug)]
pub enum PacketValue {
    Empty,
    Any,
    Boolean(bool),
    Byte(u8),
    IRange(IntRange),
    DRange(FloatRange),
    Str(String),
    Blob(Blob),
    JsonObject(Blob),
    JsonArray(Blob),
    Rgb(Rgb),
    Direction(DirectionVector),
    Location(Location),
    Timestamp(Timestamp),
    HttpResponse(Box<HttpResponse>),
    Error(ErrorPayload),
    Composed(Vec<Packet>),
    Record(Vec<FieldValue>),
}

/// 在端口间流动的、拥有单一类型与负载的值。
///
/// # 设计背景（Why）
/// - 包是单一所有权值：`send` 交出所有权，扇出时由分发器克隆；
///   非 BLOB 负载深拷贝，BLOB 负载只增加引用计数（`Clone` 派生自然满足）。
/// - 构造后逻辑不可变：访问器只按拷贝（标量）或借用（字符串、BLOB）返回。
///
/// # 契约说明（What）
/// - 类型与负载在构造时即保持一致，访问器在类型不符时返回
///   [`ErrorKind::TypeMismatch`]。
#[derive(Clone, Debug)]
pub struct Packet {
    ty: PacketTypeRef,
    value: PacketValue,
}

fn mismatch(expected: &str, actual: &PacketTypeRef) -> FlowError {
    FlowError::new(
        ErrorKind::TypeMismatch,
        format!("expected `{expected}` packet, got `{}`", actual.name()),
    )
}

impl Packet {
    /// 包类型描述符。
    pub fn ty(&self) -> &PacketTypeRef {
        &self.ty
    }

    /// 负载的带标签视图。
    pub fn value(&self) -> &PacketValue {
        &self.value
    }

    /// EMPTY 包。
    pub fn new_empty() -> Self {
        Self {
            ty: ty::empty().clone(),
            value: PacketValue::Empty,
        }
    }

    /// ANY 包。
    pub fn new_any() -> Self {
        Self {
            ty: ty::any().clone(),
            value: PacketValue::Any,
        }
    }

    /// 布尔包。
    pub fn new_boolean(value: bool) -> Self {
        Self {
            ty: ty::boolean().clone(),
            value: PacketValue::Boolean(value),
        }
    }

    /// 字节包。
    pub fn new_byte(value: u8) -> Self {
        Self {
            ty: ty::byte().clone(),
            value: PacketValue::Byte(value),
        }
    }

    /// IRANGE 包（完整边界）。
    pub fn new_irange(value: IntRange) -> Self {
        Self {
            ty: ty::irange().clone(),
            value: PacketValue::IRange(value),
        }
    }

    /// IRANGE 包（仅值，默认边界）。
    pub fn new_irange_value(value: i32) -> Self {
        Self::new_irange(IntRange::of(value))
    }

    /// DRANGE 包（完整边界）。
    pub fn new_drange(value: FloatRange) -> Self {
        Self {
            ty: ty::drange().clone(),
            value: PacketValue::DRange(value),
        }
    }

    /// DRANGE 包（仅值，默认边界）。
    pub fn new_drange_value(value: f64) -> Self {
        Self::new_drange(FloatRange::of(value))
    }

    /// 字符串包。
    pub fn new_string(value: impl Into<String>) -> Self {
        Self {
            ty: ty::string().clone(),
            value: PacketValue::Str(value.into()),
        }
    }

    /// BLOB 包。
    pub fn new_blob(blob: Blob) -> Self {
        Self {
            ty: ty::blob().clone(),
            value: PacketValue::Blob(blob),
        }
    }

    /// JSON 对象包；`blob` 为原始 JSON 文本。
    pub fn new_json_object(blob: Blob) -> Self {
        Self {
            ty: ty::json_object().clone(),
            value: PacketValue::JsonObject(blob),
        }
    }

    /// JSON 数组包；`blob` 为原始 JSON 文本。
    pub fn new_json_array(blob: Blob) -> Self {
        Self {
            ty: ty::json_array().clone(),
            value: PacketValue::JsonArray(blob),
        }
    }

    /// RGB 包。
    pub fn new_rgb(value: Rgb) -> Self {
        Self {
            ty: ty::rgb().clone(),
            value: PacketValue::Rgb(value),
        }
    }

    /// 方向向量包。
    pub fn new_direction_vector(value: DirectionVector) -> Self {
        Self {
            ty: ty::direction_vector().clone(),
            value: PacketValue::Direction(value),
        }
    }

    /// 地理位置包。
    pub fn new_location(value: Location) -> Self {
        Self {
            ty: ty::location().clone(),
            value: PacketValue::Location(value),
        }
    }

    /// 时间戳包。
    pub fn new_timestamp(value: Timestamp) -> Self {
        Self {
            ty: ty::timestamp().clone(),
            value: PacketValue::Timestamp(value),
        }
    }

    /// HTTP 响应包。
    pub fn new_http_response(value: HttpResponse) -> Self {
        Self {
            ty: ty::http_response().clone(),
            value: PacketValue::HttpResponse(Box::new(value)),
        }
    }

    /// 错误包，错误端口的负载。
    pub fn new_error(code: i32, message: impl Into<String>) -> Self {
        Self {
            ty: ty::error().clone(),
            value: PacketValue::Error(ErrorPayload {
                code,
                message: message.into(),
            }),
        }
    }

    /// 组合包：子包序列必须与组合类型的成员表逐位匹配。
    ///
    /// # 契约说明（What）
    /// - **前置条件**：`ty.is_composed()` 为真；
    /// - **错误语义**：成员数量或任一位置类型不符返回
    ///   [`ErrorKind::TypeMismatch`]，不做部分构造。
    pub fn new_composed(ty: &PacketTypeRef, members: Vec<Packet>) -> Result<Self> {
        let expected = ty.composed_members();
        if !ty.is_composed() {
            return Err(mismatch("composed", ty));
        }
        if expected.len() != members.len() {
            return Err(FlowError::new(
                ErrorKind::TypeMismatch,
                format!(
                    "composed `{}` expects {} members, got {}",
                    ty.name(),
                    expected.len(),
                    members.len()
                ),
            ));
        }
        for (idx, (want, have)) in expected.iter().zip(&members).enumerate() {
            if !PacketType::same(want, have.ty()) {
                return Err(FlowError::new(
                    ErrorKind::TypeMismatch,
                    format!(
                        "composed `{}` member {idx} expects `{}`, got `{}`",
                        ty.name(),
                        want.name(),
                        have.ty().name()
                    ),
                ));
            }
        }
        Ok(Self {
            ty: ty.clone(),
            value: PacketValue::Composed(members),
        })
    }

    /// 自定义注册类型的包：字段按注册布局逐位校验。
    pub fn new_record(ty: &PacketTypeRef, fields: Vec<FieldValue>) -> Result<Self> {
        let members = ty.members();
        if ty.is_composed() || members.is_empty() {
            return Err(mismatch("registered record", ty));
        }
        if members.len() != fields.len() {
            return Err(FlowError::new(
                ErrorKind::TypeMismatch,
                format!(
                    "record `{}` expects {} fields, got {}",
                    ty.name(),
                    members.len(),
                    fields.len()
                ),
            ));
        }
        for (member, field) in members.iter().zip(&fields) {
            if member.data_type != field.data_type() {
                return Err(FlowError::new(
                    ErrorKind::TypeMismatch,
                    format!(
                        "record `{}` member `{}` expects `{}`, got `{}`",
                        ty.name(),
                        member.name,
                        member.data_type,
                        field.data_type()
                    ),
                ));
            }
        }
        Ok(Self {
            ty: ty.clone(),
            value: PacketValue::Record(fields),
        })
    }

    /// 读取布尔负载。
    pub fn as_boolean(&self) -> Result<bool> {
        match &self.value {
            PacketValue::Boolean(v) => Ok(*v),
            _ => Err(mismatch("boolean", &self.ty)),
        }
    }

    /// 读取字节负载。
    pub fn as_byte(&self) -> Result<u8> {
        match &self.value {
            PacketValue::Byte(v) => Ok(*v),
            _ => Err(mismatch("byte", &self.ty)),
        }
    }

    /// 读取 IRANGE 负载。
    pub fn as_irange(&self) -> Result<IntRange> {
        match &self.value {
            PacketValue::IRange(v) => Ok(*v),
            _ => Err(mismatch("int", &self.ty)),
        }
    }

    /// 读取 DRANGE 负载。
    pub fn as_drange(&self) -> Result<FloatRange> {
        match &self.value {
            PacketValue::DRange(v) => Ok(*v),
            _ => Err(mismatch("float", &self.ty)),
        }
    }

    /// 借用字符串负载。
    pub fn as_str(&self) -> Result<&str> {
        match &self.value {
            PacketValue::Str(v) => Ok(v),
            _ => Err(mismatch("string", &self.ty)),
        }
    }

    /// 借用 BLOB 负载（含 JSON 包）。
    pub fn as_blob(&self) -> Result<&Blob> {
        match &self.value {
            PacketValue::Blob(v) | PacketValue::JsonObject(v) | PacketValue::JsonArray(v) => Ok(v),
            _ => Err(mismatch("blob", &self.ty)),
        }
    }

    /// 读取 RGB 负载。
    pub fn as_rgb(&self) -> Result<Rgb> {
        match &self.value {
            PacketValue::Rgb(v) => Ok(*v),
            _ => Err(mismatch("rgb", &self.ty)),
        }
    }

    /// 读取方向向量负载。
    pub fn as_direction_vector(&self) -> Result<DirectionVector> {
        match &self.value {
            PacketValue::Direction(v) => Ok(*v),
            _ => Err(mismatch("direction-vector", &self.ty)),
        }
    }

    /// 读取地理位置负载。
    pub fn as_location(&self) -> Result<Location> {
        match &self.value {
            PacketValue::Location(v) => Ok(*v),
            _ => Err(mismatch("location", &self.ty)),
        }
    }

    /// 读取时间戳负载。
    pub fn as_timestamp(&self) -> Result<Timestamp> {
        match &self.value {
            PacketValue::Timestamp(v) => Ok(*v),
            _ => Err(mismatch("timestamp", &self.ty)),
        }
    }

    /// 借用 HTTP 响应负载。
    pub fn as_http_response(&self) -> Result<&HttpResponse> {
        match &self.value {
            PacketValue::HttpResponse(v) => Ok(v),
            _ => Err(mismatch("http-response", &self.ty)),
        }
    }

    /// 读取错误负载 (code, message)。
    pub fn as_error(&self) -> Result<(i32, &str)> {
        match &self.value {
            PacketValue::Error(payload) => Ok((payload.code, &payload.message)),
            _ => Err(mismatch("error", &self.ty)),
        }
    }

    /// 借用组合包的成员序列。
    pub fn composed_members(&self) -> Result<&[Packet]> {
        match &self.value {
            PacketValue::Composed(members) => Ok(members),
            _ => Err(mismatch("composed", &self.ty)),
        }
    }

    /// 借用自定义包的字段序列。
    pub fn record_fields(&self) -> Result<&[FieldValue]> {
        match &self.value {
            PacketValue::Record(fields) => Ok(fields),
            _ => Err(mismatch("registered record", &self.ty)),
        }
    }
}

#[cfg(feature = "std_json")]
impl Packet {
    /// 校验后构造 JSON 对象包。文本必须是合法的 JSON 对象。
    pub fn new_json_object_checked(text: &str) -> Result<Self> {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(serde_json::Value::Object(_)) => {
                Ok(Self::new_json_object(Blob::with_details(
                    text.as_bytes().to_vec(),
                    "json",
                    None,
                )))
            }
            _ => Err(FlowError::new(
                ErrorKind::TypeMismatch,
                "payload is not a JSON object",
            )),
        }
    }

    /// 校验后构造 JSON 数组包。文本必须是合法的 JSON 数组。
    pub fn new_json_array_checked(text: &str) -> Result<Self> {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(serde_json::Value::Array(_)) => Ok(Self::new_json_array(Blob::with_details(
                text.as_bytes().to_vec(),
                "json",
                None,
            ))),
            _ => Err(FlowError::new(
                ErrorKind::TypeMismatch,
                "payload is not a JSON array",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::registry;

    #[test]
    fn accessors_return_stored_values() {
        assert!(Packet::new_boolean(true).as_boolean().unwrap());
        assert_eq!(Packet::new_byte(0x2a).as_byte().unwrap(), 0x2a);
        assert_eq!(Packet::new_irange_value(7).as_irange().unwrap().val, 7);
        assert_eq!(Packet::new_string("hi").as_str().unwrap(), "hi");
    }

    #[test]
    fn wrong_type_access_fails_with_type_mismatch() {
        let err = Packet::new_string("hi").as_boolean().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    /// 错误包的 (code, message) 必须原样往返。
    #[test]
    fn error_packet_roundtrips_code_and_message() {
        let packet = Packet::new_error(-5, "sensor returned garbage");
        assert_eq!(packet.as_error().unwrap(), (-5, "sensor returned garbage"));
    }

    #[test]
    fn composed_construction_then_member_access_returns_equal_sequence() {
        let ty = registry::composed(&[ty::string().clone(), ty::irange().clone()]).unwrap();
        let packet = Packet::new_composed(
            &ty,
            alloc::vec![Packet::new_string("k"), Packet::new_irange_value(42)],
        )
        .unwrap();

        let members = packet.composed_members().unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].as_str().unwrap(), "k");
        assert_eq!(members[1].as_irange().unwrap().val, 42);
    }

    #[test]
    fn composed_rejects_positional_type_mismatch() {
        let ty = registry::composed(&[ty::string().clone(), ty::irange().clone()]).unwrap();
        let err = Packet::new_composed(
            &ty,
            alloc::vec![Packet::new_irange_value(1), Packet::new_string("x")],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    /// 克隆语义：BLOB 负载共享底层块，非 BLOB 负载各自独立。
    #[test]
    fn clone_shares_blob_payloads() {
        let packet = Packet::new_blob(Blob::new(*b"shared"));
        let cloned = packet.clone();

        let a = packet.as_blob().unwrap();
        let b = cloned.as_blob().unwrap();
        assert!(Blob::same(a, b));
        assert_eq!(a.refcount(), 2);
    }

    #[test]
    fn record_packet_validates_field_layout() {
        let ty = registry::register(
            "value-accessor-probe",
            crate::packet::members([("raw", "int"), ("label", "string")]),
        )
        .unwrap();

        let ok = Packet::new_record(
            &ty,
            alloc::vec![FieldValue::Int(3), FieldValue::Str("left".into())],
        );
        assert!(ok.is_ok());

        let err = Packet::new_record(
            &ty,
            alloc::vec![FieldValue::Str("left".into()), FieldValue::Int(3)],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }
}
