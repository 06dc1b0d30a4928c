//! 节点选项：Schema 驱动的 `key=value` 文本解析。
//!
//! # 设计缘起（Why）
//! - 节点类型以有序成员表（名称、文本类型、默认值）声明自己的选项；
//!   实例化时由文本条目解析出强类型记录，取代不透明内存布局上的偏移写入。
//! - 记录与全部值类型实现 `serde`，并提供规范文本序列化，满足
//!   `parse(serialize(r)) == r` 的往返不变式。
//!
//! # 契约约束（What）
//! - 未知选项名返回 [`ErrorKind::UnknownOption`]；重复名返回
//!   [`ErrorKind::DuplicateOption`]；值越界被裁剪进声明范围并记 WARN（非致命）。
//! - 解析产出的记录归调用方所有；`open` 需要保留的内容必须自行复制。

use alloc::borrow::Cow;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, FlowError, Result};
use crate::observability::log_warn;
use crate::types::{
    DirectionVector, FloatRange, FloatRangeSpec, IntRange, IntRangeSpec, Rgb,
};

/// 选项成员的文本类型。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionDataType {
    Boolean,
    Byte,
    Int,
    Float,
    IntSpec,
    FloatSpec,
    Str,
    Rgb,
    DirectionVector,
}

impl OptionDataType {
    /// 稳定文本名（与成员声明使用的字符串一致）。
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Byte => "byte",
            Self::Int => "int",
            Self::Float => "float",
            Self::IntSpec => "irange-spec",
            Self::FloatSpec => "drange-spec",
            Self::Str => "string",
            Self::Rgb => "rgb",
            Self::DirectionVector => "direction-vector",
        }
    }

    /// 由文本名反查类型（C1 的“文本类型名到写入器”的逆向查找）。
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "boolean" => Self::Boolean,
            "byte" => Self::Byte,
            "int" => Self::Int,
            "float" => Self::Float,
            "irange-spec" => Self::IntSpec,
            "drange-spec" => Self::FloatSpec,
            "string" => Self::Str,
            "rgb" => Self::Rgb,
            "direction-vector" => Self::DirectionVector,
            _ => return None,
        })
    }
}

/// 强类型的选项值。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OptionValue {
    Boolean(bool),
    Byte(u8),
    Int(IntRange),
    Float(FloatRange),
    IntSpec(IntRangeSpec),
    FloatSpec(FloatRangeSpec),
    Str(String),
    Rgb(Rgb),
    Direction(DirectionVector),
}

impl OptionValue {
    /// 值对应的文本类型。
    pub fn data_type(&self) -> OptionDataType {
        match self {
            Self::Boolean(_) => OptionDataType::Boolean,
            Self::Byte(_) => OptionDataType::Byte,
            Self::Int(_) => OptionDataType::Int,
            Self::Float(_) => OptionDataType::Float,
            Self::IntSpec(_) => OptionDataType::IntSpec,
            Self::FloatSpec(_) => OptionDataType::FloatSpec,
            Self::Str(_) => OptionDataType::Str,
            Self::Rgb(_) => OptionDataType::Rgb,
            Self::Direction(_) => OptionDataType::DirectionVector,
        }
    }

    /// 规范文本形式：`parse` 的逆运算。
    pub fn serialize_value(&self) -> String {
        match self {
            Self::Boolean(v) => v.to_string(),
            Self::Byte(v) => format!("0x{v:02x}"),
            Self::Int(r) => format!("val:{}|min:{}|max:{}|step:{}", r.val, r.min, r.max, r.step),
            Self::Float(r) => {
                format!("val:{}|min:{}|max:{}|step:{}", r.val, r.min, r.max, r.step)
            }
            Self::IntSpec(s) => format!("min:{}|max:{}|step:{}", s.min, s.max, s.step),
            Self::FloatSpec(s) => format!("min:{}|max:{}|step:{}", s.min, s.max, s.step),
            Self::Str(s) => format!("\"{s}\""),
            Self::Rgb(c) => format!("{}|{}|{}", c.red, c.green, c.blue),
            Self::Direction(v) => format!("{}|{}|{}", v.x, v.y, v.z),
        }
    }
}

/// 选项 Schema 的单个成员。
#[derive(Clone, Debug)]
pub struct OptionMember {
    pub name: Cow<'static, str>,
    pub data_type: OptionDataType,
    pub default: OptionValue,
}

/// 节点类型的有序选项 Schema。
#[derive(Clone, Debug, Default)]
pub struct OptionsSchema {
    members: Vec<OptionMember>,
}

impl OptionsSchema {
    /// 空 Schema（无选项的节点类型）。
    pub const fn empty() -> Self {
        Self {
            members: Vec::new(),
        }
    }

    /// 开始构造 Schema。
    pub fn builder() -> OptionsSchemaBuilder {
        OptionsSchemaBuilder {
            members: Vec::new(),
        }
    }

    /// 成员表。
    pub fn members(&self) -> &[OptionMember] {
        &self.members
    }

    /// 以默认值填充一份全新记录。
    pub fn defaults(&self) -> OptionsRecord {
        OptionsRecord {
            values: self
                .members
                .iter()
                .map(|m| (m.name.to_string(), m.default.clone()))
                .collect(),
        }
    }

    /// 解析 `name=value` 文本条目序列。
    ///
    /// # 行为逻辑（How）
    /// 1. 以默认值起底；
    /// 2. 逐条定位成员（未知名失败、重复名失败）；
    /// 3. 按成员文本类型解析值；数值越界裁剪进声明范围并记 WARN。
    pub fn parse<'a>(&self, entries: impl IntoIterator<Item = &'a str>) -> Result<OptionsRecord> {
        let mut record = self.defaults();
        let mut seen = alloc::vec![false; self.members.len()];

        for entry in entries {
            let Some((key, raw)) = entry.split_once('=') else {
                return Err(FlowError::new(
                    ErrorKind::UnknownOption,
                    format!("option entry `{entry}` is missing `=`"),
                ));
            };
            let Some(idx) = self.members.iter().position(|m| m.name == key) else {
                return Err(FlowError::new(
                    ErrorKind::UnknownOption,
                    format!("option `{key}` is not declared by the schema"),
                ));
            };
            if seen[idx] {
                return Err(FlowError::new(
                    ErrorKind::DuplicateOption,
                    format!("option `{key}` given more than once"),
                ));
            }
            seen[idx] = true;
            record.values[idx].1 = parse_value(&self.members[idx], raw)?;
        }
        Ok(record)
    }
}

/// Schema 构造器：按声明顺序追加成员。
pub struct OptionsSchemaBuilder {
    members: Vec<OptionMember>,
}

impl OptionsSchemaBuilder {
    fn push(mut self, name: &'static str, data_type: OptionDataType, default: OptionValue) -> Self {
        self.members.push(OptionMember {
            name: Cow::Borrowed(name),
            data_type,
            default,
        });
        self
    }

    /// 布尔成员。
    pub fn boolean(self, name: &'static str, default: bool) -> Self {
        self.push(name, OptionDataType::Boolean, OptionValue::Boolean(default))
    }

    /// 字节成员。
    pub fn byte(self, name: &'static str, default: u8) -> Self {
        self.push(name, OptionDataType::Byte, OptionValue::Byte(default))
    }

    /// 整数成员（完整范围声明）。
    pub fn int(self, name: &'static str, default: IntRange) -> Self {
        self.push(name, OptionDataType::Int, OptionValue::Int(default))
    }

    /// 整数成员（仅默认值，全域范围）。
    pub fn int_value(self, name: &'static str, default: i32) -> Self {
        self.int(name, IntRange::of(default))
    }

    /// 浮点成员。
    pub fn float(self, name: &'static str, default: FloatRange) -> Self {
        self.push(name, OptionDataType::Float, OptionValue::Float(default))
    }

    /// 整数范围规格成员。
    pub fn irange_spec(self, name: &'static str, default: IntRangeSpec) -> Self {
        self.push(name, OptionDataType::IntSpec, OptionValue::IntSpec(default))
    }

    /// 浮点范围规格成员。
    pub fn drange_spec(self, name: &'static str, default: FloatRangeSpec) -> Self {
        self.push(
            name,
            OptionDataType::FloatSpec,
            OptionValue::FloatSpec(default),
        )
    }

    /// 字符串成员。
    pub fn string(self, name: &'static str, default: &str) -> Self {
        self.push(name, OptionDataType::Str, OptionValue::Str(default.into()))
    }

    /// RGB 成员。
    pub fn rgb(self, name: &'static str, default: Rgb) -> Self {
        self.push(name, OptionDataType::Rgb, OptionValue::Rgb(default))
    }

    /// 方向向量成员。
    pub fn direction_vector(self, name: &'static str, default: DirectionVector) -> Self {
        self.push(
            name,
            OptionDataType::DirectionVector,
            OptionValue::Direction(default),
        )
    }

    /// 完成构造。
    pub fn build(self) -> OptionsSchema {
        OptionsSchema {
            members: self.members,
        }
    }
}

/// 解析后的选项记录：按 Schema 顺序排列的 (名称, 值) 序列。
///
/// # 契约说明（What）
/// - 记录归调用方所有；`open` 借用期间有效，需要保留的值必须复制。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionsRecord {
    values: Vec<(String, OptionValue)>,
}

impl OptionsRecord {
    /// 按名称取值。
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// 覆写一个已存在的同类型值（容器的 `child_opts_set` 钩子使用）。
    pub fn set(&mut self, name: &str, value: OptionValue) -> Result<()> {
        let Some(slot) = self
            .values
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
        else {
            return Err(FlowError::new(
                ErrorKind::NotFound,
                format!("option `{name}` is not part of the record"),
            ));
        };
        if slot.data_type() != value.data_type() {
            return Err(FlowError::new(
                ErrorKind::TypeMismatch,
                format!(
                    "option `{name}` holds `{}`, refusing `{}`",
                    slot.data_type().as_str(),
                    value.data_type().as_str()
                ),
            ));
        }
        *slot = value;
        Ok(())
    }

    /// 有序视图。
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// 布尔值便捷访问。
    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            OptionValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// 字节值便捷访问。
    pub fn byte(&self, name: &str) -> Option<u8> {
        match self.get(name)? {
            OptionValue::Byte(v) => Some(*v),
            _ => None,
        }
    }

    /// 整数值便捷访问。
    pub fn int(&self, name: &str) -> Option<IntRange> {
        match self.get(name)? {
            OptionValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// 浮点值便捷访问。
    pub fn float(&self, name: &str) -> Option<FloatRange> {
        match self.get(name)? {
            OptionValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// 字符串便捷访问。
    pub fn string(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            OptionValue::Str(v) => Some(v),
            _ => None,
        }
    }

    /// 规范文本序列化：`schema.parse(record.serialize_entries())` 还原出相等记录。
    pub fn serialize_entries(&self) -> Vec<String> {
        self.values
            .iter()
            .map(|(name, value)| format!("{name}={}", value.serialize_value()))
            .collect()
    }

    /// 简短的单行摘要，供 Inspector 的节点事件使用。
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for (idx, (name, value)) in self.values.iter().enumerate() {
            if idx > 0 {
                out.push(',');
            }
            out.push_str(name);
            out.push('=');
            out.push_str(&value.serialize_value());
        }
        out
    }
}

fn parse_i32(raw: &str, what: &str) -> Result<i32> {
    raw.trim().parse().map_err(|_| {
        FlowError::new(
            ErrorKind::TypeMismatch,
            format!("`{raw}` is not a valid integer for {what}"),
        )
    })
}

fn parse_f64(raw: &str, what: &str) -> Result<f64> {
    raw.trim().parse().map_err(|_| {
        FlowError::new(
            ErrorKind::TypeMismatch,
            format!("`{raw}` is not a valid float for {what}"),
        )
    })
}

fn parse_int_fields(raw: &str, name: &str, base: IntRange) -> Result<IntRange> {
    let mut out = base;
    if !raw.contains(':') {
        out.val = parse_i32(raw, name)?;
        return Ok(out);
    }
    for field in raw.split('|') {
        let Some((key, value)) = field.split_once(':') else {
            return Err(FlowError::new(
                ErrorKind::TypeMismatch,
                format!("malformed field `{field}` in option `{name}`"),
            ));
        };
        match key.trim() {
            "val" => out.val = parse_i32(value, name)?,
            "min" => out.min = parse_i32(value, name)?,
            "max" => out.max = parse_i32(value, name)?,
            "step" => out.step = parse_i32(value, name)?,
            other => {
                return Err(FlowError::new(
                    ErrorKind::TypeMismatch,
                    format!("unknown field `{other}` in option `{name}`"),
                ));
            }
        }
    }
    Ok(out)
}

fn parse_float_fields(raw: &str, name: &str, base: FloatRange) -> Result<FloatRange> {
    let mut out = base;
    if !raw.contains(':') {
        out.val = parse_f64(raw, name)?;
        return Ok(out);
    }
    for field in raw.split('|') {
        let Some((key, value)) = field.split_once(':') else {
            return Err(FlowError::new(
                ErrorKind::TypeMismatch,
                format!("malformed field `{field}` in option `{name}`"),
            ));
        };
        match key.trim() {
            "val" => out.val = parse_f64(value, name)?,
            "min" => out.min = parse_f64(value, name)?,
            "max" => out.max = parse_f64(value, name)?,
            "step" => out.step = parse_f64(value, name)?,
            other => {
                return Err(FlowError::new(
                    ErrorKind::TypeMismatch,
                    format!("unknown field `{other}` in option `{name}`"),
                ));
            }
        }
    }
    Ok(out)
}

// 两次裁剪顺序执行（先下界后上界），使结果幂等：min > max 的病态区间也会
// 稳定收敛到 max，序列化后重解析不再漂移。
fn clamp_int(mut range: IntRange, name: &str) -> IntRange {
    if range.val < range.min {
        log_warn!(
            "options",
            "option `{name}` value {} below min {}, clamping",
            range.val,
            range.min
        );
        range.val = range.min;
    }
    if range.val > range.max {
        log_warn!(
            "options",
            "option `{name}` value {} above max {}, clamping",
            range.val,
            range.max
        );
        range.val = range.max;
    }
    range
}

fn clamp_float(mut range: FloatRange, name: &str) -> FloatRange {
    if range.val < range.min {
        log_warn!(
            "options",
            "option `{name}` value {} below min {}, clamping",
            range.val,
            range.min
        );
        range.val = range.min;
    }
    if range.val > range.max {
        log_warn!(
            "options",
            "option `{name}` value {} above max {}, clamping",
            range.val,
            range.max
        );
        range.val = range.max;
    }
    range
}

fn parse_value(member: &OptionMember, raw: &str) -> Result<OptionValue> {
    let name: &str = &member.name;
    Ok(match (&member.default, member.data_type) {
        (_, OptionDataType::Boolean) => match raw.trim() {
            "true" => OptionValue::Boolean(true),
            "false" => OptionValue::Boolean(false),
            other => {
                return Err(FlowError::new(
                    ErrorKind::TypeMismatch,
                    format!("`{other}` is not a boolean for option `{name}`"),
                ));
            }
        },
        (_, OptionDataType::Byte) => {
            let trimmed = raw.trim();
            let parsed = if let Some(hex) = trimmed.strip_prefix("0x") {
                i64::from_str_radix(hex, 16)
            } else {
                trimmed.parse::<i64>()
            }
            .map_err(|_| {
                FlowError::new(
                    ErrorKind::TypeMismatch,
                    format!("`{trimmed}` is not a byte for option `{name}`"),
                )
            })?;
            if !(0..=255).contains(&parsed) {
                log_warn!(
                    "options",
                    "option `{name}` byte value {parsed} out of range, clamping"
                );
            }
            OptionValue::Byte(parsed.clamp(0, 255) as u8)
        }
        (OptionValue::Int(base), OptionDataType::Int) => {
            OptionValue::Int(clamp_int(parse_int_fields(raw, name, *base)?, name))
        }
        (OptionValue::Float(base), OptionDataType::Float) => {
            OptionValue::Float(clamp_float(parse_float_fields(raw, name, *base)?, name))
        }
        (_, OptionDataType::IntSpec) => {
            let parsed = parse_int_fields(raw, name, IntRange::of(0))?;
            OptionValue::IntSpec(IntRangeSpec {
                min: parsed.min,
                max: parsed.max,
                step: parsed.step,
            })
        }
        (_, OptionDataType::FloatSpec) => {
            let parsed = parse_float_fields(raw, name, FloatRange::of(0.0))?;
            OptionValue::FloatSpec(FloatRangeSpec {
                min: parsed.min,
                max: parsed.max,
                step: parsed.step,
            })
        }
        (_, OptionDataType::Str) => {
            let unquoted = raw
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .unwrap_or(raw);
            OptionValue::Str(unquoted.into())
        }
        (_, OptionDataType::Rgb) => {
            let trimmed = raw.trim();
            if let Some(hex) = trimmed.strip_prefix('#') {
                if hex.len() != 6 {
                    return Err(FlowError::new(
                        ErrorKind::TypeMismatch,
                        format!("`{trimmed}` is not an RGB color for option `{name}`"),
                    ));
                }
                let value = u32::from_str_radix(hex, 16).map_err(|_| {
                    FlowError::new(
                        ErrorKind::TypeMismatch,
                        format!("`{trimmed}` is not an RGB color for option `{name}`"),
                    )
                })?;
                OptionValue::Rgb(Rgb {
                    red: (value >> 16) as u8,
                    green: (value >> 8) as u8,
                    blue: value as u8,
                })
            } else {
                let mut parts = trimmed.split('|');
                let mut component = |label: &str| -> Result<u8> {
                    let raw = parts.next().ok_or_else(|| {
                        FlowError::new(
                            ErrorKind::TypeMismatch,
                            format!("option `{name}` RGB value is missing `{label}`"),
                        )
                    })?;
                    let parsed = parse_i32(raw, name)? as i64;
                    if !(0..=255).contains(&parsed) {
                        log_warn!(
                            "options",
                            "option `{name}` {label} component {parsed} out of range, clamping"
                        );
                    }
                    Ok(parsed.clamp(0, 255) as u8)
                };
                let rgb = Rgb {
                    red: component("red")?,
                    green: component("green")?,
                    blue: component("blue")?,
                };
                OptionValue::Rgb(rgb)
            }
        }
        (_, OptionDataType::DirectionVector) => {
            let mut parts = raw.trim().split('|');
            let mut axis = |label: &str| -> Result<f64> {
                let raw = parts.next().ok_or_else(|| {
                    FlowError::new(
                        ErrorKind::TypeMismatch,
                        format!("option `{name}` direction vector is missing `{label}`"),
                    )
                })?;
                parse_f64(raw, name)
            };
            OptionValue::Direction(DirectionVector {
                x: axis("x")?,
                y: axis("y")?,
                z: axis("z")?,
            })
        }
        (default, _) => {
            // 成员默认值与声明类型不符属于 Schema 构造错误，构造器保证不会出现。
            return Err(FlowError::new(
                ErrorKind::TypeMismatch,
                format!(
                    "schema member `{name}` default is `{}`",
                    default.data_type().as_str()
                ),
            ));
        }
    })
}
