//! 包负载与选项共用的值结构。
//!
//! # 模块职责（Why）
//! - IRANGE/DRANGE 包、RGB、方向向量等值既出现在包负载中，也出现在节点选项里，
//!   集中定义避免两套表示漂移。
//! - 全部类型实现 `serde` 序列化，支撑选项记录的往返校验。
//!
//! # 契约说明（What）
//! - 所有结构体是纯数据，不含失败路径；范围裁剪等策略由选项解析层负责。

use core::fmt;

use serde::{Deserialize, Serialize};

/// 带边界与步长的整数范围值（IRANGE 负载）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRange {
    pub val: i32,
    pub min: i32,
    pub max: i32,
    pub step: i32,
}

impl IntRange {
    /// 以默认边界（`i32` 全域、步长 1）包装一个值。
    pub const fn of(val: i32) -> Self {
        Self {
            val,
            min: i32::MIN,
            max: i32::MAX,
            step: 1,
        }
    }

    /// 返回值是否落在声明的闭区间内。
    pub const fn in_bounds(&self) -> bool {
        self.val >= self.min && self.val <= self.max
    }
}

impl Default for IntRange {
    fn default() -> Self {
        Self::of(0)
    }
}

/// 整数范围的规格部分（无当前值），对应选项类型 `irange-spec`。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRangeSpec {
    pub min: i32,
    pub max: i32,
    pub step: i32,
}

impl Default for IntRangeSpec {
    fn default() -> Self {
        Self {
            min: i32::MIN,
            max: i32::MAX,
            step: 1,
        }
    }
}

/// 带边界与步长的浮点范围值（DRANGE 负载）。
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FloatRange {
    pub val: f64,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl FloatRange {
    /// 以默认边界（`f64` 全域、步长 1.0）包装一个值。
    pub const fn of(val: f64) -> Self {
        Self {
            val,
            min: f64::MIN,
            max: f64::MAX,
            step: 1.0,
        }
    }

    /// 返回值是否落在声明的闭区间内。
    pub fn in_bounds(&self) -> bool {
        self.val >= self.min && self.val <= self.max
    }
}

impl Default for FloatRange {
    fn default() -> Self {
        Self::of(0.0)
    }
}

/// 浮点范围的规格部分（无当前值），对应选项类型 `drange-spec`。
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FloatRangeSpec {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Default for FloatRangeSpec {
    fn default() -> Self {
        Self {
            min: f64::MIN,
            max: f64::MAX,
            step: 1.0,
        }
    }
}

/// RGB 颜色值。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

/// 三维方向向量，常见于加速度计/陀螺仪节点的输出。
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectionVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl DirectionVector {
    /// 向量模长。`no_std` 轨道使用 `libm` 完成浮点开方。
    pub fn magnitude(&self) -> f64 {
        libm::sqrt(self.x * self.x + self.y * self.y + self.z * self.z)
    }
}

/// 地理位置（纬度、经度、海拔）。
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

/// UTC 时间戳（Unix 纪元秒 + 纳秒）。
///
/// # 设计背景（Why）
/// - 核心不依赖任何时钟：时间戳由宿主或传感器节点填入，核心仅负责携带与
///   按 ISO-8601 渲染，保持 `no_std` 可用。
///
/// # 契约说明（What）
/// - `nanos` 必须小于 `1_000_000_000`；构造函数会做归一化。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    secs: i64,
    nanos: u32,
}

impl Timestamp {
    /// 由秒与纳秒构造时间戳，纳秒溢出会进位到秒。
    pub const fn new(secs: i64, nanos: u32) -> Self {
        let carry = (nanos / 1_000_000_000) as i64;
        Self {
            secs: secs + carry,
            nanos: nanos % 1_000_000_000,
        }
    }

    /// 纪元秒。
    pub const fn secs(&self) -> i64 {
        self.secs
    }

    /// 秒内纳秒。
    pub const fn nanos(&self) -> u32 {
        self.nanos
    }
}

/// 把纪元日序号换算为公历 (年, 月, 日)。
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let days = self.secs.div_euclid(86_400);
        let mut rem = self.secs.rem_euclid(86_400);
        let (year, month, day) = civil_from_days(days);
        let hour = rem / 3_600;
        rem %= 3_600;
        let minute = rem / 60;
        let second = rem % 60;
        write!(
            f,
            "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}"
        )?;
        if self.nanos != 0 {
            write!(f, ".{:09}", self.nanos)?;
        }
        write!(f, "Z")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn int_range_defaults_span_the_full_domain() {
        let r = IntRange::of(7);
        assert_eq!(r.val, 7);
        assert_eq!(r.min, i32::MIN);
        assert_eq!(r.max, i32::MAX);
        assert_eq!(r.step, 1);
        assert!(r.in_bounds());
    }

    #[test]
    fn magnitude_matches_hand_computation() {
        let v = DirectionVector {
            x: 3.0,
            y: 4.0,
            z: 0.0,
        };
        assert!((v.magnitude() - 5.0).abs() < 1e-12);
    }

    /// ISO-8601 渲染是 Inspector 文本格式的一部分，锁定几个已知时刻。
    #[test]
    fn timestamp_renders_iso_8601_utc() {
        assert_eq!(format!("{}", Timestamp::new(0, 0)), "1970-01-01T00:00:00Z");
        assert_eq!(
            format!("{}", Timestamp::new(1_609_459_200, 0)),
            "2021-01-01T00:00:00Z"
        );
        assert_eq!(
            format!("{}", Timestamp::new(86_399, 0)),
            "1970-01-01T23:59:59Z"
        );
        assert_eq!(
            format!("{}", Timestamp::new(0, 500_000_000)),
            "1970-01-01T00:00:00.500000000Z"
        );
    }

    #[test]
    fn timestamp_normalizes_nanos_overflow() {
        let ts = Timestamp::new(1, 1_500_000_000);
        assert_eq!(ts.secs(), 2);
        assert_eq!(ts.nanos(), 500_000_000);
    }

    /// 纪元前的日期也必须正确换算（嵌入式 RTC 可能回绕）。
    #[test]
    fn timestamp_handles_pre_epoch_instants() {
        assert_eq!(format!("{}", Timestamp::new(-1, 0)), "1969-12-31T23:59:59Z");
    }
}
