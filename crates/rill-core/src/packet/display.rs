//! 包值的规范文本渲染。
//!
//! Inspector 的调试输出与测试断言都以这里的格式为准：
//! `<empty>`、`<true>`、`<0x2a>`、`<val:7|min:…|max:…|step:1>`、`<"text">`、
//! `<mem=…|size=…|refcnt=…|type=…|parent=…>`、ISO-8601 时间戳以及
//! `<COMPOSED-PACKET {…}>`。

use core::fmt;

use super::blob::Blob;
use super::value::{FieldValue, Packet, PacketValue};

fn fmt_blob(f: &mut fmt::Formatter<'_>, blob: &Blob) -> fmt::Result {
    write!(
        f,
        "<mem=0x{:x}|size={}|refcnt={}|type={}|",
        blob.addr(),
        blob.len(),
        blob.refcount(),
        blob.blob_type()
    )?;
    match blob.parent() {
        Some(parent) => write!(f, "parent=0x{:x}>", parent.addr()),
        None => write!(f, "parent=(nil)>"),
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value() {
            PacketValue::Empty => write!(f, "<empty>"),
            PacketValue::Any => write!(f, "<any>"),
            PacketValue::Boolean(true) => write!(f, "<true>"),
            PacketValue::Boolean(false) => write!(f, "<false>"),
            PacketValue::Byte(b) => write!(f, "<0x{b:02x}>"),
            PacketValue::IRange(r) => write!(
                f,
                "<val:{}|min:{}|max:{}|step:{}>",
                r.val, r.min, r.max, r.step
            ),
            PacketValue::DRange(r) => write!(
                f,
                "<val:{}|min:{}|max:{}|step:{}>",
                r.val, r.min, r.max, r.step
            ),
            PacketValue::Str(s) => write!(f, "<\"{s}\">"),
            PacketValue::Blob(b) | PacketValue::JsonObject(b) | PacketValue::JsonArray(b) => {
                fmt_blob(f, b)
            }
            PacketValue::Rgb(c) => {
                write!(f, "<red:{}|green:{}|blue:{}>", c.red, c.green, c.blue)
            }
            PacketValue::Direction(v) => write!(f, "<x:{}|y:{}|z:{}>", v.x, v.y, v.z),
            PacketValue::Location(l) => write!(
                f,
                "<lat:{}|lon:{}|alt:{}>",
                l.latitude, l.longitude, l.altitude
            ),
            PacketValue::Timestamp(ts) => write!(f, "<{ts}>"),
            PacketValue::HttpResponse(r) => {
                write!(f, "<code:{}|url:\"{}\">", r.response_code, r.url)
            }
            PacketValue::Error(e) => write!(f, "<code:{}|msg:\"{}\">", e.code, e.message),
            PacketValue::Composed(members) => {
                write!(f, "<COMPOSED-PACKET {{")?;
                for member in members {
                    write!(f, "{member}")?;
                }
                write!(f, "}}>")
            }
            PacketValue::Record(fields) => {
                write!(f, "<")?;
                for (idx, field) in fields.iter().enumerate() {
                    if idx > 0 {
                        write!(f, "|")?;
                    }
                    match field {
                        FieldValue::Boolean(v) => write!(f, "{v}")?,
                        FieldValue::Byte(v) => write!(f, "0x{v:02x}")?,
                        FieldValue::Int(v) => write!(f, "{v}")?,
                        FieldValue::Float(v) => write!(f, "{v}")?,
                        FieldValue::Str(v) => write!(f, "\"{v}\"")?,
                    }
                }
                write!(f, ">")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::format;

    use crate::packet::{registry, ty, Blob, Packet};
    use crate::types::{IntRange, Timestamp};

    #[test]
    fn scalar_forms_match_the_canonical_format() {
        assert_eq!(format!("{}", Packet::new_empty()), "<empty>");
        assert_eq!(format!("{}", Packet::new_any()), "<any>");
        assert_eq!(format!("{}", Packet::new_boolean(true)), "<true>");
        assert_eq!(format!("{}", Packet::new_byte(0x0f)), "<0x0f>");
        assert_eq!(format!("{}", Packet::new_string("on")), "<\"on\">");
        assert_eq!(
            format!(
                "{}",
                Packet::new_irange(IntRange {
                    val: 7,
                    min: 0,
                    max: 100,
                    step: 1,
                })
            ),
            "<val:7|min:0|max:100|step:1>"
        );
        assert_eq!(
            format!("{}", Packet::new_timestamp(Timestamp::new(0, 0))),
            "<1970-01-01T00:00:00Z>"
        );
    }

    #[test]
    fn composed_form_concatenates_member_renderings() {
        let ty = registry::composed(&[ty::string().clone(), ty::irange().clone()]).unwrap();
        let packet = Packet::new_composed(
            &ty,
            alloc::vec![Packet::new_string("k"), Packet::new_irange_value(42)],
        )
        .unwrap();
        let rendered = format!("{packet}");
        assert!(rendered.starts_with("<COMPOSED-PACKET {<\"k\"><val:42|"));
        assert!(rendered.ends_with("}>"));
    }

    #[test]
    fn blob_form_carries_size_refcount_type_and_parent() {
        let packet = Packet::new_blob(Blob::new(*b"abc"));
        let rendered = format!("{packet}");
        assert!(rendered.contains("|size=3|refcnt=1|type=mem|parent=(nil)>"));
    }
}
