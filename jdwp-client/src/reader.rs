// Readers for JDWP data types
//
// Every reader checks the remaining length first so a truncated packet
// becomes a protocol error instead of a panic inside `bytes`.

use crate::protocol::{JdwpError, JdwpResult};
use crate::types::{tags, Location, TaggedObject, Value, ValueData};
use bytes::{Buf, BufMut};

fn need(buf: &&[u8], len: usize, what: &str) -> JdwpResult<()> {
    if buf.remaining() < len {
        return Err(JdwpError::Protocol(format!(
            "Not enough data for {}: expected {}, got {}",
            what,
            len,
            buf.remaining()
        )));
    }
    Ok(())
}

/// Read a JDWP string (4-byte length prefix + UTF-8 bytes)
pub fn read_string(buf: &mut &[u8]) -> JdwpResult<String> {
    let len = read_u32(buf)? as usize;
    need(buf, len, "string")?;

    let bytes = &buf[..len];
    buf.advance(len);

    String::from_utf8(bytes.to_vec())
        .map_err(|e| JdwpError::Protocol(format!("Invalid UTF-8 in string: {}", e)))
}

pub fn read_u8(buf: &mut &[u8]) -> JdwpResult<u8> {
    need(buf, 1, "u8")?;
    Ok(buf.get_u8())
}

pub fn read_bool(buf: &mut &[u8]) -> JdwpResult<bool> {
    Ok(read_u8(buf)? != 0)
}

pub fn read_u32(buf: &mut &[u8]) -> JdwpResult<u32> {
    need(buf, 4, "u32")?;
    Ok(buf.get_u32())
}

pub fn read_i32(buf: &mut &[u8]) -> JdwpResult<i32> {
    need(buf, 4, "i32")?;
    Ok(buf.get_i32())
}

pub fn read_u64(buf: &mut &[u8]) -> JdwpResult<u64> {
    need(buf, 8, "u64")?;
    Ok(buf.get_u64())
}

pub fn read_i64(buf: &mut &[u8]) -> JdwpResult<i64> {
    need(buf, 8, "i64")?;
    Ok(buf.get_i64())
}

pub fn read_location(buf: &mut &[u8]) -> JdwpResult<Location> {
    Ok(Location {
        type_tag: read_u8(buf)?,
        class_id: read_u64(buf)?,
        method_id: read_u64(buf)?,
        index: read_u64(buf)?,
    })
}

pub fn read_tagged_object(buf: &mut &[u8]) -> JdwpResult<TaggedObject> {
    Ok(TaggedObject {
        tag: read_u8(buf)?,
        id: read_u64(buf)?,
    })
}

/// Read a tag byte followed by the value it describes
pub fn read_value(buf: &mut &[u8]) -> JdwpResult<Value> {
    let tag = read_u8(buf)?;
    read_untagged_value(buf, tag)
}

/// Read a value whose tag is known from context
pub fn read_untagged_value(buf: &mut &[u8], tag: u8) -> JdwpResult<Value> {
    let data = match tag {
        tags::BYTE => ValueData::Byte(read_u8(buf)? as i8),
        tags::CHAR => {
            need(buf, 2, "char")?;
            ValueData::Char(buf.get_u16())
        }
        tags::SHORT => {
            need(buf, 2, "short")?;
            ValueData::Short(buf.get_i16())
        }
        tags::INT => ValueData::Int(read_i32(buf)?),
        tags::LONG => ValueData::Long(read_i64(buf)?),
        tags::FLOAT => ValueData::Float(f32::from_bits(read_u32(buf)?)),
        tags::DOUBLE => ValueData::Double(f64::from_bits(read_u64(buf)?)),
        tags::BOOLEAN => ValueData::Boolean(read_bool(buf)?),
        tags::VOID => ValueData::Void,
        tags::OBJECT
        | tags::ARRAY
        | tags::STRING
        | tags::THREAD
        | tags::THREAD_GROUP
        | tags::CLASS_LOADER
        | tags::CLASS_OBJECT => ValueData::Object(read_u64(buf)?),
        other => {
            return Err(JdwpError::Protocol(format!(
                "Unknown value tag: {} ({:?})",
                other, other as char
            )))
        }
    };
    Ok(Value { tag, data })
}

/// Write a JDWP string (4-byte length prefix + UTF-8 bytes)
pub fn put_string(buf: &mut impl BufMut, value: &str) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value.as_bytes());
}

pub fn put_location(buf: &mut impl BufMut, location: &Location) {
    buf.put_u8(location.type_tag);
    buf.put_u64(location.class_id);
    buf.put_u64(location.method_id);
    buf.put_u64(location.index);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_roundtrip_and_truncation() {
        let mut out = Vec::new();
        put_string(&mut out, "Lcom/example/Foo;");
        let mut buf = out.as_slice();
        assert_eq!(read_string(&mut buf).unwrap(), "Lcom/example/Foo;");
        assert!(buf.is_empty());

        let mut short: &[u8] = &[0, 0, 0, 9, b'a'];
        assert!(read_string(&mut short).is_err());
    }

    #[test]
    fn test_tagged_values() {
        let mut buf: &[u8] = &[b'I', 0, 0, 0, 42, b'Z', 1, b'V'];
        assert_eq!(read_value(&mut buf).unwrap().data, ValueData::Int(42));
        assert_eq!(read_value(&mut buf).unwrap().data, ValueData::Boolean(true));
        assert_eq!(read_value(&mut buf).unwrap().data, ValueData::Void);

        let mut unknown: &[u8] = &[b'?', 0];
        assert!(read_value(&mut unknown).is_err());
    }

    #[test]
    fn test_object_values_share_encoding() {
        let mut buf: &[u8] = &[b's', 0, 0, 0, 0, 0, 0, 0, 5];
        let value = read_value(&mut buf).unwrap();
        assert_eq!(value.tag, tags::STRING);
        assert_eq!(value.data, ValueData::Object(5));
    }
}
