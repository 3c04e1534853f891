//! Compact, hand-rolled binary encoding for `Value`.
//!
//! Scalars use their fixed-width big-endian representation; strings and
//! vectors are length-prefixed. This mirrors the teacher's choice to hand
//! roll `byteorder`/`bincode` rather than pull in those crates.

use crate::core::common::types::value::{Complex32, Complex64};
use crate::core::common::types::{DataType, Value};
use crate::core::common::OxidbError;

fn write_len(buf: &mut Vec<u8>, len: usize) {
    buf.extend_from_slice(&(len as u32).to_be_bytes());
}

fn read_len(bytes: &[u8], pos: &mut usize) -> Result<usize, OxidbError> {
    let slice = bytes
        .get(*pos..*pos + 4)
        .ok_or_else(|| OxidbError::DataCorruption("truncated length prefix".to_string()))?;
    *pos += 4;
    Ok(u32::from_be_bytes(slice.try_into().map_err(|_| {
        OxidbError::DataCorruption("malformed length prefix".to_string())
    })?) as usize)
}

/// Serializes `value` into its compact byte representation.
#[must_use]
pub fn serialize_value(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    match value {
        Value::Null => {}
        Value::Boolean(b) => buf.push(u8::from(*b)),
        Value::Byte(b) => buf.push(*b as u8),
        Value::Short(s) => buf.extend_from_slice(&s.to_be_bytes()),
        Value::Int(i) => buf.extend_from_slice(&i.to_be_bytes()),
        Value::Long(l) => buf.extend_from_slice(&l.to_be_bytes()),
        Value::Float(f) => buf.extend_from_slice(&f.to_be_bytes()),
        Value::Double(d) => buf.extend_from_slice(&d.to_be_bytes()),
        Value::Complex32(c) => {
            buf.extend_from_slice(&c.re.to_be_bytes());
            buf.extend_from_slice(&c.im.to_be_bytes());
        }
        Value::Complex64(c) => {
            buf.extend_from_slice(&c.re.to_be_bytes());
            buf.extend_from_slice(&c.im.to_be_bytes());
        }
        Value::Date(d) => buf.extend_from_slice(&d.to_be_bytes()),
        Value::String(s) => {
            write_len(&mut buf, s.len());
            buf.extend_from_slice(s.as_bytes());
        }
        Value::BooleanVector(v) => {
            write_len(&mut buf, v.len());
            for b in v {
                buf.push(u8::from(*b));
            }
        }
        Value::IntVector(v) => {
            write_len(&mut buf, v.len());
            for i in v {
                buf.extend_from_slice(&i.to_be_bytes());
            }
        }
        Value::LongVector(v) => {
            write_len(&mut buf, v.len());
            for l in v {
                buf.extend_from_slice(&l.to_be_bytes());
            }
        }
        Value::FloatVector(v) => {
            write_len(&mut buf, v.len());
            for f in v {
                buf.extend_from_slice(&f.to_be_bytes());
            }
        }
        Value::DoubleVector(v) => {
            write_len(&mut buf, v.len());
            for d in v {
                buf.extend_from_slice(&d.to_be_bytes());
            }
        }
        Value::Complex32Vector(v) => {
            write_len(&mut buf, v.len());
            for c in v {
                buf.extend_from_slice(&c.re.to_be_bytes());
                buf.extend_from_slice(&c.im.to_be_bytes());
            }
        }
        Value::Complex64Vector(v) => {
            write_len(&mut buf, v.len());
            for c in v {
                buf.extend_from_slice(&c.re.to_be_bytes());
                buf.extend_from_slice(&c.im.to_be_bytes());
            }
        }
    }
    buf
}

/// Deserializes a `Value` of the given `data_type` from `bytes`.
///
/// # Errors
/// Returns `DataCorruption` if `bytes` is shorter than `data_type` requires.
pub fn deserialize_value(data_type: DataType, bytes: &[u8]) -> Result<Value, OxidbError> {
    let mut pos = 0usize;
    read_at(data_type, bytes, &mut pos)
}

fn take<'a>(bytes: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8], OxidbError> {
    let slice = bytes
        .get(*pos..*pos + n)
        .ok_or_else(|| OxidbError::DataCorruption("truncated value".to_string()))?;
    *pos += n;
    Ok(slice)
}

fn read_at(data_type: DataType, bytes: &[u8], pos: &mut usize) -> Result<Value, OxidbError> {
    Ok(match data_type {
        DataType::Boolean => Value::Boolean(take(bytes, pos, 1)?[0] != 0),
        DataType::Byte => Value::Byte(take(bytes, pos, 1)?[0] as i8),
        DataType::Short => Value::Short(i16::from_be_bytes(take(bytes, pos, 2)?.try_into().unwrap())),
        DataType::Int => Value::Int(i32::from_be_bytes(take(bytes, pos, 4)?.try_into().unwrap())),
        DataType::Long => Value::Long(i64::from_be_bytes(take(bytes, pos, 8)?.try_into().unwrap())),
        DataType::Float => Value::Float(f32::from_be_bytes(take(bytes, pos, 4)?.try_into().unwrap())),
        DataType::Double => Value::Double(f64::from_be_bytes(take(bytes, pos, 8)?.try_into().unwrap())),
        DataType::Complex32 => Value::Complex32(Complex32 {
            re: f32::from_be_bytes(take(bytes, pos, 4)?.try_into().unwrap()),
            im: f32::from_be_bytes(take(bytes, pos, 4)?.try_into().unwrap()),
        }),
        DataType::Complex64 => Value::Complex64(Complex64 {
            re: f64::from_be_bytes(take(bytes, pos, 8)?.try_into().unwrap()),
            im: f64::from_be_bytes(take(bytes, pos, 8)?.try_into().unwrap()),
        }),
        DataType::Date => Value::Date(i64::from_be_bytes(take(bytes, pos, 8)?.try_into().unwrap())),
        DataType::String => {
            let len = read_len(bytes, pos)?;
            let raw = take(bytes, pos, len)?;
            Value::String(
                String::from_utf8(raw.to_vec())
                    .map_err(|e| OxidbError::DataCorruption(e.to_string()))?,
            )
        }
        DataType::BooleanVector(_) => {
            let len = read_len(bytes, pos)?;
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                v.push(take(bytes, pos, 1)?[0] != 0);
            }
            Value::BooleanVector(v)
        }
        DataType::IntVector(_) => {
            let len = read_len(bytes, pos)?;
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                v.push(i32::from_be_bytes(take(bytes, pos, 4)?.try_into().unwrap()));
            }
            Value::IntVector(v)
        }
        DataType::LongVector(_) => {
            let len = read_len(bytes, pos)?;
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                v.push(i64::from_be_bytes(take(bytes, pos, 8)?.try_into().unwrap()));
            }
            Value::LongVector(v)
        }
        DataType::FloatVector(_) => {
            let len = read_len(bytes, pos)?;
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                v.push(f32::from_be_bytes(take(bytes, pos, 4)?.try_into().unwrap()));
            }
            Value::FloatVector(v)
        }
        DataType::DoubleVector(_) => {
            let len = read_len(bytes, pos)?;
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                v.push(f64::from_be_bytes(take(bytes, pos, 8)?.try_into().unwrap()));
            }
            Value::DoubleVector(v)
        }
        DataType::Complex32Vector(_) => {
            let len = read_len(bytes, pos)?;
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                let re = f32::from_be_bytes(take(bytes, pos, 4)?.try_into().unwrap());
                let im = f32::from_be_bytes(take(bytes, pos, 4)?.try_into().unwrap());
                v.push(Complex32 { re, im });
            }
            Value::Complex32Vector(v)
        }
        DataType::Complex64Vector(_) => {
            let len = read_len(bytes, pos)?;
            let mut v = Vec::with_capacity(len);
            for _ in 0..len {
                let re = f64::from_be_bytes(take(bytes, pos, 8)?.try_into().unwrap());
                let im = f64::from_be_bytes(take(bytes, pos, 8)?.try_into().unwrap());
                v.push(Complex64 { re, im });
            }
            Value::Complex64Vector(v)
        }
    })
}

/// Encodes a non-negative integer with a variable-length "compressed int"
/// scheme (7 bits per byte, high bit set on all but the last byte). Used by
/// the VAF signature store for cell-index lists.
pub fn write_compressed_int(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decodes a value written by [`write_compressed_int`].
///
/// # Errors
/// Returns `DataCorruption` if the buffer ends before a terminating byte.
pub fn read_compressed_int(bytes: &[u8], pos: &mut usize) -> Result<u64, OxidbError> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = *bytes
            .get(*pos)
            .ok_or_else(|| OxidbError::DataCorruption("truncated compressed int".to_string()))?;
        *pos += 1;
        result |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trips() {
        let v = Value::Long(-42);
        let bytes = serialize_value(&v);
        assert_eq!(deserialize_value(DataType::Long, &bytes).unwrap(), v);
    }

    #[test]
    fn vector_round_trips() {
        let v = Value::FloatVector(vec![1.0, -2.5, 3.25]);
        let bytes = serialize_value(&v);
        assert_eq!(deserialize_value(DataType::FloatVector(3), &bytes).unwrap(), v);
    }

    #[test]
    fn compressed_int_round_trips() {
        let mut buf = Vec::new();
        write_compressed_int(&mut buf, 300);
        let mut pos = 0;
        assert_eq!(read_compressed_int(&buf, &mut pos).unwrap(), 300);
        assert_eq!(pos, buf.len());
    }

    #[test]
    fn truncated_string_is_data_corruption() {
        let bytes = [0, 0, 0, 5, b'h', b'i']; // claims 5 bytes, only 2 present
        assert!(matches!(
            deserialize_value(DataType::String, &bytes),
            Err(OxidbError::DataCorruption(_))
        ));
    }
}
