//! Typed value codec
//!
//! Values are stored as raw byte strings:
//! - scalars are fixed-width native-endian (`bool`/`u8` 1 byte, `i32`/`f32`
//!   4 bytes, `i64`/`f64` 8 bytes)
//! - strings are UTF-16 code units, 2 bytes each, native-endian, with no
//!   BOM and no terminator; the empty string is zero bytes
//! - numeric arrays are the concatenation of their fixed-width elements
//! - string arrays are `[i32 count]` followed by `[i32 len][utf16 bytes]`
//!   per element, lengths counted in UTF-16 code units
//! - a void marker is a zero-length value (presence only)
//!
//! Decoding validates the stored shape and reports mismatches as
//! [`PrefDbError::ValueShape`] carrying the requesting key.

use prefdb_core::{PrefDbError, Result};

fn shape(key: &str, detail: String) -> PrefDbError {
    PrefDbError::ValueShape {
        key: key.to_string(),
        detail,
    }
}

fn expect_width(key: &str, raw: &[u8], width: usize) -> Result<()> {
    if raw.len() != width {
        return Err(shape(key, format!("{} != {}", raw.len(), width)));
    }
    Ok(())
}

fn expect_multiple(key: &str, raw: &[u8], width: usize) -> Result<()> {
    if raw.len() % width != 0 {
        return Err(shape(key, format!("({} % {}) != 0", raw.len(), width)));
    }
    Ok(())
}

pub fn encode_bool(value: bool) -> Vec<u8> {
    vec![u8::from(value)]
}

pub fn decode_bool(key: &str, raw: &[u8]) -> Result<bool> {
    expect_width(key, raw, 1)?;
    Ok(raw[0] != 0)
}

pub fn encode_u8(value: u8) -> Vec<u8> {
    vec![value]
}

pub fn decode_u8(key: &str, raw: &[u8]) -> Result<u8> {
    expect_width(key, raw, 1)?;
    Ok(raw[0])
}

pub fn encode_i32(value: i32) -> Vec<u8> {
    value.to_ne_bytes().to_vec()
}

pub fn decode_i32(key: &str, raw: &[u8]) -> Result<i32> {
    expect_width(key, raw, 4)?;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(raw);
    Ok(i32::from_ne_bytes(buf))
}

pub fn encode_i64(value: i64) -> Vec<u8> {
    value.to_ne_bytes().to_vec()
}

pub fn decode_i64(key: &str, raw: &[u8]) -> Result<i64> {
    expect_width(key, raw, 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(raw);
    Ok(i64::from_ne_bytes(buf))
}

/// Widening read: accepts a 4-byte value as well as an 8-byte one, for
/// keys that migrated from 32-bit to 64-bit storage.
pub fn decode_i32_or_i64(key: &str, raw: &[u8]) -> Result<i64> {
    match raw.len() {
        4 => Ok(i64::from(decode_i32(key, raw)?)),
        8 => decode_i64(key, raw),
        len => Err(shape(key, format!("{len} != 4 && {len} != 8"))),
    }
}

pub fn encode_f32(value: f32) -> Vec<u8> {
    value.to_ne_bytes().to_vec()
}

pub fn decode_f32(key: &str, raw: &[u8]) -> Result<f32> {
    expect_width(key, raw, 4)?;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(raw);
    Ok(f32::from_ne_bytes(buf))
}

pub fn encode_f64(value: f64) -> Vec<u8> {
    value.to_ne_bytes().to_vec()
}

pub fn decode_f64(key: &str, raw: &[u8]) -> Result<f64> {
    expect_width(key, raw, 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(raw);
    Ok(f64::from_ne_bytes(buf))
}

pub fn encode_string(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() * 2);
    for unit in value.encode_utf16() {
        out.extend_from_slice(&unit.to_ne_bytes());
    }
    out
}

pub fn decode_string(key: &str, raw: &[u8]) -> Result<String> {
    expect_multiple(key, raw, 2)?;
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| shape(key, "invalid UTF-16".to_string()))
}

pub fn encode_i32_array(values: &[i32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for value in values {
        out.extend_from_slice(&value.to_ne_bytes());
    }
    out
}

pub fn decode_i32_array(key: &str, raw: &[u8]) -> Result<Vec<i32>> {
    expect_multiple(key, raw, 4)?;
    Ok(raw
        .chunks_exact(4)
        .map(|chunk| {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(chunk);
            i32::from_ne_bytes(buf)
        })
        .collect())
}

pub fn encode_i64_array(values: &[i64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 8);
    for value in values {
        out.extend_from_slice(&value.to_ne_bytes());
    }
    out
}

pub fn decode_i64_array(key: &str, raw: &[u8]) -> Result<Vec<i64>> {
    expect_multiple(key, raw, 8)?;
    Ok(raw
        .chunks_exact(8)
        .map(|chunk| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            i64::from_ne_bytes(buf)
        })
        .collect())
}

pub fn encode_f32_array(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for value in values {
        out.extend_from_slice(&value.to_ne_bytes());
    }
    out
}

pub fn decode_f32_array(key: &str, raw: &[u8]) -> Result<Vec<f32>> {
    expect_multiple(key, raw, 4)?;
    Ok(raw
        .chunks_exact(4)
        .map(|chunk| {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(chunk);
            f32::from_ne_bytes(buf)
        })
        .collect())
}

pub fn encode_f64_array(values: &[f64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 8);
    for value in values {
        out.extend_from_slice(&value.to_ne_bytes());
    }
    out
}

pub fn decode_f64_array(key: &str, raw: &[u8]) -> Result<Vec<f64>> {
    expect_multiple(key, raw, 8)?;
    Ok(raw
        .chunks_exact(8)
        .map(|chunk| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            f64::from_ne_bytes(buf)
        })
        .collect())
}

pub fn encode_string_array<S: AsRef<str>>(values: &[S]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(values.len() as i32).to_ne_bytes());
    for value in values {
        let units: Vec<u16> = value.as_ref().encode_utf16().collect();
        out.extend_from_slice(&(units.len() as i32).to_ne_bytes());
        for unit in units {
            out.extend_from_slice(&unit.to_ne_bytes());
        }
    }
    out
}

pub fn decode_string_array(key: &str, raw: &[u8]) -> Result<Vec<String>> {
    let mut pos = 0usize;
    let count = read_i32(key, raw, &mut pos)?;
    if count < 0 {
        return Err(shape(key, format!("negative count {count}")));
    }
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = read_i32(key, raw, &mut pos)?;
        if len < 0 {
            return Err(shape(key, format!("negative length {len}")));
        }
        let bytes = len as usize * 2;
        let remaining = raw.len() - pos;
        if remaining < bytes {
            return Err(shape(key, format!("{remaining} < {bytes}")));
        }
        let units: Vec<u16> = raw[pos..pos + bytes]
            .chunks_exact(2)
            .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
            .collect();
        pos += bytes;
        out.push(String::from_utf16(&units).map_err(|_| shape(key, "invalid UTF-16".to_string()))?);
    }
    if pos != raw.len() {
        return Err(shape(key, format!("{} trailing bytes", raw.len() - pos)));
    }
    Ok(out)
}

fn read_i32(key: &str, raw: &[u8], pos: &mut usize) -> Result<i32> {
    let remaining = raw.len() - *pos;
    if remaining < 4 {
        return Err(shape(key, format!("{remaining} < 4")));
    }
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&raw[*pos..*pos + 4]);
    *pos += 4;
    Ok(i32::from_ne_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape_detail(err: PrefDbError) -> String {
        match err {
            PrefDbError::ValueShape { detail, .. } => detail,
            other => panic!("expected value shape error, got {other}"),
        }
    }

    #[test]
    fn scalar_roundtrips() {
        assert!(decode_bool("k", &encode_bool(true)).unwrap());
        assert!(!decode_bool("k", &encode_bool(false)).unwrap());
        assert_eq!(decode_u8("k", &encode_u8(0xFE)).unwrap(), 0xFE);
        assert_eq!(decode_i32("k", &encode_i32(-42)).unwrap(), -42);
        assert_eq!(decode_i64("k", &encode_i64(i64::MIN)).unwrap(), i64::MIN);
        assert_eq!(decode_f32("k", &encode_f32(1.5)).unwrap(), 1.5);
        assert_eq!(decode_f64("k", &encode_f64(-0.25)).unwrap(), -0.25);
    }

    #[test]
    fn scalar_width_mismatch_reports_both_sizes() {
        let err = decode_i32("counter", &encode_i64(7)).unwrap_err();
        assert_eq!(shape_detail(err), "8 != 4");
        let err = decode_i64("counter", &encode_i32(7)).unwrap_err();
        assert_eq!(shape_detail(err), "4 != 8");
        assert!(decode_bool("flag", &[]).is_err());
    }

    #[test]
    fn shape_error_names_the_key() {
        match decode_i32("settings.volume", &[0u8; 8]).unwrap_err() {
            PrefDbError::ValueShape { key, .. } => assert_eq!(key, "settings.volume"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn i32_or_i64_widens() {
        assert_eq!(decode_i32_or_i64("k", &encode_i32(-5)).unwrap(), -5);
        assert_eq!(
            decode_i32_or_i64("k", &encode_i64(1 << 40)).unwrap(),
            1 << 40
        );
        let err = decode_i32_or_i64("k", &[0u8; 3]).unwrap_err();
        assert_eq!(shape_detail(err), "3 != 4 && 3 != 8");
    }

    #[test]
    fn string_roundtrip_including_non_bmp() {
        for s in ["", "hello", "héllo wörld", "汉字", "🦀 crab"] {
            assert_eq!(decode_string("k", &encode_string(s)).unwrap(), s);
        }
        assert!(encode_string("").is_empty());
    }

    #[test]
    fn string_odd_length_is_rejected() {
        let raw = encode_string("abc");
        let err = decode_string("k", &raw[..5]).unwrap_err();
        assert_eq!(shape_detail(err), "(5 % 2) != 0");
    }

    #[test]
    fn string_lone_surrogate_is_rejected() {
        let raw: Vec<u8> = 0xD800u16.to_ne_bytes().to_vec();
        let err = decode_string("k", &raw).unwrap_err();
        assert_eq!(shape_detail(err), "invalid UTF-16");
    }

    #[test]
    fn numeric_array_roundtrips() {
        let ints = [1i32, -2, i32::MAX];
        assert_eq!(
            decode_i32_array("k", &encode_i32_array(&ints)).unwrap(),
            ints
        );
        let longs = [0i64, i64::MIN];
        assert_eq!(
            decode_i64_array("k", &encode_i64_array(&longs)).unwrap(),
            longs
        );
        let floats = [1.0f32, -2.5];
        assert_eq!(
            decode_f32_array("k", &encode_f32_array(&floats)).unwrap(),
            floats
        );
        let doubles = [0.125f64];
        assert_eq!(
            decode_f64_array("k", &encode_f64_array(&doubles)).unwrap(),
            doubles
        );
        assert_eq!(decode_i64_array("k", &[]).unwrap(), Vec::<i64>::new());
    }

    #[test]
    fn numeric_array_partial_element_is_rejected() {
        let raw = encode_i64_array(&[1, 2]);
        let err = decode_i64_array("k", &raw[..15]).unwrap_err();
        assert_eq!(shape_detail(err), "(15 % 8) != 0");
    }

    #[test]
    fn string_array_roundtrip() {
        let values = ["", "one", "汉字", "🦀"];
        assert_eq!(
            decode_string_array("k", &encode_string_array(&values)).unwrap(),
            values
        );
        let empty: [&str; 0] = [];
        assert_eq!(
            decode_string_array("k", &encode_string_array(&empty)).unwrap(),
            Vec::<String>::new()
        );
    }

    #[test]
    fn string_array_truncation_is_rejected_at_each_step() {
        let raw = encode_string_array(&["alpha", "beta"]);
        // cut inside the last element's payload
        assert!(decode_string_array("k", &raw[..raw.len() - 2]).is_err());
        // cut inside a length word
        assert!(decode_string_array("k", &raw[..6]).is_err());
        // cut inside the count word
        assert!(decode_string_array("k", &raw[..2]).is_err());
    }

    #[test]
    fn string_array_negative_length_is_rejected() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&1i32.to_ne_bytes());
        raw.extend_from_slice(&(-3i32).to_ne_bytes());
        let err = decode_string_array("k", &raw).unwrap_err();
        assert_eq!(shape_detail(err), "negative length -3");
    }

    #[test]
    fn string_array_trailing_bytes_are_rejected() {
        let mut raw = encode_string_array(&["x"]);
        raw.extend_from_slice(&[0, 0]);
        let err = decode_string_array("k", &raw).unwrap_err();
        assert_eq!(shape_detail(err), "2 trailing bytes");
    }
}
