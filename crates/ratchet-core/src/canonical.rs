//! Canonical JSON encoding.
//!
//! Signature verification and keyid derivation both hash an encoding of a
//! JSON value, so that encoding must be byte-stable: object keys are sorted
//! lexicographically and separators are compact, with no trailing
//! whitespace. Default serde formatting is never used for hashing.
//!
//! Metadata never contains floating-point numbers; a float in the input is
//! a format error rather than a silently unstable encoding.

use serde_json::Value;

use crate::errors::{RatchetError, RatchetResult};

/// Encode a JSON value canonically.
pub fn canonical_json_bytes(value: &Value) -> RatchetResult<Vec<u8>> {
    let mut out = Vec::new();
    write_value(value, &mut out)?;
    Ok(out)
}

fn write_value(value: &Value, out: &mut Vec<u8>) -> RatchetResult<()> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => {
            if n.is_f64() {
                return Err(RatchetError::format(
                    "floating-point numbers have no canonical encoding",
                ));
            }
            out.extend_from_slice(n.to_string().as_bytes());
        }
        Value::String(s) => write_string(s, out)?,
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(key, out)?;
                out.push(b':');
                write_value(&map[key.as_str()], out)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

fn write_string(s: &str, out: &mut Vec<u8>) -> RatchetResult<()> {
    let encoded = serde_json::to_vec(s)
        .map_err(|e| RatchetError::format(format!("unencodable string: {e}")))?;
    out.extend_from_slice(&encoded);
    Ok(())
}
