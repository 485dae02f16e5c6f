//! # Wire Encoder
//!
//! Encodes `Value` trees into compact JSON text.

use bytes::Bytes;

use super::value::Value;

/// Encode a value into wire text
///
/// Total over the grammar: non-finite floats fall back to their textual form
/// as an escaped string, so this never fails.
///
/// # Examples
///
/// ```
/// use cellprobe::wire::{encode, Value};
///
/// let v = Value::Map(vec![
///     ("tech".to_string(), Value::from("LTE")),
///     ("rsrp".to_string(), Value::Float(-95.0)),
///     ("pci".to_string(), Value::Null),
/// ]);
/// assert_eq!(encode(&v), r#"{"tech":"LTE","rsrp":-95.0,"pci":null}"#);
/// ```
pub fn encode(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

/// Encode a value straight into a payload buffer
pub fn to_bytes(value: &Value) -> Bytes {
    Bytes::from(encode(value))
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Integer(i) => out.push_str(&i.to_string()),
        Value::Float(f) => write_float(out, *f),
        Value::String(s) => write_string(out, s),
        Value::Map(entries) => {
            out.push('{');
            for (i, (key, item)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, item);
            }
            out.push('}');
        }
        Value::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
    }
}

/// `Debug` keeps a fractional part or exponent, so floats decode as floats
fn write_float(out: &mut String, f: f64) {
    if f.is_finite() {
        out.push_str(&format!("{:?}", f));
    } else {
        write_string(out, &f.to_string());
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}
