//! JSON codec for datums.
//!
//! Parsing rides on `serde_json` and converts through [`serde_json::Value`];
//! pseudo-type objects are demoted during the conversion. Writing is done by
//! hand because the wire format's canonical number representation (C-locale
//! `%.17g`, signed zero preserved, integral doubles without a fraction) is
//! not something `serde_json`'s float formatter produces.

use std::fmt::Write as _;

use crate::error::{Error, Result};
use crate::reql::datum::Datum;

/// Integral doubles up to 2^53 are exactly representable and are written
/// without a fraction.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Parse a complete JSON document into a datum.
///
/// Whitespace between tokens is tolerated; trailing non-whitespace is an
/// error. Objects carrying `$reql_type$ = "BINARY"` are demoted to BINARY.
pub fn parse(input: &str) -> Result<Datum> {
    let value: serde_json::Value =
        serde_json::from_str(input).map_err(|e| Error::Protocol(format!("invalid JSON: {e}")))?;
    Ok(Datum::from(value))
}

/// Parse a complete JSON document from raw bytes.
pub fn parse_slice(input: &[u8]) -> Result<Datum> {
    let value: serde_json::Value =
        serde_json::from_slice(input).map_err(|e| Error::Protocol(format!("invalid JSON: {e}")))?;
    Ok(Datum::from(value))
}

/// Serialize a datum to its canonical JSON form.
pub fn write(datum: &Datum) -> String {
    let mut out = String::new();
    write_datum(datum, &mut out);
    out
}

fn write_datum(datum: &Datum, out: &mut String) {
    match datum {
        Datum::Null => out.push_str("null"),
        Datum::Bool(true) => out.push_str("true"),
        Datum::Bool(false) => out.push_str("false"),
        Datum::Number(n) => write_number(*n, out),
        Datum::String(s) => write_string(s, out),
        Datum::Binary(_) => write_datum(&datum.to_raw(), out),
        Datum::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_datum(item, out);
            }
            out.push(']');
        }
        Datum::Object(map) => {
            out.push('{');
            for (i, (key, value)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_datum(value, out);
            }
            out.push('}');
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            // NUL and every other control byte, tab included, goes out as
            // a unicode escape
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_number(n: f64, out: &mut String) {
    // -0.0 must stay distinguishable from 0 so signed zero survives a
    // round trip.
    if n == 0.0 && n.is_sign_negative() {
        out.push_str("-0.0");
        return;
    }
    if n.is_nan() {
        out.push_str("nan");
        return;
    }
    if n.is_infinite() {
        out.push_str(if n < 0.0 { "-inf" } else { "inf" });
        return;
    }
    if n == n.trunc() && n.abs() <= MAX_SAFE_INTEGER {
        let _ = write!(out, "{}", n as i64);
        return;
    }
    out.push_str(&format_g17(n));
}

/// C `%.17g` semantics: 17 significant digits, trailing zeros stripped,
/// fixed notation while the decimal exponent lies in [-4, 17), scientific
/// with a signed two-digit-minimum exponent otherwise.
fn format_g17(value: f64) -> String {
    let formatted = format!("{:.16e}", value);
    let (mantissa, exp_str) = formatted
        .split_once('e')
        .expect("float formatting always yields an exponent");
    let exp: i32 = exp_str.parse().expect("float exponent is numeric");
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();

    let mut out = String::new();
    if mantissa.starts_with('-') {
        out.push('-');
    }
    if (-4..17).contains(&exp) {
        if exp >= 0 {
            let point = (exp + 1) as usize;
            out.push_str(&digits[..point]);
            let frac = digits[point..].trim_end_matches('0');
            if !frac.is_empty() {
                out.push('.');
                out.push_str(frac);
            }
        } else {
            out.push_str("0.");
            for _ in 0..(-exp - 1) {
                out.push('0');
            }
            out.push_str(digits.trim_end_matches('0'));
        }
    } else {
        out.push_str(&digits[..1]);
        let frac = digits[1..].trim_end_matches('0');
        if !frac.is_empty() {
            out.push('.');
            out.push_str(frac);
        }
        out.push('e');
        out.push(if exp >= 0 { '+' } else { '-' });
        let magnitude = exp.abs();
        if magnitude < 10 {
            out.push('0');
        }
        let _ = write!(out, "{magnitude}");
    }
    out
}
