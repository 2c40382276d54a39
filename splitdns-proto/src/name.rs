//! Presentation-form codec for uncompressed wire names.
//!
//! Wire names here are the raw RFC 1035 label sequence with every compression
//! pointer already expanded; [`crate::buffer`] handles the pointer chasing.
//! The presentation form is canonical: the root is `"."`, labels are joined
//! with dots, special characters are backslash-escaped, bytes outside the
//! printable ASCII range are rendered as `\DDD`, and RFC 2673 bit-string
//! labels as `\[xHH…H/LEN]`.

use std::fmt::{Display, Write};

/// Longest uncompressed wire name, trailing root label included.
pub const MAX_WIRE_LEN: usize = 255;
/// Longest ordinary label.
pub const MAX_LABEL_LEN: usize = 63;

/// EDNS0 extended label type for bit-string labels (RFC 2673).
pub(crate) const BITSTRING_LABEL: u8 = 0x41;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum NameError {
    /// The wire name exceeds 255 bytes.
    TooLong,
    /// A single label exceeds 63 bytes.
    LabelTooLong,
    /// The wire form ended in the middle of a label.
    Truncated,
    /// Unsupported label type bits (0x80, or an extended label that is not a
    /// bit-string).
    IllegalLabel(u8),
    /// Malformed presentation form.
    Syntax,
    /// A bit-string label failed RFC 2673 §3.2 validation.
    Bitstring,
}

impl Display for NameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooLong => write!(f, "domain name too long"),
            Self::LabelTooLong => write!(f, "label too long"),
            Self::Truncated => write!(f, "truncated domain name"),
            Self::IllegalLabel(bits) => write!(f, "illegal label type {bits:#04x}"),
            Self::Syntax => write!(f, "malformed domain name"),
            Self::Bitstring => write!(f, "malformed bit-string label"),
        }
    }
}

impl std::error::Error for NameError {}

/// Length of the label data following the length byte `src[0]`, bit-string
/// count byte included.
pub(crate) fn label_len(src: &[u8]) -> Result<usize, NameError> {
    let kind = *src.first().ok_or(NameError::Truncated)?;
    match kind & 0xC0 {
        0x00 => Ok(kind as usize),
        0x40 => {
            if kind != BITSTRING_LABEL {
                return Err(NameError::IllegalLabel(kind));
            }
            let bits = match *src.get(1).ok_or(NameError::Truncated)? {
                0 => 256,
                count => count as usize,
            };
            Ok((bits + 7) / 8 + 1)
        }
        other => Err(NameError::IllegalLabel(other)),
    }
}

fn is_special(c: u8) -> bool {
    // characters with zone-file meaning, escaped on output
    matches!(c, b'"' | b'.' | b';' | b'\\' | b'(' | b')' | b'@' | b'$')
}

fn is_printable(c: u8) -> bool {
    c > 0x20 && c < 0x7f
}

/// Render an uncompressed wire name in canonical presentation form.
pub fn to_presentation(wire: &[u8]) -> Result<String, NameError> {
    let mut out = String::new();
    let mut i = 0usize;

    loop {
        let kind = *wire.get(i).ok_or(NameError::Truncated)?;
        i += 1;
        if kind == 0 {
            break;
        }
        if !out.is_empty() {
            out.push('.');
        }
        match kind & 0xC0 {
            0x00 => {
                let data = wire
                    .get(i..i + kind as usize)
                    .ok_or(NameError::Truncated)?;
                i += kind as usize;
                for &c in data {
                    if is_special(c) {
                        out.push('\\');
                        out.push(c as char);
                    } else if !is_printable(c) {
                        let _ = write!(out, "\\{c:03}");
                    } else {
                        out.push(c as char);
                    }
                }
            }
            0x40 => {
                if kind != BITSTRING_LABEL {
                    return Err(NameError::IllegalLabel(kind));
                }
                let bits = match *wire.get(i).ok_or(NameError::Truncated)? {
                    0 => 256,
                    count => count as usize,
                };
                i += 1;
                let data = wire
                    .get(i..i + (bits + 7) / 8)
                    .ok_or(NameError::Truncated)?;
                i += (bits + 7) / 8;
                write_bitstring(&mut out, data, bits);
            }
            other => return Err(NameError::IllegalLabel(other)),
        }
    }

    if out.is_empty() {
        out.push('.');
    }
    Ok(out)
}

/// `\[x…/len]` rendering. Insignificant bits of the final digit are masked
/// off, matching what the encoder demands of them.
fn write_bitstring(out: &mut String, data: &[u8], bits: usize) {
    out.push_str("\\[x");
    let mut remaining = bits;
    let mut bytes = data.iter();
    while remaining > 7 {
        let byte = bytes.next().copied().unwrap_or(0);
        let _ = write!(out, "{byte:02x}");
        remaining -= 8;
    }
    if remaining > 4 {
        let byte = bytes.next().copied().unwrap_or(0);
        let _ = write!(out, "{:02x}", byte & (0xffu8 << (8 - remaining)));
    } else if remaining > 0 {
        let byte = bytes.next().copied().unwrap_or(0);
        let _ = write!(out, "{:1x}", (byte >> 4) & (0x0fu8 << (4 - remaining)) & 0x0f);
    }
    let _ = write!(out, "/{bits}]");
}

/// Parse a presentation-form name into its uncompressed wire form.
///
/// Both `"example.com"` and `"example.com."` are accepted; `"."` and `""`
/// denote the root.
pub fn from_presentation(src: &str) -> Result<Vec<u8>, NameError> {
    let bytes = src.as_bytes();
    if bytes.is_empty() || bytes == b"." {
        return Ok(vec![0]);
    }

    let mut out: Vec<u8> = Vec::with_capacity(bytes.len() + 2);
    let mut label_start = 0usize;
    out.push(0);

    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i];
        i += 1;
        if c == b'\\' {
            let escaped = *bytes.get(i).ok_or(NameError::Syntax)?;
            i += 1;
            if escaped == b'[' {
                // bit-string labels stand alone
                if out.len() != label_start + 1 {
                    return Err(NameError::Syntax);
                }
                let close = bytes[i..]
                    .iter()
                    .position(|&b| b == b']')
                    .ok_or(NameError::Syntax)?;
                encode_bitstring(&mut out, label_start, &bytes[i..i + close])?;
                i += close + 1;
                match bytes.get(i) {
                    None => return finish_label(out, label_start, true),
                    Some(b'.') => {
                        i += 1;
                        if i == bytes.len() {
                            return finish_label(out, label_start, true);
                        }
                        label_start = out.len();
                        out.push(0);
                        continue;
                    }
                    Some(_) => return Err(NameError::Syntax),
                }
            }
            let value = if escaped.is_ascii_digit() {
                let d2 = *bytes.get(i).ok_or(NameError::Syntax)?;
                let d3 = *bytes.get(i + 1).ok_or(NameError::Syntax)?;
                if !d2.is_ascii_digit() || !d3.is_ascii_digit() {
                    return Err(NameError::Syntax);
                }
                i += 2;
                let n = u32::from(escaped - b'0') * 100
                    + u32::from(d2 - b'0') * 10
                    + u32::from(d3 - b'0');
                u8::try_from(n).map_err(|_| NameError::Syntax)?
            } else {
                escaped
            };
            push_label_byte(&mut out, label_start, value)?;
        } else if c == b'.' {
            let len = out.len() - label_start - 1;
            if len == 0 {
                return Err(NameError::Syntax);
            }
            out[label_start] = len as u8;
            if i == bytes.len() {
                out.push(0);
                return check_total(out);
            }
            label_start = out.len();
            out.push(0);
        } else {
            push_label_byte(&mut out, label_start, c)?;
        }
    }

    finish_label(out, label_start, false)
}

fn push_label_byte(out: &mut Vec<u8>, label_start: usize, value: u8) -> Result<(), NameError> {
    if out.len() - label_start - 1 >= MAX_LABEL_LEN {
        return Err(NameError::LabelTooLong);
    }
    out.push(value);
    if out.len() >= MAX_WIRE_LEN {
        return Err(NameError::TooLong);
    }
    Ok(())
}

fn finish_label(
    mut out: Vec<u8>,
    label_start: usize,
    bitstring: bool,
) -> Result<Vec<u8>, NameError> {
    if !bitstring {
        let len = out.len() - label_start - 1;
        if len == 0 {
            return Err(NameError::Syntax);
        }
        out[label_start] = len as u8;
    }
    out.push(0);
    check_total(out)
}

fn check_total(out: Vec<u8>) -> Result<Vec<u8>, NameError> {
    if out.len() > MAX_WIRE_LEN {
        return Err(NameError::TooLong);
    }
    Ok(out)
}

/// Encode the inside of a `\[…]` bit-string label (only the hex form `xH…H`
/// and `xH…H/len` are supported, as in the BIND resolver this mirrors).
fn encode_bitstring(
    out: &mut Vec<u8>,
    label_start: usize,
    inner: &[u8],
) -> Result<(), NameError> {
    let hex_and_len = inner.strip_prefix(b"x").ok_or(NameError::Bitstring)?;
    let (hex, len_digits) = match hex_and_len.iter().position(|&b| b == b'/') {
        Some(slash) => (&hex_and_len[..slash], Some(&hex_and_len[slash + 1..])),
        None => (hex_and_len, None),
    };
    if hex.is_empty() {
        return Err(NameError::Bitstring);
    }

    let mut data: Vec<u8> = Vec::with_capacity(hex.len() / 2 + 1);
    let mut pending: Option<u8> = None;
    let mut seen_bits = 0usize;
    for &c in hex {
        let digit = (c as char).to_digit(16).ok_or(NameError::Bitstring)? as u8;
        match pending.take() {
            Some(high) => data.push(high << 4 | digit),
            None => pending = Some(digit),
        }
        seen_bits += 4;
        if seen_bits > 256 {
            return Err(NameError::Bitstring);
        }
    }
    if let Some(high) = pending {
        data.push(high << 4);
    }

    let bits = match len_digits {
        Some(digits) => {
            // the length never begins with 0 and the digit count must be just
            // sufficient for it, with insignificant trailing bits zero
            // (RFC 2673 §3.2)
            if digits.first().map_or(true, |&d| d == b'0') {
                return Err(NameError::Bitstring);
            }
            let bits: usize = std::str::from_utf8(digits)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or(NameError::Bitstring)?;
            if (bits + 3) & !3 != seen_bits {
                return Err(NameError::Bitstring);
            }
            for trailing in bits..seen_bits {
                if data[trailing / 8] & (1 << (7 - trailing % 8)) != 0 {
                    return Err(NameError::Bitstring);
                }
            }
            bits
        }
        None => seen_bits,
    };

    out[label_start] = BITSTRING_LABEL;
    out.push(if bits == 256 { 0 } else { bits as u8 });
    out.extend_from_slice(&data);
    if out.len() >= MAX_WIRE_LEN {
        return Err(NameError::TooLong);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{from_presentation, to_presentation, NameError};

    #[test]
    fn should_decode_root() {
        assert_eq!(to_presentation(&[0]).unwrap(), ".");
    }

    #[test]
    fn should_decode_simple_name() {
        let wire = b"\x07example\x03com\x00";
        assert_eq!(to_presentation(wire).unwrap(), "example.com");
    }

    #[test]
    fn should_preserve_case() {
        let wire = b"\x07eXaMpLe\x03Com\x00";
        assert_eq!(to_presentation(wire).unwrap(), "eXaMpLe.Com");
    }

    #[test]
    fn should_escape_specials_and_unprintables() {
        let wire = b"\x04a.b\"\x02\x01c\x00";
        assert_eq!(to_presentation(wire).unwrap(), "a\\.b\\\".\\001c");
    }

    #[test]
    fn should_reject_pointer_in_uncompressed_name() {
        let err = to_presentation(&[0xC0, 0x02]).unwrap_err();
        assert_eq!(err, NameError::IllegalLabel(0xC0));
    }

    #[test]
    fn should_reject_reserved_label_type() {
        let err = to_presentation(&[0x81, b'a', 0]).unwrap_err();
        assert_eq!(err, NameError::IllegalLabel(0x80));
    }

    #[test]
    fn should_encode_simple_name() {
        assert_eq!(
            from_presentation("example.com").unwrap(),
            b"\x07example\x03com\x00"
        );
    }

    #[test]
    fn should_encode_fully_qualified_name() {
        assert_eq!(
            from_presentation("example.com.").unwrap(),
            b"\x07example\x03com\x00"
        );
    }

    #[test]
    fn should_encode_root() {
        assert_eq!(from_presentation(".").unwrap(), vec![0]);
        assert_eq!(from_presentation("").unwrap(), vec![0]);
    }

    #[test]
    fn should_encode_escapes() {
        assert_eq!(
            from_presentation("a\\.b.\\001c").unwrap(),
            b"\x03a.b\x02\x01c\x00"
        );
    }

    #[test]
    fn should_reject_empty_label() {
        assert_eq!(from_presentation("a..b").unwrap_err(), NameError::Syntax);
        assert_eq!(from_presentation(".a").unwrap_err(), NameError::Syntax);
    }

    #[test]
    fn should_reject_long_label() {
        let label = "a".repeat(64);
        assert_eq!(
            from_presentation(&label).unwrap_err(),
            NameError::LabelTooLong
        );
    }

    #[test]
    fn should_reject_long_name() {
        let name = ["a".repeat(63).as_str(); 4].join(".");
        assert_eq!(from_presentation(&name).unwrap_err(), NameError::TooLong);
    }

    #[test]
    fn should_accept_longest_name() {
        // 3 * 64 + 62 + 1 + 1 = 255 wire bytes
        let name = format!("{0}.{0}.{0}.{1}", "a".repeat(63), "b".repeat(61));
        let wire = from_presentation(&name).unwrap();
        assert_eq!(wire.len(), 255);
        assert_eq!(to_presentation(&wire).unwrap(), name);
    }

    #[test]
    fn should_decode_bitstring_label() {
        // \[x0a000001/32].in-addr.arpa style label, 32 bits of data
        let wire = b"\x41\x20\x0a\x00\x00\x01\x07in-addr\x04arpa\x00";
        assert_eq!(
            to_presentation(wire).unwrap(),
            "\\[x0a000001/32].in-addr.arpa"
        );
    }

    #[test]
    fn should_decode_partial_byte_bitstring() {
        // 6 bits: the trailing two bits of the only byte are masked off
        let wire = [0x41, 6, 0b1010_1100, 0];
        assert_eq!(to_presentation(&wire).unwrap(), "\\[xac/6]");
    }

    #[test]
    fn should_encode_bitstring_label() {
        let wire = from_presentation("\\[x0a000001/32].in-addr.arpa").unwrap();
        assert_eq!(
            wire,
            b"\x41\x20\x0a\x00\x00\x01\x07in-addr\x04arpa\x00".to_vec()
        );
    }

    #[test]
    fn should_reject_bitstring_with_stray_trailing_bits() {
        // 6-bit length but the 7th bit of the data is set
        assert_eq!(
            from_presentation("\\[xad/6]").unwrap_err(),
            NameError::Bitstring
        );
    }

    #[test]
    fn should_reject_bitstring_with_excess_digits() {
        // four digits carry 16 bits, too many for a declared length of 6
        assert_eq!(
            from_presentation("\\[xac00/6]").unwrap_err(),
            NameError::Bitstring
        );
    }

    #[test]
    fn should_roundtrip_bitstring_without_length() {
        let wire = from_presentation("\\[xac]").unwrap();
        assert_eq!(wire, vec![0x41, 8, 0xac, 0]);
        assert_eq!(to_presentation(&wire).unwrap(), "\\[xac/8]");
    }

    #[test]
    fn should_roundtrip_escaped_names() {
        for name in [
            "example.com",
            "a\\.b.c",
            "\\001\\255.tld",
            "xn--hxajbheg2az3al.xn--jxalpdlp",
            "\\[x20010db8/32].ip6.arpa",
            "MiXeD.CaSe.Org",
        ] {
            let wire = from_presentation(name).unwrap();
            assert_eq!(to_presentation(&wire).unwrap(), name, "name {name}");
        }
    }
}
