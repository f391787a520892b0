//! パーセントエンコーディング (RFC 3986 Section 2.1)
//!
//! リクエストのパスとクエリパラメーターのデコードに使う。
//! `+` は空白に変換しない。
//!
//! ```rust
//! use shiguredo_httpd::uri::{percent_decode, percent_encode};
//!
//! assert_eq!(percent_encode("hello world"), "hello%20world");
//! assert_eq!(percent_decode("hello%20world").unwrap(), "hello world");
//! assert_eq!(percent_decode("a+b").unwrap(), "a+b");
//! ```

/// パーセントデコードエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PercentDecodeError {
    /// `%` の後に 16 進数 2 桁が続かない
    #[error("invalid percent encoding")]
    InvalidPercentEncoding,
    /// デコード結果が UTF-8 として不正
    #[error("invalid UTF-8 sequence")]
    InvalidUtf8,
}

/// RFC 3986 Section 2.3 の unreserved 文字
fn is_unreserved(c: u8) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, b'-' | b'.' | b'_' | b'~')
}

/// unreserved 文字以外をパーセントエンコードする
pub fn percent_encode(input: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut result = String::with_capacity(input.len() * 3);
    for byte in input.bytes() {
        if is_unreserved(byte) {
            result.push(byte as char);
        } else {
            result.push('%');
            result.push(HEX[(byte >> 4) as usize] as char);
            result.push(HEX[(byte & 0x0F) as usize] as char);
        }
    }
    result
}

/// パーセントデコードして UTF-8 文字列を返す
pub fn percent_decode(input: &str) -> Result<String, PercentDecodeError> {
    let bytes = percent_decode_bytes(input)?;
    String::from_utf8(bytes).map_err(|_| PercentDecodeError::InvalidUtf8)
}

/// パーセントデコードしてバイト列を返す
pub fn percent_decode_bytes(input: &str) -> Result<Vec<u8>, PercentDecodeError> {
    let mut result = Vec::with_capacity(input.len());
    let mut bytes = input.bytes();

    while let Some(byte) = bytes.next() {
        if byte != b'%' {
            result.push(byte);
            continue;
        }
        let high = bytes
            .next()
            .and_then(from_hex_char)
            .ok_or(PercentDecodeError::InvalidPercentEncoding)?;
        let low = bytes
            .next()
            .and_then(from_hex_char)
            .ok_or(PercentDecodeError::InvalidPercentEncoding)?;
        result.push((high << 4) | low);
    }

    Ok(result)
}

fn from_hex_char(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}
