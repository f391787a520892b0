//! Content-Type ヘッダー
//!
//! ボディ解釈に必要なメディアタイプ、charset、multipart 境界だけを寛容に取り出す。
//! 不正な形式でも失敗せず、取り出せなかった要素は未設定として扱う。
//!
//! ```rust
//! use shiguredo_httpd::content_type::ContentType;
//!
//! let ct = ContentType::new(Some("multipart/form-data; boundary=\"xyz\""));
//! assert!(ct.is_multipart());
//! assert_eq!(ct.boundary(), Some("xyz"));
//! assert_eq!(ct.encoding(), "US-ASCII");
//!
//! let ct = ContentType::new(Some("text/html"));
//! assert_eq!(ct.try_utf8().content_type_header(), Some("text/html; charset=UTF-8"));
//! ```

const MULTIPART_FORM_DATA: &str = "multipart/form-data";
const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const ASCII_ENCODING: &str = "US-ASCII";
const UTF8_ENCODING: &str = "UTF-8";

/// パース済み Content-Type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    header: Option<String>,
    mime_type: String,
    charset: Option<String>,
    boundary: Option<String>,
}

impl ContentType {
    /// Content-Type ヘッダー値から作成する
    ///
    /// ヘッダーが無い場合は charset を UTF-8 とみなす。
    pub fn new(header: Option<&str>) -> Self {
        let Some(header) = header else {
            return Self {
                header: None,
                mime_type: String::new(),
                charset: Some(UTF8_ENCODING.to_string()),
                boundary: None,
            };
        };

        let (mime_part, rest) = match header.find(';') {
            Some(pos) => (&header[..pos], &header[pos + 1..]),
            None => (header, ""),
        };
        let mime_type = mime_part
            .trim()
            .split(|c: char| c == ',' || c.is_whitespace())
            .next()
            .filter(|s| s.contains('/'))
            .unwrap_or_default()
            .to_string();

        let mut charset = None;
        let mut boundary = None;
        for (name, value) in parse_parameters(rest) {
            if name.eq_ignore_ascii_case("charset") && charset.is_none() {
                charset = Some(value);
            } else if name.eq_ignore_ascii_case("boundary") && boundary.is_none() {
                boundary = Some(value);
            }
        }

        let is_multipart = mime_type.eq_ignore_ascii_case(MULTIPART_FORM_DATA);
        Self {
            header: Some(header.to_string()),
            mime_type,
            charset,
            boundary: if is_multipart { boundary } else { None },
        }
    }

    /// 元のヘッダー値
    pub fn content_type_header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    /// メディアタイプ (例: `text/html`)
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// 指定された charset
    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    /// 実際に使うエンコーディング名
    ///
    /// charset 未指定の場合は `US-ASCII`。
    pub fn encoding(&self) -> &str {
        self.charset.as_deref().unwrap_or(ASCII_ENCODING)
    }

    /// multipart 境界 (`multipart/form-data` の場合のみ)
    pub fn boundary(&self) -> Option<&str> {
        self.boundary.as_deref()
    }

    /// `multipart/form-data` かどうか
    pub fn is_multipart(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case(MULTIPART_FORM_DATA)
    }

    /// `application/x-www-form-urlencoded` かどうか
    pub fn is_form_urlencoded(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case(FORM_URLENCODED)
    }

    /// charset が未指定なら `; charset=UTF-8` を付けた Content-Type を返す
    pub fn try_utf8(&self) -> ContentType {
        match (&self.charset, &self.header) {
            (None, Some(header)) => {
                ContentType::new(Some(&format!("{}; charset={}", header, UTF8_ENCODING)))
            }
            _ => self.clone(),
        }
    }
}

/// `;` 区切りの `name=value` を取り出す (値の引用符は除去)
fn parse_parameters(input: &str) -> impl Iterator<Item = (&str, String)> {
    input.split(';').filter_map(|param| {
        let (name, value) = param.split_once('=')?;
        let value = value
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .split(',')
            .next()
            .unwrap_or_default();
        Some((name.trim(), value.to_string()))
    })
}

/// 文字コード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Ascii,
    Latin1,
    Utf8,
}

impl Charset {
    /// エンコーディング名から判定する
    ///
    /// 未対応のエンコーディングは UTF-8 として扱う。
    pub fn from_name(name: &str) -> Charset {
        match name.trim().to_ascii_lowercase().as_str() {
            "us-ascii" | "ascii" => Charset::Ascii,
            "iso-8859-1" | "latin1" | "iso8859-1" => Charset::Latin1,
            _ => Charset::Utf8,
        }
    }

    /// テキストをこの文字コードで表現できるか
    pub fn can_encode(self, text: &str) -> bool {
        match self {
            Charset::Ascii => text.is_ascii(),
            Charset::Latin1 => text.chars().all(|c| (c as u32) <= 0xFF),
            Charset::Utf8 => true,
        }
    }

    /// テキストをエンコードする
    ///
    /// 表現できない文字は `?` に置き換える。
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Charset::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
            Charset::Latin1 => text
                .chars()
                .map(|c| u8::try_from(c as u32).unwrap_or(b'?'))
                .collect(),
            Charset::Utf8 => text.as_bytes().to_vec(),
        }
    }

    /// バイト列をテキストへデコードする
    ///
    /// 不正なバイトは U+FFFD に置き換える。
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Charset::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
                .collect(),
            Charset::Latin1 => bytes.iter().map(|&b| b as char).collect(),
            Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_header() {
        let ct = ContentType::new(None);
        assert_eq!(ct.content_type_header(), None);
        assert_eq!(ct.mime_type(), "");
        assert_eq!(ct.encoding(), "UTF-8");
        assert!(!ct.is_multipart());
    }

    #[test]
    fn test_default_charset_is_ascii() {
        let ct = ContentType::new(Some("text/plain"));
        assert_eq!(ct.mime_type(), "text/plain");
        assert_eq!(ct.charset(), None);
        assert_eq!(ct.encoding(), "US-ASCII");
    }

    #[test]
    fn test_charset() {
        let ct = ContentType::new(Some("text/html; CHARSET='iso-8859-1'"));
        assert_eq!(ct.charset(), Some("iso-8859-1"));
        assert_eq!(Charset::from_name(ct.encoding()), Charset::Latin1);
    }

    #[test]
    fn test_boundary_only_for_multipart() {
        let ct = ContentType::new(Some("multipart/form-data; boundary=abc"));
        assert_eq!(ct.boundary(), Some("abc"));
        let ct = ContentType::new(Some("multipart/mixed; boundary=abc"));
        assert_eq!(ct.boundary(), None);
        let ct = ContentType::new(Some("MULTIPART/FORM-DATA; charset=UTF-8; boundary=\"q q\""));
        assert!(ct.is_multipart());
        assert_eq!(ct.boundary(), Some("q q"));
        assert_eq!(ct.charset(), Some("UTF-8"));
    }

    #[test]
    fn test_form_urlencoded() {
        let ct = ContentType::new(Some("application/x-www-form-urlencoded; charset=UTF-8"));
        assert!(ct.is_form_urlencoded());
    }

    #[test]
    fn test_try_utf8() {
        let ct = ContentType::new(Some("text/plain"));
        let utf8 = ct.try_utf8();
        assert_eq!(utf8.charset(), Some("UTF-8"));
        assert_eq!(
            utf8.content_type_header(),
            Some("text/plain; charset=UTF-8")
        );

        let ct = ContentType::new(Some("text/plain; charset=ISO-8859-1"));
        assert_eq!(ct.try_utf8(), ct);
    }

    #[test]
    fn test_charset_encode_decode() {
        assert!(Charset::Ascii.can_encode("abc"));
        assert!(!Charset::Ascii.can_encode("日本"));
        assert!(Charset::Latin1.can_encode("café"));
        assert_eq!(Charset::Latin1.encode("café"), vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(Charset::Ascii.encode("é"), b"?".to_vec());
        assert_eq!(Charset::Latin1.decode(&[0xE9]), "é");
        assert_eq!(Charset::Ascii.decode(&[b'a', 0xE9]), "a\u{FFFD}");
        assert_eq!(Charset::Utf8.decode("日本".as_bytes()), "日本");
    }
}
