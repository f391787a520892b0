//! リクエストライン / ヘッダーのデコード
//!
//! [`find_header_end`](crate::framer::find_header_end) で切り出したヘッダーブロックを
//! 行単位で解析して [`RequestHead`] を作る。
//!
//! - ヘッダー名は小文字化して保存し、重複した場合は後勝ち
//! - ヘッダー値は前後の空白を除去
//! - プロトコルバージョンが無い場合は `HTTP/1.1`
//! - URI の `?` 以降はクエリ文字列として切り出してからパスをパーセントデコード

use std::collections::HashMap;

use crate::error::Error;
use crate::uri::percent_decode;

/// ヘッダーマップ (キーは小文字)
pub type Headers = HashMap<String, String>;

/// パラメーターマップ (1 つのキーに複数の値を順序付きで保持)
pub type Parameters = HashMap<String, Vec<String>>;

const USAGE: &str = "Usage: GET /example/file.html";

/// デコード済みのリクエストヘッド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    /// メソッドトークン (未検証)
    pub method: String,
    /// デコード済みパス (クエリを含まない)
    pub uri: String,
    /// 生のクエリ文字列
    pub query_string: Option<String>,
    /// プロトコルバージョン
    pub version: String,
    /// ヘッダー
    pub headers: Headers,
    /// クエリ文字列から得たパラメーター
    pub parameters: Parameters,
}

impl RequestHead {
    /// ヘッダーを取得 (名前は大文字小文字を区別しない)
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    /// キープアライブ接続かどうか
    ///
    /// `HTTP/1.1` かつ Connection ヘッダーに `close` が含まれない場合に true。
    pub fn is_keep_alive(&self) -> bool {
        self.version == "HTTP/1.1"
            && !self
                .get_header("connection")
                .is_some_and(|v| v.to_ascii_lowercase().contains("close"))
    }

    /// Content-Length ヘッダーの値
    pub fn content_length(&self) -> Option<u64> {
        self.get_header("content-length")
            .and_then(|v| v.trim().parse().ok())
    }
}

/// ヘッダーブロックをデコードする
///
/// `buf` はヘッダー終端までのバイト列 (終端を含んでもよい)。
pub fn decode_request_head(buf: &[u8]) -> Result<RequestHead, Error> {
    let text = String::from_utf8_lossy(buf);
    let mut lines = split_lines(&text);

    let request_line = lines.next().unwrap_or_default();
    let mut tokens = request_line.split_ascii_whitespace();

    let method = tokens
        .next()
        .ok_or_else(|| Error::bad_request(format!("BAD REQUEST: Syntax error. {}", USAGE)))?
        .to_string();
    let raw_uri = tokens
        .next()
        .ok_or_else(|| Error::bad_request(format!("BAD REQUEST: Missing URI. {}", USAGE)))?;
    let version = tokens.next().unwrap_or("HTTP/1.1").to_string();

    let mut parameters = Parameters::new();
    let (path, query_string) = match raw_uri.split_once('?') {
        Some((path, query)) => {
            decode_parameters(query, &mut parameters)?;
            (path, Some(query.to_string()))
        }
        None => (raw_uri, None),
    };
    let uri = decode_component(path)?;

    let mut headers = Headers::new();
    for line in lines {
        if line.trim().is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    Ok(RequestHead {
        method,
        uri,
        query_string,
        version,
        headers,
        parameters,
    })
}

/// クエリ文字列 / フォームデータをパラメーターマップへ追加する
///
/// `&` で分割し、最初の `=` でキーと値に分ける。`=` の無いトークンは値が空文字列の
/// キーになる。キーはデコード後に前後の空白を除去する。
pub fn decode_parameters(input: &str, parameters: &mut Parameters) -> Result<(), Error> {
    for token in input.split('&') {
        if token.is_empty() {
            continue;
        }
        let (key, value) = match token.split_once('=') {
            Some((key, value)) => (decode_component(key)?, decode_component(value)?),
            None => (decode_component(token)?, String::new()),
        };
        parameters
            .entry(key.trim().to_string())
            .or_default()
            .push(value);
    }
    Ok(())
}

fn decode_component(input: &str) -> Result<String, Error> {
    percent_decode(input)
        .map_err(|e| Error::bad_request(format!("BAD REQUEST: {}: {:?}", e, input)))
}

/// `\r\n`、`\n`、`\r` のいずれも行末として扱う行イテレーター
fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line))
}
