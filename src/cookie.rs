//! Cookie の読み取りと Set-Cookie の送出
//!
//! ```rust
//! use shiguredo_httpd::cookie::CookieHandler;
//! use shiguredo_httpd::decoder::Headers;
//!
//! let mut headers = Headers::new();
//! headers.insert("cookie".to_string(), "session=abc; theme=dark".to_string());
//!
//! let mut cookies = CookieHandler::new(&headers);
//! assert_eq!(cookies.read("session"), Some("abc"));
//! cookies.delete("theme");
//! assert_eq!(cookies.unload_queue().len(), 1);
//! ```

use std::collections::HashMap;

use crate::date::HttpDate;
use crate::decoder::Headers;

/// 送出する Cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    expires: String,
}

impl Cookie {
    /// 現在から `days` 日後に期限切れになる Cookie を作成
    pub fn new(name: &str, value: &str, days: i64) -> Self {
        Self::with_expires(name, value, &HttpDate::days_from_now(days).to_string())
    }

    /// 期限を文字列で指定して作成
    pub fn with_expires(name: &str, value: &str, expires: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            expires: expires.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Set-Cookie ヘッダー値
    pub fn http_header(&self) -> String {
        format!("{}={}; expires={}", self.name, self.value, self.expires)
    }
}

/// リクエストの Cookie と送出待ちの Set-Cookie を管理する
#[derive(Debug, Clone, Default)]
pub struct CookieHandler {
    cookies: HashMap<String, String>,
    queue: Vec<Cookie>,
}

impl CookieHandler {
    /// `cookie` ヘッダーから作成する
    pub fn new(headers: &Headers) -> Self {
        let mut cookies = HashMap::new();
        if let Some(raw) = headers.get("cookie") {
            for token in raw.split(';') {
                let mut parts = token.trim().split('=');
                if let (Some(name), Some(value), None) = (parts.next(), parts.next(), parts.next())
                {
                    cookies.insert(name.to_string(), value.to_string());
                }
            }
        }
        Self {
            cookies,
            queue: Vec::new(),
        }
    }

    /// リクエストの Cookie 値を読む
    pub fn read(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// リクエストの Cookie 名
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cookies.keys().map(String::as_str)
    }

    /// Cookie を設定する (`days` 日後に期限切れ)
    pub fn set(&mut self, name: &str, value: &str, days: i64) {
        self.queue.push(Cookie::new(name, value, days));
    }

    /// Cookie を送出キューに追加する
    pub fn set_cookie(&mut self, cookie: Cookie) {
        self.queue.push(cookie);
    }

    /// Cookie を削除する (過去の期限で上書きする)
    pub fn delete(&mut self, name: &str) {
        self.set(name, "-delete-", -30);
    }

    /// 送出待ちの Set-Cookie ヘッダー値を取り出す
    pub fn unload_queue(&mut self) -> Vec<String> {
        self.queue.drain(..).map(|c| c.http_header()).collect()
    }
}
