//! レスポンスヘッドと転送方式の決定
//!
//! ボディ以外のレスポンス情報を保持し、ステータスライン/ヘッダーのエンコードと
//! 転送方式 (Content-Length / chunked / gzip) の決定を行う。
//! ボディの送出は I/O 層が [`TransferPlan`] に従って行う。

use crate::date::HttpDate;
use crate::method::Method;
use crate::status::Status;

/// gzip 圧縮の利用方針
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GzipUsage {
    /// MIME タイプが `text/` か `/json` を含む場合に圧縮
    #[default]
    Default,
    /// 常に圧縮
    Always,
    /// 圧縮しない
    Never,
}

/// ボディの転送方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlan {
    /// gzip 圧縮する
    pub gzip: bool,
    /// chunked でフレーミングする
    pub chunked: bool,
    /// ボディを送信する (HEAD や 1xx/204/304 では false)
    pub send_body: bool,
    /// ボディソースから読み出す最大バイト数 (`None` は EOF まで)
    pub limit: Option<u64>,
}

/// レスポンスヘッド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    status: Status,
    mime_type: Option<String>,
    headers: Vec<(String, String)>,
    cookie_headers: Vec<String>,
    content_length: Option<u64>,
    gzip_usage: GzipUsage,
    keep_alive: bool,
    request_method: Option<Method>,
}

impl ResponseHead {
    /// レスポンスヘッドを作成する
    ///
    /// `content_length` が `None` のボディは長さ不明として chunked で送る。
    pub fn new(status: Status, mime_type: Option<&str>, content_length: Option<u64>) -> Self {
        Self {
            status,
            mime_type: mime_type.map(str::to_string),
            headers: Vec::new(),
            cookie_headers: Vec::new(),
            content_length,
            gzip_usage: GzipUsage::Default,
            keep_alive: true,
            request_method: None,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// ボディ長 (不明なら `None`)
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// ヘッダーを設定する
    ///
    /// 同名のヘッダー (大文字小文字を区別しない) があれば置き換える。
    pub fn add_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(entry) => *entry = (name.to_string(), value.to_string()),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    /// ヘッダーを削除する
    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// ヘッダーを取得 (大文字小文字を区別しない)
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Set-Cookie 行を追加する
    pub fn add_cookie_header(&mut self, cookie: &str) {
        self.cookie_headers.push(cookie.to_string());
    }

    pub fn cookie_headers(&self) -> &[String] {
        &self.cookie_headers
    }

    /// 送信後に接続を閉じるかどうかを設定する
    ///
    /// `Connection: close` ヘッダーの有無で表現する。
    pub fn close_connection(&mut self, close: bool) {
        if close {
            self.add_header("connection", "close");
        } else {
            self.remove_header("connection");
        }
    }

    /// 送信後に接続を閉じるかどうか
    pub fn is_close_connection(&self) -> bool {
        self.get_header("connection")
            .is_some_and(|v| v.eq_ignore_ascii_case("close"))
    }

    pub fn set_keep_alive(&mut self, keep_alive: bool) {
        self.keep_alive = keep_alive;
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn set_gzip_usage(&mut self, usage: GzipUsage) {
        self.gzip_usage = usage;
    }

    /// gzip を常に使う / 使わないを設定する
    pub fn set_use_gzip(&mut self, use_gzip: bool) {
        self.gzip_usage = if use_gzip {
            GzipUsage::Always
        } else {
            GzipUsage::Never
        };
    }

    pub fn gzip_usage(&self) -> GzipUsage {
        self.gzip_usage
    }

    /// 元リクエストのメソッドを設定する (HEAD ではボディを送らない)
    pub fn set_request_method(&mut self, method: Method) {
        self.request_method = Some(method);
    }

    pub fn request_method(&self) -> Option<Method> {
        self.request_method
    }

    /// gzip を使う方針かどうか
    pub fn use_gzip_when_accepted(&self) -> bool {
        match self.gzip_usage {
            GzipUsage::Always => true,
            GzipUsage::Never => false,
            GzipUsage::Default => self.mime_type.as_deref().is_some_and(|m| {
                let m = m.to_ascii_lowercase();
                m.contains("text/") || m.contains("/json")
            }),
        }
    }

    /// 明示的に設定された Content-Length ヘッダーの値
    ///
    /// 数値として解釈できない値は無視する。
    fn explicit_content_length(&self) -> Option<u64> {
        self.get_header("content-length")
            .and_then(|v| v.trim().parse().ok())
    }

    /// 転送方式を決定する
    ///
    /// Content-Length と chunked が同時に有効になることはない。
    pub fn transfer_plan(&self) -> TransferPlan {
        let explicit_length = self.explicit_content_length();
        let bodiless = self.status.is_bodiless();
        let is_head = self.request_method == Some(Method::Head);

        let gzip = !bodiless && explicit_length.is_none() && self.use_gzip_when_accepted();
        let chunked =
            !bodiless && explicit_length.is_none() && (gzip || self.content_length.is_none());

        TransferPlan {
            gzip,
            chunked: chunked && !is_head,
            send_body: !bodiless && !is_head,
            limit: explicit_length.or(self.content_length),
        }
    }

    /// ステータスラインとヘッダーをエンコードする
    ///
    /// `date` は Date ヘッダーが設定されていない場合に使う。
    pub fn encode(&self, date: &HttpDate) -> (Vec<u8>, TransferPlan) {
        let plan = self.transfer_plan();
        let is_head = self.request_method == Some(Method::Head);
        let mut buf = String::with_capacity(256);

        buf.push_str("HTTP/1.1 ");
        buf.push_str(&self.status.description());
        buf.push_str("\r\n");

        if let Some(mime_type) = &self.mime_type {
            push_header(&mut buf, "Content-Type", mime_type);
        }
        if self.get_header("date").is_none() {
            push_header(&mut buf, "Date", &date.to_string());
        }
        let explicit_length = self.explicit_content_length();
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("content-length")
                && (explicit_length.is_none() || self.status.is_bodiless())
            {
                continue;
            }
            push_header(&mut buf, name, value);
        }
        for cookie in &self.cookie_headers {
            push_header(&mut buf, "Set-Cookie", cookie);
        }
        if self.get_header("connection").is_none() {
            let value = if self.keep_alive { "keep-alive" } else { "close" };
            push_header(&mut buf, "Connection", value);
        }

        if plan.gzip {
            push_header(&mut buf, "Content-Encoding", "gzip");
        }
        if !is_head && plan.chunked {
            push_header(&mut buf, "Transfer-Encoding", "chunked");
        } else if !plan.gzip && !self.status.is_bodiless() && explicit_length.is_none() {
            if let Some(len) = self.content_length {
                push_header(&mut buf, "Content-Length", &len.to_string());
            }
        }
        buf.push_str("\r\n");

        (buf.into_bytes(), plan)
    }
}

fn push_header(buf: &mut String, name: &str, value: &str) {
    buf.push_str(name);
    buf.push_str(": ");
    buf.push_str(value);
    buf.push_str("\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> HttpDate {
        HttpDate::from_unix_secs(784_111_777)
    }

    fn encode(head: &ResponseHead) -> (String, TransferPlan) {
        let (bytes, plan) = head.encode(&date());
        (String::from_utf8(bytes).unwrap(), plan)
    }

    #[test]
    fn test_fixed_length_text_without_gzip() {
        let mut head = ResponseHead::new(Status::Ok, Some("text/plain"), Some(5));
        head.set_use_gzip(false);
        let (text, plan) = encode(&head);
        assert_eq!(
            text,
            "HTTP/1.1 200 OK\r\n\
             Content-Type: text/plain\r\n\
             Date: Sun, 06 Nov 1994 08:49:37 GMT\r\n\
             Connection: keep-alive\r\n\
             Content-Length: 5\r\n\
             \r\n"
        );
        assert_eq!(
            plan,
            TransferPlan {
                gzip: false,
                chunked: false,
                send_body: true,
                limit: Some(5)
            }
        );
    }

    #[test]
    fn test_default_gzip_for_text() {
        let head = ResponseHead::new(Status::Ok, Some("text/html"), Some(100));
        let (text, plan) = encode(&head);
        assert!(text.contains("Content-Encoding: gzip\r\n"));
        assert!(text.contains("Transfer-Encoding: chunked\r\n"));
        assert!(!text.contains("Content-Length"));
        assert!(plan.gzip && plan.chunked);
    }

    #[test]
    fn test_default_gzip_for_json() {
        let head = ResponseHead::new(Status::Ok, Some("application/json"), None);
        assert!(head.transfer_plan().gzip);
        let head = ResponseHead::new(Status::Ok, Some("image/png"), None);
        assert!(!head.transfer_plan().gzip);
    }

    #[test]
    fn test_explicit_content_length_disables_gzip() {
        let mut head = ResponseHead::new(Status::Ok, Some("text/html"), Some(3));
        head.set_gzip_usage(GzipUsage::Always);
        head.add_header("Content-Length", "3");
        let (text, plan) = encode(&head);
        assert!(!plan.gzip);
        assert!(!plan.chunked);
        assert_eq!(plan.limit, Some(3));
        assert_eq!(text.matches("Content-Length").count(), 1);
    }

    #[test]
    fn test_unknown_length_is_chunked() {
        let head = ResponseHead::new(Status::Ok, Some("application/octet-stream"), None);
        let (text, plan) = encode(&head);
        assert!(text.contains("Transfer-Encoding: chunked\r\n"));
        assert!(plan.chunked);
        assert_eq!(plan.limit, None);
    }

    #[test]
    fn test_explicit_content_length_on_unknown_length_body() {
        let mut head = ResponseHead::new(Status::Ok, Some("application/octet-stream"), None);
        head.add_header("Content-Length", "5");
        let (text, plan) = encode(&head);
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(!text.contains("Transfer-Encoding"));
        assert_eq!(
            plan,
            TransferPlan {
                gzip: false,
                chunked: false,
                send_body: true,
                limit: Some(5)
            }
        );
    }

    #[test]
    fn test_invalid_explicit_content_length_is_ignored() {
        let mut head = ResponseHead::new(Status::Ok, Some("application/octet-stream"), None);
        head.add_header("Content-Length", "five");
        let (text, plan) = encode(&head);
        assert!(!text.contains("Content-Length"));
        assert!(text.contains("Transfer-Encoding: chunked\r\n"));
        assert!(plan.chunked);
        assert_eq!(plan.limit, None);
    }

    #[test]
    fn test_head_request_suppresses_body() {
        let mut head = ResponseHead::new(Status::Ok, Some("application/octet-stream"), None);
        head.set_request_method(Method::Head);
        let (text, plan) = encode(&head);
        assert!(!text.contains("Transfer-Encoding"));
        assert!(!text.contains("Content-Length"));
        assert!(!plan.send_body);
        assert!(!plan.chunked);

        let mut head = ResponseHead::new(Status::Ok, Some("image/png"), Some(10));
        head.set_request_method(Method::Head);
        let (text, plan) = encode(&head);
        assert!(text.contains("Content-Length: 10\r\n"));
        assert!(!plan.send_body);
    }

    #[test]
    fn test_connection_close() {
        let mut head = ResponseHead::new(Status::Ok, None, Some(0));
        head.set_keep_alive(false);
        let (text, _) = encode(&head);
        assert!(text.contains("Connection: close\r\n"));

        let mut head = ResponseHead::new(Status::Ok, None, Some(0));
        head.close_connection(true);
        assert!(head.is_close_connection());
        let (text, _) = encode(&head);
        assert_eq!(text.matches("onnection").count(), 1);
        head.close_connection(false);
        assert!(!head.is_close_connection());
    }

    #[test]
    fn test_explicit_date_and_headers_and_cookies() {
        let mut head = ResponseHead::new(Status::NotFound, Some("text/plain"), Some(0));
        head.add_header("Date", "yesterday");
        head.add_header("X-A", "1");
        head.add_header("x-a", "2");
        head.add_cookie_header("a=b; expires=never");
        let (text, _) = encode(&head);
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Date: yesterday\r\n"));
        assert!(text.contains("x-a: 2\r\n"));
        assert!(!text.contains("X-A: 1"));
        assert!(text.contains("Set-Cookie: a=b; expires=never\r\n"));
    }

    #[test]
    fn test_switching_protocols_has_no_body_headers() {
        let mut head = ResponseHead::new(Status::SwitchProtocol, None, Some(0));
        head.set_use_gzip(false);
        head.add_header("Connection", "Upgrade");
        let (text, plan) = encode(&head);
        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(!text.contains("Content-Length"));
        assert!(!text.contains("keep-alive"));
        assert!(!plan.send_body);
    }
}
