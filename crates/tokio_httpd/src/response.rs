//! レスポンス
//!
//! ボディ以外の情報は `shiguredo_httpd::ResponseHead` が持ち、
//! ここではボディのソースとアップグレード時のフックを保持する。

use std::future::Future;
use std::io::Cursor;
use std::pin::Pin;

use shiguredo_httpd::{ContentType, GzipUsage, ResponseHead, Status, content_type::Charset};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;

/// ボディのソース
pub type BodyReader = Box<dyn AsyncRead + Send + Unpin>;

/// プロトコル切り替え後の接続
pub struct Upgraded {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
    /// ヘッダー読み込み時に読み過ぎたバイト列
    pub pending: Vec<u8>,
    /// サーバー停止の通知
    pub shutdown: watch::Receiver<bool>,
}

/// 101 応答の送信に合わせて呼ばれるフック
///
/// レスポンスを継承して送信処理を差し替えるかわりに、シリアライザーが
/// 送信開始時に `before_send()` を、送信後にセッションが `run()` を呼ぶ。
pub trait UpgradeHook: Send {
    /// レスポンスヘッドを書き込む直前に呼ばれる
    fn before_send(&mut self) {}

    /// 接続を引き継いで処理する
    fn run(self: Box<Self>, upgraded: Upgraded) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// HTTP レスポンス
pub struct Response {
    head: ResponseHead,
    body: Option<BodyReader>,
    upgrade: Option<Box<dyn UpgradeHook>>,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("head", &self.head)
            .field("has_body", &self.body.is_some())
            .field("upgrade", &self.upgrade.is_some())
            .finish()
    }
}

impl Response {
    fn with_body(
        status: Status,
        mime_type: Option<&str>,
        body: Option<BodyReader>,
        content_length: Option<u64>,
    ) -> Self {
        Self {
            head: ResponseHead::new(status, mime_type, content_length),
            body,
            upgrade: None,
        }
    }

    /// 長さが既知のバイト列のレスポンス
    pub fn fixed_length(status: Status, mime_type: Option<&str>, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        let len = body.len() as u64;
        Self::with_body(status, mime_type, Some(Box::new(Cursor::new(body))), Some(len))
    }

    /// テキストのレスポンス
    ///
    /// 宣言された charset でテキストを表現できない場合は `; charset=UTF-8` に切り替える。
    pub fn text(status: Status, mime_type: &str, text: &str) -> Self {
        let mut content_type = ContentType::new(Some(mime_type));
        if !Charset::from_name(content_type.encoding()).can_encode(text) {
            content_type = content_type.try_utf8();
        }
        let bytes = Charset::from_name(content_type.encoding()).encode(text);
        Self::fixed_length(status, content_type.content_type_header(), bytes)
    }

    /// `text/html` のレスポンス
    pub fn html(status: Status, html: &str) -> Self {
        Self::text(status, "text/html", html)
    }

    /// ボディなしのレスポンス
    pub fn empty(status: Status) -> Self {
        Self::fixed_length(status, None, Vec::new())
    }

    /// 長さが既知のストリームのレスポンス
    ///
    /// ソースからは `len` バイトだけ読み出す。
    pub fn sized<R>(status: Status, mime_type: Option<&str>, reader: R, len: u64) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::with_body(status, mime_type, Some(Box::new(reader)), Some(len))
    }

    /// 長さ不明のストリームのレスポンス (chunked で送る)
    pub fn chunked<R>(status: Status, mime_type: Option<&str>, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::with_body(status, mime_type, Some(Box::new(reader)), None)
    }

    /// リクエスト処理エラーのレスポンス
    ///
    /// 圧縮せずに送り、送信後に接続を閉じる。
    pub fn from_error(error: &shiguredo_httpd::Error) -> Self {
        let mut response = Self::text(error.status(), "text/plain", &error.message());
        response.set_gzip_usage(GzipUsage::Never);
        response.close_connection(true);
        response
    }

    /// アップグレードフックを設定する
    pub fn with_upgrade(mut self, hook: Box<dyn UpgradeHook>) -> Self {
        self.upgrade = Some(hook);
        self
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn head_mut(&mut self) -> &mut ResponseHead {
        &mut self.head
    }

    pub fn status(&self) -> Status {
        self.head.status()
    }

    pub fn set_status(&mut self, status: Status) {
        self.head.set_status(status);
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.head.mime_type()
    }

    /// ヘッダーを追加する (同名のヘッダーは置き換える)
    pub fn add_header(&mut self, name: &str, value: &str) {
        self.head.add_header(name, value);
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.head.get_header(name)
    }

    pub fn add_cookie_header(&mut self, cookie: &str) {
        self.head.add_cookie_header(cookie);
    }

    pub fn close_connection(&mut self, close: bool) {
        self.head.close_connection(close);
    }

    pub fn is_close_connection(&self) -> bool {
        self.head.is_close_connection()
    }

    pub fn set_keep_alive(&mut self, keep_alive: bool) {
        self.head.set_keep_alive(keep_alive);
    }

    pub fn set_use_gzip(&mut self, use_gzip: bool) {
        self.head.set_use_gzip(use_gzip);
    }

    pub fn set_gzip_usage(&mut self, usage: GzipUsage) {
        self.head.set_gzip_usage(usage);
    }

    pub(crate) fn body_mut(&mut self) -> Option<&mut BodyReader> {
        self.body.as_mut()
    }

    /// ボディのソースを閉じる
    pub(crate) fn close_body(&mut self) {
        self.body = None;
    }

    pub(crate) fn upgrade_mut(&mut self) -> Option<&mut Box<dyn UpgradeHook>> {
        self.upgrade.as_mut()
    }

    pub(crate) fn take_upgrade(&mut self) -> Option<Box<dyn UpgradeHook>> {
        self.upgrade.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_keeps_declared_charset() {
        let response = Response::text(Status::Ok, "text/plain; charset=ISO-8859-1", "café");
        assert_eq!(response.mime_type(), Some("text/plain; charset=ISO-8859-1"));
        assert_eq!(response.head().content_length(), Some(4));
    }

    #[test]
    fn test_text_falls_back_to_utf8() {
        let response = Response::text(Status::Ok, "text/plain", "日本語");
        assert_eq!(response.mime_type(), Some("text/plain; charset=UTF-8"));
        assert_eq!(response.head().content_length(), Some(9));
    }

    #[test]
    fn test_text_ascii() {
        let response = Response::text(Status::NotFound, "text/plain", "Not Found");
        assert_eq!(response.mime_type(), Some("text/plain"));
        assert_eq!(response.status(), Status::NotFound);
    }

    #[test]
    fn test_from_error_closes_connection() {
        let error = shiguredo_httpd::Error::bad_request("BAD REQUEST: Missing URI.");
        let response = Response::from_error(&error);
        assert_eq!(response.status(), Status::BadRequest);
        assert!(response.is_close_connection());
        assert!(!response.head().transfer_plan().gzip);
    }

    #[test]
    fn test_chunked_has_no_length() {
        let response = Response::chunked(Status::Ok, None, Cursor::new(b"abc".to_vec()));
        assert_eq!(response.head().content_length(), None);
    }
}
