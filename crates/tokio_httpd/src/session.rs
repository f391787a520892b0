//! HTTP セッション
//!
//! 1 つの接続上でリクエスト/レスポンスのサイクルを順番に処理する。
//! ボディはハンドラーが `parse_body()` を呼んだ時だけ読み込む。

use std::io::{self, Cursor, Seek, SeekFrom};
use std::mem;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use shiguredo_httpd::body::{BodyStore, Files, interpret_body};
use shiguredo_httpd::{
    CookieHandler, Headers, Limits, Method, Parameters, TempFileManager, decode_request_head,
    find_header_end,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::response::{Response, UpgradeHook, Upgraded};
use crate::serializer::send_response;
use crate::server::{Handler, Interceptor};

/// サイクルごとに一時ファイル管理を作成する関数
pub type TempFileManagerFactory = Arc<dyn Fn() -> Box<dyn TempFileManager> + Send + Sync>;

/// セッションの設定
#[derive(Clone)]
pub struct SessionConfig {
    /// 読み込みタイムアウト
    pub read_timeout: Duration,
    /// 書き込みバッファサイズ
    pub write_buffer_size: usize,
    pub limits: Limits,
    pub temp_file_manager_factory: TempFileManagerFactory,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(5),
            write_buffer_size: 65536,
            limits: Limits::default(),
            temp_file_manager_factory: Arc::new(|| -> Box<dyn TempFileManager> {
                Box::new(shiguredo_httpd::DefaultTempFileManager::new())
            }),
        }
    }
}

/// 1 サイクルの結果
pub enum Cycle {
    /// 次のリクエストを待つ
    KeepAlive,
    /// 接続を閉じる
    Close,
    /// プロトコルを切り替える
    Upgrade(Box<dyn UpgradeHook>),
}

impl std::fmt::Debug for Cycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cycle::KeepAlive => write!(f, "KeepAlive"),
            Cycle::Close => write!(f, "Close"),
            Cycle::Upgrade(_) => write!(f, "Upgrade"),
        }
    }
}

enum BodyState {
    /// まだ読んでいない
    Unread,
    Parsed,
    /// 解釈に失敗した (ハンドラーの後でエラーレスポンスに差し替える)
    Failed(shiguredo_httpd::Error),
    /// 読み込み中に接続が終了した
    Aborted,
}

/// ボディの書き込み先
enum BodySink {
    Memory(Vec<u8>),
    File(tokio::fs::File),
}

impl BodySink {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            BodySink::Memory(buf) => {
                buf.extend_from_slice(data);
                Ok(())
            }
            BodySink::File(file) => file.write_all(data).await,
        }
    }

    async fn into_store(self) -> io::Result<BodyStore> {
        match self {
            BodySink::Memory(buf) => Ok(BodyStore::Memory(Cursor::new(buf))),
            BodySink::File(mut file) => {
                file.flush().await?;
                let mut file = file.into_std().await;
                file.seek(SeekFrom::Start(0))?;
                Ok(BodyStore::File(file))
            }
        }
    }
}

/// HTTP セッション
pub struct HttpSession {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    writer: BufWriter<Box<dyn AsyncWrite + Send + Unpin>>,
    /// ヘッダー終端より後に読み込んだバイト列
    pending: Vec<u8>,
    shutdown: watch::Receiver<bool>,
    config: SessionConfig,
    remote_addr: Option<SocketAddr>,

    temp_files: Option<Box<dyn TempFileManager>>,
    method: Method,
    uri: String,
    query_string: Option<String>,
    version: String,
    headers: Headers,
    parameters: Parameters,
    files: Files,
    cookies: CookieHandler,
    body: BodyState,
}

impl HttpSession {
    pub fn new<R, W>(
        reader: R,
        writer: W,
        remote_addr: Option<SocketAddr>,
        shutdown: watch::Receiver<bool>,
        config: SessionConfig,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        Self {
            reader: Box::new(reader),
            writer: BufWriter::with_capacity(config.write_buffer_size, writer),
            pending: Vec::new(),
            shutdown,
            config,
            remote_addr,
            temp_files: None,
            method: Method::Get,
            uri: String::new(),
            query_string: None,
            version: String::new(),
            headers: Headers::new(),
            parameters: Parameters::new(),
            files: Files::new(),
            cookies: CookieHandler::default(),
            body: BodyState::Unread,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// デコード済みのパス
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// 生のクエリ文字列
    pub fn query_parameter_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// ヘッダー (名前は小文字)
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// パラメーター (クエリ文字列と、`parse_body()` 後はフォームボディ)
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// パラメーターの最初の値
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn cookies(&mut self) -> &mut CookieHandler {
        &mut self.cookies
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// クライアントの IP アドレス (ループバックは `127.0.0.1`)
    pub fn remote_ip_address(&self) -> Option<String> {
        self.remote_addr.map(|addr| {
            if addr.ip().is_loopback() {
                "127.0.0.1".to_string()
            } else {
                addr.ip().to_string()
            }
        })
    }

    /// ボディを読み込んで解釈する
    ///
    /// 最初の呼び出しでだけ読み込み、以降は結果を返す。フォームの値は
    /// `parameters()` に追加され、テキストや一時ファイルのパスは戻り値に入る。
    pub async fn parse_body(&mut self) -> Result<&Files> {
        match &self.body {
            BodyState::Parsed => return Ok(&self.files),
            BodyState::Failed(e) => return Err(Error::Http(duplicate_error(e))),
            BodyState::Aborted => return Err(Error::Shutdown),
            BodyState::Unread => {}
        }
        match self.read_body().await {
            Ok(()) => {
                self.body = BodyState::Parsed;
                Ok(&self.files)
            }
            Err(Error::Http(e)) => {
                let returned = duplicate_error(&e);
                self.body = BodyState::Failed(e);
                Err(Error::Http(returned))
            }
            Err(e) => {
                self.body = BodyState::Aborted;
                Err(e)
            }
        }
    }

    /// 1 サイクルを処理する
    ///
    /// 一時ファイルは成否にかかわらずサイクルの終わりに削除する。
    pub async fn execute<H: Handler>(
        &mut self,
        handler: &H,
        interceptors: &[Box<dyn Interceptor>],
    ) -> Result<Cycle> {
        self.reset_cycle();
        self.temp_files = Some((self.config.temp_file_manager_factory)());
        let result = self.run_cycle(handler, interceptors).await;
        if let Some(mut temp_files) = self.temp_files.take() {
            temp_files.clear();
        }
        result
    }

    /// アップグレード後の接続を取り出す
    pub async fn into_upgraded(mut self) -> Upgraded {
        if let Err(e) = self.writer.flush().await {
            tracing::debug!("flush before upgrade failed: {e}");
        }
        Upgraded {
            reader: self.reader,
            writer: self.writer.into_inner(),
            pending: self.pending,
            shutdown: self.shutdown,
        }
    }

    /// 書き込み側を閉じる
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!("shutdown failed: {e}");
        }
    }

    fn reset_cycle(&mut self) {
        self.method = Method::Get;
        self.uri.clear();
        self.query_string = None;
        self.version.clear();
        self.headers.clear();
        self.parameters.clear();
        self.files.clear();
        self.cookies = CookieHandler::default();
        self.body = BodyState::Unread;
    }

    async fn run_cycle<H: Handler>(
        &mut self,
        handler: &H,
        interceptors: &[Box<dyn Interceptor>],
    ) -> Result<Cycle> {
        let raw = match self.read_head().await {
            Ok(raw) => raw,
            Err(Error::Http(e)) => return self.reject(e).await,
            Err(e) => return Err(e),
        };
        let head = match decode_request_head(&raw) {
            Ok(head) => head,
            Err(e) => return self.reject(e).await,
        };
        let Some(method) = Method::lookup(&head.method) else {
            let e = shiguredo_httpd::Error::bad_request(format!(
                "BAD REQUEST: Syntax error. HTTP verb {} unhandled.",
                head.method
            ));
            return self.reject(e).await;
        };

        let keep_alive = head.is_keep_alive();
        let content_length = head.content_length();
        self.method = method;
        self.uri = head.uri;
        self.query_string = head.query_string;
        self.version = head.version;
        self.headers = head.headers;
        self.parameters = head.parameters;
        if let Some(ip) = self.remote_ip_address() {
            self.headers.insert("remote-addr".to_string(), ip.clone());
            self.headers.insert("http-client-ip".to_string(), ip);
        }
        self.cookies = CookieHandler::new(&self.headers);
        tracing::debug!(method = %method, uri = %self.uri, "request");

        let mut response = self.dispatch(handler, interceptors).await;

        match &self.body {
            BodyState::Aborted => return Err(Error::Shutdown),
            BodyState::Failed(e) if e.is_fatal() => {
                tracing::error!("request body could not be stored: {e}");
                return Err(Error::Http(duplicate_error(e)));
            }
            BodyState::Failed(e) => response = Response::from_error(e),
            BodyState::Unread | BodyState::Parsed => {}
        }

        for cookie in self.cookies.unload_queue() {
            response.add_cookie_header(&cookie);
        }
        response.head_mut().set_request_method(method);
        response.set_keep_alive(keep_alive);
        if !self
            .header("accept-encoding")
            .is_some_and(|v| v.contains("gzip"))
        {
            response.set_use_gzip(false);
        }

        send_response(&mut self.writer, &mut response).await;

        if let Some(hook) = response.take_upgrade() {
            return Ok(Cycle::Upgrade(hook));
        }
        if matches!(self.body, BodyState::Unread) {
            if let Some(len) = content_length {
                self.discard_body(len).await?;
            }
        }
        if !keep_alive || response.is_close_connection() {
            Ok(Cycle::Close)
        } else {
            Ok(Cycle::KeepAlive)
        }
    }

    /// インターセプターを順に試し、最初に応答したものを使う。無ければハンドラーを呼ぶ。
    async fn dispatch<H: Handler>(
        &mut self,
        handler: &H,
        interceptors: &[Box<dyn Interceptor>],
    ) -> Response {
        for interceptor in interceptors {
            if let Some(response) = interceptor.intercept(self).await {
                return response;
            }
        }
        handler.handle(self).await
    }

    /// リクエスト処理エラーを応答して接続を閉じる
    async fn reject(&mut self, error: shiguredo_httpd::Error) -> Result<Cycle> {
        if error.is_fatal() {
            return Err(Error::Http(error));
        }
        tracing::warn!("rejecting request: {error}");
        let mut response = Response::from_error(&error);
        send_response(&mut self.writer, &mut response).await;
        Ok(Cycle::Close)
    }

    /// ヘッダー終端まで読み込む
    ///
    /// 終端より後のバイト列は `pending` に残す。
    async fn read_head(&mut self) -> Result<Vec<u8>> {
        let size = self.config.limits.header_buffer_size;
        let mut buf = vec![0u8; size];
        let carried = self.pending.len().min(size);
        buf[..carried].copy_from_slice(&self.pending[..carried]);
        self.pending.drain(..carried);
        let mut filled = carried;

        loop {
            if let Some(end) = find_header_end(&buf, filled) {
                let mut rest = buf[end..filled].to_vec();
                rest.append(&mut self.pending);
                self.pending = rest;
                buf.truncate(end);
                return Ok(buf);
            }
            if filled == size {
                return Err(Error::Http(shiguredo_httpd::Error::bad_request(
                    "BAD REQUEST: Request header too large.",
                )));
            }
            let n = self.read_some(filled, &mut buf).await?;
            filled += n;
        }
    }

    /// `buf[offset..]` へ読み込む
    ///
    /// EOF、タイムアウト、サーバー停止はすべて `Error::Shutdown` になる。
    async fn read_some(&mut self, offset: usize, buf: &mut [u8]) -> Result<usize> {
        if *self.shutdown.borrow() {
            return Err(Error::Shutdown);
        }
        let read = tokio::time::timeout(self.config.read_timeout, self.reader.read(&mut buf[offset..]));
        tokio::select! {
            result = read => match result {
                Ok(Ok(0)) | Err(_) => Err(Error::Shutdown),
                Ok(Ok(n)) => Ok(n),
                Ok(Err(e)) => Err(Error::Io(e)),
            },
            Ok(()) = self.shutdown.changed() => Err(Error::Shutdown),
        }
    }

    async fn read_body(&mut self) -> Result<()> {
        let size = self
            .header("content-length")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(self.pending.len() as u64);
        let limits = self.config.limits.clone();

        let mut temp_files = self
            .temp_files
            .take()
            .unwrap_or_else(|| (self.config.temp_file_manager_factory)());
        let store = BodyStore::for_size(size, &limits, &mut *temp_files);
        let mut sink = match store {
            Ok(BodyStore::File(file)) => BodySink::File(tokio::fs::File::from_std(file)),
            Ok(BodyStore::Memory(_)) => BodySink::Memory(Vec::with_capacity(size as usize)),
            Err(e) => {
                self.temp_files = Some(temp_files);
                return Err(Error::Http(e));
            }
        };

        let result = self.fill_body(&mut sink, size).await;
        let store = match result {
            Ok(()) => sink.into_store().await.map_err(|e| {
                Error::Http(shiguredo_httpd::Error::internal(format!(
                    "SERVER INTERNAL ERROR: IOException: {e}"
                )))
            }),
            Err(e) => Err(e),
        };
        let mut store = match store {
            Ok(store) => store,
            Err(e) => {
                self.temp_files = Some(temp_files);
                return Err(e);
            }
        };

        let method = self.method;
        let content_type = self.headers.get("content-type").cloned();
        let mut parameters = mem::take(&mut self.parameters);
        let mut files = mem::take(&mut self.files);
        let mut guard = ClearOnDrop(Some(temp_files));
        let joined = tokio::task::spawn_blocking(move || {
            let result = match guard.0.as_deref_mut() {
                Some(temp_files) => interpret_body(
                    method,
                    content_type.as_deref(),
                    &mut store,
                    &mut parameters,
                    &mut files,
                    temp_files,
                    &limits,
                ),
                None => Err(shiguredo_httpd::Error::internal(
                    "temp file manager unavailable",
                )),
            };
            (result, parameters, files, guard.0.take())
        })
        .await;

        match joined {
            Ok((result, parameters, files, temp_files)) => {
                self.parameters = parameters;
                self.files = files;
                self.temp_files = temp_files;
                result.map_err(Error::Http)
            }
            Err(e) => Err(Error::Http(shiguredo_httpd::Error::Fatal(io::Error::other(
                e,
            )))),
        }
    }

    /// 先に `pending` から、残りをソケットから読み込む
    async fn fill_body(&mut self, sink: &mut BodySink, size: u64) -> Result<()> {
        let from_pending = (size.min(self.pending.len() as u64)) as usize;
        let head: Vec<u8> = self.pending.drain(..from_pending).collect();
        sink.write(&head).await.map_err(body_io_error)?;

        let mut remaining = size - from_pending as u64;
        let mut chunk = vec![0u8; self.config.limits.request_buffer_len];
        while remaining > 0 {
            let want = remaining.min(chunk.len() as u64) as usize;
            let n = self.read_some(0, &mut chunk[..want]).await?;
            sink.write(&chunk[..n]).await.map_err(body_io_error)?;
            remaining -= n as u64;
        }
        Ok(())
    }

    /// 読まれなかったボディを捨てる
    async fn discard_body(&mut self, len: u64) -> Result<()> {
        let from_pending = (len.min(self.pending.len() as u64)) as usize;
        self.pending.drain(..from_pending);
        let mut remaining = len - from_pending as u64;
        let mut chunk = vec![0u8; self.config.limits.request_buffer_len];
        while remaining > 0 {
            let want = remaining.min(chunk.len() as u64) as usize;
            remaining -= self.read_some(0, &mut chunk[..want]).await? as u64;
        }
        Ok(())
    }
}

/// 取り出されずに破棄された一時ファイル管理を `clear()` する
///
/// ブロッキングタスクがパニックした場合やキャンセルされた場合に一時ファイルを残さない。
struct ClearOnDrop(Option<Box<dyn TempFileManager>>);

impl Drop for ClearOnDrop {
    fn drop(&mut self) {
        if let Some(mut manager) = self.0.take() {
            manager.clear();
        }
    }
}

fn body_io_error(e: io::Error) -> Error {
    Error::Http(shiguredo_httpd::Error::internal(format!(
        "SERVER INTERNAL ERROR: IOException: {e}"
    )))
}

/// 保持しているエラーの複製を作る (`io::Error` は Clone できない)
fn duplicate_error(error: &shiguredo_httpd::Error) -> shiguredo_httpd::Error {
    match error {
        shiguredo_httpd::Error::Response { status, message } => shiguredo_httpd::Error::Response {
            status: *status,
            message: message.clone(),
        },
        shiguredo_httpd::Error::Fatal(e) => {
            shiguredo_httpd::Error::Fatal(io::Error::new(e.kind(), e.to_string()))
        }
    }
}
