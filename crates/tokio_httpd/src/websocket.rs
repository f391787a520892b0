//! WebSocket サーバー
//!
//! `WebSocketUpgrade` をインターセプターとして登録すると、アップグレード要求に
//! 101 応答を返し、その接続をフレームの読み込みループに引き継ぐ。
//!
//! ## 使い方
//!
//! ```ignore
//! use tokio_httpd::websocket::{WebSocket, WebSocketHandler, WebSocketUpgrade};
//!
//! struct Echo;
//!
//! impl WebSocketHandler for Echo {
//!     async fn on_open(&self, _socket: WebSocket) {}
//!
//!     async fn on_message(&self, socket: &WebSocket, message: Frame) {
//!         let _ = socket.send_frame(message).await;
//!     }
//!
//!     async fn on_close(&self, code: CloseCode, reason: &str, initiated_by_remote: bool) {}
//! }
//!
//! let server = Server::bind("0.0.0.0:8080")
//!     .await?
//!     .interceptor(WebSocketUpgrade::new(|_session: &HttpSession| Echo));
//! ```

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shiguredo_httpd::websocket::{
    CloseCode, CloseInfo, Frame, FrameDecoder, SessionEvent, WebSocketSession, WebSocketState,
    accept, is_websocket_requested,
};
use shiguredo_httpd::{GzipUsage, Status};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::response::{Response, UpgradeHook, Upgraded};
use crate::server::Interceptor;
use crate::session::HttpSession;

const READ_BUFFER_SIZE: usize = 8192;

/// WebSocket のイベントハンドラー
pub trait WebSocketHandler: Send + Sync + 'static {
    /// 101 応答の送信後に呼ばれる
    fn on_open(&self, socket: WebSocket) -> impl Future<Output = ()> + Send;

    /// 完全なメッセージ (断片化されていた場合は結合済み) を受信した
    fn on_message(&self, socket: &WebSocket, message: Frame) -> impl Future<Output = ()> + Send;

    fn on_pong(&self, _socket: &WebSocket, _pong: Frame) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// 接続が閉じた (1 接続につき 1 回だけ呼ばれる)
    fn on_close(
        &self,
        code: CloseCode,
        reason: &str,
        initiated_by_remote: bool,
    ) -> impl Future<Output = ()> + Send;

    /// 読み込みループでエラーが発生した
    fn on_exception(&self, _error: &Error) -> impl Future<Output = ()> + Send {
        async {}
    }
}

struct Shared {
    session: Mutex<WebSocketSession>,
    writer: tokio::sync::Mutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>,
}

/// WebSocket 接続のハンドル
///
/// クローンして他のタスクから送信できる。フレームの書き込みは 1 つずつ行う。
#[derive(Clone)]
pub struct WebSocket {
    shared: Arc<Shared>,
}

impl WebSocket {
    fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                session: Mutex::new(WebSocketSession::new()),
                writer: tokio::sync::Mutex::new(None),
            }),
        }
    }

    fn session(&self) -> MutexGuard<'_, WebSocketSession> {
        self.shared
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> WebSocketState {
        self.session().state()
    }

    pub fn is_open(&self) -> bool {
        self.state() == WebSocketState::Open
    }

    /// フレームを送信する
    pub async fn send_frame(&self, frame: Frame) -> Result<()> {
        let mut writer = self.shared.writer.lock().await;
        let writer = writer
            .as_mut()
            .ok_or_else(|| Error::Io(io::Error::from(io::ErrorKind::NotConnected)))?;
        tracing::debug!(opcode = ?frame.opcode(), len = frame.payload().len(), "sending frame");
        writer.write_all(&frame.encode()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn send_if_open(&self, frame: Frame) -> Result<()> {
        if !self.is_open() {
            return Err(Error::Io(io::Error::from(io::ErrorKind::NotConnected)));
        }
        self.send_frame(frame).await
    }

    pub async fn send_text(&self, text: &str) -> Result<()> {
        self.send_if_open(Frame::text(text)).await
    }

    pub async fn send_binary(&self, payload: Vec<u8>) -> Result<()> {
        self.send_if_open(Frame::binary(payload)).await
    }

    pub async fn ping(&self, payload: Vec<u8>) -> Result<()> {
        self.send_if_open(Frame::ping(payload)).await
    }

    /// クローズを開始する
    ///
    /// 接続中であればクローズフレームを送り、相手の応答を待ってから終了する。
    pub async fn close(&self, code: CloseCode, reason: &str) -> Result<()> {
        let events = self.session().close(code, reason, false);
        self.apply_sends(events).await
    }

    async fn apply_sends(&self, events: Vec<SessionEvent>) -> Result<()> {
        for event in events {
            if let SessionEvent::Send(frame) = event {
                self.send_frame(frame).await?;
            }
        }
        Ok(())
    }

    fn finalize(&self, code: CloseCode, reason: &str) {
        self.session().finalize(code, reason.to_string(), false);
    }

    fn take_close_info(&self) -> Option<CloseInfo> {
        self.session().take_close_info()
    }

    async fn shutdown_writer(&self) {
        if let Some(mut writer) = self.shared.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!("websocket shutdown failed: {e}");
            }
        }
    }
}

/// WebSocket へのアップグレードを行うインターセプター
///
/// `factory` は接続ごとにハンドラーを作成する。
pub struct WebSocketUpgrade<F> {
    factory: F,
}

impl<F> WebSocketUpgrade<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

impl<F, H> Interceptor for WebSocketUpgrade<F>
where
    F: Fn(&HttpSession) -> H + Send + Sync + 'static,
    H: WebSocketHandler,
{
    fn intercept<'a>(
        &'a self,
        session: &'a mut HttpSession,
    ) -> Pin<Box<dyn Future<Output = Option<Response>> + Send + 'a>> {
        Box::pin(async move {
            if !is_websocket_requested(session.headers()) {
                return None;
            }
            let handshake = match accept(session.headers()) {
                Ok(handshake) => handshake,
                Err(e) => {
                    tracing::warn!("websocket handshake rejected: {e}");
                    return Some(Response::text(Status::BadRequest, "text/plain", &e.to_string()));
                }
            };

            let hook = WebSocketHook {
                handler: (self.factory)(session),
                socket: WebSocket::new(),
            };
            let mut response = Response::empty(Status::SwitchProtocol);
            response.add_header("upgrade", "websocket");
            response.add_header("connection", "Upgrade");
            response.add_header("sec-websocket-accept", &handshake.accept);
            if let Some(protocol) = &handshake.protocol {
                response.add_header("sec-websocket-protocol", protocol);
            }
            response.set_gzip_usage(GzipUsage::Never);
            Some(response.with_upgrade(Box::new(hook)))
        })
    }
}

struct WebSocketHook<H> {
    handler: H,
    socket: WebSocket,
}

impl<H: WebSocketHandler> UpgradeHook for WebSocketHook<H> {
    fn before_send(&mut self) {
        self.socket.session().handshake_started();
    }

    fn run(self: Box<Self>, upgraded: Upgraded) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let WebSocketHook { handler, socket } = *self;
        Box::pin(drive(handler, socket, upgraded))
    }
}

/// ループを抜けた理由
enum Exit {
    /// クローズハンドシェイクが完了した
    Closed,
    /// サーバーが停止した
    Stopped,
}

async fn drive<H: WebSocketHandler>(handler: H, socket: WebSocket, upgraded: Upgraded) {
    let Upgraded {
        mut reader,
        writer,
        pending,
        mut shutdown,
    } = upgraded;
    *socket.shared.writer.lock().await = Some(writer);
    socket.session().opened();
    handler.on_open(socket.clone()).await;

    let mut decoder = FrameDecoder::new();
    decoder.feed(&pending);
    let result = read_loop(&handler, &socket, &mut decoder, &mut reader, &mut shutdown).await;

    match result {
        Ok(Exit::Closed) => {}
        Ok(Exit::Stopped) => {
            let code = CloseCode::GoingAway;
            let _ = socket.send_frame(Frame::close(code, "server shutting down")).await;
            socket.finalize(code, "server shutting down");
        }
        Err(Error::WebSocket(e)) => {
            tracing::warn!("websocket protocol violation: {e}");
            let (code, reason) = (e.close_code(), e.close_reason());
            handler.on_exception(&Error::WebSocket(e)).await;
            let _ = socket.send_frame(Frame::close(code, &reason)).await;
            socket.finalize(code, &reason);
        }
        Err(e) => {
            if !matches!(e, Error::Shutdown) {
                handler.on_exception(&e).await;
            }
            socket.finalize(
                CloseCode::InternalServerError,
                "handler terminated without closing the connection",
            );
        }
    }

    socket.shutdown_writer().await;
    if let Some(info) = socket.take_close_info() {
        tracing::debug!(code = %info.code, remote = info.initiated_by_remote, "websocket closed");
        handler
            .on_close(info.code, &info.reason, info.initiated_by_remote)
            .await;
    }
}

async fn read_loop<H: WebSocketHandler>(
    handler: &H,
    socket: &WebSocket,
    decoder: &mut FrameDecoder,
    reader: &mut Box<dyn AsyncRead + Send + Unpin>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<Exit> {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        while let Some(frame) = decoder.decode()? {
            tracing::debug!(opcode = ?frame.opcode(), len = frame.payload().len(), "frame received");
            let events = socket.session().handle_frame(frame)?;
            for event in events {
                match event {
                    SessionEvent::Send(frame) => socket.send_frame(frame).await?,
                    SessionEvent::Message(message) => handler.on_message(socket, message).await,
                    SessionEvent::Pong(pong) => handler.on_pong(socket, pong).await,
                    SessionEvent::Closed => return Ok(Exit::Closed),
                }
            }
        }
        if socket.state() == WebSocketState::Closed {
            return Ok(Exit::Closed);
        }

        if *shutdown.borrow() {
            return Ok(Exit::Stopped);
        }
        let n = tokio::select! {
            result = reader.read(&mut buf) => result?,
            Ok(()) = shutdown.changed() => return Ok(Exit::Stopped),
        };
        if n == 0 {
            return Err(Error::Io(io::Error::from(io::ErrorKind::UnexpectedEof)));
        }
        decoder.feed(&buf[..n]);
    }
}
