//! HTTP/HTTPS サーバー
//!
//! 接続ごとにタスクを起動し、`HttpSession` でリクエストを順番に処理する。
//!
//! ## 使い方
//!
//! ```ignore
//! use tokio_httpd::{HttpSession, Response, Server};
//! use shiguredo_httpd::Status;
//!
//! struct Hello;
//!
//! impl tokio_httpd::Handler for Hello {
//!     async fn handle(&self, session: &mut HttpSession) -> Response {
//!         Response::text(Status::Ok, "text/plain", "Hello, World!")
//!     }
//! }
//!
//! // HTTP サーバー
//! let server = Server::bind("0.0.0.0:8080").await?;
//! server.serve(Hello).await?;
//!
//! // HTTPS サーバー
//! let server = Server::bind("0.0.0.0:8443").await?.tls(tls_config);
//! server.serve(Hello).await?;
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rustls::ServerConfig;
use shiguredo_httpd::{DefaultTempFileManager, Limits, TempFileManager};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, watch};
use tokio_rustls::TlsAcceptor;

use crate::error::{Error, Result};
use crate::registry::ConnectionRegistry;
use crate::response::Response;
use crate::session::{Cycle, HttpSession, SessionConfig};

/// HTTP リクエストハンドラー
pub trait Handler: Send + Sync + 'static {
    /// リクエストを処理してレスポンスを返す
    fn handle(&self, session: &mut HttpSession) -> impl Future<Output = Response> + Send;
}

/// ハンドラーの前に呼ばれるインターセプター
///
/// `Some` を返すとハンドラーは呼ばれない。
pub trait Interceptor: Send + Sync + 'static {
    fn intercept<'a>(
        &'a self,
        session: &'a mut HttpSession,
    ) -> Pin<Box<dyn Future<Output = Option<Response>> + Send + 'a>>;
}

/// 起動中のサーバーを操作するハンドル
#[derive(Clone)]
pub struct ServerHandle {
    registry: ConnectionRegistry,
    stop: Arc<Notify>,
}

impl ServerHandle {
    /// すべての接続を閉じる (待ち受けは続ける)
    pub fn close_all_connections(&self) {
        self.registry.close_all();
    }

    /// 待ち受けを止め、すべての接続を閉じる
    pub fn stop(&self) {
        self.stop.notify_one();
    }

    /// 実行中の接続数
    pub fn connections(&self) -> usize {
        self.registry.len()
    }
}

/// HTTP サーバー
///
/// HTTP と HTTPS の両方に対応。HTTPS を使用する場合は `tls()` で TLS 設定を指定する。
pub struct Server {
    listener: TcpListener,
    config: SessionConfig,
    interceptors: Vec<Box<dyn Interceptor>>,
    tls_acceptor: Option<TlsAcceptor>,
    registry: ConnectionRegistry,
    stop: Arc<Notify>,
}

impl Server {
    /// 指定アドレスにバインド
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            config: SessionConfig::default(),
            interceptors: Vec::new(),
            tls_acceptor: None,
            registry: ConnectionRegistry::new(),
            stop: Arc::new(Notify::new()),
        })
    }

    /// TLS 設定を指定 (HTTPS 用)
    pub fn tls(mut self, config: Arc<ServerConfig>) -> Self {
        self.tls_acceptor = Some(TlsAcceptor::from(config));
        self
    }

    /// 読み込みタイムアウトを設定 (デフォルト: 5 秒)
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// 書き込みバッファサイズを設定
    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.config.write_buffer_size = size;
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.config.limits = limits;
        self
    }

    /// 一時ファイルを作成するディレクトリを設定
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.config.temp_file_manager_factory =
            Arc::new(move || -> Box<dyn TempFileManager> {
                Box::new(DefaultTempFileManager::with_dir(dir.clone()))
            });
        self
    }

    /// 一時ファイル管理の作成関数を設定
    pub fn temp_file_manager_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn TempFileManager> + Send + Sync + 'static,
    {
        self.config.temp_file_manager_factory = Arc::new(factory);
        self
    }

    /// インターセプターを追加 (登録順に試す)
    pub fn interceptor<I: Interceptor>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Box::new(interceptor));
        self
    }

    /// ローカルアドレスを取得
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// TLS が有効かどうかを返す
    pub fn is_tls(&self) -> bool {
        self.tls_acceptor.is_some()
    }

    /// サーバーを操作するハンドルを取得
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            registry: self.registry.clone(),
            stop: self.stop.clone(),
        }
    }

    /// サーバーを起動
    ///
    /// `ServerHandle::stop()` が呼ばれるまで接続を受け付ける。
    pub async fn serve<H: Handler>(self, handler: H) -> Result<()> {
        let shared = Arc::new(Shared {
            handler,
            interceptors: self.interceptors,
            config: self.config,
        });

        loop {
            tokio::select! {
                _ = self.stop.notified() => {
                    tracing::debug!("server stopped");
                    self.registry.close_all();
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = accepted?;
                    let shared = shared.clone();
                    let tls_acceptor = self.tls_acceptor.clone();
                    self.registry.exec(move |shutdown| async move {
                        run_connection(stream, peer_addr, tls_acceptor, shared, shutdown).await;
                    });
                }
            }
        }
    }

    /// 単一の接続を処理 (テスト用)
    pub async fn handle_one<H: Handler>(self, handler: H) -> Result<()> {
        let (stream, peer_addr) = self.listener.accept().await?;
        let shared = Shared {
            handler,
            interceptors: self.interceptors,
            config: self.config,
        };
        let (_tx, shutdown) = watch::channel(false);
        let (reader, writer) = split_stream(stream, self.tls_acceptor.as_ref()).await?;
        let session = HttpSession::new(reader, writer, Some(peer_addr), shutdown, shared.config.clone());
        serve_session(session, &shared).await
    }
}

struct Shared<H> {
    handler: H,
    interceptors: Vec<Box<dyn Interceptor>>,
    config: SessionConfig,
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// TLS の有無にかかわらず読み込み側と書き込み側に分ける
async fn split_stream(
    stream: TcpStream,
    tls_acceptor: Option<&TlsAcceptor>,
) -> Result<(BoxedReader, BoxedWriter)> {
    match tls_acceptor {
        Some(acceptor) => {
            let tls_stream = acceptor
                .accept(stream)
                .await
                .map_err(|e| Error::Tls(e.to_string()))?;
            let (reader, writer) = tokio::io::split(tls_stream);
            Ok((Box::new(reader), Box::new(writer)))
        }
        None => {
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader), Box::new(writer)))
        }
    }
}

async fn run_connection<H: Handler>(
    stream: TcpStream,
    peer_addr: SocketAddr,
    tls_acceptor: Option<TlsAcceptor>,
    shared: Arc<Shared<H>>,
    shutdown: watch::Receiver<bool>,
) {
    let (reader, writer) = match split_stream(stream, tls_acceptor.as_ref()).await {
        Ok(halves) => halves,
        Err(e) => {
            tracing::warn!(%peer_addr, "connection setup failed: {e}");
            return;
        }
    };
    tracing::debug!(%peer_addr, "connection opened");
    let session = HttpSession::new(reader, writer, Some(peer_addr), shutdown, shared.config.clone());
    if let Err(e) = serve_session(session, &shared).await {
        tracing::warn!(%peer_addr, "connection error: {e}");
    }
    tracing::debug!(%peer_addr, "connection closed");
}

/// キープアライブが続く間サイクルを繰り返す
async fn serve_session<H: Handler>(mut session: HttpSession, shared: &Shared<H>) -> Result<()> {
    loop {
        match session
            .execute(&shared.handler, &shared.interceptors)
            .await
        {
            Ok(Cycle::KeepAlive) => continue,
            Ok(Cycle::Close) | Err(Error::Shutdown) => break,
            Ok(Cycle::Upgrade(hook)) => {
                hook.run(session.into_upgraded().await).await;
                return Ok(());
            }
            Err(e) => {
                session.shutdown().await;
                return Err(e);
            }
        }
    }
    session.shutdown().await;
    Ok(())
}
