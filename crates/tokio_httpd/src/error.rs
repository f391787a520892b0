//! tokio_httpd エラー型

use shiguredo_httpd::websocket::WebSocketError;

/// tokio_httpd エラー
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O エラー
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// リクエスト処理エラー
    #[error("HTTP error: {0}")]
    Http(#[from] shiguredo_httpd::Error),
    /// WebSocket プロトコルエラー
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WebSocketError),
    /// TLS エラー
    #[error("TLS error: {0}")]
    Tls(String),
    /// 接続の終了 (相手の切断、読み込みタイムアウト、サーバー停止)
    ///
    /// 異常ではないのでログには出さない。
    #[error("connection shut down")]
    Shutdown,
}

impl From<rustls::Error> for Error {
    fn from(e: rustls::Error) -> Self {
        Error::Tls(e.to_string())
    }
}

/// Result 型エイリアス
pub type Result<T> = std::result::Result<T, Error>;
