//! tokio_httpd - Tokio integration for shiguredo_httpd
//!
//! tokio と tokio-rustls を使用した組み込み用 HTTP/1.1 + WebSocket サーバー。
//!
//! ## 特徴
//!
//! - **shiguredo_httpd ベース**: Sans I/O ライブラリをベースにした設計
//! - **非同期 I/O**: 接続ごとに tokio タスクを起動する
//! - **TLS 対応**: tokio-rustls による HTTPS 対応
//! - **Keep-Alive**: HTTP/1.1 Keep-Alive 接続のサポート
//! - **gzip**: `Accept-Encoding: gzip` を送ってきたクライアントへの圧縮転送
//! - **WebSocket**: インターセプターによるアップグレードとフレームの読み込みループ
//!
//! ## サーバー
//!
//! ```ignore
//! use shiguredo_httpd::Status;
//! use tokio_httpd::{Handler, HttpSession, Response, Server};
//!
//! struct Hello;
//!
//! impl Handler for Hello {
//!     async fn handle(&self, session: &mut HttpSession) -> Response {
//!         Response::text(Status::Ok, "text/plain", "Hello, World!")
//!     }
//! }
//!
//! let server = Server::bind("0.0.0.0:8080").await?;
//! let handle = server.handle();
//! tokio::spawn(server.serve(Hello));
//! // ...
//! handle.stop();
//! ```

pub mod compressor;
pub mod error;
pub mod registry;
pub mod response;
pub mod serializer;
pub mod server;
pub mod session;
pub mod websocket;

pub use compressor::GzipCompressor;
pub use error::{Error, Result};
pub use registry::{ConnectionId, ConnectionRegistry};
pub use response::{BodyReader, Response, UpgradeHook, Upgraded};
pub use serializer::send_response;
pub use server::{Handler, Interceptor, Server, ServerHandle};
pub use session::{Cycle, HttpSession, SessionConfig, TempFileManagerFactory};
pub use websocket::{WebSocket, WebSocketHandler, WebSocketUpgrade};
