//! # shiguredo_httpd
//!
//! 組み込み用 HTTP/1.1 + WebSocket サーバーエンジンのコア (Sans I/O)
//!
//! ## 特徴
//!
//! - **Sans I/O**: ソケットを扱わず、バイト列と `Read` / `Seek` だけを入出力にする
//! - **ボディ解釈**: URL エンコードされたフォーム、multipart/form-data、PUT ボディ
//! - **WebSocket**: フレームコーデック、ハンドシェイク、接続状態機械
//!
//! 非同期ランタイムとの統合は `tokio_httpd` クレートが行う。
//!
//! ## 使い方
//!
//! ```rust
//! use shiguredo_httpd::{HttpDate, ResponseHead, Status, decode_request_head, find_header_end};
//!
//! let buf = b"GET /hello?name=world HTTP/1.1\r\nHost: example.com\r\n\r\n";
//! let end = find_header_end(buf, buf.len()).unwrap();
//! let head = decode_request_head(&buf[..end]).unwrap();
//! assert_eq!(head.uri, "/hello");
//! assert_eq!(head.parameters["name"], vec!["world".to_string()]);
//!
//! let response = ResponseHead::new(Status::Ok, Some("text/plain"), Some(5));
//! let (bytes, plan) = response.encode(&HttpDate::from_unix_secs(0));
//! assert!(bytes.starts_with(b"HTTP/1.1 200 OK\r\n"));
//! assert!(plan.send_body);
//! ```

pub mod body;
pub mod compression;
pub mod content_type;
pub mod cookie;
pub mod date;
pub mod decoder;
pub mod encoder;
mod error;
pub mod framer;
mod limits;
pub mod method;
pub mod mime;
pub mod multipart;
pub mod response;
pub mod status;
pub mod temp_file;
pub mod uri;
pub mod websocket;

pub use body::{BodyStore, Files, POST_DATA, PUT_CONTENT, interpret_body};
pub use compression::{CompressionError, CompressionStatus, Compressor, NoCompression};
pub use content_type::{Charset, ContentType};
pub use cookie::{Cookie, CookieHandler};
pub use date::HttpDate;
pub use decoder::{Headers, Parameters, RequestHead, decode_parameters, decode_request_head};
pub use encoder::{LAST_CHUNK, encode_chunk, encode_chunk_into};
pub use error::Error;
pub use framer::find_header_end;
pub use limits::Limits;
pub use method::Method;
pub use mime::mime_type_for_file;
pub use response::{GzipUsage, ResponseHead, TransferPlan};
pub use status::Status;
pub use temp_file::{DefaultTempFileManager, TempFile, TempFileManager};
