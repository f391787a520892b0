//! WebSocket ハンドシェイク (RFC 6455 Section 4.2)

use base64::Engine;
use sha1::{Digest, Sha1};

use crate::decoder::Headers;

/// Sec-WebSocket-Accept の計算に使う GUID
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// サポートする WebSocket バージョン
pub const WS_VERSION: &str = "13";

/// ハンドシェイクエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    /// Sec-WebSocket-Version が 13 でない
    #[error("Invalid Websocket-Version {}", .0.as_deref().unwrap_or("null"))]
    InvalidVersion(Option<String>),
    /// Sec-WebSocket-Key がない
    #[error("Missing Websocket-Key")]
    MissingKey,
}

/// ハンドシェイク応答に必要な値
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Sec-WebSocket-Accept の値
    pub accept: String,
    /// Sec-WebSocket-Protocol に返すプロトコル (要求の最初の値)
    pub protocol: Option<String>,
}

/// リクエストが WebSocket へのアップグレードを要求しているか判定する
///
/// ヘッダー名は小文字化済みであること。
pub fn is_websocket_requested(headers: &Headers) -> bool {
    let upgrade = headers
        .get("upgrade")
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"));
    let connection = headers
        .get("connection")
        .is_some_and(|v| v.to_ascii_lowercase().contains("upgrade"));
    upgrade && connection
}

/// Sec-WebSocket-Key から Sec-WebSocket-Accept を計算する
pub fn make_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// アップグレード要求を検証して応答の値を返す
///
/// バージョンを先に検証する。
pub fn accept(headers: &Headers) -> Result<Handshake, HandshakeError> {
    let version = headers.get("sec-websocket-version").map(|v| v.trim());
    if version != Some(WS_VERSION) {
        return Err(HandshakeError::InvalidVersion(version.map(str::to_string)));
    }
    let key = headers
        .get("sec-websocket-key")
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or(HandshakeError::MissingKey)?;
    let protocol = headers
        .get("sec-websocket-protocol")
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    Ok(Handshake {
        accept: make_accept_key(key),
        protocol,
    })
}
