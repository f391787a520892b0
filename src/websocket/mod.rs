//! WebSocket (RFC 6455)
//!
//! - `frame`: フレームのエンコード/デコード
//! - `handshake`: アップグレード要求の検証と Sec-WebSocket-Accept の計算
//! - `session`: 接続の状態機械

pub mod frame;
pub mod handshake;
pub mod session;

pub use frame::{CloseCode, Frame, FrameDecoder, MAX_MESSAGE_LEN, OpCode, WebSocketError, apply_mask};
pub use handshake::{Handshake, HandshakeError, WS_GUID, accept, is_websocket_requested, make_accept_key};
pub use session::{CloseInfo, SessionEvent, WebSocketSession, WebSocketState};
