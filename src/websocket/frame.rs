//! WebSocket フレームのエンコード/デコード (RFC 6455 Section 5)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! ```
//!
//! 長さは最小のエンコーディングを使う。デコーダーは最小でないエンコーディングを
//! プロトコルエラーとして拒否する。

use core::fmt;

/// 7 ビット長で表現できる最大値
const MAX_INLINE_LEN: u64 = 125;
/// 16 ビット拡張長で表現できる最大値
const MAX_16BIT_LEN: u64 = 0xFFFF;
/// 1 フレーム / 1 メッセージの最大長
pub const MAX_MESSAGE_LEN: u64 = i32::MAX as u64;

/// オペコード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl OpCode {
    /// バイト値から変換 (予約/未知の値は `None`)
    pub fn from_u8(value: u8) -> Option<OpCode> {
        match value {
            0x0 => Some(OpCode::Continuation),
            0x1 => Some(OpCode::Text),
            0x2 => Some(OpCode::Binary),
            0x8 => Some(OpCode::Close),
            0x9 => Some(OpCode::Ping),
            0xA => Some(OpCode::Pong),
            _ => None,
        }
    }

    /// 制御フレームかどうか
    pub fn is_control(self) -> bool {
        (self as u8) & 0x8 != 0
    }
}

/// クローズコード (RFC 6455 Section 7.4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    NormalClosure,
    GoingAway,
    ProtocolError,
    UnsupportedData,
    NoStatusRcvd,
    AbnormalClosure,
    InvalidFramePayloadData,
    PolicyViolation,
    MessageTooBig,
    MandatoryExt,
    InternalServerError,
    TlsHandshake,
    /// 上記以外のコード
    Other(u16),
}

impl CloseCode {
    pub fn from_u16(code: u16) -> CloseCode {
        match code {
            1000 => CloseCode::NormalClosure,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::UnsupportedData,
            1005 => CloseCode::NoStatusRcvd,
            1006 => CloseCode::AbnormalClosure,
            1007 => CloseCode::InvalidFramePayloadData,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::MessageTooBig,
            1010 => CloseCode::MandatoryExt,
            1011 => CloseCode::InternalServerError,
            1015 => CloseCode::TlsHandshake,
            other => CloseCode::Other(other),
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            CloseCode::NormalClosure => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::UnsupportedData => 1003,
            CloseCode::NoStatusRcvd => 1005,
            CloseCode::AbnormalClosure => 1006,
            CloseCode::InvalidFramePayloadData => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::MandatoryExt => 1010,
            CloseCode::InternalServerError => 1011,
            CloseCode::TlsHandshake => 1015,
            CloseCode::Other(code) => code,
        }
    }

    /// 人が読める説明
    pub fn reason(self) -> &'static str {
        match self {
            CloseCode::NormalClosure => "normal closure",
            CloseCode::GoingAway => "going away",
            CloseCode::ProtocolError => "protocol error",
            CloseCode::UnsupportedData => "unsupported data",
            CloseCode::NoStatusRcvd => "no status received",
            CloseCode::AbnormalClosure => "abnormal closure",
            CloseCode::InvalidFramePayloadData => "invalid frame payload data",
            CloseCode::PolicyViolation => "policy violation",
            CloseCode::MessageTooBig => "message too big",
            CloseCode::MandatoryExt => "mandatory extension",
            CloseCode::InternalServerError => "internal server error",
            CloseCode::TlsHandshake => "TLS handshake failure",
            CloseCode::Other(_) => "unknown",
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_u16(), self.reason())
    }
}

/// WebSocket エラー
///
/// 相手に送るクローズコードと理由を持つ。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WebSocketError {
    /// プロトコル違反
    #[error("{reason} ({code})")]
    Protocol { code: CloseCode, reason: String },
    /// テキストが UTF-8 として不正
    #[error("invalid UTF-8 in text payload")]
    InvalidUtf8,
}

impl WebSocketError {
    /// ProtocolError (1002) のエラーを作成
    pub fn protocol(reason: impl Into<String>) -> Self {
        WebSocketError::Protocol {
            code: CloseCode::ProtocolError,
            reason: reason.into(),
        }
    }

    /// MessageTooBig (1009) のエラーを作成
    pub fn message_too_big() -> Self {
        WebSocketError::Protocol {
            code: CloseCode::MessageTooBig,
            reason: "Max frame length has been exceeded.".to_string(),
        }
    }

    /// 相手に送るクローズコード
    pub fn close_code(&self) -> CloseCode {
        match self {
            WebSocketError::Protocol { code, .. } => *code,
            WebSocketError::InvalidUtf8 => CloseCode::InvalidFramePayloadData,
        }
    }

    /// 相手に送るクローズ理由
    pub fn close_reason(&self) -> String {
        match self {
            WebSocketError::Protocol { reason, .. } => reason.clone(),
            WebSocketError::InvalidUtf8 => "Invalid UTF-8 in text payload.".to_string(),
        }
    }
}

/// WebSocket フレーム
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    opcode: OpCode,
    fin: bool,
    masking_key: Option<[u8; 4]>,
    /// マスク解除済みのペイロード
    payload: Vec<u8>,
}

impl Frame {
    pub fn new(opcode: OpCode, fin: bool, payload: Vec<u8>) -> Self {
        Self {
            opcode,
            fin,
            masking_key: None,
            payload,
        }
    }

    pub fn text(text: &str) -> Self {
        Self::new(OpCode::Text, true, text.as_bytes().to_vec())
    }

    pub fn binary(payload: Vec<u8>) -> Self {
        Self::new(OpCode::Binary, true, payload)
    }

    pub fn ping(payload: Vec<u8>) -> Self {
        Self::new(OpCode::Ping, true, payload)
    }

    pub fn pong(payload: Vec<u8>) -> Self {
        Self::new(OpCode::Pong, true, payload)
    }

    /// クローズフレームを作成する
    ///
    /// 制御フレームの上限 125 バイトに収まるよう、理由は文字境界で切り詰める。
    pub fn close(code: CloseCode, reason: &str) -> Self {
        let mut end = reason.len().min(MAX_INLINE_LEN as usize - 2);
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        let mut payload = Vec::with_capacity(2 + end);
        payload.extend_from_slice(&code.as_u16().to_be_bytes());
        payload.extend_from_slice(&reason.as_bytes()[..end]);
        Self::new(OpCode::Close, true, payload)
    }

    /// マスクキーを設定する
    pub fn with_masking_key(mut self, key: [u8; 4]) -> Self {
        self.masking_key = Some(key);
        self
    }

    /// 断片化されたフレーム列を 1 つのメッセージに結合する
    pub fn from_fragments(opcode: OpCode, fragments: Vec<Frame>) -> Result<Frame, WebSocketError> {
        let total: u64 = fragments.iter().map(|f| f.payload.len() as u64).sum();
        if total > MAX_MESSAGE_LEN {
            return Err(WebSocketError::message_too_big());
        }
        let mut payload = Vec::with_capacity(total as usize);
        for fragment in fragments {
            payload.extend_from_slice(&fragment.payload);
        }
        Ok(Frame::new(opcode, true, payload))
    }

    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    pub fn is_fin(&self) -> bool {
        self.fin
    }

    pub fn masking_key(&self) -> Option<[u8; 4]> {
        self.masking_key
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// テキストとしてのペイロード
    pub fn text_payload(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// クローズコード (クローズフレームで 2 バイト以上ある場合)
    pub fn close_code(&self) -> Option<CloseCode> {
        if self.opcode != OpCode::Close || self.payload.len() < 2 {
            return None;
        }
        Some(CloseCode::from_u16(u16::from_be_bytes([
            self.payload[0],
            self.payload[1],
        ])))
    }

    /// クローズ理由 (クローズフレームの場合)
    pub fn close_reason(&self) -> Option<&str> {
        if self.opcode != OpCode::Close {
            return None;
        }
        if self.payload.len() < 2 {
            return Some("");
        }
        std::str::from_utf8(&self.payload[2..]).ok()
    }

    /// フレームをエンコードする
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.payload.len() + 14);
        self.encode_into(&mut buf);
        buf
    }

    /// フレームをエンコードして `buf` に追記する
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        let mut b0 = self.opcode as u8;
        if self.fin {
            b0 |= 0x80;
        }
        buf.push(b0);

        let mask_bit = if self.masking_key.is_some() { 0x80 } else { 0x00 };
        let len = self.payload.len() as u64;
        if len <= MAX_INLINE_LEN {
            buf.push(mask_bit | len as u8);
        } else if len <= MAX_16BIT_LEN {
            buf.push(mask_bit | 126);
            buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            buf.push(mask_bit | 127);
            buf.extend_from_slice(&len.to_be_bytes());
        }

        match self.masking_key {
            Some(key) => {
                buf.extend_from_slice(&key);
                let start = buf.len();
                buf.extend_from_slice(&self.payload);
                apply_mask(&mut buf[start..], key);
            }
            None => buf.extend_from_slice(&self.payload),
        }
    }
}

/// ペイロードにマスクを適用する (適用は可逆)
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// フレームデコーダー
///
/// `feed()` で受信データを追加し、`decode()` で完全なフレームを 1 つずつ取り出す。
/// データが足りない場合は `Ok(None)` を返す。検証はヘッダーの該当バイトが揃った時点で行う。
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 受信データを追加する
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// バッファ中の未処理バイト数
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// フレームを 1 つデコードする
    pub fn decode(&mut self) -> Result<Option<Frame>, WebSocketError> {
        if self.buf.len() < 2 {
            return Ok(None);
        }

        let b0 = self.buf[0];
        let fin = b0 & 0x80 != 0;
        let rsv = b0 & 0x70;
        if rsv != 0 {
            return Err(WebSocketError::protocol(format!(
                "The reserved bits ({:b}) must be 0.",
                rsv >> 4
            )));
        }
        let opcode = OpCode::from_u8(b0 & 0x0F).ok_or_else(|| {
            WebSocketError::protocol(format!(
                "Received frame with reserved/unknown opcode {}.",
                b0 & 0x0F
            ))
        })?;
        if opcode.is_control() && !fin {
            return Err(WebSocketError::protocol("Fragmented control frame."));
        }

        let b1 = self.buf[1];
        let masked = b1 & 0x80 != 0;
        let mut offset = 2;
        let len = match b1 & 0x7F {
            126 => {
                let Some(bytes) = self.buf.get(2..4) else {
                    return Ok(None);
                };
                let len = u16::from_be_bytes([bytes[0], bytes[1]]) as u64;
                if len <= MAX_INLINE_LEN {
                    return Err(WebSocketError::protocol(
                        "Invalid data frame 2byte length. (not using minimal length encoding)",
                    ));
                }
                offset += 2;
                len
            }
            127 => {
                let Some(bytes) = self.buf.get(2..10) else {
                    return Ok(None);
                };
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                let len = u64::from_be_bytes(raw);
                if len <= MAX_16BIT_LEN {
                    return Err(WebSocketError::protocol(
                        "Invalid data frame 4byte length. (not using minimal length encoding)",
                    ));
                }
                if len > MAX_MESSAGE_LEN {
                    return Err(WebSocketError::message_too_big());
                }
                offset += 8;
                len
            }
            len => len as u64,
        };

        if opcode.is_control() {
            if len > MAX_INLINE_LEN {
                return Err(WebSocketError::protocol(
                    "Control frame with payload length > 125 bytes.",
                ));
            }
            if opcode == OpCode::Close && len == 1 {
                return Err(WebSocketError::protocol(
                    "Received close frame with payload len 1.",
                ));
            }
        }

        let masking_key = if masked {
            let Some(bytes) = self.buf.get(offset..offset + 4) else {
                return Ok(None);
            };
            offset += 4;
            Some([bytes[0], bytes[1], bytes[2], bytes[3]])
        } else {
            None
        };

        let end = offset + len as usize;
        if self.buf.len() < end {
            return Ok(None);
        }

        let mut payload = self.buf[offset..end].to_vec();
        self.buf.drain(..end);
        if let Some(key) = masking_key {
            apply_mask(&mut payload, key);
        }

        let frame = Frame {
            opcode,
            fin,
            masking_key,
            payload,
        };
        match opcode {
            OpCode::Text if fin => {
                if frame.text_payload().is_none() {
                    return Err(WebSocketError::InvalidUtf8);
                }
            }
            OpCode::Close => {
                if frame.close_reason().is_none() {
                    return Err(WebSocketError::InvalidUtf8);
                }
            }
            _ => {}
        }
        Ok(Some(frame))
    }
}
