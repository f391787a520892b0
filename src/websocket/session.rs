//! WebSocket セッションの状態機械 (Sans I/O)
//!
//! 受信フレームを `handle_frame()` に渡すと、送信すべきフレームや
//! アプリケーションに通知すべきイベントを `SessionEvent` として返す。

use super::frame::{CloseCode, Frame, OpCode, WebSocketError};

/// 接続状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebSocketState {
    Unconnected,
    /// ハンドシェイク応答の送信中
    Connecting,
    Open,
    /// クローズフレームを送信して相手の応答を待っている
    Closing,
    Closed,
}

/// セッションが呼び出し側に要求する処理
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// フレームを送信する
    Send(Frame),
    /// 完全なメッセージ (text / binary) を受信した
    Message(Frame),
    /// Pong を受信した
    Pong(Frame),
    /// 接続が閉じた (`take_close_info()` で詳細を取得する)
    Closed,
}

/// 接続終了の情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: CloseCode,
    pub reason: String,
    /// 相手から開始されたクローズかどうか
    pub initiated_by_remote: bool,
}

/// WebSocket セッション
#[derive(Debug)]
pub struct WebSocketSession {
    state: WebSocketState,
    /// 断片化メッセージの先頭オペコード
    continuous_opcode: Option<OpCode>,
    continuous_frames: Vec<Frame>,
    close_info: Option<CloseInfo>,
}

impl Default for WebSocketSession {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketSession {
    pub fn new() -> Self {
        Self {
            state: WebSocketState::Unconnected,
            continuous_opcode: None,
            continuous_frames: Vec::new(),
            close_info: None,
        }
    }

    pub fn state(&self) -> WebSocketState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == WebSocketState::Open
    }

    /// ハンドシェイク応答の送信を開始した
    pub fn handshake_started(&mut self) {
        if self.state == WebSocketState::Unconnected {
            self.state = WebSocketState::Connecting;
        }
    }

    /// ハンドシェイク応答の送信が完了した
    pub fn opened(&mut self) {
        if self.state == WebSocketState::Connecting {
            self.state = WebSocketState::Open;
        }
    }

    /// 受信フレームを処理する
    ///
    /// エラーを返した場合、呼び出し側はエラーのクローズコードでクローズを送信し、
    /// `finalize()` で接続を終了すること。
    pub fn handle_frame(&mut self, frame: Frame) -> Result<Vec<SessionEvent>, WebSocketError> {
        match frame.opcode() {
            OpCode::Close => Ok(self.handle_close_frame(&frame)),
            OpCode::Ping => Ok(vec![SessionEvent::Send(Frame::pong(frame.into_payload()))]),
            OpCode::Pong => Ok(vec![SessionEvent::Pong(frame)]),
            OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                self.handle_data_frame(frame)
            }
        }
    }

    fn handle_close_frame(&mut self, frame: &Frame) -> Vec<SessionEvent> {
        let code = frame.close_code().unwrap_or(CloseCode::NormalClosure);
        let reason = frame.close_reason().unwrap_or("").to_string();
        match self.state {
            WebSocketState::Closing => {
                // 自分から送ったクローズへの応答
                self.finalize(code, reason, false);
                vec![SessionEvent::Closed]
            }
            WebSocketState::Closed => Vec::new(),
            _ => {
                let echo = Frame::close(code, &reason);
                self.finalize(code, reason, true);
                vec![SessionEvent::Send(echo), SessionEvent::Closed]
            }
        }
    }

    fn handle_data_frame(&mut self, frame: Frame) -> Result<Vec<SessionEvent>, WebSocketError> {
        match (frame.opcode(), self.continuous_opcode) {
            (OpCode::Continuation, None) => Err(WebSocketError::protocol(
                "Continuous frame sequence was not started.",
            )),
            (OpCode::Continuation, Some(opcode)) => {
                let fin = frame.is_fin();
                self.continuous_frames.push(frame);
                if !fin {
                    return Ok(Vec::new());
                }
                self.continuous_opcode = None;
                let fragments = std::mem::take(&mut self.continuous_frames);
                let message = Frame::from_fragments(opcode, fragments)?;
                if opcode == OpCode::Text && message.text_payload().is_none() {
                    return Err(WebSocketError::InvalidUtf8);
                }
                Ok(vec![SessionEvent::Message(message)])
            }
            (_, Some(_)) if frame.is_fin() => Err(WebSocketError::protocol(
                "Continuous frame sequence not completed.",
            )),
            (_, Some(_)) => Err(WebSocketError::protocol(
                "Previous continuous frame sequence not completed.",
            )),
            (opcode, None) => {
                if frame.is_fin() {
                    return Ok(vec![SessionEvent::Message(frame)]);
                }
                self.continuous_opcode = Some(opcode);
                self.continuous_frames.push(frame);
                Ok(Vec::new())
            }
        }
    }

    /// ローカルからクローズを開始する
    ///
    /// Open の場合はクローズフレームを返して Closing に遷移し、相手の応答を待つ。
    /// それ以外の状態では即座に終了する。
    pub fn close(
        &mut self,
        code: CloseCode,
        reason: &str,
        initiated_by_remote: bool,
    ) -> Vec<SessionEvent> {
        match self.state {
            WebSocketState::Closed | WebSocketState::Closing => Vec::new(),
            WebSocketState::Open => {
                self.state = WebSocketState::Closing;
                vec![SessionEvent::Send(Frame::close(code, reason))]
            }
            _ => {
                self.finalize(code, reason.to_string(), initiated_by_remote);
                vec![SessionEvent::Closed]
            }
        }
    }

    /// 接続を終了状態にする
    ///
    /// 最初の呼び出しの情報だけを保持する。
    pub fn finalize(&mut self, code: CloseCode, reason: String, initiated_by_remote: bool) {
        if self.state == WebSocketState::Closed {
            return;
        }
        self.state = WebSocketState::Closed;
        self.continuous_opcode = None;
        self.continuous_frames.clear();
        self.close_info = Some(CloseInfo {
            code,
            reason,
            initiated_by_remote,
        });
    }

    /// 終了情報を取り出す (一度だけ `Some` を返す)
    pub fn take_close_info(&mut self) -> Option<CloseInfo> {
        self.close_info.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_session() -> WebSocketSession {
        let mut session = WebSocketSession::new();
        session.handshake_started();
        assert_eq!(session.state(), WebSocketState::Connecting);
        session.opened();
        assert!(session.is_open());
        session
    }

    #[test]
    fn test_single_text_message() {
        let mut session = open_session();
        let events = session.handle_frame(Frame::text("hi")).unwrap();
        assert_eq!(events, vec![SessionEvent::Message(Frame::text("hi"))]);
    }

    #[test]
    fn test_fragmented_message() {
        let mut session = open_session();
        let parts = [
            Frame::new(OpCode::Text, false, b"He".to_vec()),
            Frame::new(OpCode::Continuation, false, b"l".to_vec()),
            Frame::new(OpCode::Continuation, true, b"lo".to_vec()),
        ];
        let mut events = Vec::new();
        for part in parts {
            events = session.handle_frame(part).unwrap();
        }
        let [SessionEvent::Message(message)] = events.as_slice() else {
            panic!("unexpected events: {events:?}");
        };
        assert_eq!(message.text_payload(), Some("Hello"));
    }

    #[test]
    fn test_control_frame_between_fragments() {
        let mut session = open_session();
        session
            .handle_frame(Frame::new(OpCode::Binary, false, vec![1]))
            .unwrap();
        let events = session.handle_frame(Frame::ping(b"p".to_vec())).unwrap();
        assert_eq!(events, vec![SessionEvent::Send(Frame::pong(b"p".to_vec()))]);
        let events = session
            .handle_frame(Frame::new(OpCode::Continuation, true, vec![2]))
            .unwrap();
        assert_eq!(events, vec![SessionEvent::Message(Frame::binary(vec![1, 2]))]);
    }

    #[test]
    fn test_continuation_without_start() {
        let mut session = open_session();
        let err = session
            .handle_frame(Frame::new(OpCode::Continuation, true, vec![]))
            .unwrap_err();
        assert_eq!(err.close_reason(), "Continuous frame sequence was not started.");
    }

    #[test]
    fn test_new_message_during_sequence() {
        let mut session = open_session();
        session
            .handle_frame(Frame::new(OpCode::Text, false, b"a".to_vec()))
            .unwrap();
        let err = session.handle_frame(Frame::text("b")).unwrap_err();
        assert_eq!(err.close_reason(), "Continuous frame sequence not completed.");

        let mut session = open_session();
        session
            .handle_frame(Frame::new(OpCode::Text, false, b"a".to_vec()))
            .unwrap();
        let err = session
            .handle_frame(Frame::new(OpCode::Binary, false, vec![]))
            .unwrap_err();
        assert_eq!(
            err.close_reason(),
            "Previous continuous frame sequence not completed."
        );
    }

    #[test]
    fn test_fragmented_invalid_utf8() {
        let mut session = open_session();
        session
            .handle_frame(Frame::new(OpCode::Text, false, vec![0xC3]))
            .unwrap();
        let err = session
            .handle_frame(Frame::new(OpCode::Continuation, true, vec![0x28]))
            .unwrap_err();
        assert_eq!(err, WebSocketError::InvalidUtf8);
    }

    #[test]
    fn test_remote_close_is_echoed() {
        let mut session = open_session();
        let events = session
            .handle_frame(Frame::close(CloseCode::GoingAway, "bye"))
            .unwrap();
        assert_eq!(
            events,
            vec![
                SessionEvent::Send(Frame::close(CloseCode::GoingAway, "bye")),
                SessionEvent::Closed
            ]
        );
        assert_eq!(session.state(), WebSocketState::Closed);
        let info = session.take_close_info().unwrap();
        assert_eq!(info.code, CloseCode::GoingAway);
        assert_eq!(info.reason, "bye");
        assert!(info.initiated_by_remote);
        assert_eq!(session.take_close_info(), None);
    }

    #[test]
    fn test_local_close_waits_for_peer() {
        let mut session = open_session();
        let events = session.close(CloseCode::NormalClosure, "done", false);
        assert_eq!(
            events,
            vec![SessionEvent::Send(Frame::close(CloseCode::NormalClosure, "done"))]
        );
        assert_eq!(session.state(), WebSocketState::Closing);
        assert!(session.close(CloseCode::NormalClosure, "again", false).is_empty());

        let events = session
            .handle_frame(Frame::close(CloseCode::NormalClosure, ""))
            .unwrap();
        assert_eq!(events, vec![SessionEvent::Closed]);
        let info = session.take_close_info().unwrap();
        assert!(!info.initiated_by_remote);
    }

    #[test]
    fn test_close_before_open_finalizes() {
        let mut session = WebSocketSession::new();
        let events = session.close(CloseCode::InternalServerError, "oops", false);
        assert_eq!(events, vec![SessionEvent::Closed]);
        assert_eq!(session.state(), WebSocketState::Closed);
    }

    #[test]
    fn test_finalize_keeps_first_info() {
        let mut session = open_session();
        session.finalize(CloseCode::ProtocolError, "first".to_string(), false);
        session.finalize(CloseCode::NormalClosure, "second".to_string(), true);
        assert_eq!(session.take_close_info().unwrap().reason, "first");
    }
}
