#![no_main]

use libfuzzer_sys::fuzz_target;
use shiguredo_httpd::websocket::{FrameDecoder, SessionEvent, WebSocketSession, WebSocketState};

fuzz_target!(|data: &[u8]| {
    let mut session = WebSocketSession::new();
    session.handshake_started();
    session.opened();

    let mut decoder = FrameDecoder::new();
    decoder.feed(data);
    loop {
        let frame = match decoder.decode() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                session.close(e.close_code(), &e.close_reason(), false);
                break;
            }
        };
        match session.handle_frame(frame) {
            Ok(events) => {
                for event in events {
                    if let SessionEvent::Message(message) = event {
                        assert!(message.is_fin());
                    }
                }
            }
            Err(e) => {
                session.finalize(e.close_code(), e.close_reason(), false);
                break;
            }
        }
        if session.state() == WebSocketState::Closed {
            assert!(session.take_close_info().is_some());
            break;
        }
    }
});
