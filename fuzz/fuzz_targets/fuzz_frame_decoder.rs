#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use shiguredo_httpd::websocket::FrameDecoder;

#[derive(Arbitrary, Debug)]
struct FuzzFrames {
    data: Vec<u8>,
    split_hint: u8,
}

fn decode_all(data: &[u8], split: usize) -> Vec<Result<Vec<u8>, String>> {
    let mut decoder = FrameDecoder::new();
    let mut out = Vec::new();
    for part in data.chunks(split) {
        decoder.feed(part);
        loop {
            match decoder.decode() {
                Ok(Some(frame)) => {
                    // デコード結果は再エンコードしても同じフレームになる
                    let mut again = FrameDecoder::new();
                    again.feed(&frame.encode());
                    assert_eq!(again.decode().ok().flatten().as_ref(), Some(&frame));
                    out.push(Ok(frame.into_payload()));
                }
                Ok(None) => break,
                Err(e) => {
                    out.push(Err(e.to_string()));
                    return out;
                }
            }
        }
    }
    out
}

fuzz_target!(|input: FuzzFrames| {
    let split = (input.split_hint as usize).max(1);
    // 分割位置に関係なく同じ結果になる
    assert_eq!(
        decode_all(&input.data, input.data.len().max(1)),
        decode_all(&input.data, split)
    );
});
