#![no_main]

use libfuzzer_sys::fuzz_target;
use shiguredo_httpd::{Method, decode_request_head, find_header_end};

fuzz_target!(|data: &[u8]| {
    // 一括で終端を探す
    let whole = find_header_end(data, data.len());

    // 追記しながら探しても同じ位置で見つかる
    let mut incremental = None;
    for len in (0..=data.len()).step_by(7).chain(std::iter::once(data.len())) {
        if let Some(end) = find_header_end(data, len) {
            incremental = Some(end);
            break;
        }
    }
    assert_eq!(whole, incremental);

    let head_len = whole.unwrap_or(data.len());
    if let Ok(head) = decode_request_head(&data[..head_len]) {
        let _ = Method::lookup(&head.method);
        let _ = head.is_keep_alive();
        let _ = head.content_length();
        for name in head.headers.keys() {
            assert_eq!(name, &name.to_ascii_lowercase());
        }
    }
});
