//! レスポンスヘッドのプロパティテスト

use proptest::prelude::*;
use shiguredo_httpd::{
    GzipUsage, HttpDate, LAST_CHUNK, Method, ResponseHead, Status, encode_chunk,
};

fn status() -> impl Strategy<Value = Status> {
    proptest::sample::select(vec![101u16, 200, 201, 204, 206, 301, 304, 400, 404, 500, 503])
        .prop_map(|code| Status::lookup(code).unwrap())
}

fn mime_type() -> impl Strategy<Value = Option<String>> {
    proptest::option::of(proptest::sample::select(vec![
        "text/plain".to_string(),
        "text/html".to_string(),
        "application/json".to_string(),
        "application/octet-stream".to_string(),
        "image/png".to_string(),
    ]))
}

fn gzip_usage() -> impl Strategy<Value = GzipUsage> {
    prop_oneof![
        Just(GzipUsage::Default),
        Just(GzipUsage::Always),
        Just(GzipUsage::Never)
    ]
}

fn encode(head: &ResponseHead) -> String {
    let (bytes, _) = head.encode(&HttpDate::from_unix_secs(0));
    String::from_utf8(bytes).unwrap()
}

// ========================================
// 転送方式
// ========================================

// ボディを持たないステータスと HEAD ではボディもフレーミングも送らない
proptest! {
    #[test]
    fn prop_no_body_for_head_or_bodiless(
        status in status(),
        mime in mime_type(),
        length in proptest::option::of(0u64..10_000),
        usage in gzip_usage(),
        head_request in any::<bool>(),
    ) {
        let mut head = ResponseHead::new(status, mime.as_deref(), length);
        head.set_gzip_usage(usage);
        if head_request {
            head.set_request_method(Method::Head);
        }
        let plan = head.transfer_plan();
        let text = encode(&head);

        if status.is_bodiless() || head_request {
            prop_assert!(!plan.send_body);
            prop_assert!(!text.contains("Transfer-Encoding"));
        }
        if status.is_bodiless() {
            prop_assert!(!text.contains("Content-Length"));
            prop_assert!(!plan.gzip);
        }
    }
}

// gzip と chunked は同時に使い、Content-Length は送らない
proptest! {
    #[test]
    fn prop_gzip_implies_chunked(
        status in status(),
        mime in mime_type(),
        length in proptest::option::of(0u64..10_000),
        usage in gzip_usage(),
    ) {
        let mut head = ResponseHead::new(status, mime.as_deref(), length);
        head.set_gzip_usage(usage);
        let plan = head.transfer_plan();
        let text = encode(&head);

        if plan.gzip {
            prop_assert!(plan.chunked);
            prop_assert!(text.contains("Content-Encoding: gzip\r\n"));
            prop_assert!(text.contains("Transfer-Encoding: chunked\r\n"));
            prop_assert!(!text.contains("Content-Length"));
        }
        if plan.send_body && !plan.gzip {
            prop_assert_eq!(plan.chunked, length.is_none());
        }
        if plan.send_body && !plan.chunked {
            let expected = format!("Content-Length: {}\r\n", length.unwrap());
            prop_assert!(text.contains(&expected));
        }
    }
}

// 明示的な Content-Length ヘッダーがあれば gzip を使わず読み出し上限になる
proptest! {
    #[test]
    fn prop_explicit_content_length(declared in 0u64..10_000, mime in mime_type()) {
        let mut head = ResponseHead::new(Status::Ok, mime.as_deref(), None);
        head.set_gzip_usage(GzipUsage::Always);
        head.add_header("Content-Length", &declared.to_string());
        let plan = head.transfer_plan();
        prop_assert!(!plan.gzip);
        prop_assert_eq!(plan.limit, Some(declared));
    }
}

// Content-Length と Transfer-Encoding: chunked は同時に送らない
proptest! {
    #[test]
    fn prop_single_transfer_mode(
        status in status(),
        mime in mime_type(),
        length in proptest::option::of(0u64..10_000),
        declared in proptest::option::of(0u64..10_000),
        usage in gzip_usage(),
        head_request in any::<bool>(),
    ) {
        let mut head = ResponseHead::new(status, mime.as_deref(), length);
        head.set_gzip_usage(usage);
        if let Some(declared) = declared {
            head.add_header("Content-Length", &declared.to_string());
        }
        if head_request {
            head.set_request_method(Method::Head);
        }
        let plan = head.transfer_plan();
        let text = encode(&head);

        let has_length = text.contains("Content-Length");
        let has_chunked = text.contains("Transfer-Encoding: chunked");
        prop_assert!(!(has_length && has_chunked));
        if declared.is_some() && !status.is_bodiless() {
            prop_assert!(!plan.chunked);
            prop_assert_eq!(plan.limit, declared);
        }
    }
}

// ステータスラインと Connection ヘッダー
proptest! {
    #[test]
    fn prop_status_line_and_connection(status in status(), keep_alive in any::<bool>()) {
        let mut head = ResponseHead::new(status, None, Some(0));
        head.set_keep_alive(keep_alive);
        let text = encode(&head);
        let status_line = format!("HTTP/1.1 {} {}\r\n", status.code(), status.reason_phrase());
        prop_assert!(text.starts_with(&status_line));
        let connection = if keep_alive { "keep-alive" } else { "close" };
        let expected = format!("Connection: {}\r\n", connection);
        prop_assert!(text.contains(&expected));
        prop_assert!(text.ends_with("\r\n\r\n"));
    }
}

// ========================================
// chunked フレーミング
// ========================================

proptest! {
    #[test]
    fn prop_chunk_framing(data in proptest::collection::vec(any::<u8>(), 1..2048)) {
        let chunk = encode_chunk(&data);
        let prefix = format!("{:x}\r\n", data.len());
        prop_assert!(chunk.starts_with(prefix.as_bytes()));
        prop_assert!(chunk.ends_with(b"\r\n"));
        prop_assert_eq!(&chunk[prefix.len()..chunk.len() - 2], data.as_slice());
        prop_assert_ne!(chunk.as_slice(), LAST_CHUNK);
    }
}
