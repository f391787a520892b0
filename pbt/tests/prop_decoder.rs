//! リクエストヘッドのデコードとヘッダー終端検出のプロパティテスト

use std::collections::HashMap;

use pbt::{header_name, header_value, query_component};
use proptest::prelude::*;
use shiguredo_httpd::uri::{percent_decode, percent_encode};
use shiguredo_httpd::{Parameters, decode_parameters, decode_request_head, find_header_end};

fn build_request(path: &str, headers: &[(String, String)], crlf: bool) -> Vec<u8> {
    let eol = if crlf { "\r\n" } else { "\n" };
    let mut raw = format!("GET {} HTTP/1.1{}", path, eol);
    for (name, value) in headers {
        raw.push_str(&format!("{}: {}{}", name, value, eol));
    }
    raw.push_str(eol);
    raw.into_bytes()
}

// ========================================
// ヘッダー終端検出
// ========================================

// 追記しながら走査しても一括走査と同じ位置で終端を検出する
proptest! {
    #[test]
    fn prop_header_end_incremental(
        headers in proptest::collection::vec((header_name(), header_value()), 0..8),
        crlf in any::<bool>(),
        body in proptest::collection::vec(any::<u8>(), 0..32),
        step in 1usize..16,
    ) {
        let mut raw = build_request("/", &headers, crlf);
        let head_len = raw.len();
        raw.extend_from_slice(&body);

        prop_assert_eq!(find_header_end(&raw, raw.len()), Some(head_len));

        let mut len = 0;
        let found = loop {
            len = (len + step).min(raw.len());
            if let Some(end) = find_header_end(&raw, len) {
                break Some(end);
            }
            if len == raw.len() {
                break None;
            }
        };
        prop_assert_eq!(found, Some(head_len));
    }
}

// 終端を含まないバイト列では検出しない
proptest! {
    #[test]
    fn prop_header_end_absent(s in "[A-Za-z0-9 :/]{0,64}(\r\n[A-Za-z0-9 :/]{1,16}){0,4}") {
        prop_assert_eq!(find_header_end(s.as_bytes(), s.len()), None);
    }
}

// ========================================
// ヘッダーブロックのデコード
// ========================================

// ヘッダー名は小文字化され、同名ヘッダーは後勝ち
proptest! {
    #[test]
    fn prop_decode_headers(
        headers in proptest::collection::vec((header_name(), header_value()), 0..8),
        crlf in any::<bool>(),
    ) {
        let raw = build_request("/index.html", &headers, crlf);
        let head = decode_request_head(&raw).unwrap();

        let mut expected = HashMap::new();
        for (name, value) in &headers {
            expected.insert(name.to_ascii_lowercase(), value.clone());
        }
        prop_assert_eq!(head.method, "GET");
        prop_assert_eq!(head.uri, "/index.html");
        prop_assert_eq!(head.headers, expected);
    }
}

// パスはデコードされ、クエリは生の文字列も保持する
proptest! {
    #[test]
    fn prop_decode_path_and_query(
        segment in "\\PC{1,16}",
        key in query_component(),
        value in query_component(),
    ) {
        let query = format!("{}={}", percent_encode(&key), percent_encode(&value));
        let path = format!("/{}?{}", percent_encode(&segment), query);
        let head = decode_request_head(&build_request(&path, &[], true)).unwrap();

        prop_assert_eq!(head.uri, format!("/{}", segment));
        prop_assert_eq!(head.query_string.as_deref(), Some(query.as_str()));
        prop_assert_eq!(&head.parameters[key.trim()], &vec![value]);
    }
}

// ========================================
// パラメーターのデコード
// ========================================

// 同じキーの値は出現順に蓄積される
proptest! {
    #[test]
    fn prop_parameters_multi_value(
        key in "[a-z]{1,8}",
        values in proptest::collection::vec(query_component(), 1..6),
    ) {
        let input = values
            .iter()
            .map(|v| format!("{}={}", key, percent_encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let mut parameters = Parameters::new();
        decode_parameters(&input, &mut parameters).unwrap();
        prop_assert_eq!(parameters.len(), 1);
        prop_assert_eq!(&parameters[&key], &values);
    }
}

// `=` の無いトークンは空文字列の値を持つ
proptest! {
    #[test]
    fn prop_parameters_flag(keys in proptest::collection::btree_set("[a-z]{1,8}", 1..6)) {
        let input = keys.iter().cloned().collect::<Vec<_>>().join("&");
        let mut parameters = Parameters::new();
        decode_parameters(&input, &mut parameters).unwrap();
        for key in &keys {
            prop_assert_eq!(&parameters[key], &vec![String::new()]);
        }
    }
}

// ========================================
// パーセントエンコーディング
// ========================================

proptest! {
    #[test]
    fn prop_percent_roundtrip(s in "\\PC{0,32}") {
        let encoded = percent_encode(&s);
        prop_assert!(encoded.bytes().all(|b| b.is_ascii_alphanumeric() || b"-._~%".contains(&b)));
        prop_assert_eq!(percent_decode(&encoded).unwrap(), s);
    }
}

// `+` はそのまま残る
proptest! {
    #[test]
    fn prop_percent_plus_is_literal(s in "[a-z+]{0,16}") {
        prop_assert_eq!(percent_decode(&s).unwrap(), s);
    }
}
