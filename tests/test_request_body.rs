//! ヘッダーの切り出しからボディの解釈までを通しで確認するテスト
//!
//! ソケットの代わりにバイト列を使い、I/O 層が行う処理 (ヘッダー終端の検出、
//! 読み過ぎたバイト列の保持、ボディの保持先の選択) を再現する。

use std::io::{Read, Write};

use shiguredo_httpd::body::{BodyStore, Files, POST_DATA, PUT_CONTENT, interpret_body};
use shiguredo_httpd::{
    DefaultTempFileManager, Limits, Method, Parameters, Status, decode_request_head,
    find_header_end,
};

struct Parsed {
    method: Method,
    uri: String,
    parameters: Parameters,
    files: Files,
    // 一時ファイルを生かしておく
    _temp_files: DefaultTempFileManager,
}

fn process(raw: &[u8]) -> Result<Parsed, shiguredo_httpd::Error> {
    let limits = Limits::default();
    let end = find_header_end(raw, raw.len()).expect("header terminator");
    let head = decode_request_head(&raw[..end])?;
    let method = Method::lookup(&head.method).expect("known method");
    let body = &raw[end..];
    let size = head.content_length().unwrap_or(body.len() as u64);

    let mut temp_files = DefaultTempFileManager::new();
    let mut store = BodyStore::for_size(size, &limits, &mut temp_files)?;
    store.write_all(&body[..size as usize]).unwrap();

    let mut parameters = head.parameters;
    let mut files = Files::new();
    interpret_body(
        method,
        head.headers.get("content-type").map(String::as_str),
        &mut store,
        &mut parameters,
        &mut files,
        &mut temp_files,
        &limits,
    )?;
    Ok(Parsed {
        method,
        uri: head.uri,
        parameters,
        files,
        _temp_files: temp_files,
    })
}

fn read_file(path: &str) -> Vec<u8> {
    let mut out = Vec::new();
    std::fs::File::open(path)
        .unwrap()
        .read_to_end(&mut out)
        .unwrap();
    out
}

#[test]
fn test_query_and_form_parameters_merge() {
    let raw = b"POST /submit?tag=a HTTP/1.1\r\n\
Content-Type: application/x-www-form-urlencoded\r\n\
Content-Length: 20\r\n\
\r\n\
tag=b&name=%E5%A4%AA";
    let parsed = process(raw).unwrap();
    assert_eq!(parsed.method, Method::Post);
    assert_eq!(parsed.uri, "/submit");
    assert_eq!(parsed.parameters["tag"], vec!["a", "b"]);
    assert_eq!(parsed.parameters["name"], vec!["太"]);
}

#[test]
fn test_lenient_line_endings() {
    let raw = b"POST /plain HTTP/1.1\nContent-Length: 6\n\n hello";
    let parsed = process(raw).unwrap();
    assert_eq!(parsed.files[POST_DATA], "hello");
}

#[test]
fn test_multipart_with_file_and_fields() {
    let body = "--XyZ\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\
\r\n\
report\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\n\
Content-Type: text/plain\r\n\
\r\n\
first file\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"upload\"; filename=\"b.txt\"\r\n\
Content-Type: text/plain\r\n\
\r\n\
second file\r\n\
--XyZ--\r\n";
    let raw = format!(
        "POST /upload HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=XyZ\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    let parsed = process(raw.as_bytes()).unwrap();
    assert_eq!(parsed.parameters["title"], vec!["report"]);
    assert_eq!(parsed.parameters["upload"], vec!["a.txt", "b.txt"]);
    assert_eq!(read_file(&parsed.files["upload"]), b"first file");
    assert_eq!(read_file(&parsed.files["upload2"]), b"second file");
}

#[test]
fn test_large_multipart_goes_through_file_store() {
    let payload = "x".repeat(10_000);
    let body = format!(
        "--B\r\nContent-Disposition: form-data; name=\"big\"; filename=\"big.bin\"\r\n\r\n{payload}\r\n--B--\r\n"
    );
    let raw = format!(
        "POST / HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=B\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    let parsed = process(raw.as_bytes()).unwrap();
    assert_eq!(read_file(&parsed.files["big"]), payload.as_bytes());
}

#[test]
fn test_multipart_errors() {
    let raw = b"POST / HTTP/1.1\r\nContent-Type: multipart/form-data\r\nContent-Length: 4\r\n\r\nabcd";
    let err = process(raw).err().unwrap();
    assert_eq!(err.status(), Status::BadRequest);

    let raw = b"POST / HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=Q\r\nContent-Length: 7\r\n\r\n--Q\r\nab";
    let err = process(raw).err().unwrap();
    assert!(err.message().contains("less than two boundary strings"));
}

#[test]
fn test_put_body_is_stored_as_file() {
    let payload = vec![7u8; 3000];
    let mut raw = format!("PUT /blob HTTP/1.1\r\nContent-Length: {}\r\n\r\n", payload.len()).into_bytes();
    raw.extend_from_slice(&payload);
    let parsed = process(&raw).unwrap();
    assert_eq!(read_file(&parsed.files[PUT_CONTENT]), payload);
}
