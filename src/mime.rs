//! 拡張子から MIME タイプへの変換
//!
//! テーブルは最初の参照時に一度だけ構築し、以降は読み取り専用で共有する。

use std::collections::HashMap;
use std::sync::LazyLock;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

static MIME_TYPES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    [
        ("css", "text/css"),
        ("htm", "text/html"),
        ("html", "text/html"),
        ("xml", "text/xml"),
        ("java", "text/x-java-source, text/java"),
        ("md", "text/plain"),
        ("txt", "text/plain"),
        ("asc", "text/plain"),
        ("csv", "text/csv"),
        ("gif", "image/gif"),
        ("jpg", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("png", "image/png"),
        ("svg", "image/svg+xml"),
        ("ico", "image/x-icon"),
        ("webp", "image/webp"),
        ("mp3", "audio/mpeg"),
        ("m3u", "audio/mpeg-url"),
        ("mp4", "video/mp4"),
        ("ogv", "video/ogg"),
        ("flv", "video/x-flv"),
        ("mov", "video/quicktime"),
        ("swf", "application/x-shockwave-flash"),
        ("js", "application/javascript"),
        ("json", "application/json"),
        ("pdf", "application/pdf"),
        ("doc", "application/msword"),
        ("ogg", "application/x-ogg"),
        ("zip", "application/octet-stream"),
        ("exe", "application/octet-stream"),
        ("class", "application/octet-stream"),
        ("wasm", "application/wasm"),
        ("woff", "font/woff"),
        ("woff2", "font/woff2"),
    ]
    .into_iter()
    .collect()
});

/// URI またはファイル名から MIME タイプを推定する
///
/// 拡張子が無いか未知の場合は `application/octet-stream`。
pub fn mime_type_for_file(uri: &str) -> &'static str {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let file_name = path.rsplit('/').next().unwrap_or(path);
    file_name
        .rsplit_once('.')
        .and_then(|(_, ext)| MIME_TYPES.get(ext.to_ascii_lowercase().as_str()).copied())
        .unwrap_or(DEFAULT_MIME_TYPE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        assert_eq!(mime_type_for_file("/index.html"), "text/html");
        assert_eq!(mime_type_for_file("photo.JPG"), "image/jpeg");
        assert_eq!(mime_type_for_file("/api/data.json?x=1"), "application/json");
    }

    #[test]
    fn test_unknown_extension() {
        assert_eq!(mime_type_for_file("archive.unknown"), DEFAULT_MIME_TYPE);
        assert_eq!(mime_type_for_file("/dir.d/README"), DEFAULT_MIME_TYPE);
    }

    #[test]
    fn test_concurrent_first_access() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| mime_type_for_file("a.css")))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), "text/css");
        }
    }
}
