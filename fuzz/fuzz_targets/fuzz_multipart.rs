#![no_main]

use std::io::Cursor;

use libfuzzer_sys::fuzz_target;
use shiguredo_httpd::content_type::ContentType;
use shiguredo_httpd::multipart::{boundary_positions, decode_multipart};
use shiguredo_httpd::{DefaultTempFileManager, Files, Limits, Parameters};

fuzz_target!(|data: &[u8]| {
    // 様々な境界とウィンドウサイズで分解を試行
    let boundaries = ["boundary", "----WebKitFormBoundary", "abc123", "-"];

    for boundary in boundaries {
        for window_size in [1, 7, 4096] {
            let positions =
                boundary_positions(&mut Cursor::new(data), boundary.as_bytes(), window_size);
            let expected: Vec<u64> = data
                .windows(boundary.len())
                .enumerate()
                .filter(|(_, w)| *w == boundary.as_bytes())
                .map(|(i, _)| i as u64)
                .collect();
            assert_eq!(positions.ok(), Some(expected));
        }

        let content_type =
            ContentType::new(Some(&format!("multipart/form-data; boundary={}", boundary)));
        let mut parameters = Parameters::new();
        let mut files = Files::new();
        let mut temp_files = DefaultTempFileManager::new();
        // パニックしなければ OK
        let _ = decode_multipart(
            &mut Cursor::new(data),
            &content_type,
            &mut parameters,
            &mut files,
            &mut temp_files,
            &Limits::default(),
        );
    }
});
