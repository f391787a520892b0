#![no_main]

use libfuzzer_sys::fuzz_target;
use shiguredo_httpd::uri::{percent_decode, percent_decode_bytes, percent_encode};
use shiguredo_httpd::{Parameters, decode_parameters};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let encoded = percent_encode(s);
        assert_eq!(percent_decode(&encoded).ok().as_deref(), Some(s));

        let _ = percent_decode(s);
        let _ = percent_decode_bytes(s);

        let mut parameters = Parameters::new();
        let _ = decode_parameters(s, &mut parameters);
    }
});
