//! chunked 転送エンコーディングのフレーミング

/// 終端チャンク
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// データを 1 つのチャンクとしてエンコード
///
/// 空のデータは終端チャンクになるため、途中の空データは呼び出し側で除外すること。
pub fn encode_chunk(data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(data.len() + 12);
    encode_chunk_into(data, &mut buf);
    buf
}

/// データを 1 つのチャンクとして `buf` に追記
pub fn encode_chunk_into(data: &[u8], buf: &mut Vec<u8>) {
    if data.is_empty() {
        buf.extend_from_slice(LAST_CHUNK);
        return;
    }
    buf.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_chunk() {
        assert_eq!(encode_chunk(b"hello"), b"5\r\nhello\r\n");
        assert_eq!(encode_chunk(&[0u8; 255])[..4], *b"ff\r\n");
    }

    #[test]
    fn test_encode_last_chunk() {
        assert_eq!(encode_chunk(b""), LAST_CHUNK);
    }
}
