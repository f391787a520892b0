//! ヘッダーとボディの境界検出

/// ヘッダー終端の直後の位置を返す
///
/// `buf[..len]` を先頭から走査し、`\r\n\r\n` を優先して、寛容なクライアント向けに
/// `\n\n` も終端として扱う。見つからない場合は `None` を返す。
/// 返す位置は常に `len` 以下。
///
/// 読み込みを追加するたびに蓄積したバッファ全体に対して繰り返し呼んでよい。
pub fn find_header_end(buf: &[u8], len: usize) -> Option<usize> {
    let len = len.min(buf.len());
    let mut i = 0;
    while i + 1 < len {
        if i + 3 < len && &buf[i..i + 4] == b"\r\n\r\n" {
            return Some(i + 4);
        }
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some(i + 2);
        }
        i += 1;
    }
    None
}
