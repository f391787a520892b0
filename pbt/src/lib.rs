//! PBT テスト共通ユーティリティ

use proptest::prelude::*;

// ========================================
// HTTP 要素の生成
// ========================================

/// ヘッダー名: token 文字のみ (1-16 文字)
pub fn header_name() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9-]{0,15}".prop_map(|s| s)
}

/// ヘッダー値: 前後に空白を持たない可視 ASCII
pub fn header_value() -> impl Strategy<Value = String> {
    "[!-~]([ -~]{0,30}[!-~])?".prop_map(|s| s)
}

/// クエリのキー: `=` と `&` を含まない任意の文字列
pub fn query_component() -> impl Strategy<Value = String> {
    "[^=&%]{1,16}".prop_map(|s| s)
}

/// multipart の境界文字列
///
/// 小文字のパート内容と衝突しないよう英大文字と数字に限る。
pub fn boundary() -> impl Strategy<Value = String> {
    "[A-Z0-9]{8,32}".prop_map(|s| s)
}

// ========================================
// WebSocket 要素の生成
// ========================================

/// 長さ表現の境界値を含むペイロード長
pub fn payload_len() -> impl Strategy<Value = usize> {
    prop_oneof![
        Just(0usize),
        Just(1usize),
        Just(125usize),
        Just(126usize),
        Just(65535usize),
        Just(65536usize),
        0usize..=70_000,
    ]
}

/// マスクキー (マスクなしを含む)
pub fn masking_key() -> impl Strategy<Value = Option<[u8; 4]>> {
    proptest::option::of(any::<[u8; 4]>())
}
