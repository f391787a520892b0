/// エンジンの制限設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// ヘッダー読み込みバッファサイズ (デフォルト: 8KB)
    ///
    /// リクエストラインとヘッダーはこのサイズ内で終端しなければならない。
    pub header_buffer_size: usize,
    /// multipart の各パートヘッダーを読み込むウィンドウサイズ (デフォルト: 1KB)
    pub max_part_header_size: usize,
    /// ボディをメモリに保持する上限 (デフォルト: 1KB)
    ///
    /// これ以上のボディは一時ファイルへ書き出す。
    pub memory_store_limit: usize,
    /// ボディ読み込み時の 1 回あたりの読み込みサイズ (デフォルト: 512 バイト)
    pub request_buffer_len: usize,
    /// multipart 境界探索のウィンドウサイズ (デフォルト: 4KB)
    ///
    /// 実際のウィンドウは境界文字列の長さだけ大きくなる。
    pub multipart_window_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            header_buffer_size: 8192,
            max_part_header_size: 1024,
            memory_store_limit: 1024,
            request_buffer_len: 512,
            multipart_window_size: 4096,
        }
    }
}
