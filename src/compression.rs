//! レスポンスボディの圧縮インターフェース (Sans I/O)
//!
//! 具体的な圧縮方式 (gzip 等) は I/O 側のクレートが `Compressor` を実装して提供する。
//! コアは圧縮なしの `NoCompression` と、出力バッファが満杯になった場合の
//! 繰り返し処理 (`compress_to_vec` / `finish_to_vec`) だけを持つ。

/// 圧縮エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompressionError {
    /// `finish()` 後に呼び出された
    #[error("compression already finished")]
    AlreadyFinished,
    /// 出力バッファが空
    #[error("output buffer is empty")]
    EmptyOutput,
    /// 圧縮器内部のエラー
    #[error("compression failed: {0}")]
    Internal(String),
}

/// 1 回の呼び出しの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionStatus {
    /// 入力をすべて消費した
    Continue { consumed: usize, produced: usize },
    /// 圧縮が完了した (`finish()` のみ)
    Complete { consumed: usize, produced: usize },
    /// 出力バッファが満杯なので、同じ入力の残りで再度呼び出す必要がある
    OutputFull { consumed: usize, produced: usize },
}

impl CompressionStatus {
    pub fn consumed(&self) -> usize {
        match *self {
            CompressionStatus::Continue { consumed, .. }
            | CompressionStatus::Complete { consumed, .. }
            | CompressionStatus::OutputFull { consumed, .. } => consumed,
        }
    }

    pub fn produced(&self) -> usize {
        match *self {
            CompressionStatus::Continue { produced, .. }
            | CompressionStatus::Complete { produced, .. }
            | CompressionStatus::OutputFull { produced, .. } => produced,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, CompressionStatus::Complete { .. })
    }

    pub fn is_output_full(&self) -> bool {
        matches!(self, CompressionStatus::OutputFull { .. })
    }
}

/// 圧縮器
///
/// `compress()` は `OutputFull` を返した場合、生成しきれなかったデータを内部に保持し、
/// 次の呼び出しで先に出力しなければならない。
pub trait Compressor {
    fn compress(
        &mut self,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<CompressionStatus, CompressionError>;

    /// 残りのデータを出力する。`Complete` を返すまで繰り返し呼び出す。
    fn finish(&mut self, output: &mut [u8]) -> Result<CompressionStatus, CompressionError>;

    fn reset(&mut self);
}

impl<C: Compressor + ?Sized> Compressor for Box<C> {
    fn compress(
        &mut self,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<CompressionStatus, CompressionError> {
        (**self).compress(input, output)
    }

    fn finish(&mut self, output: &mut [u8]) -> Result<CompressionStatus, CompressionError> {
        (**self).finish(output)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// 入力をすべて圧縮して `out` に追記する
///
/// `scratch` は 1 回の呼び出しで使う出力バッファ。
pub fn compress_to_vec<C: Compressor + ?Sized>(
    compressor: &mut C,
    mut input: &[u8],
    scratch: &mut [u8],
    out: &mut Vec<u8>,
) -> Result<(), CompressionError> {
    if scratch.is_empty() {
        return Err(CompressionError::EmptyOutput);
    }
    loop {
        let status = compressor.compress(input, scratch)?;
        out.extend_from_slice(&scratch[..status.produced()]);
        input = &input[status.consumed()..];
        if !status.is_output_full() {
            return Ok(());
        }
    }
}

/// 圧縮を終了して残りを `out` に追記する
pub fn finish_to_vec<C: Compressor + ?Sized>(
    compressor: &mut C,
    scratch: &mut [u8],
    out: &mut Vec<u8>,
) -> Result<(), CompressionError> {
    if scratch.is_empty() {
        return Err(CompressionError::EmptyOutput);
    }
    loop {
        let status = compressor.finish(scratch)?;
        out.extend_from_slice(&scratch[..status.produced()]);
        if status.is_complete() {
            return Ok(());
        }
    }
}

/// 圧縮なし (入力をそのまま出力する)
#[derive(Debug, Clone, Default)]
pub struct NoCompression {
    finished: bool,
}

impl NoCompression {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Compressor for NoCompression {
    fn compress(
        &mut self,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<CompressionStatus, CompressionError> {
        if self.finished {
            return Err(CompressionError::AlreadyFinished);
        }
        let n = input.len().min(output.len());
        output[..n].copy_from_slice(&input[..n]);
        if n < input.len() {
            Ok(CompressionStatus::OutputFull {
                consumed: n,
                produced: n,
            })
        } else {
            Ok(CompressionStatus::Continue {
                consumed: n,
                produced: n,
            })
        }
    }

    fn finish(&mut self, _output: &mut [u8]) -> Result<CompressionStatus, CompressionError> {
        if self.finished {
            return Err(CompressionError::AlreadyFinished);
        }
        self.finished = true;
        Ok(CompressionStatus::Complete {
            consumed: 0,
            produced: 0,
        })
    }

    fn reset(&mut self) {
        self.finished = false;
    }
}
