//! gzip 圧縮器
//!
//! `shiguredo_httpd::Compressor` を flate2 で実装する。
//! 出力バッファに収まらなかった圧縮データは内部に保持し、次の呼び出しで先に出力する。

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use shiguredo_httpd::{CompressionError, CompressionStatus, Compressor};

/// gzip 圧縮器
pub struct GzipCompressor {
    encoder: Option<GzEncoder<Vec<u8>>>,
    pending: Vec<u8>,
    pending_pos: usize,
}

impl GzipCompressor {
    pub fn new() -> Self {
        Self {
            encoder: Some(GzEncoder::new(Vec::new(), Compression::default())),
            pending: Vec::new(),
            pending_pos: 0,
        }
    }

    /// 保持している圧縮データを出力バッファへ移す
    fn drain_pending(&mut self, output: &mut [u8]) -> usize {
        let available = &self.pending[self.pending_pos..];
        let n = available.len().min(output.len());
        output[..n].copy_from_slice(&available[..n]);
        self.pending_pos += n;
        if self.pending_pos == self.pending.len() {
            self.pending.clear();
            self.pending_pos = 0;
        }
        n
    }

    fn has_pending(&self) -> bool {
        self.pending_pos < self.pending.len()
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for GzipCompressor {
    fn compress(
        &mut self,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<CompressionStatus, CompressionError> {
        let produced = self.drain_pending(output);
        if self.has_pending() {
            return Ok(CompressionStatus::OutputFull {
                consumed: 0,
                produced,
            });
        }

        let encoder = self
            .encoder
            .as_mut()
            .ok_or(CompressionError::AlreadyFinished)?;
        encoder
            .write_all(input)
            .map_err(|e| CompressionError::Internal(e.to_string()))?;
        self.pending.append(encoder.get_mut());

        let produced = produced + self.drain_pending(&mut output[produced..]);
        if self.has_pending() {
            Ok(CompressionStatus::OutputFull {
                consumed: input.len(),
                produced,
            })
        } else {
            Ok(CompressionStatus::Continue {
                consumed: input.len(),
                produced,
            })
        }
    }

    fn finish(&mut self, output: &mut [u8]) -> Result<CompressionStatus, CompressionError> {
        if let Some(encoder) = self.encoder.take() {
            let tail = encoder
                .finish()
                .map_err(|e| CompressionError::Internal(e.to_string()))?;
            self.pending.extend_from_slice(&tail);
        } else if !self.has_pending() {
            return Err(CompressionError::AlreadyFinished);
        }

        let produced = self.drain_pending(output);
        if self.has_pending() {
            Ok(CompressionStatus::OutputFull {
                consumed: 0,
                produced,
            })
        } else {
            // 完了後の呼び出しはエラーにするため、空の保持データを残さない
            self.pending = Vec::new();
            Ok(CompressionStatus::Complete {
                consumed: 0,
                produced,
            })
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;
    use shiguredo_httpd::compression::{compress_to_vec, finish_to_vec};

    use super::*;

    fn gunzip(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        GzDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_gzip_roundtrip_small_output_buffer() {
        let input = "hello gzip ".repeat(500);
        let mut compressor = GzipCompressor::new();
        let mut scratch = [0u8; 7];
        let mut out = Vec::new();
        for chunk in input.as_bytes().chunks(100) {
            compress_to_vec(&mut compressor, chunk, &mut scratch, &mut out).unwrap();
        }
        finish_to_vec(&mut compressor, &mut scratch, &mut out).unwrap();
        assert_eq!(gunzip(&out), input.as_bytes());
    }

    #[test]
    fn test_finish_twice() {
        let mut compressor = GzipCompressor::new();
        let mut out = vec![0u8; 1024];
        assert!(compressor.finish(&mut out).unwrap().is_complete());
        assert_eq!(
            compressor.finish(&mut out),
            Err(CompressionError::AlreadyFinished)
        );
        compressor.reset();
        assert!(compressor.compress(b"x", &mut out).is_ok());
    }
}
