//! 一時ファイル管理
//!
//! 大きなリクエストボディや multipart のファイルパートを書き出す先を提供する。
//! マネージャーは 1 回のリクエスト処理ごとに [`TempFileManager::clear`] が呼ばれ、
//! その間に作成したファイルをすべて削除する。

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Error;

/// 一時ファイル
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
    file: File,
}

impl TempFile {
    /// ファイルパス
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// ファイルハンドル
    pub fn file(&self) -> &File {
        &self.file
    }

    /// ファイルハンドルを取り出す
    pub fn into_file(self) -> File {
        self.file
    }
}

/// 一時ファイルマネージャー
pub trait TempFileManager: Send {
    /// 一時ファイルを作成する
    ///
    /// `filename_hint` はアップロード元のファイル名など。実装は無視してもよい。
    fn create_temp_file(&mut self, filename_hint: Option<&str>) -> io::Result<TempFile>;

    /// 作成した一時ファイルをすべて削除する
    fn clear(&mut self);
}

/// `source` の `offset` から `len` バイトを一時ファイルへ書き出し、そのパスを返す
///
/// `len` が 0 の場合はファイルを作らず空文字列を返す。
/// 一時ファイルを確保できない場合は [`Error::Fatal`] になる。
pub fn copy_to_temp_file<R: Read + Seek>(
    manager: &mut dyn TempFileManager,
    source: &mut R,
    offset: u64,
    len: u64,
    filename_hint: Option<&str>,
) -> Result<String, Error> {
    if len == 0 {
        return Ok(String::new());
    }
    let temp = manager.create_temp_file(filename_hint).map_err(Error::Fatal)?;
    let path = temp.path().to_string_lossy().into_owned();
    let mut file = temp.into_file();

    copy_range(source, offset, len, &mut file).map_err(|e| Error::internal(e.to_string()))?;
    Ok(path)
}

fn copy_range<R: Read + Seek>(
    source: &mut R,
    offset: u64,
    len: u64,
    file: &mut File,
) -> io::Result<()> {
    source.seek(SeekFrom::Start(offset))?;
    io::copy(&mut Read::take(&mut *source, len), file)?;
    file.flush()
}

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// 指定ディレクトリに一時ファイルを作成するデフォルト実装
#[derive(Debug)]
pub struct DefaultTempFileManager {
    dir: PathBuf,
    files: Vec<PathBuf>,
}

impl DefaultTempFileManager {
    /// OS の一時ディレクトリを使うマネージャーを作成
    pub fn new() -> Self {
        Self::with_dir(std::env::temp_dir())
    }

    /// 指定ディレクトリを使うマネージャーを作成
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
        }
    }

    /// 現在保持している一時ファイル数
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// 一時ファイルを保持していないかどうか
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Default for DefaultTempFileManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TempFileManager for DefaultTempFileManager {
    fn create_temp_file(&mut self, _filename_hint: Option<&str>) -> io::Result<TempFile> {
        loop {
            let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
            let path = self
                .dir
                .join(format!("httpd-{}-{}.tmp", std::process::id(), seq));
            match OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(file) => {
                    self.files.push(path.clone());
                    return Ok(TempFile { path, file });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn clear(&mut self) {
        for path in self.files.drain(..) {
            // 既に削除されている場合もあるので結果は無視する
            let _ = std::fs::remove_file(path);
        }
    }
}

impl Drop for DefaultTempFileManager {
    fn drop(&mut self) {
        self.clear();
    }
}
