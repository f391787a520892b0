//! リクエストボディの保持と解釈
//!
//! ボディは宣言サイズに応じてメモリか一時ファイルに保持し ([`BodyStore`])、
//! メソッドと Content-Type に応じて解釈する ([`interpret_body`])。
//! 読み込み自体は I/O 層が行う。

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use crate::content_type::{Charset, ContentType};
use crate::decoder::{Parameters, decode_parameters};
use crate::error::Error;
use crate::limits::Limits;
use crate::method::Method;
use crate::multipart::decode_multipart;
use crate::temp_file::{TempFileManager, copy_to_temp_file};

/// POST の生ボディを格納するファイルマップのキー
pub const POST_DATA: &str = "postData";

/// PUT のボディを格納するファイルマップのキー
pub const PUT_CONTENT: &str = "content";

/// フィールド名から一時ファイルパス (または生ボディ) へのマップ
pub type Files = HashMap<String, String>;

/// ボディの保持先
#[derive(Debug)]
pub enum BodyStore {
    /// メモリ
    Memory(Cursor<Vec<u8>>),
    /// 一時ファイル
    File(File),
}

impl BodyStore {
    /// 宣言サイズに応じた保持先を作成する
    ///
    /// `memory_store_limit` 未満ならメモリ、それ以上なら一時ファイル。
    pub fn for_size(
        size: u64,
        limits: &Limits,
        temp_files: &mut dyn TempFileManager,
    ) -> Result<BodyStore, Error> {
        if size < limits.memory_store_limit as u64 {
            Ok(BodyStore::Memory(Cursor::new(Vec::with_capacity(size as usize))))
        } else {
            let temp = temp_files.create_temp_file(None).map_err(Error::Fatal)?;
            Ok(BodyStore::File(temp.into_file()))
        }
    }

    /// メモリ上に保持しているかどうか
    pub fn is_memory(&self) -> bool {
        matches!(self, BodyStore::Memory(_))
    }

    /// 保持しているバイト数
    pub fn len(&mut self) -> io::Result<u64> {
        let current = self.stream_position()?;
        let len = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(current))?;
        Ok(len)
    }

    /// 空かどうか
    pub fn is_empty(&mut self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Read for BodyStore {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            BodyStore::Memory(cursor) => cursor.read(buf),
            BodyStore::File(file) => file.read(buf),
        }
    }
}

impl Write for BodyStore {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            BodyStore::Memory(cursor) => cursor.write(buf),
            BodyStore::File(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            BodyStore::Memory(cursor) => cursor.flush(),
            BodyStore::File(file) => file.flush(),
        }
    }
}

impl Seek for BodyStore {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            BodyStore::Memory(cursor) => cursor.seek(pos),
            BodyStore::File(file) => file.seek(pos),
        }
    }
}

/// 読み込み済みのボディを解釈する
///
/// - POST + `application/x-www-form-urlencoded`: パラメーターへ追加
/// - POST + `multipart/form-data`: パートを分解
/// - POST + その他: 前後の空白を除去したテキストを [`POST_DATA`] に格納
/// - PUT: ボディ全体を一時ファイルに書き出し [`PUT_CONTENT`] に格納
pub fn interpret_body(
    method: Method,
    content_type: Option<&str>,
    store: &mut BodyStore,
    parameters: &mut Parameters,
    files: &mut Files,
    temp_files: &mut dyn TempFileManager,
    limits: &Limits,
) -> Result<(), Error> {
    let io_error = |e: io::Error| Error::internal(e.to_string());

    match method {
        Method::Post => {
            let content_type = ContentType::new(content_type);
            if content_type.is_multipart() {
                return decode_multipart(store, &content_type, parameters, files, temp_files, limits);
            }

            let mut bytes = Vec::new();
            store.seek(SeekFrom::Start(0)).map_err(io_error)?;
            store.read_to_end(&mut bytes).map_err(io_error)?;
            let text = Charset::from_name(content_type.encoding()).decode(&bytes);
            let text = text.trim();

            if content_type.is_form_urlencoded() {
                decode_parameters(text, parameters)?;
            } else if !text.is_empty() {
                files.insert(POST_DATA.to_string(), text.to_string());
            }
        }
        Method::Put => {
            let len = store.len().map_err(io_error)?;
            let path = copy_to_temp_file(temp_files, store, 0, len, None)?;
            files.insert(PUT_CONTENT.to_string(), path);
        }
        _ => {}
    }
    Ok(())
}
