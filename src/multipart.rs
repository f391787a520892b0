//! multipart/form-data の境界探索とパート分解
//!
//! ボディは [`Read`] + [`Seek`] なソース (メモリまたは一時ファイル) として扱い、
//! 固定サイズのスライディングウィンドウで境界を探すため、ボディ全体を
//! メモリに載せる必要はない。
//!
//! 境界位置は先頭の `--` を含まない境界トークンの開始位置を指す。

use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom};

use crate::content_type::{Charset, ContentType};
use crate::decoder::Parameters;
use crate::error::Error;
use crate::limits::Limits;
use crate::temp_file::{TempFileManager, copy_to_temp_file};

/// パートヘッダー
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartHeader {
    /// Content-Disposition の name 属性
    pub name: Option<String>,
    /// Content-Disposition の filename 属性
    pub filename: Option<String>,
    /// パートの Content-Type
    pub content_type: Option<String>,
    /// 境界行からヘッダー終端の空行までのバイト数
    pub header_len: usize,
}

/// 境界トークンの出現位置をすべて返す
///
/// `window_size + boundary.len()` バイトのウィンドウで走査し、ウィンドウを詰め直す際は
/// 末尾 `boundary.len() - 1` バイトを次のウィンドウへ持ち越すので、
/// ウィンドウをまたぐ境界も検出される。結果は昇順。
pub fn boundary_positions<R: Read + Seek>(
    source: &mut R,
    boundary: &[u8],
    window_size: usize,
) -> io::Result<Vec<u64>> {
    let mut positions = Vec::new();
    if boundary.is_empty() {
        return Ok(positions);
    }
    source.seek(SeekFrom::Start(0))?;

    let mut window = vec![0u8; window_size.max(1) + boundary.len()];
    let mut filled = 0;
    let mut window_offset: u64 = 0;

    loop {
        let read = fill(source, &mut window[filled..])?;
        filled += read;
        if filled < boundary.len() {
            break;
        }

        for start in 0..=(filled - boundary.len()) {
            if &window[start..start + boundary.len()] == boundary {
                positions.push(window_offset + start as u64);
            }
        }

        if filled < window.len() {
            break;
        }

        let carry = boundary.len() - 1;
        window.copy_within(filled - carry..filled, 0);
        window_offset += (filled - carry) as u64;
        filled = carry;
    }

    Ok(positions)
}

/// EOF かバッファが埋まるまで読み込む
fn fill<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match source.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// パートヘッダーを解析する
///
/// `window` は境界トークンから始まるバイト列。
pub fn parse_part_header(window: &[u8], boundary: &str) -> Result<PartHeader, Error> {
    let mut header = PartHeader::default();
    let mut offset = 0;
    let mut first_line = true;

    loop {
        let Some(newline) = window[offset..].iter().position(|&b| b == b'\n') else {
            return Err(Error::internal(
                "Multipart header size exceeds MAX_HEADER_SIZE.",
            ));
        };
        let raw = String::from_utf8_lossy(&window[offset..offset + newline]);
        let line = raw.trim_end_matches('\r');
        offset += newline + 1;

        if first_line {
            if !line.contains(boundary) {
                return Err(Error::bad_request(
                    "BAD REQUEST: Content type is multipart/form-data but chunk does not start with boundary.",
                ));
            }
            first_line = false;
            continue;
        }

        if line.trim().is_empty() {
            break;
        }

        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.eq_ignore_ascii_case("content-disposition") {
            for (key, value) in disposition_attributes(value) {
                if key.eq_ignore_ascii_case("name") {
                    header.name = Some(value);
                } else if key.eq_ignore_ascii_case("filename") {
                    header.filename = Some(value);
                }
            }
        } else if name.eq_ignore_ascii_case("content-type") {
            header.content_type = Some(value.trim().to_string());
        }
    }

    if offset + 4 >= window.len() {
        return Err(Error::internal(
            "Multipart header size exceeds MAX_HEADER_SIZE.",
        ));
    }
    header.header_len = offset;
    Ok(header)
}

/// Content-Disposition の `key="value"` 属性を取り出す
fn disposition_attributes(value: &str) -> impl Iterator<Item = (&str, String)> {
    value.split(';').filter_map(|attr| {
        let (key, value) = attr.split_once('=')?;
        let value = value.trim();
        let value = match value.as_bytes().first() {
            Some(b'"') | Some(b'\'') => {
                let quote = value.as_bytes()[0] as char;
                let inner = &value[1..];
                inner.find(quote).map_or(inner, |end| &inner[..end])
            }
            _ => value,
        };
        Some((key.trim(), value.to_string()))
    })
}

/// multipart/form-data ボディを分解する
///
/// ファイル名か Content-Type を持つパートは一時ファイルへ書き出して `files` にパスを登録し、
/// それ以外はテキストとして `parameters` に追加する。同名のファイルパートは
/// `name2`、`name3` ... のように番号を付けて区別する。
pub fn decode_multipart<R: Read + Seek>(
    source: &mut R,
    content_type: &ContentType,
    parameters: &mut Parameters,
    files: &mut HashMap<String, String>,
    temp_files: &mut dyn TempFileManager,
    limits: &Limits,
) -> Result<(), Error> {
    let boundary = content_type.boundary().ok_or_else(|| {
        Error::bad_request(
            "BAD REQUEST: Content type is multipart/form-data but boundary missing. Usage: GET /example/file.html",
        )
    })?;
    let charset = Charset::from_name(content_type.encoding());
    let io_error = |e: io::Error| Error::internal(e.to_string());

    let positions = boundary_positions(source, boundary.as_bytes(), limits.multipart_window_size)
        .map_err(io_error)?;
    if positions.len() < 2 {
        return Err(Error::bad_request(
            "BAD REQUEST: Content type is multipart/form-data but contains less than two boundary strings.",
        ));
    }

    let total = source.seek(SeekFrom::End(0)).map_err(io_error)?;
    let mut window = vec![0u8; limits.max_part_header_size];

    for pair in positions.windows(2) {
        let (start, next) = (pair[0], pair[1]);
        let window_len = (total - start).min(limits.max_part_header_size as u64) as usize;
        source.seek(SeekFrom::Start(start)).map_err(io_error)?;
        let read = fill(source, &mut window[..window_len]).map_err(io_error)?;

        let header = parse_part_header(&window[..read], boundary)?;
        let data_start = start + header.header_len as u64;
        let data_len = next.saturating_sub(4).saturating_sub(data_start);
        let name = header.name.unwrap_or_default();

        if header.filename.is_none() && header.content_type.is_none() {
            let mut data = vec![0u8; data_len as usize];
            source.seek(SeekFrom::Start(data_start)).map_err(io_error)?;
            source.read_exact(&mut data).map_err(io_error)?;
            parameters
                .entry(name)
                .or_default()
                .push(charset.decode(&data));
            continue;
        }

        let path = copy_to_temp_file(
            temp_files,
            source,
            data_start,
            data_len,
            header.filename.as_deref(),
        )?;
        let key = if files.contains_key(&name) {
            (2..)
                .map(|n| format!("{}{}", name, n))
                .find(|candidate| !files.contains_key(candidate))
                .unwrap_or_default()
        } else {
            name.clone()
        };
        files.insert(key, path);
        if let Some(filename) = header.filename {
            parameters.entry(name).or_default().push(filename);
        }
    }

    Ok(())
}
