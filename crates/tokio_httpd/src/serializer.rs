//! レスポンスの送信
//!
//! ヘッドのエンコードと転送方式の決定はコアの `ResponseHead` が行い、
//! ここでは `TransferPlan` に従ってボディを圧縮/chunked フレーミングしながら書き込む。

use std::io;

use shiguredo_httpd::compression::{compress_to_vec, finish_to_vec};
use shiguredo_httpd::{Compressor, HttpDate, LAST_CHUNK, NoCompression, TransferPlan, encode_chunk_into};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::compressor::GzipCompressor;
use crate::response::{BodyReader, Response};

const BUFFER_SIZE: usize = 16 * 1024;

/// レスポンスを 1 つ送信する
///
/// I/O エラーはログに出して破棄する。呼び出し側は送信後に接続の継続可否だけを判断する。
/// ボディのソースは結果にかかわらず閉じる。
pub async fn send_response<W>(writer: &mut W, response: &mut Response)
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if let Err(e) = write_response(writer, response).await {
        tracing::error!("could not send response to the client: {e}");
    }
    response.close_body();
}

async fn write_response<W>(writer: &mut W, response: &mut Response) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if let Some(hook) = response.upgrade_mut() {
        hook.before_send();
    }

    let (head, plan) = response.head().encode(&HttpDate::now());
    writer.write_all(&head).await?;

    if plan.send_body {
        match response.body_mut() {
            Some(body) => write_body(writer, body, plan).await?,
            None if plan.chunked => writer.write_all(LAST_CHUNK).await?,
            None => {}
        }
    }
    writer.flush().await
}

async fn write_body<W>(writer: &mut W, body: &mut BodyReader, plan: TransferPlan) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut compressor: Box<dyn Compressor + Send> = if plan.gzip {
        Box::new(GzipCompressor::new())
    } else {
        Box::new(NoCompression::new())
    };
    let mut reader = body.take(plan.limit.unwrap_or(u64::MAX));
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut scratch = vec![0u8; BUFFER_SIZE];
    let mut out = Vec::with_capacity(BUFFER_SIZE);

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        out.clear();
        compress_to_vec(&mut compressor, &buf[..n], &mut scratch, &mut out)
            .map_err(io::Error::other)?;
        write_framed(writer, &out, plan.chunked).await?;
    }

    out.clear();
    finish_to_vec(&mut compressor, &mut scratch, &mut out).map_err(io::Error::other)?;
    write_framed(writer, &out, plan.chunked).await?;

    if plan.chunked {
        writer.write_all(LAST_CHUNK).await?;
    }
    Ok(())
}

/// chunked の場合はチャンクとして書き込む (空のデータは書かない)
async fn write_framed<W>(writer: &mut W, data: &[u8], chunked: bool) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if data.is_empty() {
        return Ok(());
    }
    if chunked {
        let mut framed = Vec::with_capacity(data.len() + 16);
        encode_chunk_into(data, &mut framed);
        writer.write_all(&framed).await
    } else {
        writer.write_all(data).await
    }
}
