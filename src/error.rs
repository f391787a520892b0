use crate::status::Status;

/// リクエスト処理エラー
///
/// `Response` はクライアントへ HTTP エラーレスポンスとして返すエラー、
/// `Fatal` は安全に回復できないローカル障害を表す。
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// クライアントへ通知するエラー (ステータスコードと平文メッセージ)
    #[error("{status}: {message}")]
    Response { status: Status, message: String },
    /// 一時ファイル確保などの回復不能な障害
    #[error("unrecoverable local fault: {0}")]
    Fatal(#[source] std::io::Error),
}

impl Error {
    /// 400 Bad Request エラーを作成
    pub fn bad_request(message: impl Into<String>) -> Self {
        Error::Response {
            status: Status::BadRequest,
            message: message.into(),
        }
    }

    /// 500 Internal Server Error エラーを作成
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Response {
            status: Status::InternalError,
            message: message.into(),
        }
    }

    /// クライアントへ返すステータスコード
    ///
    /// `Fatal` の場合は 500 を返す。
    pub fn status(&self) -> Status {
        match self {
            Error::Response { status, .. } => *status,
            Error::Fatal(_) => Status::InternalError,
        }
    }

    /// クライアントへ返すメッセージ
    pub fn message(&self) -> String {
        match self {
            Error::Response { message, .. } => message.clone(),
            Error::Fatal(e) => format!("SERVER INTERNAL ERROR: {}", e),
        }
    }

    /// 回復不能な障害かどうか
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }
}
