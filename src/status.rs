//! HTTP ステータス

use core::fmt;

/// HTTP ステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    SwitchProtocol,
    Ok,
    Created,
    Accepted,
    NoContent,
    PartialContent,
    MultiStatus,
    Redirect,
    Found,
    RedirectSeeOther,
    NotModified,
    TemporaryRedirect,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    NotAcceptable,
    RequestTimeout,
    Conflict,
    Gone,
    LengthRequired,
    PreconditionFailed,
    PayloadTooLarge,
    UnsupportedMediaType,
    RangeNotSatisfiable,
    ExpectationFailed,
    TooManyRequests,
    InternalError,
    NotImplemented,
    ServiceUnavailable,
    UnsupportedHttpVersion,
}

const ALL: [Status; 32] = [
    Status::SwitchProtocol,
    Status::Ok,
    Status::Created,
    Status::Accepted,
    Status::NoContent,
    Status::PartialContent,
    Status::MultiStatus,
    Status::Redirect,
    Status::Found,
    Status::RedirectSeeOther,
    Status::NotModified,
    Status::TemporaryRedirect,
    Status::BadRequest,
    Status::Unauthorized,
    Status::Forbidden,
    Status::NotFound,
    Status::MethodNotAllowed,
    Status::NotAcceptable,
    Status::RequestTimeout,
    Status::Conflict,
    Status::Gone,
    Status::LengthRequired,
    Status::PreconditionFailed,
    Status::PayloadTooLarge,
    Status::UnsupportedMediaType,
    Status::RangeNotSatisfiable,
    Status::ExpectationFailed,
    Status::TooManyRequests,
    Status::InternalError,
    Status::NotImplemented,
    Status::ServiceUnavailable,
    Status::UnsupportedHttpVersion,
];

impl Status {
    /// ステータスコード
    pub fn code(self) -> u16 {
        match self {
            Status::SwitchProtocol => 101,
            Status::Ok => 200,
            Status::Created => 201,
            Status::Accepted => 202,
            Status::NoContent => 204,
            Status::PartialContent => 206,
            Status::MultiStatus => 207,
            Status::Redirect => 301,
            Status::Found => 302,
            Status::RedirectSeeOther => 303,
            Status::NotModified => 304,
            Status::TemporaryRedirect => 307,
            Status::BadRequest => 400,
            Status::Unauthorized => 401,
            Status::Forbidden => 403,
            Status::NotFound => 404,
            Status::MethodNotAllowed => 405,
            Status::NotAcceptable => 406,
            Status::RequestTimeout => 408,
            Status::Conflict => 409,
            Status::Gone => 410,
            Status::LengthRequired => 411,
            Status::PreconditionFailed => 412,
            Status::PayloadTooLarge => 413,
            Status::UnsupportedMediaType => 415,
            Status::RangeNotSatisfiable => 416,
            Status::ExpectationFailed => 417,
            Status::TooManyRequests => 429,
            Status::InternalError => 500,
            Status::NotImplemented => 501,
            Status::ServiceUnavailable => 503,
            Status::UnsupportedHttpVersion => 505,
        }
    }

    /// 理由句
    pub fn reason_phrase(self) -> &'static str {
        match self {
            Status::SwitchProtocol => "Switching Protocols",
            Status::Ok => "OK",
            Status::Created => "Created",
            Status::Accepted => "Accepted",
            Status::NoContent => "No Content",
            Status::PartialContent => "Partial Content",
            Status::MultiStatus => "Multi-Status",
            Status::Redirect => "Moved Permanently",
            Status::Found => "Found",
            Status::RedirectSeeOther => "See Other",
            Status::NotModified => "Not Modified",
            Status::TemporaryRedirect => "Temporary Redirect",
            Status::BadRequest => "Bad Request",
            Status::Unauthorized => "Unauthorized",
            Status::Forbidden => "Forbidden",
            Status::NotFound => "Not Found",
            Status::MethodNotAllowed => "Method Not Allowed",
            Status::NotAcceptable => "Not Acceptable",
            Status::RequestTimeout => "Request Timeout",
            Status::Conflict => "Conflict",
            Status::Gone => "Gone",
            Status::LengthRequired => "Length Required",
            Status::PreconditionFailed => "Precondition Failed",
            Status::PayloadTooLarge => "Payload Too Large",
            Status::UnsupportedMediaType => "Unsupported Media Type",
            Status::RangeNotSatisfiable => "Requested Range Not Satisfiable",
            Status::ExpectationFailed => "Expectation Failed",
            Status::TooManyRequests => "Too Many Requests",
            Status::InternalError => "Internal Server Error",
            Status::NotImplemented => "Not Implemented",
            Status::ServiceUnavailable => "Service Unavailable",
            Status::UnsupportedHttpVersion => "HTTP Version Not Supported",
        }
    }

    /// ステータスラインに使う "コード 理由句" 形式の文字列
    pub fn description(self) -> String {
        format!("{} {}", self.code(), self.reason_phrase())
    }

    /// ステータスコードから検索
    pub fn lookup(code: u16) -> Option<Status> {
        ALL.iter().copied().find(|s| s.code() == code)
    }

    /// ボディを持てないステータスかどうか (1xx, 204, 304)
    pub fn is_bodiless(self) -> bool {
        let code = self.code();
        (100..200).contains(&code) || code == 204 || code == 304
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason_phrase())
    }
}
