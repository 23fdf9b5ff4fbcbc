//! HTTP status codes.
//!
//! Only the six codes this server ever emits are represented: the core
//! never needs to round-trip an arbitrary status code, so (unlike a
//! general-purpose HTTP library) there is no `Unregistered(u16)` escape
//! hatch.

use std::fmt;

/// An HTTP response status code, restricted to the codes this server emits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum StatusCode {
    /// 200 OK
    /// [[RFC7231, Section 6.3.1](https://tools.ietf.org/html/rfc7231#section-6.3.1)]
    Ok,
    /// 400 Bad Request
    /// [[RFC7231, Section 6.5.1](https://tools.ietf.org/html/rfc7231#section-6.5.1)]
    BadRequest,
    /// 404 Not Found
    /// [[RFC7231, Section 6.5.4](https://tools.ietf.org/html/rfc7231#section-6.5.4)]
    NotFound,
    /// 418 I'm a teapot
    /// [[RFC2324](https://tools.ietf.org/html/rfc2324)]
    ImATeapot,
    /// 422 Unprocessable Entity
    /// [[RFC4918](https://tools.ietf.org/html/rfc4918)]
    UnprocessableEntity,
    /// 500 Internal Server Error
    /// [[RFC7231, Section 6.6.1](https://tools.ietf.org/html/rfc7231#section-6.6.1)]
    InternalServerError,
}

impl StatusCode {
    /// The numeric status code, as written on the wire.
    pub fn as_u16(&self) -> u16 {
        match *self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
            StatusCode::ImATeapot => 418,
            StatusCode::UnprocessableEntity => 422,
            StatusCode::InternalServerError => 500,
        }
    }

    /// The canonical reason phrase, as written on the wire after the code.
    pub fn reason_phrase(&self) -> &'static str {
        match *self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::ImATeapot => "I'm a teapot",
            StatusCode::UnprocessableEntity => "Unprocessable Entity",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}

#[cfg(test)]
mod tests {
    use super::StatusCode;

    #[test]
    fn as_u16_matches_wire_code() {
        assert_eq!(StatusCode::Ok.as_u16(), 200);
        assert_eq!(StatusCode::ImATeapot.as_u16(), 418);
        assert_eq!(StatusCode::InternalServerError.as_u16(), 500);
    }

    #[test]
    fn display_is_code_and_reason() {
        assert_eq!(StatusCode::NotFound.to_string(), "404 Not Found");
    }
}
