//! The response type and its fixed wire serialization.

use bytes::{BufMut, Bytes, BytesMut};

use crate::status::StatusCode;

/// The `Content-Type` a [`Response`] body is serialized as.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ContentType {
    /// `text/plain; charset=US-ASCII`
    PlainText,
    /// `application/json; charset=US-ASCII`
    Json,
}

impl ContentType {
    fn mime(&self) -> &'static str {
        match *self {
            ContentType::PlainText => "text/plain",
            ContentType::Json => "application/json",
        }
    }
}

/// A response produced by a handler, or synthesized by the core (404, the
/// best-effort 400).
#[derive(Clone, Debug)]
pub struct Response {
    status: StatusCode,
    content_type: Option<ContentType>,
    body: Vec<u8>,
}

impl Response {
    /// Builds a response with a body and its content type.
    pub fn new(status: StatusCode, content_type: ContentType, body: impl Into<Vec<u8>>) -> Self {
        Response {
            status,
            content_type: Some(content_type),
            body: body.into(),
        }
    }

    /// Builds a response with an empty body and no `Content-Type` header,
    /// as the core synthesizes for not-found routes.
    pub fn empty(status: StatusCode) -> Self {
        Response {
            status,
            content_type: None,
            body: Vec::new(),
        }
    }

    pub(crate) fn status(&self) -> StatusCode {
        self.status
    }

    /// Serializes the response to the bit-exact wire format:
    ///
    /// ```text
    /// HTTP/1.1 <code> <reason>\r\n
    /// Content-Type: <mime>; charset=US-ASCII\r\n
    /// Content-Length: <n>\r\n
    /// \r\n
    /// <body-bytes>
    /// ```
    ///
    /// The `Content-Type` line is omitted when the response was built with
    /// [`Response::empty`].
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64 + self.body.len());
        buf.put_slice(b"HTTP/1.1 ");
        buf.put_slice(self.status.to_string().as_bytes());
        buf.put_slice(b"\r\n");
        if let Some(content_type) = self.content_type {
            buf.put_slice(b"Content-Type: ");
            buf.put_slice(content_type.mime().as_bytes());
            buf.put_slice(b"; charset=US-ASCII\r\n");
        }
        buf.put_slice(b"Content-Length: ");
        let mut len_buf = itoa::Buffer::new();
        buf.put_slice(len_buf.format(self.body.len()).as_bytes());
        buf.put_slice(b"\r\n\r\n");
        buf.put_slice(&self.body);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_plaintext_response() {
        let res = Response::new(StatusCode::Ok, ContentType::PlainText, "hi".as_bytes().to_vec());
        let wire = res.serialize();
        assert_eq!(
            &wire[..],
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=US-ASCII\r\nContent-Length: 2\r\n\r\nhi"
                as &[u8]
        );
    }

    #[test]
    fn empty_response_omits_content_type() {
        let res = Response::empty(StatusCode::NotFound);
        let wire = res.serialize();
        assert_eq!(
            &wire[..],
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n" as &[u8]
        );
    }
}
