//! Inbound request model and body normalization.
//!
//! A request whose transport did not declare a length (chunked or otherwise
//! unknown) is drained into memory once, after which every later reader sees
//! a replayable body with a known length.

use bytes::Bytes;
use http::header::{HeaderMap, CONTENT_LENGTH};
use http::Method;
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

/// A readable request body supplied by the host.
pub trait BodySource: AsyncRead + Send + Unpin {
    /// Release the underlying transport stream.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BodySource for &'static [u8] {}
impl BodySource for io::Cursor<Vec<u8>> {}
impl BodySource for io::Cursor<Bytes> {}
impl BodySource for tokio::fs::File {}
impl BodySource for tokio::io::Stdin {}
impl<R: AsyncRead + Send + Unpin> BodySource for tokio::io::BufReader<R> {}

/// How a body read treats the body afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Read for cache key derivation; the body stays available to the handler.
    KeyGeneration,
    /// Final read by the request handler; the body is handed over.
    Consume,
}

enum Body {
    Stream(Box<dyn BodySource>),
    Buffered(Bytes),
    Consumed,
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Stream(_) => f.write_str("Stream"),
            Body::Buffered(bytes) => write!(f, "Buffered({} bytes)", bytes.len()),
            Body::Consumed => f.write_str("Consumed"),
        }
    }
}

/// An inbound SOAP-over-HTTP request.
#[derive(Debug)]
pub struct SoapRequest {
    method: Method,
    headers: HeaderMap,
    content_length: Option<u64>,
    body: Body,
}

impl SoapRequest {
    /// Request with a streaming body. `content_length` is `None` when the
    /// transport did not declare one.
    pub fn new(
        method: Method,
        headers: HeaderMap,
        content_length: Option<u64>,
        body: impl BodySource + 'static,
    ) -> Self {
        Self {
            method,
            headers,
            content_length,
            body: Body::Stream(Box::new(body)),
        }
    }

    /// Request whose body is already in memory.
    pub fn from_bytes(method: Method, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self {
            method,
            headers,
            content_length: Some(body.len() as u64),
            body: Body::Buffered(body),
        }
    }

    /// Build from `http` request parts, taking the declared length from
    /// `Content-Length` when it is present and valid.
    pub fn from_parts(parts: http::request::Parts, body: impl BodySource + 'static) -> Self {
        let content_length = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        Self::new(parts.method, parts.headers, content_length, body)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as a string, if present and visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(http::header::CONTENT_TYPE.as_str())
    }

    /// Declared body length; `None` means unknown.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Whether the body is held in memory and can be read again.
    pub fn is_buffered(&self) -> bool {
        matches!(self.body, Body::Buffered(_))
    }

    /// Buffer a body of unknown length and record its length.
    ///
    /// Does nothing when a length was declared. The original stream is closed;
    /// a close failure is logged and otherwise ignored.
    pub async fn normalize_body(&mut self) -> io::Result<()> {
        if self.content_length.is_some() {
            return Ok(());
        }

        let bytes = self.buffer().await?;
        debug!(length = bytes.len(), "Buffered request body of unknown length");
        self.content_length = Some(bytes.len() as u64);
        Ok(())
    }

    /// By-value form of [`normalize_body`](Self::normalize_body).
    pub async fn with_buffered_body(mut self) -> io::Result<Self> {
        self.normalize_body().await?;
        Ok(self)
    }

    /// Read the whole body.
    pub async fn read_body(&mut self, mode: ReadMode) -> io::Result<Bytes> {
        match mode {
            ReadMode::KeyGeneration => self.buffer().await,
            ReadMode::Consume => match std::mem::replace(&mut self.body, Body::Consumed) {
                Body::Buffered(bytes) => Ok(bytes),
                Body::Stream(mut stream) => drain(&mut stream).await,
                Body::Consumed => Err(consumed()),
            },
        }
    }

    /// Ensure the body is in memory and return a handle to it.
    async fn buffer(&mut self) -> io::Result<Bytes> {
        match &mut self.body {
            Body::Buffered(bytes) => Ok(bytes.clone()),
            Body::Consumed => Err(consumed()),
            Body::Stream(stream) => {
                let bytes = drain(stream).await?;
                if let Some(declared) = self.content_length {
                    if declared != bytes.len() as u64 {
                        debug!(
                            declared,
                            actual = bytes.len(),
                            "Request body length differs from declared length"
                        );
                    }
                }
                self.body = Body::Buffered(bytes.clone());
                Ok(bytes)
            }
        }
    }
}

async fn drain(stream: &mut Box<dyn BodySource>) -> io::Result<Bytes> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    if let Err(e) = stream.close() {
        warn!(error = %e, "Request body stream did not close");
    }
    Ok(Bytes::from(buf))
}

fn consumed() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "request body already consumed")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    /// Body stream that can fail on read or close and records closing.
    pub(crate) struct TestStream {
        data: io::Cursor<Vec<u8>>,
        fail_read: bool,
        fail_close: bool,
        closed: Arc<AtomicBool>,
    }

    impl TestStream {
        pub(crate) fn new(data: &[u8]) -> Self {
            Self {
                data: io::Cursor::new(data.to_vec()),
                fail_read: false,
                fail_close: false,
                closed: Arc::new(AtomicBool::new(false)),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                fail_read: true,
                ..Self::new(b"")
            }
        }
    }

    impl AsyncRead for TestStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.fail_read {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )));
            }
            Pin::new(&mut self.data).poll_read(cx, buf)
        }
    }

    impl BodySource for TestStream {
        fn close(&mut self) -> io::Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            if self.fail_close {
                Err(io::Error::new(io::ErrorKind::Other, "close failed"))
            } else {
                Ok(())
            }
        }
    }

    fn post() -> (Method, HeaderMap) {
        (Method::POST, HeaderMap::new())
    }

    #[tokio::test]
    async fn test_normalize_unknown_length() {
        let (method, headers) = post();
        let stream = TestStream::new(b"<xml/>");
        let closed = Arc::clone(&stream.closed);
        let mut request = SoapRequest::new(method, headers, None, stream);

        request.normalize_body().await.unwrap();
        assert_eq!(request.content_length(), Some(6));
        assert!(request.is_buffered());
        assert!(closed.load(Ordering::SeqCst));

        // Replayable for the key pass and the handler.
        assert_eq!(request.read_body(ReadMode::KeyGeneration).await.unwrap(), "<xml/>");
        assert_eq!(request.read_body(ReadMode::Consume).await.unwrap(), "<xml/>");
    }

    #[tokio::test]
    async fn test_normalize_known_length_is_noop() {
        let (method, headers) = post();
        let mut request = SoapRequest::new(method, headers, Some(6), TestStream::new(b"<xml/>"));
        request.normalize_body().await.unwrap();
        assert!(!request.is_buffered());
        assert_eq!(request.content_length(), Some(6));
    }

    #[tokio::test]
    async fn test_close_failure_is_not_fatal() {
        let (method, headers) = post();
        let stream = TestStream {
            fail_close: true,
            ..TestStream::new(b"<a/>")
        };
        let request = SoapRequest::new(method, headers, None, stream)
            .with_buffered_body()
            .await
            .unwrap();
        assert_eq!(request.content_length(), Some(4));
    }

    #[tokio::test]
    async fn test_read_failure_propagates() {
        let (method, headers) = post();
        let mut request = SoapRequest::new(method, headers, None, TestStream::failing());
        let err = request.normalize_body().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[tokio::test]
    async fn test_key_generation_read_keeps_body() {
        let (method, headers) = post();
        let mut request = SoapRequest::new(method, headers, Some(4), TestStream::new(b"<a/>"));
        let first = request.read_body(ReadMode::KeyGeneration).await.unwrap();
        let second = request.read_body(ReadMode::KeyGeneration).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(request.content_length(), Some(4));
        assert_eq!(request.read_body(ReadMode::Consume).await.unwrap(), "<a/>");
    }

    #[tokio::test]
    async fn test_consumed_body_errors() {
        let (method, headers) = post();
        let mut request = SoapRequest::from_bytes(method, headers, &b"<a/>"[..]);
        request.read_body(ReadMode::Consume).await.unwrap();
        assert!(request.read_body(ReadMode::KeyGeneration).await.is_err());
        assert!(request.read_body(ReadMode::Consume).await.is_err());
    }

    #[tokio::test]
    async fn test_from_parts_content_length() {
        let (parts, _) = http::Request::post("/soap")
            .header("content-length", "6")
            .header("SOAPAction", "getAccount")
            .body(())
            .unwrap()
            .into_parts();
        let request = SoapRequest::from_parts(parts, &b"<xml/>"[..]);
        assert_eq!(request.content_length(), Some(6));
        assert_eq!(request.header("soapaction"), Some("getAccount"));

        let (parts, _) = http::Request::post("/soap")
            .header("transfer-encoding", "chunked")
            .body(())
            .unwrap()
            .into_parts();
        let request = SoapRequest::from_parts(parts, &b"<xml/>"[..]);
        assert_eq!(request.content_length(), None);
    }
}
