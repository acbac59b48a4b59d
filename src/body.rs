use std::fmt;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 8 * 1024;

/// A response body. Cached bodies are opened lazily from the content store
/// and can only be consumed once; buffered bodies may be read repeatedly.
pub enum Body {
    Empty,
    Full(Bytes),
    Reader(Pin<Box<dyn AsyncRead + Send + Sync>>),
}

impl Body {
    pub fn empty() -> Self {
        Body::Empty
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
    {
        Body::Reader(Box::pin(reader))
    }

    /// Size of the body when it is already buffered. Streamed bodies report
    /// `None`; their length is only known once drained.
    pub fn len_hint(&self) -> Option<u64> {
        match self {
            Body::Empty => Some(0),
            Body::Full(bytes) => Some(bytes.len() as u64),
            Body::Reader(_) => None,
        }
    }

    pub fn is_empty_hint(&self) -> bool {
        matches!(self.len_hint(), Some(0))
    }

    /// Drain the body into a single buffer. Readers are consumed exactly
    /// once; calling this is the final use of a streamed body.
    pub async fn into_bytes(self) -> std::io::Result<Bytes> {
        match self {
            Body::Empty => Ok(Bytes::new()),
            Body::Full(bytes) => Ok(bytes),
            Body::Reader(mut reader) => {
                let mut buf = BytesMut::new();
                let mut chunk = [0u8; READ_CHUNK];
                loop {
                    let n = reader.read(&mut chunk).await?;
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                Ok(buf.freeze())
            }
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::Empty
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Full(bytes) => write!(f, "Body::Full({} bytes)", bytes.len()),
            Body::Reader(_) => f.write_str("Body::Reader(..)"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        if bytes.is_empty() {
            Body::Empty
        } else {
            Body::Full(bytes)
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Bytes::from_static(text.as_bytes()).into()
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Bytes::from(text.into_bytes()).into()
    }
}
