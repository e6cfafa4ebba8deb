use std::collections::BTreeMap;
use std::path::PathBuf;

use futures::stream::{BoxStream, Stream, StreamExt};
use secrecy::SecretString;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(serde_json::Value),
    /// Raw file contents, streamed from disk.
    File(PathBuf),
}

/// A transport-neutral HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub user_agent: String,
    /// Sent as HTTP basic auth with an empty user name.
    pub api_key: Option<SecretString>,
    pub body: Body,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            user_agent: String::new(),
            api_key: None,
            body: Body::Empty,
        }
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = Body::Json(value);
        self
    }

    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.body = Body::File(path.into());
        self
    }
}

/// A fully buffered response. Header names are lowercase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A response whose body is consumed line by line as it arrives.
pub struct StreamingResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub lines: BoxStream<'static, Result<String, HttpError>>,
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl StreamingResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("HTTP transport error")]
    Transport { source: reqwest::Error },

    #[error("failed to open request body {path}")]
    BodyFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Re-chunk a byte stream into `\n`-terminated lines.
///
/// A trailing `\r` is stripped. A final unterminated line is still yielded.
/// Invalid UTF-8 is replaced rather than rejected.
pub fn split_lines<S, B, E>(chunks: S) -> BoxStream<'static, Result<String, E>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Send + 'static,
{
    let state = (chunks.boxed(), Vec::<u8>::new(), false);
    futures::stream::unfold(state, |(mut chunks, mut buf, mut done)| async move {
        loop {
            if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let mut line: Vec<u8> = buf.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                let line = String::from_utf8_lossy(&line).into_owned();
                return Some((Ok(line), (chunks, buf, done)));
            }

            if done {
                if buf.is_empty() {
                    return None;
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                buf.clear();
                return Some((Ok(line), (chunks, buf, done)));
            }

            match chunks.next().await {
                Some(Ok(chunk)) => buf.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => return Some((Err(e), (chunks, buf, true))),
                None => done = true,
            }
        }
    })
    .boxed()
}
