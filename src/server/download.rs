use super::error::ApiError;
use crate::scratch::Scratch;
use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::Response;
use futures::Stream;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

/// Streams `path` as an attachment. The response body takes ownership of
/// `scratch`, so every artifact of the request is deleted once the body is
/// done: fully sent, failed, or dropped by a disconnecting client.
pub async fn attachment(
    path: &Path,
    download_name: &str,
    content_type: &str,
    extra_headers: &[(HeaderName, String)],
    scratch: Scratch,
) -> Result<Response, ApiError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| ApiError::Internal(format!("open result {}: {e}", path.display())))?;
    let len = file
        .metadata()
        .await
        .map_err(|e| ApiError::Internal(format!("stat result {}: {e}", path.display())))?
        .len();

    let body = Body::from_stream(CleanupStream {
        inner: ReaderStream::new(file),
        name: download_name.to_string(),
        _scratch: scratch,
    });

    let disposition = format!("attachment; filename=\"{}\"", download_name.replace('"', ""));
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, len)
        .header(header::CONTENT_DISPOSITION, disposition);
    for (name, value) in extra_headers {
        let value = HeaderValue::from_str(value)
            .map_err(|e| ApiError::Internal(format!("invalid header {name}: {e}")))?;
        builder = builder.header(name.clone(), value);
    }
    builder
        .body(body)
        .map_err(|e| ApiError::Internal(format!("build response: {e}")))
}

/// Byte stream that drags the request's `Scratch` along with it.
struct CleanupStream<S> {
    inner: S,
    name: String,
    _scratch: Scratch,
}

impl<S> Stream for CleanupStream<S>
where
    S: Stream<Item = std::io::Result<axum::body::Bytes>> + Unpin,
{
    type Item = std::io::Result<axum::body::Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = Pin::new(&mut self.inner).poll_next(cx);
        match &polled {
            Poll::Ready(Some(Err(e))) => warn!("download of {} failed: {e}", self.name),
            Poll::Ready(None) => debug!("download of {} complete", self.name),
            _ => {}
        }
        polled
    }
}
