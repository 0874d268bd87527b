use super::models::{ListenRequest, ListenResponse};
use super::FirestoreError;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream};
use reqwest_middleware::ClientWithMiddleware;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A stream of `ListenResponse` messages.
///
/// The listen endpoint answers with one JSON array that grows for as long as the connection
/// stays open; every element is yielded as soon as it is complete.
pub struct ListenStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    buffer: BytesMut,
}

impl ListenStream {
    pub fn new(
        inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    ) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
        }
    }
}

impl Stream for ListenStream {
    type Item = Result<ListenResponse, FirestoreError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some((start, end)) = find_json_boundary(&self.buffer) {
                let bytes = self.buffer.split_to(end);
                return Poll::Ready(Some(
                    serde_json::from_slice::<ListenResponse>(&bytes[start..])
                        .map_err(FirestoreError::SerializationError),
                ));
            }

            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    self.buffer.extend_from_slice(&chunk);
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(FirestoreError::RequestError(e))));
                }
                Poll::Ready(None) => {
                    if !self.buffer.iter().all(|b| is_separator(*b)) {
                        self.buffer.clear();
                        return Poll::Ready(Some(Err(FirestoreError::ApiError(
                            "Stream ended with incomplete JSON".into(),
                        ))));
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Bytes between the elements of the streamed array.
fn is_separator(b: u8) -> bool {
    b.is_ascii_whitespace() || matches!(b, b'[' | b',' | b']')
}

/// Finds the first complete JSON object in the buffer.
///
/// Returns the offset where the object starts and the offset just past its end. Array
/// punctuation and whitespace before the object are skipped.
fn find_json_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let start = buf.iter().position(|b| !is_separator(*b))?;
    if buf[start] != b'{' {
        // Not an object; hand the byte to the parser so it reports the error.
        return Some((start, start + 1));
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;

    for (i, &b) in buf.iter().enumerate().skip(start) {
        if in_string {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((start, i + 1));
                }
            }
            _ => {}
        }
    }

    None
}

/// Opens a `documents:listen` stream below `database_url` (`.../projects/{p}/databases/{d}`).
pub async fn listen_request(
    client: &ClientWithMiddleware,
    database_url: &str,
    request: &ListenRequest,
) -> Result<ListenStream, FirestoreError> {
    let url = format!("{}/documents:listen", database_url);

    let response = client.post(&url).json(request).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(FirestoreError::ApiError(format!(
            "Listen failed {}: {}",
            status, text
        )));
    }

    let stream = stream::unfold(response, |mut resp| async move {
        match resp.chunk().await {
            Ok(Some(bytes)) => Some((Ok(bytes), resp)),
            Ok(None) => None,
            Err(e) => Some((Err(e), resp)),
        }
    });

    Ok(ListenStream::new(Box::pin(stream)))
}
