//! Single-pass streaming relay with inline content digesting.
//!
//! Downloaded artifacts are relayed to the client chunk by chunk while
//! the same chunks feed MD5, SHA-1 and SHA-256 hashers. [`TeeBody`]
//! wraps the upstream body as a [`Stream`] suitable for
//! `axum::body::Body::from_stream`; when the upstream body ends cleanly
//! the finished [`ContentDigests`] are handed to a completion callback.
//! If the stream errors or is dropped mid-transfer the callback never
//! fires, so partial transfers are never recorded.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use http_body_util::BodyStream;
use hyper::body::Incoming;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Lowercase hex digests plus the exact byte count of one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDigests {
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
    pub size: u64,
}

impl ContentDigests {
    /// Digest a fully buffered payload, e.g. an upload body.
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        let mut sink = DigestSink::new();
        sink.update(data);
        sink.finish()
    }
}

/// Incremental triple hasher. Cheap to create, one per transfer.
pub struct DigestSink {
    md5: Md5,
    sha1: Sha1,
    sha256: Sha256,
    size: u64,
}

impl DigestSink {
    #[must_use]
    pub fn new() -> Self {
        Self {
            md5: Md5::new(),
            sha1: Sha1::new(),
            sha256: Sha256::new(),
            size: 0,
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.md5.update(chunk);
        self.sha1.update(chunk);
        self.sha256.update(chunk);
        self.size += chunk.len() as u64;
    }

    #[must_use]
    pub fn finish(self) -> ContentDigests {
        ContentDigests {
            md5: format!("{:x}", self.md5.finalize()),
            sha1: format!("{:x}", self.sha1.finalize()),
            sha256: format!("{:x}", self.sha256.finalize()),
            size: self.size,
        }
    }
}

impl Default for DigestSink {
    fn default() -> Self {
        Self::new()
    }
}

type CompletionFn = Box<dyn FnOnce(ContentDigests) + Send + 'static>;

/// Upstream response body that digests every data frame as it passes
/// through. Trailer frames are swallowed.
pub struct TeeBody {
    inner: BodyStream<Incoming>,
    sink: Option<DigestSink>,
    on_complete: Option<CompletionFn>,
}

impl TeeBody {
    pub fn new(body: Incoming, on_complete: CompletionFn) -> Self {
        Self {
            inner: BodyStream::new(body),
            sink: Some(DigestSink::new()),
            on_complete: Some(on_complete),
        }
    }
}

impl Stream for TeeBody {
    type Item = Result<Bytes, hyper::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(frame))) => {
                    let Ok(data) = frame.into_data() else {
                        continue;
                    };
                    if let Some(sink) = this.sink.as_mut() {
                        sink.update(&data);
                    }
                    return Poll::Ready(Some(Ok(data)));
                }
                Poll::Ready(Some(Err(e))) => {
                    // Partial transfer: never record it.
                    this.sink = None;
                    this.on_complete = None;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    if let (Some(sink), Some(complete)) =
                        (this.sink.take(), this.on_complete.take())
                    {
                        complete(sink.finish());
                    }
                    return Poll::Ready(None);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digests_of_known_payload() {
        let digests = ContentDigests::of(b"hello world");
        assert_eq!(digests.md5, "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(digests.sha1, "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
        assert_eq!(
            digests.sha256,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(digests.size, 11);
    }

    #[test]
    fn incremental_updates_match_one_shot() {
        let mut sink = DigestSink::new();
        sink.update(b"hello ");
        sink.update(b"world");
        assert_eq!(sink.finish(), ContentDigests::of(b"hello world"));
    }

    #[test]
    fn empty_payload_has_zero_size() {
        let digests = ContentDigests::of(b"");
        assert_eq!(digests.size, 0);
        assert_eq!(digests.md5, "d41d8cd98f00b204e9800998ecf8427e");
    }
}
