use std::collections::VecDeque;
use std::io::IoSlice;

use bytes::{Buf, BufMut as _, Bytes, BytesMut};

/// Request body as a list of shared chunks.
///
/// Framing and payload stay separate `Bytes`, so a large upload is written straight from
/// the caller's buffer instead of being copied into one contiguous body first.
#[derive(Debug, Clone, Default)]
pub struct RequestBody {
    chunks: VecDeque<Bytes>,
    remaining: usize,
}

impl RequestBody {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_chunks(chunks: impl IntoIterator<Item = Bytes>) -> Self {
        let mut body = Self::default();
        for chunk in chunks {
            body.push(chunk);
        }
        body
    }

    pub fn push(&mut self, chunk: Bytes) {
        // An empty chunk would make `chunk()` return nothing while bytes remain.
        if chunk.is_empty() {
            return;
        }
        self.remaining += chunk.len();
        self.chunks.push_back(chunk);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.remaining
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    /// Number of separate chunks still queued.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// The queued chunks, front first.
    pub fn chunks(&self) -> impl Iterator<Item = &Bytes> {
        self.chunks.iter()
    }

    /// Contiguous copy of the body. Free when there is at most one chunk.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        match self.chunks.len() {
            0 => Bytes::new(),
            1 => self.chunks[0].clone(),
            _ => {
                let mut out = BytesMut::with_capacity(self.remaining);
                for chunk in &self.chunks {
                    out.extend_from_slice(chunk);
                }
                out.freeze()
            }
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(chunk: Bytes) -> Self {
        Self::from_chunks([chunk])
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(data: Vec<u8>) -> Self {
        Bytes::from(data).into()
    }
}

impl Buf for RequestBody {
    fn remaining(&self) -> usize {
        self.remaining
    }

    fn chunk(&self) -> &[u8] {
        self.chunks.front().map(Bytes::as_ref).unwrap_or_default()
    }

    fn chunks_vectored<'a>(&'a self, dst: &mut [IoSlice<'a>]) -> usize {
        let mut n = 0;
        for (slot, chunk) in dst.iter_mut().zip(&self.chunks) {
            *slot = IoSlice::new(chunk);
            n += 1;
        }
        n
    }

    fn advance(&mut self, mut cnt: usize) {
        self.remaining = self.remaining.saturating_sub(cnt);
        while cnt > 0 {
            let Some(front) = self.chunks.front_mut() else {
                break;
            };
            if cnt < front.len() {
                front.advance(cnt);
                break;
            }
            cnt -= front.len();
            self.chunks.pop_front();
        }
    }

    fn copy_to_bytes(&mut self, len: usize) -> Bytes {
        if let Some(front) = self.chunks.front_mut()
            && len <= front.len()
        {
            let out = front.split_to(len);
            if front.is_empty() {
                self.chunks.pop_front();
            }
            self.remaining -= len;
            return out;
        }

        let mut out = BytesMut::with_capacity(len);
        out.put(self.take(len));
        out.freeze()
    }
}

#[cfg(test)]
mod tests {
    use bytes::BufMut as _;

    use super::*;

    #[test]
    fn empty_chunks_are_dropped() {
        let body = RequestBody::from_chunks([
            Bytes::new(),
            Bytes::from_static(b"ab"),
            Bytes::new(),
            Bytes::from_static(b"c"),
        ]);
        assert_eq!(body.len(), 3);
        assert_eq!(body.chunk_count(), 2);
        assert_eq!(body.to_bytes(), Bytes::from_static(b"abc"));
        assert!(RequestBody::empty().is_empty());
    }

    #[test]
    fn advance_walks_across_chunk_boundaries() {
        let mut body = RequestBody::from_chunks([
            Bytes::from_static(b"head"),
            Bytes::from_static(b"payload"),
            Bytes::from_static(b"tail"),
        ]);
        body.advance(6);
        assert_eq!(body.remaining(), 9);
        assert_eq!(body.chunk(), b"yload");

        let mut rest = Vec::new();
        rest.put(&mut body);
        assert_eq!(rest, b"yloadtail");
        assert_eq!(body.remaining(), 0);
        assert!(body.chunk().is_empty());
    }

    #[test]
    fn single_chunk_conversion_shares_the_buffer() {
        let data = Bytes::from(vec![7u8; 4096]);
        let body = RequestBody::from(data.clone());
        assert_eq!(body.to_bytes().as_ptr(), data.as_ptr());
    }

    #[test]
    fn vectored_view_lists_every_chunk() {
        let body = RequestBody::from_chunks([
            Bytes::from_static(b"a"),
            Bytes::from_static(b"bc"),
            Bytes::from_static(b"def"),
        ]);
        let mut slots = [IoSlice::new(&[]); 2];
        assert_eq!(body.chunks_vectored(&mut slots), 2);
        assert_eq!(&*slots[1], b"bc");
    }
}
