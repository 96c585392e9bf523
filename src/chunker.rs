//! Splits the source stream into packet payloads.
//!
//! Every chunk is exactly `packet_size` bytes except the last, which may be
//! shorter.  One chunk of lookahead is kept so that a trailing lone `0xFF`
//! byte, which would be indistinguishable from the end-marker, can be merged
//! with the last byte of the chunk before it:
//!
//! ```text
//!  [a b c d] [0xFF]   ──▶   [a b c] [d 0xFF]
//! ```

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};
use crate::packet::END_MARKER;

#[derive(Debug)]
pub struct Chunker<R> {
    source: R,
    packet_size: usize,
    lookahead: Option<Vec<u8>>,
    primed: bool,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin> Chunker<R> {
    /// `packet_size` must be at least [`crate::config::MIN_PACKET_SIZE`].
    pub fn new(source: R, packet_size: usize) -> Self {
        Self {
            source,
            packet_size,
            lookahead: None,
            primed: false,
            bytes_read: 0,
        }
    }

    /// Total bytes pulled from the source so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Next payload, or `None` once the source is exhausted.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if !self.primed {
            self.primed = true;
            self.lookahead = self.read_chunk().await?;
            if is_end_marker(self.lookahead.as_deref()) {
                return Err(Error::AmbiguousSource);
            }
        }

        let Some(mut current) = self.lookahead.take() else {
            return Ok(None);
        };
        let mut next = self.read_chunk().await?;
        if let Some(tail) = next.as_mut() {
            if tail.as_slice() == [END_MARKER] {
                // `current` is full-sized here, so it keeps at least two bytes.
                if let Some(last) = current.pop() {
                    tail.insert(0, last);
                }
            }
        }
        self.lookahead = next;
        Ok(Some(current))
    }

    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.packet_size];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.source.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        self.bytes_read += filled as u64;
        Ok(Some(buf))
    }
}

fn is_end_marker(chunk: Option<&[u8]>) -> bool {
    chunk == Some(&[END_MARKER][..])
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(source: &[u8], packet_size: usize) -> Result<Vec<Vec<u8>>> {
        let mut chunker = Chunker::new(source, packet_size);
        let mut chunks = Vec::new();
        while let Some(chunk) = chunker.next_chunk().await? {
            chunks.push(chunk);
        }
        assert_eq!(chunker.bytes_read(), source.len() as u64);
        Ok(chunks)
    }

    #[tokio::test]
    async fn splits_into_full_chunks_and_short_tail() {
        let source: Vec<u8> = (0..25).collect();
        let chunks = collect(&source, 10).await.unwrap();
        let lens: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(lens, vec![10, 10, 5]);
        assert_eq!(chunks.concat(), source);
    }

    #[tokio::test]
    async fn empty_source_yields_nothing() {
        assert!(collect(&[], 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exact_multiple_has_no_empty_tail() {
        let chunks = collect(&[7u8; 20], 10).await.unwrap();
        assert_eq!(chunks.len(), 2);
    }

    #[tokio::test]
    async fn lone_trailing_ff_is_merged_into_tail() {
        let source = [1, 2, 3, 4, 0xFF];
        let chunks = collect(&source, 4).await.unwrap();
        assert_eq!(chunks, vec![vec![1, 2, 3], vec![4, 0xFF]]);
    }

    #[tokio::test]
    async fn ff_inside_a_chunk_is_left_alone() {
        let source = [0xFF, 0xFF, 0xFF, 0xFF];
        let chunks = collect(&source, 3).await.unwrap();
        assert_eq!(chunks, vec![vec![0xFF, 0xFF], vec![0xFF, 0xFF]]);
        assert!(chunks.iter().all(|c| c.as_slice() != [END_MARKER]));
    }

    #[tokio::test]
    async fn single_ff_source_is_ambiguous() {
        assert!(matches!(
            collect(&[0xFF], 10).await,
            Err(Error::AmbiguousSource)
        ));
    }
}
