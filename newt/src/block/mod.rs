/// Block1 / Block2 client transfers
pub mod client;

/// Block1 / Block2 server transfers
pub mod server;

#[doc(inline)]
pub use client::{Block1Client, Block2Client, BlockwiseClient};
#[doc(inline)]
pub use server::{blockwise_response, BlockwiseServer};

/// Chunks of a body received out of order, reassembled once all have arrived
///
/// ```
/// use newt::block::BlockBuffer;
///
/// let mut buf = BlockBuffer::default();
/// buf.set(1, b"world".to_vec());
/// assert!(!buf.is_full());
///
/// buf.set(0, b"hello ".to_vec());
/// assert!(buf.is_full());
/// assert_eq!(buf.assemble(), b"hello world".to_vec());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockBuffer {
  chunks: Vec<Option<Vec<u8>>>,
}

impl BlockBuffer {
  /// Store the chunk at `index`, replacing any chunk there.
  ///
  /// Indexes between the current end and `index` are
  /// filled with placeholders.
  pub fn set(&mut self, index: usize, chunk: Vec<u8>) {
    if self.chunks.len() <= index {
      self.chunks.resize(index + 1, None);
    }
    self.chunks[index] = Some(chunk);
  }

  /// Get the chunk at `index`, if it has been received
  pub fn get(&self, index: usize) -> Option<&[u8]> {
    self.chunks.get(index).and_then(|c| c.as_deref())
  }

  /// Have all chunks up to the highest index been received?
  pub fn is_full(&self) -> bool {
    self.chunks.iter().all(Option::is_some)
  }

  /// Number of chunk slots (received or not)
  pub fn len(&self) -> usize {
    self.chunks.len()
  }

  /// Is the buffer empty?
  pub fn is_empty(&self) -> bool {
    self.chunks.is_empty()
  }

  /// Number of bytes received so far
  pub fn size(&self) -> usize {
    self.chunks.iter().flatten().map(Vec::len).sum()
  }

  /// Concatenate every received chunk in order
  pub fn assemble(&self) -> Vec<u8> {
    self.chunks.iter().flatten().flatten().copied().collect()
  }

  /// Forget every chunk
  pub fn clear(&mut self) {
    self.chunks.clear()
  }

  /// Forget every chunk at or past index `len`
  pub fn truncate(&mut self, len: usize) {
    self.chunks.truncate(len)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn full_only_after_every_index() {
    let mut buf = BlockBuffer::default();
    buf.set(0, vec![0; 4]);
    assert!(buf.is_full());

    buf.set(2, vec![2; 4]);
    assert!(!buf.is_full());
    assert_eq!(buf.len(), 3);
    assert_eq!(buf.get(1), None);

    buf.set(1, vec![1; 4]);
    assert!(buf.is_full());
    assert_eq!(buf.size(), 12);
    assert_eq!(buf.assemble(),
               [[0u8; 4], [1; 4], [2; 4]].concat());
  }

  #[test]
  fn replacing_a_chunk() {
    let mut buf = BlockBuffer::default();
    buf.set(0, b"aaaa".to_vec());
    buf.set(0, b"bb".to_vec());
    assert_eq!(buf.get(0), Some(b"bb".as_ref()));
    assert_eq!(buf.size(), 2);

    buf.clear();
    assert!(buf.is_empty());
  }

  #[test]
  fn truncating_drops_trailing_chunks() {
    let mut buf = BlockBuffer::default();
    buf.set(0, vec![0; 4]);
    buf.set(3, vec![3; 4]);
    buf.truncate(1);

    assert!(buf.is_full());
    assert_eq!(buf.assemble(), vec![0; 4]);
  }
}
