/// A read-only cursor over a buffer of bytes.
///
/// Every read advances the position; reads past
/// the end yield `None` or a short slice rather than panicking.
#[derive(Debug)]
pub(crate) struct Cursor<T> {
  buf: T,
  pos: usize,
}

impl<T: AsRef<[u8]>> Cursor<T> {
  pub(crate) fn new(buf: T) -> Self {
    Self { buf, pos: 0 }
  }

  fn bytes(&self) -> &[u8] {
    self.buf.as_ref()
  }

  /// Number of bytes not yet consumed
  pub(crate) fn remaining(&self) -> usize {
    self.bytes().len().saturating_sub(self.pos)
  }

  /// Look at the next byte without consuming it
  pub(crate) fn peek(&self) -> Option<u8> {
    self.bytes().get(self.pos).copied()
  }

  pub(crate) fn next(&mut self) -> Option<u8> {
    let b = self.peek()?;
    self.pos += 1;
    Some(b)
  }

  /// Consume up to `n` bytes
  pub(crate) fn take(&mut self, n: usize) -> &[u8] {
    let start = self.pos.min(self.bytes().len());
    let end = (start + n).min(self.bytes().len());
    self.pos = end;
    &self.buf.as_ref()[start..end]
  }

  /// Consume exactly `n` bytes, or nothing if fewer than `n` remain.
  pub(crate) fn take_exact(&mut self, n: usize) -> Option<&[u8]> {
    if self.remaining() < n {
      None
    } else {
      Some(self.take(n))
    }
  }

  pub(crate) fn take_until_end(&mut self) -> &[u8] {
    let n = self.remaining();
    self.take(n)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn take_exact_does_not_advance_on_short_read() {
    let mut cur = Cursor::new([1u8, 2, 3]);
    assert_eq!(cur.next(), Some(1));
    assert_eq!(cur.take_exact(3), None);
    assert_eq!(cur.remaining(), 2);
    assert_eq!(cur.take_exact(2), Some([2u8, 3].as_ref()));
    assert_eq!(cur.next(), None);
    assert_eq!(cur.take(10), &[] as &[u8]);
  }
}
