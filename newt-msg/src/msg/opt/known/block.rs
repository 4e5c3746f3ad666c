/// Three items of information may need to be transferred in a
/// Block (Block1 or Block2) option:
/// * the size of the block ([`Block::size`])
/// * whether more blocks are following ([`Block::more`])
/// * the relative number of the block ([`Block::num`]) within a sequence of blocks with the given size.
///
/// On the wire this is a single unsigned integer:
/// `num << 4 | more << 3 | szx`, where the block size is `16 << szx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block(u32);

/// Block sizes expressible by a Block option
pub const BLOCK_SIZES: [u16; 7] = [16, 32, 64, 128, 256, 512, 1024];

impl Block {
  /// Create a Block option value.
  ///
  /// # Panics
  /// `size` must be one of [`BLOCK_SIZES`]; a block of any other
  /// size cannot be expressed on the wire, so asking for one is a bug.
  ///
  /// ```
  /// use newt_msg::Block;
  ///
  /// let b = Block::new(64, 3, true);
  /// assert_eq!(b.size(), 64);
  /// assert_eq!(b.num(), 3);
  /// assert!(b.more());
  /// ```
  pub fn new(size: u16, num: u32, more: bool) -> Self {
    let szx = match Self::szx_for(size) {
      | Some(szx) => szx as u32,
      | None => panic!("{} is not a valid block size", size),
    };
    let num = num << 4;
    let more = u32::from(more) << 3;

    Self(num | more | szx)
  }

  /// The size exponent for a block size, if `size` is a valid block size
  pub fn szx_for(size: u16) -> Option<u8> {
    BLOCK_SIZES.iter().position(|s| *s == size).map(|ix| ix as u8)
  }

  /// The largest valid block size that is `<= size`,
  /// clamped to `[16, 1024]`
  pub fn floor_size(size: u16) -> u16 {
    BLOCK_SIZES.iter()
               .rev()
               .copied()
               .find(|s| *s <= size)
               .unwrap_or(BLOCK_SIZES[0])
  }

  /// Size of this block, in bytes.
  ///
  /// The reserved size exponent 7 is read as 1024.
  pub fn size(&self) -> u16 {
    let szx = (self.0 & 0b111).min(6);
    16u16 << szx
  }

  /// Whether more blocks follow this one
  pub fn more(&self) -> bool {
    (self.0 & 0b1000) >> 3 == 1
  }

  /// Position of this block in the sequence
  pub fn num(&self) -> u32 {
    self.0 >> 4
  }

  /// Byte offset of this block in the full body (`num * size`)
  pub fn offset(&self) -> usize {
    self.num() as usize * self.size() as usize
  }
}

impl From<Block> for u32 {
  fn from(b: Block) -> Self {
    b.0
  }
}

impl From<u32> for Block {
  fn from(n: u32) -> Self {
    Block(n)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn block() {
    let b = Block(33);
    assert_eq!(b.size(), 32);
    assert_eq!(b.num(), 2);
    assert_eq!(b.more(), false);

    let b = Block(59);
    assert_eq!(b.size(), 128);
    assert_eq!(b.num(), 3);
    assert_eq!(b.more(), true);

    assert_eq!(Block::new(32, 2, false), Block(33));
    assert_eq!(Block::new(128, 3, true), Block(59));
  }

  #[test]
  fn reserved_szx_is_1024() {
    assert_eq!(Block(0b0111).size(), 1024);
  }

  #[test]
  #[should_panic]
  fn invalid_size_panics() {
    Block::new(100, 0, false);
  }

  #[test]
  fn floor_size() {
    assert_eq!(Block::floor_size(0), 16);
    assert_eq!(Block::floor_size(100), 64);
    assert_eq!(Block::floor_size(1024), 1024);
    assert_eq!(Block::floor_size(4096), 1024);
  }
}
