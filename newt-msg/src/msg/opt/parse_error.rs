/// Errors encounterable while parsing an option from bytes
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Eq, Ord)]
pub enum OptParseError {
  /// Reached end of stream before parsing was finished
  UnexpectedEndOfStream,

  /// Option Delta was set to 15, which is invalid.
  OptionDeltaReservedValue(u8),

  /// Value Length was set to 15, which is invalid.
  ValueLengthReservedValue(u8),

  /// The sum of option deltas exceeded the largest
  /// representable option number (`u16::MAX`)
  OptionNumberOverflow(u32),
}

impl OptParseError {
  /// Shorthand for [`OptParseError::UnexpectedEndOfStream`]
  pub fn eof() -> Self {
    Self::UnexpectedEndOfStream
  }
}

impl core::fmt::Display for OptParseError {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self {
      | Self::UnexpectedEndOfStream => write!(f, "unexpected end of stream"),
      | Self::OptionDeltaReservedValue(n) => write!(f, "reserved option delta nibble {}", n),
      | Self::ValueLengthReservedValue(n) => write!(f, "reserved option length nibble {}", n),
      | Self::OptionNumberOverflow(n) => write!(f, "option number {} does not fit in 16 bits", n),
    }
  }
}

impl std::error::Error for OptParseError {}
