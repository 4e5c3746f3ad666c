use super::opt::parse_error::OptParseError;

/// Errors encounterable while parsing a message from bytes
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Eq, Ord)]
pub enum MessageParseError {
  /// Reached end of stream before parsing was finished
  UnexpectedEndOfStream,

  /// Version was not 1
  InvalidVersion(u8),

  /// Token length was > 8
  InvalidTokenLength(u8),

  /// Message had code 0.00 (Empty) but carried a token,
  /// options or a payload
  InvalidEmptyMessage,

  /// The payload marker (0xFF) was present but no payload followed it
  PayloadMarkerWithoutPayload,

  /// Error parsing option
  OptParseError(OptParseError),

  /// The message type is invalid (see [`Type`](super::Type) for information & valid values)
  InvalidType(u8),
}

impl MessageParseError {
  /// Shorthand for [`MessageParseError::UnexpectedEndOfStream`]
  pub fn eof() -> Self {
    Self::UnexpectedEndOfStream
  }
}

impl From<OptParseError> for MessageParseError {
  fn from(e: OptParseError) -> Self {
    Self::OptParseError(e)
  }
}

impl core::fmt::Display for MessageParseError {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self {
      | Self::UnexpectedEndOfStream => write!(f, "unexpected end of stream"),
      | Self::InvalidVersion(v) => write!(f, "unsupported version {}", v),
      | Self::InvalidTokenLength(n) => write!(f, "token length {} exceeds 8", n),
      | Self::InvalidEmptyMessage => write!(f, "empty message carried token, options or payload"),
      | Self::PayloadMarkerWithoutPayload => write!(f, "payload marker not followed by a payload"),
      | Self::OptParseError(e) => write!(f, "invalid option: {}", e),
      | Self::InvalidType(t) => write!(f, "invalid message type {}", t),
    }
  }
}

impl std::error::Error for MessageParseError {}
