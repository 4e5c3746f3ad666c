use super::MessageParseError;

/// Message type, the 2 bits after the version in the header
///
/// See [RFC7252 - Message Details](https://datatracker.ietf.org/doc/html/rfc7252#section-3) for context
#[derive(Copy, Clone, Hash, Eq, Ord, PartialEq, PartialOrd, Debug)]
pub enum Type {
  /// Non-confirmable; no acknowledgement expected
  Non,
  /// Confirmable; retransmitted until acknowledged or reset
  Con,
  /// Acknowledges a Confirmable message, possibly carrying a
  /// piggybacked response
  Ack,
  /// The receiver is missing the context to process a message
  /// (also the answer to an empty CON "ping")
  Reset,
}

impl Type {
  /// Short human-readable name (`CON`, `NON`, `ACK`, `RST`)
  pub fn to_human(&self) -> &'static str {
    match self {
      | Type::Con => "CON",
      | Type::Non => "NON",
      | Type::Ack => "ACK",
      | Type::Reset => "RST",
    }
  }
}

impl TryFrom<u8> for Type {
  type Error = MessageParseError;

  fn try_from(b: u8) -> Result<Self, Self::Error> {
    match b {
      | 0 => Ok(Type::Con),
      | 1 => Ok(Type::Non),
      | 2 => Ok(Type::Ack),
      | 3 => Ok(Type::Reset),
      | _ => Err(MessageParseError::InvalidType(b)),
    }
  }
}

impl From<Type> for u8 {
  fn from(t: Type) -> u8 {
    match t {
      | Type::Con => 0,
      | Type::Non => 1,
      | Type::Ack => 2,
      | Type::Reset => 3,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bits() {
    for ty in [Type::Con, Type::Non, Type::Ack, Type::Reset] {
      assert_eq!(Type::try_from(u8::from(ty)), Ok(ty));
    }
    assert_eq!(Type::try_from(4), Err(MessageParseError::InvalidType(4)));
  }
}
