/// Content-Format
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContentFormat {
  /// `text/plain; charset=utf-8`
  Text,
  /// `application/link-format`
  LinkFormat,
  /// `application/xml`
  Xml,
  /// `application/octet-stream`
  OctetStream,
  /// `application/exi`
  Exi,
  /// `application/json`
  Json,
  /// `application/cbor`
  Cbor,
  /// Another content format
  Other(u16),
}

impl ContentFormat {
  /// MIME type of this format, if it is one of the well-known ones
  pub fn mime(&self) -> Option<&'static str> {
    use ContentFormat::*;
    match self {
      | Text => Some("text/plain; charset=utf-8"),
      | LinkFormat => Some("application/link-format"),
      | Xml => Some("application/xml"),
      | OctetStream => Some("application/octet-stream"),
      | Exi => Some("application/exi"),
      | Json => Some("application/json"),
      | Cbor => Some("application/cbor"),
      | Other(_) => None,
    }
  }
}

impl From<ContentFormat> for u16 {
  fn from(f: ContentFormat) -> Self {
    use ContentFormat::*;
    match f {
      | Text => 0,
      | LinkFormat => 40,
      | Xml => 41,
      | OctetStream => 42,
      | Exi => 47,
      | Json => 50,
      | Cbor => 60,
      | Other(n) => n,
    }
  }
}

impl From<u16> for ContentFormat {
  fn from(n: u16) -> Self {
    use ContentFormat::*;
    match n {
      | 0 => Text,
      | 40 => LinkFormat,
      | 41 => Xml,
      | 42 => OctetStream,
      | 47 => Exi,
      | 50 => Json,
      | 60 => Cbor,
      | n => Other(n),
    }
  }
}
