use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use newt_msg::{repeat, Message, MessageOptions};

use crate::core::Protocol;

/// Port used when a `coap://` uri doesn't name one
pub const DEFAULT_PORT: u16 = 5683;

/// A parsed `coap://host[:port]/path?query` uri
///
/// ```
/// use newt::client::Uri;
///
/// let uri: Uri = "coap://example.com:5684/sensors/temp?unit=c".parse().unwrap();
/// assert_eq!(uri.host, "example.com");
/// assert_eq!(uri.port, 5684);
/// assert_eq!(uri.path, vec!["sensors", "temp"]);
/// assert_eq!(uri.query, vec!["unit=c"]);
///
/// assert!("coaps://example.com/".parse::<Uri>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri {
  /// Host name or IP literal (without brackets)
  pub host: String,
  /// Port, 5683 if absent
  pub port: u16,
  /// Percent-decoded path segments
  pub path: Vec<String>,
  /// Percent-decoded query parts
  pub query: Vec<String>,
}

impl Uri {
  /// Parse a uri string
  pub fn parse(uri: &str) -> Result<Self, Protocol> {
    let bad = |why: &str| Protocol::BadUri(format!("{} ({})", uri, why));

    let (scheme, rest) = uri.split_once("://").ok_or_else(|| bad("missing scheme"))?;
    match scheme.to_ascii_lowercase().as_str() {
      | "coap" => (),
      | "coaps" => return Err(bad("coaps is not supported")),
      | _ => return Err(bad("scheme must be coap")),
    }

    if rest.contains('#') {
      return Err(bad("fragments are not allowed"));
    }

    let authority_end = rest.find(|c: char| c == '/' || c == '?').unwrap_or(rest.len());
    let (authority, rest) = rest.split_at(authority_end);
    let (path, query) = match rest.split_once('?') {
      | Some((path, query)) => (path, Some(query)),
      | None => (rest, None),
    };

    let (host, port) = if let Some(v6) = authority.strip_prefix('[') {
      let (host, port) = v6.split_once(']').ok_or_else(|| bad("unclosed ipv6 literal"))?;
      (host, port.strip_prefix(':'))
    } else {
      match authority.rsplit_once(':') {
        | Some((host, port)) => (host, Some(port)),
        | None => (authority, None),
      }
    };

    if host.is_empty() {
      return Err(bad("missing host"));
    }

    let port = match port {
      | Some(port) => port.parse::<u16>().map_err(|_| bad("invalid port"))?,
      | None => DEFAULT_PORT,
    };

    let segments = |s: &str, sep: char| -> Result<Vec<String>, Protocol> {
      s.split(sep)
       .filter(|seg| !seg.is_empty())
       .map(|seg| percent_decode(seg).ok_or_else(|| bad("invalid percent-encoding")))
       .collect()
    };

    Ok(Self { host: host.to_string(),
              port,
              path: segments(path, '/')?,
              query: query.map(|q| segments(q, '&'))
                          .transpose()?
                          .unwrap_or_default() })
  }

  /// The host, if it is an IP literal
  pub fn ip(&self) -> Option<IpAddr> {
    self.host.parse().ok()
  }

  /// Resolve the host to a socket address
  pub fn resolve(&self) -> Result<SocketAddr, Protocol> {
    if let Some(ip) = self.ip() {
      return Ok(SocketAddr::new(ip, self.port));
    }

    (self.host.as_str(), self.port).to_socket_addrs()
                                   .ok()
                                   .and_then(|mut addrs| addrs.next())
                                   .ok_or_else(|| Protocol::HostUnresolved(self.host.clone()))
  }

  /// Path segments joined with `/`
  pub fn path_string(&self) -> String {
    self.path.join("/")
  }

  /// Set the Uri-* options of a request addressed to this uri
  pub fn apply(&self, msg: &mut Message) {
    if self.ip().is_none() {
      msg.set_host(&self.host);
    }
    if self.port != DEFAULT_PORT {
      msg.set_port(self.port);
    }

    msg.remove(repeat::PATH);
    self.path
        .iter()
        .for_each(|seg| msg.add(repeat::PATH, seg.as_str().into()));

    msg.remove(repeat::QUERY);
    self.query.iter().for_each(|q| msg.add_query(q));
  }
}

impl FromStr for Uri {
  type Err = Protocol;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

impl core::fmt::Display for Uri {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self.ip() {
      | Some(IpAddr::V6(_)) => write!(f, "coap://[{}]", self.host)?,
      | _ => write!(f, "coap://{}", self.host)?,
    }
    if self.port != DEFAULT_PORT {
      write!(f, ":{}", self.port)?;
    }
    write!(f, "/{}", self.path_string())?;
    if !self.query.is_empty() {
      write!(f, "?{}", self.query.join("&"))?;
    }
    Ok(())
  }
}

fn percent_decode(s: &str) -> Option<String> {
  let mut out = Vec::with_capacity(s.len());
  let mut bytes = s.bytes();

  while let Some(b) = bytes.next() {
    if b == b'%' {
      let hi = (bytes.next()? as char).to_digit(16)?;
      let lo = (bytes.next()? as char).to_digit(16)?;
      out.push((hi * 16 + lo) as u8);
    } else {
      out.push(b);
    }
  }

  String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
  use newt_msg::{Code, Id, Token, Type};

  use super::*;

  fn bad(uri: &str) -> bool {
    matches!(Uri::parse(uri), Err(Protocol::BadUri(_)))
  }

  #[test]
  fn defaults() {
    let uri = Uri::parse("coap://10.0.0.1").unwrap();
    assert_eq!(uri.port, 5683);
    assert!(uri.path.is_empty());
    assert!(uri.query.is_empty());
    assert_eq!(uri.resolve().unwrap(), "10.0.0.1:5683".parse().unwrap());
  }

  #[test]
  fn ipv6() {
    let uri = Uri::parse("coap://[::1]:61616/a").unwrap();
    assert_eq!(uri.host, "::1");
    assert_eq!(uri.port, 61616);
    assert_eq!(uri.resolve().unwrap(), "[::1]:61616".parse().unwrap());
    assert_eq!(uri.to_string(), "coap://[::1]:61616/a");
  }

  #[test]
  fn percent_encoded_segments() {
    let uri = Uri::parse("coap://h/a%2Fb/c?x=%41").unwrap();
    assert_eq!(uri.path, vec!["a/b", "c"]);
    assert_eq!(uri.query, vec!["x=A"]);
  }

  #[test]
  fn rejected() {
    assert!(bad("coaps://h/a"));
    assert!(bad("http://h/a"));
    assert!(bad("coap://h/a#frag"));
    assert!(bad("coap:///a"));
    assert!(bad("coap://h:99999/a"));
    assert!(bad("coap://h/%zz"));
    assert!(bad("h/a"));
  }

  #[test]
  fn options() {
    let mut msg = Message::new(Type::Con, Code::new(0, 1), Id(0), Token::default());
    Uri::parse("coap://example.com:1234/a/b?c&d").unwrap()
                                                   .apply(&mut msg);
    assert_eq!(msg.host(), Some("example.com"));
    assert_eq!(msg.port(), Some(1234));
    assert_eq!(msg.path(), vec!["a", "b"]);
    assert_eq!(msg.query(), vec!["c", "d"]);

    let mut msg = Message::new(Type::Con, Code::new(0, 1), Id(0), Token::default());
    Uri::parse("coap://127.0.0.1/a").unwrap().apply(&mut msg);
    assert_eq!(msg.host(), None);
    assert_eq!(msg.port(), None);
  }
}
