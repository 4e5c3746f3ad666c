use super::known::no_repeat::*;
use super::known::observe::Action;
use super::known::repeat::*;
use super::known::{Block, ContentFormat};
use super::{OptNumber, OptValue};
use crate::Message;

/// Get & set options on a message.
///
/// The generic accessors work for any option number, and the typed
/// accessors interpret the options defined in RFC7252, RFC7641 & RFC7959.
///
/// ```
/// use newt_msg::{Block, Code, ContentFormat, Id, Message, MessageOptions, Token, Type};
///
/// let mut msg = Message::new(Type::Con, Code::new(0, 1), Id(1), Token::default());
/// msg.set_path("a/b");
/// msg.set_content_format(ContentFormat::Json);
/// msg.set_block2(Block::new(64, 0, false));
///
/// assert_eq!(msg.path_string(), "a/b");
/// assert_eq!(msg.content_format(), Some(ContentFormat::Json));
/// assert_eq!(msg.block2().map(|b| b.size()), Some(64));
/// ```
pub trait MessageOptions {
  /// All values of an option
  fn get(&self, n: OptNumber) -> Option<&Vec<OptValue>>;

  /// Insert or replace every value of an option
  fn set(&mut self, n: OptNumber, v: OptValue) -> Option<Vec<OptValue>>;

  /// Add a value to a repeatable option
  fn add(&mut self, n: OptNumber, v: OptValue);

  /// Remove every value of an option
  fn remove(&mut self, n: OptNumber) -> Option<Vec<OptValue>>;

  /// The first value of an option
  fn get_first(&self, n: OptNumber) -> Option<&OptValue> {
    self.get(n).and_then(|vs| vs.first())
  }

  /// Is the option set?
  fn has(&self, n: OptNumber) -> bool {
    self.get(n).is_some()
  }

  /// The first value of an option, as an unsigned integer
  fn get_u32(&self, n: OptNumber) -> Option<u32> {
    self.get_first(n).and_then(|v| v.as_u32())
  }

  /// The first value of an option, as a string
  fn get_str(&self, n: OptNumber) -> Option<&str> {
    self.get_first(n).and_then(|v| v.as_str())
  }

  /// All values of an option that are valid UTF-8
  fn get_strs(&self, n: OptNumber) -> Vec<&str> {
    self.get(n)
        .map(|vs| vs.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default()
  }

  /// Set an unsigned integer option
  fn set_u32(&mut self, n: OptNumber, v: u32) {
    self.set(n, OptValue::uint(v));
  }

  /// Block1 (request payload slicing)
  fn block1(&self) -> Option<Block> {
    self.get_u32(BLOCK1).map(Block::from)
  }

  /// See [`MessageOptions::block1`]
  fn set_block1(&mut self, b: Block) {
    self.set_u32(BLOCK1, b.into());
  }

  /// Block2 (response payload slicing)
  fn block2(&self) -> Option<Block> {
    self.get_u32(BLOCK2).map(Block::from)
  }

  /// See [`MessageOptions::block2`]
  fn set_block2(&mut self, b: Block) {
    self.set_u32(BLOCK2, b.into());
  }

  /// Raw Observe value; a registration action on requests and
  /// a sequence number on notifications
  fn observe(&self) -> Option<u32> {
    self.get_u32(OBSERVE)
  }

  /// See [`MessageOptions::observe`]
  fn set_observe(&mut self, n: u32) {
    self.set_u32(OBSERVE, n & super::known::observe::SEQ_MASK);
  }

  /// Observe value interpreted as a registration [`Action`]
  fn observe_action(&self) -> Option<Action> {
    self.observe().and_then(Action::from_u32)
  }

  /// See [`MessageOptions::observe_action`]
  fn set_observe_action(&mut self, a: Action) {
    self.set_u32(OBSERVE, a.into());
  }

  /// Content-Format
  fn content_format(&self) -> Option<ContentFormat> {
    self.get_u32(CONTENT_FORMAT)
        .map(|n| ContentFormat::from(n as u16))
  }

  /// See [`MessageOptions::content_format`]
  fn set_content_format(&mut self, f: ContentFormat) {
    self.set_u32(CONTENT_FORMAT, u16::from(f) as u32);
  }

  /// Accept
  fn accept(&self) -> Option<ContentFormat> {
    self.get_u32(ACCEPT).map(|n| ContentFormat::from(n as u16))
  }

  /// See [`MessageOptions::accept`]
  fn set_accept(&mut self, f: ContentFormat) {
    self.set_u32(ACCEPT, u16::from(f) as u32);
  }

  /// Max-Age in seconds; 60 when not set
  fn max_age(&self) -> u32 {
    self.get_u32(MAX_AGE).unwrap_or(60)
  }

  /// See [`MessageOptions::max_age`]
  fn set_max_age(&mut self, secs: u32) {
    self.set_u32(MAX_AGE, secs);
  }

  /// ETags
  fn etags(&self) -> Vec<&OptValue> {
    self.get(ETAG).map(|vs| vs.iter().collect()).unwrap_or_default()
  }

  /// See [`MessageOptions::etags`]
  fn add_etag(&mut self, tag: &[u8]) {
    self.add(ETAG, OptValue(tag.to_vec()));
  }

  /// Uri-Host
  fn host(&self) -> Option<&str> {
    self.get_str(HOST)
  }

  /// See [`MessageOptions::host`]
  fn set_host(&mut self, host: &str) {
    self.set(HOST, host.into());
  }

  /// Uri-Port
  fn port(&self) -> Option<u16> {
    self.get_u32(PORT).map(|n| n as u16)
  }

  /// See [`MessageOptions::port`]
  fn set_port(&mut self, port: u16) {
    self.set_u32(PORT, port as u32);
  }

  /// Uri-Path segments
  fn path(&self) -> Vec<&str> {
    self.get_strs(PATH)
  }

  /// Uri-Path segments joined with `/`
  fn path_string(&self) -> String {
    self.path().join("/")
  }

  /// Replace the Uri-Path with the segments of `path`.
  ///
  /// Leading, trailing and repeated `/`s are ignored.
  fn set_path(&mut self, path: &str) {
    self.remove(PATH);
    path.split('/')
        .filter(|s| !s.is_empty())
        .for_each(|s| self.add(PATH, s.into()));
  }

  /// Uri-Query parts
  fn query(&self) -> Vec<&str> {
    self.get_strs(QUERY)
  }

  /// See [`MessageOptions::query`]
  fn add_query(&mut self, query: &str) {
    self.add(QUERY, query.into());
  }

  /// Location-Path segments
  fn location_path(&self) -> Vec<&str> {
    self.get_strs(LOCATION_PATH)
  }

  /// See [`MessageOptions::location_path`]
  fn add_location_path(&mut self, seg: &str) {
    self.add(LOCATION_PATH, seg.into());
  }

  /// Location-Query parts
  fn location_query(&self) -> Vec<&str> {
    self.get_strs(LOCATION_QUERY)
  }

  /// See [`MessageOptions::location_query`]
  fn add_location_query(&mut self, query: &str) {
    self.add(LOCATION_QUERY, query.into());
  }

  /// Size1; size of the request body, in bytes
  fn size1(&self) -> Option<u32> {
    self.get_u32(SIZE1)
  }

  /// See [`MessageOptions::size1`]
  fn set_size1(&mut self, n: u32) {
    self.set_u32(SIZE1, n);
  }

  /// Size2; size of the response body, in bytes
  fn size2(&self) -> Option<u32> {
    self.get_u32(SIZE2)
  }

  /// See [`MessageOptions::size2`]
  fn set_size2(&mut self, n: u32) {
    self.set_u32(SIZE2, n);
  }

  /// If-Match
  fn if_match(&self) -> Vec<&OptValue> {
    self.get(IF_MATCH)
        .map(|vs| vs.iter().collect())
        .unwrap_or_default()
  }

  /// If-None-Match
  fn if_none_match(&self) -> bool {
    self.has(IF_NONE_MATCH)
  }

  /// See [`MessageOptions::if_none_match`]
  fn set_if_none_match(&mut self) {
    self.set(IF_NONE_MATCH, OptValue(vec![]));
  }

  /// Proxy-Uri
  fn proxy_uri(&self) -> Option<&str> {
    self.get_str(PROXY_URI)
  }

  /// Proxy-Scheme
  fn proxy_scheme(&self) -> Option<&str> {
    self.get_str(PROXY_SCHEME)
  }
}

impl MessageOptions for Message {
  fn get(&self, n: OptNumber) -> Option<&Vec<OptValue>> {
    self.opts.get(&n)
  }

  fn set(&mut self, n: OptNumber, v: OptValue) -> Option<Vec<OptValue>> {
    self.opts.insert(n, vec![v])
  }

  fn add(&mut self, n: OptNumber, v: OptValue) {
    self.opts.entry(n).or_default().push(v);
  }

  fn remove(&mut self, n: OptNumber) -> Option<Vec<OptValue>> {
    self.opts.remove(&n)
  }
}
