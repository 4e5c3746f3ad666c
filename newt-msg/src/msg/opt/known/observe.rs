/// When included in a GET request, the Observe Option extends the GET
/// method so it does not only retrieve a current representation of the
/// target resource, but also requests the server to add or remove an
/// entry in the list of observers of the resource depending on the
/// option value.  The list entry consists of the client endpoint and the
/// token specified by the client in the request.  Possible values are:
///
///    `0` (register) adds the entry to the list, if not present;
///
///    `1` (deregister) removes the entry from the list, if present
#[derive(Hash, Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum Action {
  /// Tells the resource owner we would like to observe updates to
  /// the resource we've issued a GET request for.
  Register,
  /// Tells the resource owner we would no longer like to observe updates to
  /// the resource we've issued a GET request for.
  Deregister,
}

/// Notification sequence numbers are 24 bits wide
pub const SEQ_MASK: u32 = 0xFF_FFFF;

impl Action {
  /// Try to parse from an option value
  pub fn from_u32(n: u32) -> Option<Self> {
    match n {
      | 0 => Some(Action::Register),
      | 1 => Some(Action::Deregister),
      | _ => None,
    }
  }
}

impl From<Action> for u32 {
  fn from(a: Action) -> Self {
    match a {
      | Action::Register => 0,
      | Action::Deregister => 1,
    }
  }
}

/// The sequence number following `seq`, wrapping within 24 bits
///
/// ```
/// use newt_msg::observe::next_seq;
///
/// assert_eq!(next_seq(1), 2);
/// assert_eq!(next_seq(0xFF_FFFF), 0);
/// ```
pub fn next_seq(seq: u32) -> u32 {
  seq.wrapping_add(1) & SEQ_MASK
}

/// Whether a notification with sequence number `v2` received at `t2` (millis)
/// is newer than one with `v1` received at `t1` (RFC7641 section 3.4)
///
/// ```
/// use newt_msg::observe::is_fresh;
///
/// assert!(is_fresh((1, 0), (2, 0)));
/// assert!(!is_fresh((2, 0), (1, 0)));
/// assert!(is_fresh((0xFF_FFFF, 0), (0, 0)));
/// assert!(is_fresh((2, 0), (1, 128_001)));
/// ```
pub fn is_fresh((v1, t1): (u32, u64), (v2, t2): (u32, u64)) -> bool {
  const HALF: u32 = 1 << 23;
  (v1 < v2 && v2 - v1 < HALF) || (v1 > v2 && v1 - v2 > HALF) || t2 > t1 + 128_000
}
