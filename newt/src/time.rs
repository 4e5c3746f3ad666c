use embedded_time::Instant;

/// A duration, in milliseconds
pub type Millis = embedded_time::duration::Milliseconds<u64>;

/// Supertrait of [`embedded_time::Clock`] pinning the
/// type of "ticks" to u64
pub trait Clock: embedded_time::Clock<T = u64> {}
impl<C: embedded_time::Clock<T = u64>> Clock for C {}

/// Timeout configuration allowing for "never time out" as an option
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy)]
pub enum Timeout {
  /// Timeout after some number of milliseconds has elapsed
  Millis(u64),
  /// Never time out
  Never,
}

impl Timeout {
  /// Convert to a [`std::time::Duration`], `None` meaning "wait forever"
  pub fn to_duration(&self) -> Option<std::time::Duration> {
    match self {
      | Timeout::Millis(ms) => Some(std::time::Duration::from_millis(*ms)),
      | Timeout::Never => None,
    }
  }
}

/// Milliseconds elapsed between a clock's epoch and `instant`
///
/// Yields `None` when the duration does not fit in milliseconds.
pub fn millis_since_epoch<C: Clock>(instant: Instant<C>) -> Option<u64> {
  Millis::try_from(instant.duration_since_epoch()).ok()
                                                 .map(|ms| ms.0)
}
