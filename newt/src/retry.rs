use core::ops::RangeInclusive;

use embedded_time::duration::Milliseconds;
use embedded_time::Instant;
use rand::Rng;

use crate::time::{Clock, Millis};

/// A non-blocking timer that allows a fixed-delay or exponential-backoff retry,
/// that lives alongside some operation to retry.
///
/// The timer measures from the last attempt, so a late check
/// does not cause a burst of retries.
///
/// ```
/// use embedded_time::clock::Clock;
/// use embedded_time::duration::Milliseconds;
/// use newt::retry;
///
/// # main();
/// fn main() {
///   let mut called = false;
///   let mut fails_once = || -> Result<(), ()> {
///     // ...
///     # if !called {
///     #   called = true;
///     #   Err(())
///     # } else {
///     #   Ok(())
///     # }
///   };
///
///   let clock = newt::std::Clock::new();
///   let now = || clock.try_now().unwrap();
///   let strategy = retry::Strategy::Delay { min: Milliseconds(1),
///                                           max: Milliseconds(2) };
///   let mut rng = rand::rngs::mock::StepRng::new(0, 1);
///   let mut retry = retry::RetryTimer::new(now(), strategy, retry::Attempts(2), &mut rng);
///
///   while let Err(_) = fails_once() {
///     match nb::block!(retry.what_should_i_do(now())) {
///       | Ok(retry::YouShould::Retry) => continue,
///       | Ok(retry::YouShould::Cry) => panic!("no more attempts! it failed more than once!!"),
///       | Err(never) => match never {},
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RetryTimer<C: Clock> {
  last: Instant<C>,
  delay: Millis,
  strategy: Strategy,
  attempts: Attempts,
  max_attempts: Attempts,
}

/// A number of attempts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Attempts(pub u16);

/// Result of [`RetryTimer.what_should_i_do`].
///
/// This tells you if a retry should be attempted or not.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum YouShould {
  /// Attempts have been exhausted and the work that is
  /// being retried should be considered poisoned.
  Cry,
  /// A retry should be performed
  Retry,
}

impl<C: Clock> RetryTimer<C> {
  /// Create a new retrier, the first attempt
  /// being made at `start`.
  ///
  /// `max_attempts` is the number of _retries_ allowed after the first attempt.
  pub fn new(start: Instant<C>,
             strategy: Strategy,
             max_attempts: Attempts,
             rng: &mut impl Rng)
             -> Self {
    let delay = if strategy.has_jitter() {
      rng.gen_range(strategy.range())
    } else {
      *strategy.range().start()
    };

    Self { last: start,
           delay: Milliseconds(delay),
           strategy,
           attempts: Attempts(0),
           max_attempts }
  }

  /// Time to wait after the most recent attempt before asking again
  pub fn delay(&self) -> Millis {
    self.delay
  }

  /// Number of retries performed so far
  pub fn attempts(&self) -> Attempts {
    self.attempts
  }

  /// Milliseconds until [`RetryTimer::what_should_i_do`] stops blocking
  pub fn remaining(&self, now: Instant<C>) -> Millis {
    let elapsed = now.checked_duration_since(&self.last)
                     .and_then(|d| Millis::try_from(d).ok())
                     .unwrap_or(Milliseconds(0));
    Milliseconds(self.delay.0.saturating_sub(elapsed.0))
  }

  /// When the thing we keep trying fails, invoke this to
  /// tell the retrytimer "it failed again! what do I do??"
  ///
  /// Returns `nb::Error::WouldBlock` when we have not yet
  /// waited the appropriate amount of time to retry.
  pub fn what_should_i_do(&mut self,
                          now: Instant<C>)
                          -> nb::Result<YouShould, core::convert::Infallible> {
    if self.remaining(now).0 > 0 {
      return Err(nb::Error::WouldBlock);
    }

    if self.attempts >= self.max_attempts {
      Ok(YouShould::Cry)
    } else {
      self.attempts.0 += 1;
      self.last = now;
      if let Strategy::Exponential { .. } = self.strategy {
        self.delay = Milliseconds(self.delay.0.saturating_mul(2));
      }
      Ok(YouShould::Retry)
    }
  }
}

/// Strategy to employ when retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Strategy {
  /// Generate a random delay between `min` and `max`,
  /// and wait until this delay has passed between attempts.
  ///
  /// After each failed attempt, double the delay before retrying again.
  Exponential {
    /// Minimum (inclusive) delay for second attempt
    init_min: Millis,
    /// Maximum (inclusive) delay for second attempt
    init_max: Millis,
  },
  /// Generate a random delay between `min` and `max`,
  /// and wait until this delay has passed between attempts.
  Delay {
    /// Minimum (inclusive) delay for attempts
    min: Millis,
    /// Maximum (inclusive) delay for attempts
    max: Millis,
  },
}

impl Strategy {
  /// Are min & max delays the same? if so, we should probably skip the random number generation.
  pub fn has_jitter(&self) -> bool {
    let rng = self.range();
    rng.start() != rng.end()
  }

  /// Get the min & max durations as an inclusive range
  pub fn range(&self) -> RangeInclusive<u64> {
    match self {
      | &Self::Delay { min: Milliseconds(min),
                       max: Milliseconds(max), } => (min..=max),

      | &Self::Exponential { init_min: Milliseconds(min),
                             init_max: Milliseconds(max), } => (min..=max),
    }
  }

  /// Get the longest amount of time this strategy will take if all attempts fail
  /// (`MAX_TRANSMIT_WAIT` for the default CON strategy)
  pub fn max_time(&self, max_attempts: Attempts) -> Millis {
    Milliseconds(match self {
                   | Self::Exponential { init_max: Milliseconds(max),
                                         .. } => {
                     max.saturating_mul(2u64.saturating_pow(max_attempts.0 as u32 + 1) - 1)
                   },
                   | Self::Delay { max: Milliseconds(max),
                                   .. } => max * (max_attempts.0 as u64 + 1),
                 })
  }
}

#[cfg(test)]
mod test {
  use rand::rngs::mock::StepRng;

  use super::*;
  use crate::test::ClockMock;

  fn at(ms: u64) -> Instant<ClockMock> {
    Instant::new(ms)
  }

  #[test]
  fn delay_retrier() {
    let mut retry = RetryTimer::<ClockMock>::new(at(0),
                                                 Strategy::Delay { min: Milliseconds(1000),
                                                                   max: Milliseconds(1000) },
                                                 Attempts(2),
                                                 &mut StepRng::new(0, 1));

    assert_eq!(retry.what_should_i_do(at(999)).unwrap_err(),
               nb::Error::WouldBlock);
    assert_eq!(retry.what_should_i_do(at(1000)).unwrap(), YouShould::Retry);

    // measured from the last attempt, not from the start
    assert_eq!(retry.what_should_i_do(at(1999)).unwrap_err(),
               nb::Error::WouldBlock);
    assert_eq!(retry.what_should_i_do(at(10_000)).unwrap(), YouShould::Retry);
    assert_eq!(retry.what_should_i_do(at(10_001)).unwrap_err(),
               nb::Error::WouldBlock);
    assert_eq!(retry.what_should_i_do(at(11_000)).unwrap(), YouShould::Cry);
  }

  #[test]
  fn exponential_retrier() {
    let mut retry = RetryTimer::<ClockMock>::new(at(0),
                                                 Strategy::Exponential { init_min:
                                                                           Milliseconds(2000),
                                                                         init_max:
                                                                           Milliseconds(2000) },
                                                 Attempts(4),
                                                 &mut StepRng::new(0, 1));

    let mut transmissions = 1;
    for t in [2_000u64, 6_000, 14_000, 30_000] {
      assert_eq!(retry.what_should_i_do(at(t - 1)).unwrap_err(),
                 nb::Error::WouldBlock);
      assert_eq!(retry.what_should_i_do(at(t)).unwrap(), YouShould::Retry);
      transmissions += 1;
    }

    assert_eq!(retry.what_should_i_do(at(61_999)).unwrap_err(),
               nb::Error::WouldBlock);
    assert_eq!(retry.what_should_i_do(at(62_000)).unwrap(), YouShould::Cry);
    assert_eq!(transmissions, 5);
  }

  #[test]
  fn jitter_stays_in_range() {
    let strategy = Strategy::Exponential { init_min: Milliseconds(2000),
                                           init_max: Milliseconds(3000) };
    let mut rng = rand::rngs::mock::StepRng::new(7, 12345);
    for _ in 0..32 {
      let retry = RetryTimer::<ClockMock>::new(at(0), strategy, Attempts(4), &mut rng);
      assert!((2000..=3000).contains(&retry.delay().0));
    }
  }

  #[test]
  fn max_time() {
    let strategy = Strategy::Exponential { init_min: Milliseconds(2000),
                                           init_max: Milliseconds(3000) };
    // MAX_TRANSMIT_SPAN + last timeout: 3000 * (2^5 - 1)
    assert_eq!(strategy.max_time(Attempts(4)), Milliseconds(93_000u64));
  }
}
