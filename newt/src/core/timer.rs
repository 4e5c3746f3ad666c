use std::collections::BTreeMap;

use super::Core;
use crate::platform::PlatformTypes;

/// Handle to work scheduled with [`Core::schedule`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub(crate) u64);

pub(crate) type TimerFn<P> = Box<dyn FnOnce(&Core<P>) + Send + Sync>;

/// Pending timers, keyed by the order they were scheduled in
pub(crate) struct Timers<P: PlatformTypes> {
  next: u64,
  pending: BTreeMap<TimerId, (u64, TimerFn<P>)>,
}

impl<P: PlatformTypes> Default for Timers<P> {
  fn default() -> Self {
    Self { next: 0,
           pending: BTreeMap::new() }
  }
}

impl<P: PlatformTypes> Timers<P> {
  pub(crate) fn insert(&mut self, deadline: u64, f: TimerFn<P>) -> TimerId {
    let id = TimerId(self.next);
    self.next += 1;
    self.pending.insert(id, (deadline, f));
    id
  }

  pub(crate) fn cancel(&mut self, id: TimerId) -> bool {
    self.pending.remove(&id).is_some()
  }

  pub(crate) fn len(&self) -> usize {
    self.pending.len()
  }

  pub(crate) fn next_deadline(&self) -> Option<u64> {
    self.pending.values().map(|(at, _)| *at).min()
  }

  /// Remove every timer whose deadline is at or before `now`,
  /// earliest deadline first.
  pub(crate) fn take_due(&mut self, now: u64) -> Vec<TimerFn<P>> {
    let mut due = self.pending
                      .iter()
                      .filter(|(_, (at, _))| *at <= now)
                      .map(|(id, (at, _))| (*at, *id))
                      .collect::<Vec<_>>();
    due.sort();

    due.into_iter()
       .filter_map(|(_, id)| self.pending.remove(&id))
       .map(|(_, f)| f)
       .collect()
  }
}
