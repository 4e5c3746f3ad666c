use embedded_time::duration::Milliseconds;

use crate::retry::{Attempts, Strategy};
use crate::time::Millis;

/// Configuration options related to parsing & handling outbound CON requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Con {
  /// Retry strategy for CON messages that
  /// have not yet been ACKed.
  ///
  /// The initial timeout is picked at random between
  /// `ACK_TIMEOUT` and `ACK_TIMEOUT * ACK_RANDOM_FACTOR`,
  /// and doubles after every retransmission.
  ///
  /// Defaults to an exponential retry strategy:
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use newt::config::Con;
  /// use newt::retry::Strategy;
  ///
  /// assert_eq!(Con::default().unacked_retry_strategy,
  ///            Strategy::Exponential { init_min: Milliseconds(2_000),
  ///                                    init_max: Milliseconds(3_000) });
  /// ```
  pub unacked_retry_strategy: Strategy,
  /// Number of times we are allowed to resend a CON message
  /// before giving up (`MAX_RETRANSMIT`).
  ///
  /// Defaults to 4 attempts.
  /// ```
  /// use newt::config::Con;
  /// use newt::retry::Attempts;
  ///
  /// assert_eq!(Con::default().max_attempts, Attempts(4));
  /// ```
  pub max_attempts: Attempts,
}

/// Configuration options related to parsing & handling messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Msg {
  /// Seed used to generate message [`Token`](newt_msg::Token)s,
  /// customizable to allow for your application to generate tokens
  /// less guessably.
  ///
  /// The default value is 0, although it is
  /// best practice to set this to something else.
  /// (random integer, machine identifier)
  ///
  /// ```
  /// use newt::config::Msg;
  ///
  /// assert_eq!(Msg::default().token_seed, 0);
  /// ```
  pub token_seed: u16,

  /// Length of generated tokens, in bytes (at most 8)
  ///
  /// ```
  /// use newt::config::Msg;
  ///
  /// assert_eq!(Msg::default().token_len, 4);
  /// ```
  pub token_len: u8,

  /// See [`Con`]
  pub con: Con,

  /// How long a server may sit on a CON request
  /// before it must send an empty ACK and respond separately.
  ///
  /// A window of 0 ACKs every CON request immediately.
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use newt::config::Msg;
  ///
  /// assert_eq!(Msg::default().piggyback_window, Milliseconds(200u64));
  /// ```
  pub piggyback_window: Millis,

  /// How long state about a message exchange
  /// (e.g. a cached ACK) is kept around (`EXCHANGE_LIFETIME`)
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use newt::config::Msg;
  ///
  /// assert_eq!(Msg::default().exchange_lifetime, Milliseconds(100_000u64));
  /// ```
  pub exchange_lifetime: Millis,
}

/// Configuration options related to blockwise transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block {
  /// Largest block we send, and ask to receive, as a client.
  ///
  /// 0 disables slicing of outbound request bodies
  /// and early Block2 negotiation.
  ///
  /// ```
  /// use newt::config::Block;
  ///
  /// assert_eq!(Block::default().client_max_size, 1024);
  /// ```
  pub client_max_size: u16,

  /// Largest block we send, and accept, as a server.
  ///
  /// ```
  /// use newt::config::Block;
  ///
  /// assert_eq!(Block::default().server_max_size, 1024);
  /// ```
  pub server_max_size: u16,

  /// Number of times a Block2 transfer may start over
  /// after receiving an out-of-sequence block before
  /// giving up.
  ///
  /// ```
  /// use newt::config::Block;
  ///
  /// assert_eq!(Block::default().max_block2_restarts, 4);
  /// ```
  pub max_block2_restarts: u8,
}

/// Configuration options related to the [`Resources`](crate::server::resource::Resources) server
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Resources {
  /// Maximum number of resources stored at once.
  ///
  /// Storing a new resource when full evicts an arbitrary one.
  ///
  /// ```
  /// use newt::config::Resources;
  ///
  /// assert_eq!(Resources::default().max_count, 64);
  /// ```
  pub max_count: usize,

  /// Maximum size of a single resource, in bytes.
  ///
  /// ```
  /// use newt::config::Resources;
  ///
  /// assert_eq!(Resources::default().max_size, 1024 * 1024);
  /// ```
  pub max_size: usize,

  /// Whether every notification is sent CON.
  ///
  /// When disabled, 9 out of every 10 notifications are sent NON.
  ///
  /// ```
  /// use newt::config::Resources;
  ///
  /// assert!(Resources::default().reliable_notifications);
  /// ```
  pub reliable_notifications: bool,
}

impl Default for Con {
  fn default() -> Self {
    Con { unacked_retry_strategy: Strategy::Exponential { init_min: Milliseconds(2_000),
                                                          init_max: Milliseconds(3_000) },
          max_attempts: Attempts(4) }
  }
}

impl Default for Msg {
  fn default() -> Self {
    Msg { token_seed: 0,
          token_len: 4,
          con: Con::default(),
          piggyback_window: Milliseconds(200),
          exchange_lifetime: Milliseconds(100_000) }
  }
}

impl Default for Block {
  fn default() -> Self {
    Block { client_max_size: 1024,
            server_max_size: 1024,
            max_block2_restarts: 4 }
  }
}

impl Default for Resources {
  fn default() -> Self {
    Resources { max_count: 64,
                max_size: 1024 * 1024,
                reliable_notifications: true }
  }
}

/// Runtime config
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Config {
  /// See [`Msg`]
  pub msg: Msg,
  /// See [`Block`]
  pub block: Block,
  /// See [`Resources`]
  pub resources: Resources,
}
