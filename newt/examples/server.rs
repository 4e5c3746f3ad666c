//! A resource server
//!
//! ```text
//! cargo run --example server -- [-p <port>] [-w] [-m <max-block-size>] [-a <name> <format> <value>]...
//! ```
//!
//! `-w` allows clients to PUT and DELETE resources. `format` is one of
//! NULL, TEXT, XML or JSON, and `value` is ascii or hex (`0x..`).
//!
//! A `time` resource holding the seconds since startup is updated every second,
//! try observing it.

use std::time::{Duration, Instant};

use newt::config::Config;
use newt::server::{Resources, Server};
use newt_msg::ContentFormat;

fn format(name: &str) -> Option<ContentFormat> {
  match name.to_ascii_uppercase().as_str() {
    | "TEXT" => Some(ContentFormat::Text),
    | "XML" => Some(ContentFormat::Xml),
    | "JSON" => Some(ContentFormat::Json),
    | _ => None,
  }
}

fn value(s: &str) -> Vec<u8> {
  match s.strip_prefix("0x") {
    | Some(hex) => (0..hex.len()).step_by(2)
                                 .filter_map(|i| hex.get(i..i + 2))
                                 .filter_map(|b| u8::from_str_radix(b, 16).ok())
                                 .collect(),
    | None => s.as_bytes().to_vec(),
  }
}

fn main() {
  simple_logger::init_with_level(log::Level::Debug).unwrap();

  let args = std::env::args().skip(1).collect::<Vec<_>>();
  let mut port = 5683u16;
  let mut write = false;
  let mut config = Config::default();
  let mut initial = vec![];

  let mut ix = 0;
  while ix < args.len() {
    match args[ix].as_str() {
      | "-p" => {
        port = args[ix + 1].parse().unwrap();
        ix += 1;
      },
      | "-m" => {
        config.block.server_max_size = args[ix + 1].parse().unwrap();
        ix += 1;
      },
      | "-w" => write = true,
      | "-a" => {
        initial.push((args[ix + 1].clone(), format(&args[ix + 2]), value(&args[ix + 3])));
        ix += 3;
      },
      | other => panic!("unrecognized argument {:?}", other),
    }
    ix += 1;
  }

  let (core, _runtime) = newt::std::start(("0.0.0.0", port), config).unwrap();
  let resources = Resources::new(config.resources);
  resources.set_write_mode(write);
  let server = Server::new(core, resources.clone());

  log::info!("listening on port {}, write mode {}",
             port,
             if write { "enabled" } else { "disabled" });

  for (name, format, value) in initial {
    log::info!("adding resource {:?}", name);
    resources.set_resource(&server, &name, format, value);
  }

  let start = Instant::now();
  loop {
    std::thread::sleep(Duration::from_secs(1));
    let secs = start.elapsed().as_secs().to_string();
    resources.set_resource(&server, "time", Some(ContentFormat::Text), secs.into_bytes());
  }
}
