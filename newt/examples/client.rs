//! A command-line client
//!
//! ```text
//! cargo run --example client -- GET coap://127.0.0.1/time
//! cargo run --example client -- PUT coap://127.0.0.1/hello world
//! cargo run --example client -- OBSERVE coap://127.0.0.1/time
//! ```

use std::sync::mpsc;

use newt::blocking::{Client, ClientResultExt};
use newt::core::{Core, Error};
use newt::net::Addrd;
use newt::platform::Std;
use newt::resp::Resp;
use newt::time::Timeout;
use newt_msg::ContentFormat;

fn log_resp(resp: &Addrd<Resp>) {
  log::info!("{} from {}: {:?}",
             resp.data().code().to_string(),
             resp.addr(),
             resp.data()
                 .payload_str()
                 .map(String::from)
                 .unwrap_or_else(|| format!("{:?}", resp.data().payload())));
}

fn main() {
  simple_logger::init_with_level(log::Level::Info).unwrap();

  let args = std::env::args().skip(1).collect::<Vec<_>>();
  let (method, uri) = match args.as_slice() {
    | [method, uri, ..] => (method.to_ascii_uppercase(), uri.clone()),
    | _ => panic!("usage: client <GET|PUT|POST|DELETE|OBSERVE> <uri> [payload]"),
  };
  let payload = args.get(2).map(|p| p.as_bytes().to_vec());

  let client = Client::try_new(0).unwrap();
  let timeout = Timeout::Millis(30_000);

  let result = match method.as_str() {
    | "GET" => client.get(&uri, timeout),
    | "DELETE" => client.delete(&uri, timeout),
    | "PUT" => client.put(&uri, Some(ContentFormat::Text), payload.unwrap_or_default(), timeout),
    | "POST" => client.post(&uri, Some(ContentFormat::Text), payload.unwrap_or_default(), timeout),
    | "OBSERVE" => {
      let (tx, rx) = mpsc::sync_channel(1);
      client.client()
            .observe(&uri,
                     None,
                     |_: &Core<Std>, resp: Addrd<Resp>| log_resp(&resp),
                     move |_: &Core<Std>, err: Option<Error<Std>>| {
                       tx.send(err).ok();
                     })
            .unwrap();

      match rx.recv() {
        | Ok(Some(e)) => log::error!("observation ended: {}", e),
        | _ => log::info!("observation ended"),
      }
      return;
    },
    | other => panic!("unknown method {}", other),
  };

  match result.timeout_ok() {
    | Ok(Some(resp)) => log_resp(&resp),
    | Ok(None) => log::warn!("no response"),
    | Err(e) => log::error!("{}", e),
  }
}
