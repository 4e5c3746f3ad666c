use newt_msg::Message;

/// One-line description of a message for log output, e.g.
/// `CON 0.01 id=12 token=0a0b0c0d with 5 byte payload`
pub(crate) fn msg_summary(msg: &Message) -> String {
  let code: String = msg.code.to_human().iter().collect();
  format!("{} {} id={} token={} with {} byte payload",
          msg.ty.to_human(),
          code,
          msg.id,
          msg.token,
          msg.payload.0.len())
}
