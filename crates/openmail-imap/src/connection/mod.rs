//! Connection management: streams, framing, the session, and the IDLE
//! monitor.

mod framed;
mod idle;
mod session;
mod stream;

pub use framed::FramedStream;
pub use idle::{IDLE_ACTIVATION_DELAY, IDLE_TIMEOUT, MailEvent};
pub use session::{
    COMMAND_TIMEOUT, Session, SessionConfig, SessionState, WAIT_RESPONSE_TIMEOUT,
};
pub use stream::{ImapStream, connect_plain, connect_tls, tls_connector};
