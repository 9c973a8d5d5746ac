//! Sans-I/O response parser.
//!
//! A hand-written recursive-descent parser over a token cursor; no
//! regular expressions anywhere near the protocol. The transport layer
//! assembles a complete response (line plus embedded literals) and
//! hands it here.

mod fetch;
mod lexer;
mod response;

pub use fetch::{BodyStructure, Disposition, FetchData};
pub use lexer::{Cursor, Token};
pub use response::{Response, Untagged, parse_response};
