// Library root
// -----------
// This crate exposes the library surface of the CLI. The binary
// (`main.rs`) builds the command table from `ui` and dispatches into it.
//
// Module responsibilities:
// - `api`: Browser-like HTTP session against the shop's JSON API (login
//   handshake, search, cart) and the cookie/token bookkeeping.
// - `types`: Wire types for requests and responses.
// - `session`: Persisting the session cookies between invocations.
// - `error`: The error taxonomy shared by the modules above.
// - `ui`: Command table, prompts and text rendering of results.
pub mod api;
pub mod error;
pub mod session;
pub mod types;
pub mod ui;

pub use api::{ApiClient, ClientConfig};
pub use error::{Error, Result};
pub use session::{Session, SessionStore};
