//! Data models for connections, sessions, codes, tokens and the OAuth2
//! wire surface.

pub mod code;
pub mod connection;
pub mod oauth;
pub mod profile;
pub mod session;

pub use code::*;
pub use connection::*;
pub use oauth::*;
pub use profile::*;
pub use session::*;
