pub mod command;
pub mod connection;
pub mod hash;
pub mod router;
pub mod slots;
pub mod topology;

pub use command::{Arg, Command, Reply};
pub use router::{Router, ServerConfig};
pub use topology::Bootstrap;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("connection error: {0}")]
    Connect(#[source] std::io::Error),
    #[error("{0}")]
    Protocol(&'static str),
    #[error("server replied with an error: {0}")]
    Server(String),
    #[error("no server known for slot {0}")]
    NoRoute(u16),
    #[error("too many redirects ({0}) while routing a command")]
    TooManyRedirects(u32),
}
