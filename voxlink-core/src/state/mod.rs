pub mod connection;
mod snapshot;

pub use connection::ConnectionState;
pub use snapshot::ConnectionSnapshot;
