pub mod channels;
pub mod connection;
pub mod constants;
pub mod decoder;
pub mod driver;
pub mod filter;
pub mod orientation;
pub mod session;
pub mod sink;
pub mod transport;
pub mod types;
