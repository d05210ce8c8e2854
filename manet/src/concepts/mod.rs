pub mod client;
pub mod connection;
pub mod message;
pub mod route;
