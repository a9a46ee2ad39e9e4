//! TCP transport (C1's carrier): a [`gateway::Gateway`] accepts connections
//! and hands each one to a [`connection::Connection`], which runs the login
//! handshake and then the steady-state read/dispatch/flush loop.

pub mod connection;
pub mod gateway;

pub use connection::Connection;
pub use gateway::Gateway;
