//! banchod: a real-time chat-and-lobby service for a rhythm-game community.
//!
//! The binary wires these modules to a [`tokio::net::TcpListener`]; the
//! library crate is structured so every subsystem can be exercised without
//! opening a socket (see each module's own tests and `tests/`).

pub mod channel;
pub mod chat;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod kv;
pub mod locking;
pub mod login;
pub mod match_engine;
pub mod metrics;
pub mod network;
pub mod pubsub_bridge;
pub mod services;
pub mod session;
pub mod spectator;
pub mod streams;
pub mod user_store;
pub mod webhook;
pub mod workers;
