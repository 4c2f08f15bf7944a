//! Courier Game Server - authoritative round/economy/contention core
//!
//! A round-based multiplayer vehicular-combat delivery game. This crate is
//! the server-trusted simulation: it drives rounds through their phases,
//! places contestable packages and a destination, arbitrates concurrent
//! pickup/steal/drop/deliver requests, applies combat and collision damage,
//! and settles delivery outcomes into persistent currency.

pub mod app;
pub mod config;
pub mod error;
pub mod net;
pub mod round;
pub mod store;
pub mod util;
