//! Replication boundary - inbound action requests and outbound events

pub mod protocol;
