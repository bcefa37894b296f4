//! Client-side requester for verifiable randomness.
//!
//! A client state account, derived from the VRF account it is bound to,
//! requests randomness from an oracle queue and consumes each verified result
//! exactly once through a frozen callback. This crate builds and checks every
//! request off-chain before submission and waits for the result under a
//! bounded poll.

pub mod callback;
pub mod client;
pub mod config;
pub mod derivation;
pub mod error;
pub mod escrow;
pub mod layout;
pub mod localnet;
pub mod metrics;
pub mod network;
pub mod oracle;
pub mod permission;
pub mod poll;
pub mod raffle;
pub mod request;
pub mod rpc;

pub use error::{ErrorKind, RequesterError, Result};
pub use request::{ClientBinding, RequestManager, RequestTicket};
