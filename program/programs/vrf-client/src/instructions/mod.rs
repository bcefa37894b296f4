#![allow(ambiguous_glob_reexports)]

pub mod add_raffle_list;
pub mod consume_randomness;
pub mod init_client;
pub mod request_randomness;

pub use add_raffle_list::*;
pub use consume_randomness::*;
pub use init_client::*;
pub use request_randomness::*;
