//! Client library behind the `todo` binary: gRPC client, errors and output
//! formatting.

pub mod client;
pub mod error;
pub mod output;
