//! Gateway client and its builder.

mod builder;
mod client;

pub use builder::GatewayBuilder;
pub use client::GatewayClient;
