//! Hookchat core library: webhook relay, response normalizer, conversation store and the
//! HTTP gateway used by the CLI.

pub mod config;
pub mod conversations;
pub mod gateway;
pub mod health;
pub mod init;
pub mod normalize;
pub mod rate_limit;
pub mod relay;
pub mod validation;
