//! Relay core library — webhook gateway, AI chat client, TikTok channel and session routing
//! used by the CLI.

pub mod channels;
pub mod config;
pub mod gateway;
pub mod init;
pub mod llm;
pub mod relay;
pub mod routing;
