//! Jibu - Streaming chat gateway
//!
//! This crate provides a daemon that authenticates callers, normalizes
//! conversation history, and republishes token streams from local or hosted
//! LLM backends as a single unified event stream.

pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;

pub use error::GatewayError;
