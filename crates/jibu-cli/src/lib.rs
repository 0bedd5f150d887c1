//! Library portion of the jibu terminal chat client

pub mod client;
pub mod error;
