//! Outbound side: the one HTTP client every probe goes through

mod client;

pub use client::{ProxyClient, MAX_REDIRECTS};
