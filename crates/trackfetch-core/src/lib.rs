pub mod config;
pub mod logging;

pub mod catalog;
pub mod clock;
pub mod control;
pub mod download;
pub mod matching;
pub mod peer_api;
pub mod postprocess;
pub mod retry;
pub mod scheduler;
pub mod service;
pub mod source;
pub mod store;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;
