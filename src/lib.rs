pub mod config;
pub mod kalshi;
pub mod movement;
pub mod poller;
pub mod source;
pub mod stats;
pub mod store;
pub mod types;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_support;
