pub mod engine;
pub mod executor;
pub mod outcome;
pub mod paths;
pub mod remote;
pub mod transfer;
pub mod walker;

#[cfg(test)]
mod fake_store;
