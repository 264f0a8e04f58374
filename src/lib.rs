pub mod client;
pub mod contract;
pub mod deployment;
pub mod draw;
pub mod mint;
pub mod network;
pub mod preferences;
pub mod provider;
pub mod rpc;
pub mod session;
pub mod ui;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
