pub mod archive;
pub mod commands;
pub mod config;
pub mod discord;
pub mod events;
pub mod gateway;
pub mod language;
pub mod provisioner;
pub mod registry;
pub mod relay;
pub mod retry;
pub mod scanner;
pub mod service;
pub mod translation;

#[cfg(test)]
mod test_support;
