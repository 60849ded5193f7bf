pub mod catalog;
pub mod config;
pub mod fetcher;
pub mod notify;
pub mod output;
pub mod ranking;
pub mod server;
pub mod service;
pub mod store;
