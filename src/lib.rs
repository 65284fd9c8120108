pub mod archive;
pub mod cli;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod formats;
pub mod pipeline;
pub mod report;
pub mod request;
pub mod scratch;
pub mod server;
pub mod util;
