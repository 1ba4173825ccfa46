pub mod argument;
pub mod cleanup;
pub mod config;
pub mod container;
pub mod encoder;
pub mod error;
pub mod event;
pub mod formatter;
pub mod job;
pub mod media;
pub mod metadata;
pub mod parser;
pub mod progress;
pub mod render;
pub mod runner;
pub mod summary;
