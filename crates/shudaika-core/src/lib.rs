pub mod config;
pub mod encoder;
pub mod error;
pub mod fetcher;
pub mod library;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod resolver;
pub mod scorer;
pub mod storage;
