pub mod app;
pub mod batch;
pub mod config;
pub mod domain;
pub mod error;
pub mod export;
pub mod fetch;
pub mod ncbi;
pub mod organism;
pub mod output;
pub mod persist;
pub mod session;
pub mod uniprot;
