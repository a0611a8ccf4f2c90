pub mod batch;
pub mod config;
pub mod domain;
pub mod dssp;
pub mod error;
pub mod features;
pub mod output;
pub mod pipeline;
pub mod rcsb;
pub mod retry;
pub mod store;
pub mod structure;
