/// Repository walking, structural chunking and the ingestion worker pool.
pub mod code_parser;
pub mod core;
pub mod heuristic;
pub mod identity;
pub mod languages;
pub mod walker;
pub mod writer;
