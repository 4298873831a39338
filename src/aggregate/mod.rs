pub mod aggregator;
pub mod writer;
