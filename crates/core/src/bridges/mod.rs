//! The subscribers: ingest (signals and feedback) and relay (analysis
//! results to the analytics store).

pub mod ingest;
pub mod relay;

pub use ingest::*;
pub use relay::*;
