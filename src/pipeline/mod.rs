pub mod ingest;
pub mod normalize;

pub use ingest::{IngestOutcome, IngestSummary, Ingestor};
pub use normalize::Normalizer;
