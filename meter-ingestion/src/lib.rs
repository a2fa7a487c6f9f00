pub mod baseline;
pub mod config;
pub mod ingest;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod scheduler;
pub mod sinks;
pub mod sources;
pub mod transform;

#[cfg(test)]
pub(crate) mod test_support;

pub use baseline::{BaselineInitializer, BaselineStore};
pub use ingest::IngestionLoop;
pub use pipeline::{Envelope, IngestError};
