//! Alertmanager ingestion boundary.

mod ingest;
mod types;

pub use ingest::{AlertIngestor, IngestDecision, IngestSummary};
pub use types::{AlertmanagerAlert, AlertmanagerPayload};
