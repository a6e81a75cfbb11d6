//! Service layer tying crawlers, the fetcher, and the splitter together.

mod ingest;

pub use ingest::{IngestReport, IngestService};
