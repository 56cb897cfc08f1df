pub mod cache_gate;
pub use cache_gate::{CacheGate, GateDecision};

pub mod orchestrator;
pub use orchestrator::{Orchestrator, SourceReport};

pub mod scrape;
pub use scrape::{ScrapeOutcome, ScrapeRequest, ScrapeRequestError, ScrapeService, SourceOutcome};

pub mod scheduler;
pub use scheduler::Scheduler;
