//! Domain types for PriceGuard

pub mod flag;
pub mod quarantine;
pub mod record;

pub use flag::{DetectionStage, FlagSet, QualityFlag};
pub use quarantine::{EntryValue, QuarantineEntry, QuarantinedRecord, SymbolPartition};
pub use record::{BenchmarkObservation, BenchmarkSeries, Record, Series, SeriesKey};
