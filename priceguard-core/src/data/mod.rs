//! Data ingestion: source adapters and normalization.
//!
//! Adapters return an untyped [`RawFrame`]; the [`Normalizer`] turns that
//! into the canonical [`Series`](crate::domain::Series) or
//! [`BenchmarkSeries`](crate::domain::BenchmarkSeries).

pub mod csv_dir;
pub mod ecb;
pub mod normalize;
pub mod provider;
pub mod synthetic;
pub mod yahoo;

pub use csv_dir::{read_csv_frame, CsvDirAdapter};
pub use ecb::EcbAdapter;
pub use normalize::{Normalizer, SchemaError};
pub use provider::{
    safe_symbol, FetchError, FetchOutcome, Interval, RawFrame, RawValue, SourceAdapter,
    SourceKind,
};
pub use synthetic::SyntheticAdapter;
pub use yahoo::YahooAdapter;
