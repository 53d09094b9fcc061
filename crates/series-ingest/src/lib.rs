//! Ingestion and schema layer for translating monitoring samples into
//! writes against a `series_wire`-routed backend: descriptor/name/source/
//! instance/label indexes (`metadata`) and per-series value streams
//! (`stream`), with string deduplication via `mapping`/`intern` and
//! per-sample completion tracking via `token`. See `SPEC_FULL.md` for the
//! full design and `DESIGN.md` for what each module is grounded on.

pub mod intern;
pub mod mapping;
pub mod metadata;
pub mod model;
pub mod setup;
pub mod stream;
pub mod token;

pub use model::{Context, Desc, Id, Instance, Label, LabelFlags, Metric, Name, Samples, Value, ValueType};
pub use setup::{Client, ClientConfig};
pub use token::{Completion, LoadToken};

/// Errors this crate can report on its own behalf, beyond what
/// `series_wire::Error` already covers (which is surfaced to callers
/// unwrapped, via `#[from]`, rather than nested — see `gazette::Error`'s
/// own transparent-wrap style).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Wire(#[from] series_wire::Error),
    /// An external label decoder reported a failure (`SPEC_FULL.md` §7).
    /// The affected metric or instance's labels are skipped; the load
    /// continues.
    #[error("label decoding failed: {0}")]
    LabelDecode(String),
}
