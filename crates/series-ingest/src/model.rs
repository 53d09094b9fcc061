//! The data model ingested per sample: a [`Context`] (collection source)
//! carrying one or more [`Metric`]s, each with its [`Desc`]riptor, optional
//! instances, labels, and current value(s).
//!
//! Grounded on the argument shapes read out of `redis_series_source` /
//! `redis_series_metric` / `redis_series_instance` / `redis_series_labelset`
//! in the original C source — the structs themselves were not part of the
//! retrieved pack, only the functions that read their fields, so these types
//! are reconstructed from that usage.

use series_wire::hash;

pub type Id = hash::Id;

/// A string plus its interned mapping id and, where relevant, the
/// series/source hash derived from it.
#[derive(Debug, Clone)]
pub struct Name {
    pub text: String,
    pub id: Id,
}

impl Name {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let id = hash::hash(text.as_bytes());
        Self { text, id }
    }
}

/// The collection source of a set of metrics: a PCP context (archive or
/// live agent) identified by its name and host, optionally geolocated.
#[derive(Debug, Clone)]
pub struct Context {
    pub name: Name,
    pub hostid: Name,
    /// `(lat, lon)`. Always written to `pcp:source:location` at source
    /// registration — a caller with no real coordinates passes `(0.0, 0.0)`,
    /// same as the original effectively does, rather than skipping the
    /// index entirely (SPEC_FULL.md §4.7 lists it as unconditional).
    pub location: (f64, f64),
}

impl Context {
    /// The content-addressed identity of this source, used throughout the
    /// namespace as `<CH>` (`pcp:source:*`, `pcp:desc:series:*` `source`
    /// field, etc).
    pub fn source_hash(&self) -> Id {
        hash::hash(self.name.text.as_bytes())
    }
}

/// `domain.cluster.item` performance metric identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pmid {
    pub domain: u32,
    pub cluster: u32,
    pub item: u32,
}

impl Pmid {
    pub fn render(&self) -> String {
        format!("{}.{}.{}", self.domain, self.cluster, self.item)
    }
}

/// `domain.serial` instance domain identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indom {
    pub domain: u32,
    pub serial: u32,
}

impl Indom {
    pub fn render(&self) -> String {
        format!("{}.{}", self.domain, self.serial)
    }
}

/// Metric semantics (counter, instant, discrete, ...). Rendered into the
/// `semantics` field of `pcp:desc:series:*` as the same canonical strings
/// `pmwebapi_semantics_str` produces in the original source, not a numeric
/// code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Semantics {
    Counter,
    Instant,
    Discrete,
    /// No defined semantics for this metric, or a semantics code this layer
    /// does not recognize.
    NoSupport,
}

impl Semantics {
    pub fn render(self) -> &'static str {
        match self {
            Semantics::Counter => "counter",
            Semantics::Instant => "instant",
            Semantics::Discrete => "discrete",
            Semantics::NoSupport => "no-support",
        }
    }
}

/// The value kind a metric's samples carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    I32,
    U32,
    I64,
    U64,
    Float,
    Double,
    String,
    Aggregate,
    /// A type code this layer does not know how to encode. Carried through
    /// rather than rejected, per the original's `PM_ERR_NYI` fallback.
    Unsupported,
}

impl ValueType {
    /// The canonical string stored in the `type` field of
    /// `pcp:desc:series:*`, matching `pmwebapi_type_str`'s output in the
    /// original source (e.g. `"32"` for a 32-bit signed integer — the name
    /// is not a numeric code, it just happens to read like one for the
    /// integer types).
    pub fn render(self) -> &'static str {
        match self {
            ValueType::I32 => "32",
            ValueType::U32 => "u32",
            ValueType::I64 => "64",
            ValueType::U64 => "u64",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::String => "string",
            ValueType::Aggregate => "aggregate",
            ValueType::Unsupported => "unknown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Desc {
    pub pmid: Pmid,
    pub indom: Option<Indom>,
    pub semantics: Semantics,
    pub units: String,
    pub kind: ValueType,
}

impl Desc {
    pub fn render_indom(&self) -> String {
        match &self.indom {
            Some(indom) => indom.render(),
            None => "none".to_string(),
        }
    }
}

/// Label scope, matching the flag bits the original distinguishes to decide
/// whether a `pcp:labelflags:series:*` entry is written. Discriminants are
/// PCP's own `PM_LABEL_*` bitset values, not sequential indices: readers of
/// `pcp:labelflags:series:*` expect the real bit, not an enum ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelFlags {
    Context = 1,
    Domain = 2,
    Indom = 4,
    Cluster = 8,
    Item = 16,
    Instance = 32,
}

#[derive(Debug, Clone)]
pub struct Label {
    pub name: Name,
    pub value: Name,
    pub flags: LabelFlags,
}

#[derive(Debug, Clone)]
pub struct Instance {
    pub name: Name,
    pub inst: i32,
    pub labels: Vec<Label>,
}

/// A sample value. `Aggregate` carries an opaque byte blob (binary metric
/// values PCP does not interpret further).
#[derive(Debug, Clone)]
pub enum Value {
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Float(f32),
    Double(f64),
    String(Option<String>),
    Aggregate(Option<Vec<u8>>),
    Unsupported,
}

#[derive(Debug, Clone)]
pub enum Samples {
    Scalar(Value),
    Instances(Vec<(i32, Value)>),
}

/// One ingested metric: its name aliases, descriptor, current samples, and
/// labels. `updated` mirrors the original's dirty flag gating stream writes.
#[derive(Debug, Clone)]
pub struct Metric {
    pub names: Vec<Name>,
    pub desc: Desc,
    pub instances: Vec<Instance>,
    pub labels: Vec<Label>,
    pub samples: Samples,
    pub updated: bool,
    /// A negative PCP errno, if this sample failed to collect.
    pub error: Option<i32>,
}

impl Metric {
    /// The content-addressed series identity for name alias `name`, unique
    /// per (source, name, descriptor). Combines the source hash with the
    /// name text and descriptor so the same metric name under a different
    /// source or a redefined descriptor is a distinct series.
    pub fn series_hash(&self, source: &Id, name: &Name) -> Id {
        let canonical = format!(
            "{}|{}|{}|{}",
            hash::hex(source),
            name.text,
            self.desc.pmid.render(),
            self.desc.render_indom(),
        );
        hash::hash(canonical.as_bytes())
    }
}
