//! Top-level `Client`: setup/ingest/shutdown orchestration tying
//! `series_wire`'s `Router` + `Bootstrap` together with the
//! `MappingPipeline`/`MetadataWriter`/`StreamWriter` writers above.
//! Grounded on `gazette::journal::Client::new(http, router)` (a client
//! wraps a router, constructed once and cloned cheaply) and on
//! `pmSeriesSetup`'s entry-point shape in the original source.

use crate::intern::InternRegistry;
use crate::model::{Context, Id, Metric};
use crate::token::LoadToken;
use crate::{mapping, metadata, stream};
use series_wire::router::{Router, ServerConfig};
use series_wire::topology::{Bootstrap, Flags, Report};
use series_wire::Error as WireError;
use std::time::Duration;

/// Connection and bootstrap settings for a [`Client`]. No environment or
/// CLI parsing happens here — the calling binary owns that (see
/// `SPEC_FULL.md` §2's ambient-configuration row).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub seeds: Vec<String>,
    pub connect_timeout: Duration,
    /// Load the `COMMAND` keymap during bootstrap. `pmSeriesSetup`'s real
    /// call site leaves this off; see `DESIGN.md`.
    pub load_keymap: bool,
    /// Enforce the schema version during bootstrap.
    pub check_schema_version: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            connect_timeout: Duration::from_secs(5),
            load_keymap: false,
            check_schema_version: true,
        }
    }
}

/// A live connection to the schema-layer backend: a routed command path
/// plus the interning registry needed to translate ingested samples into
/// writes. Cheap to clone (the router is `Rc`-backed); not `Send`.
#[derive(Clone)]
pub struct Client {
    router: Router,
    registry: std::rc::Rc<InternRegistry>,
}

impl Client {
    /// Run `TopologyBootstrap` against `config.seeds` and return a ready
    /// client plus the bootstrap's diagnostic report.
    pub async fn setup(config: ClientConfig) -> Result<(Self, Report), WireError> {
        let server_config = ServerConfig {
            seeds: config.seeds,
            connect_timeout: config.connect_timeout,
        };
        let flags = Flags {
            keymap: config.load_keymap,
            version: config.check_schema_version,
        };

        let (router, report) = Bootstrap::connect(server_config, flags).await?;

        if report.version < 0 {
            tracing::warn!(
                got = report.version,
                expected = series_wire::topology::SCHEMA_VERSION,
                "unsupported schema version; continuing with setup() resolved anyway"
            );
        }

        Ok((
            Self {
                router,
                registry: std::rc::Rc::new(InternRegistry::new()),
            },
            report,
        ))
    }

    /// Intern a collection context's name and write its source indexes.
    /// Issued once per context, before any of its metrics are ingested.
    pub async fn register_source(&self, ctx: &Context) {
        let token = LoadToken::new();
        metadata::register_source(&self.router, &token, &self.registry, ctx);
        token.join().await;
    }

    /// Ensure a label/value/name string is interned without writing any
    /// metric metadata — exposed for callers that want to pre-warm a
    /// mapping ahead of a large batch.
    pub fn context_name_id(&self, token: &LoadToken, name: &str) -> Id {
        mapping::get_map(&self.router, token, &self.registry.context_name, name)
    }

    /// Write metadata and/or stream entries for one ingested metric,
    /// resolving once every command it fans out into has been acknowledged
    /// (or failed-and-logged). Mirrors `redis_series_metric`'s own gating
    /// (`examples/original_source/src/libpcp_web/src/schema.c:736-742`):
    /// metadata is written when either flag is set, the stream entry only
    /// when `data_flag` is set — so a metadata-only registration can skip
    /// the value stream, and a data-only refresh can skip re-writing
    /// descriptor/index metadata.
    pub async fn ingest_metric(
        &self,
        source: &Id,
        metric: &Metric,
        timestamp: &str,
        meta_flag: bool,
        data_flag: bool,
    ) {
        let token = LoadToken::new();
        if meta_flag || data_flag {
            metadata::write_metric(&self.router, &token, &self.registry, source, metric);
        }
        if data_flag {
            stream::append(&self.router, &token, source, metric, timestamp);
        }
        token.join().await;
    }

    /// Release idle pooled connections. A no-op beyond that: there is no
    /// process-wide state to tear down (see `SPEC_FULL.md` §9 on the
    /// caller-held `InternRegistry`).
    pub fn shutdown(self) {
        self.router.sweep();
    }
}
