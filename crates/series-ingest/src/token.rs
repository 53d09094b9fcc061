//! Join-group completion tracking for one ingest call. Replaces the
//! original's explicit-refcount, magic-tagged completion batons
//! (`seriesBatonReferences`/`seriesBatonCheckMagic`/`doneSeriesLoadBaton`)
//! with a `FuturesUnordered` of tagged futures: `register` is the `addref`,
//! draining the set on `join` is the decrement-to-zero that fires
//! `on_done`. See `SPEC_FULL.md` §4.9 and §9.

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;

/// Which family of work a registered future belongs to. The original's
/// runtime magic-number check becomes a `debug_assert!` that a future
/// registered under one variant actually resolves as that variant —
/// a static defense against wiring a command's continuation to the wrong
/// join group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Slots,
    Mapping,
    Stream,
    Load,
}

type BoxedFuture = Pin<Box<dyn Future<Output = Completion>>>;

/// Tracks outstanding command futures for one `ingest_metric` call (or,
/// reused more narrowly, for one mapping round or one stream append). Its
/// `join` future resolves once every future registered against it has
/// resolved, mirroring `doneSeriesLoadBaton` firing `on_done` when the
/// original's refcount reaches zero.
#[derive(Default)]
pub struct LoadToken {
    pending: RefCell<FuturesUnordered<BoxedFuture>>,
}

impl LoadToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one in-flight unit of work. `expect` names the join group
    /// the caller believes `fut` belongs to; this is checked against what
    /// `fut` actually resolves to once it completes.
    pub fn register<F>(&self, expect: Completion, fut: F)
    where
        F: Future<Output = Completion> + 'static,
    {
        self.pending.borrow_mut().push(Box::pin(async move {
            let got = fut.await;
            debug_assert_eq!(got, expect, "completion resolved under the wrong join group");
            got
        }));
    }

    /// How many futures are currently outstanding.
    pub fn outstanding(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Resolve once every registered future has resolved. Futures that are
    /// registered by other futures already polled by this `join` (e.g. a
    /// mapping round queuing its HSET continuation once looked up) are
    /// still drained, since `FuturesUnordered` keeps polling as long as it
    /// is non-empty.
    pub async fn join(self) {
        let mut pending = self.pending.into_inner();
        while pending.next().await.is_some() {}
    }
}
