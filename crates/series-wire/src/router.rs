//! `Router` dispatches commands to the cluster member that owns their slot,
//! maintaining a cache of dialed connections the way `gazette::router::
//! Router` maintains a cache of dialed gRPC channels — lazily dial, reuse
//! while ready, prune when idle. The whole client runs on one cooperatively
//! scheduled thread (see the crate-level docs), so the dial-state cache
//! itself is a plain `Rc<RefCell<_>>` rather than `gazette`'s
//! `Arc<Mutex<_>>` — but each individual connection slot is a
//! `Rc<tokio::sync::Mutex<_>>`, not a `RefCell`: one ingest call fans out
//! many concurrent commands that frequently share a connection, and only an
//! async mutex can hold its guard across the write/read round trip without
//! risking a borrow panic when two such commands land on the same
//! connection at once.

use crate::command::{Arg, Command, Reply};
use crate::connection::Connection;
use crate::slots::{slot_for_key, SlotMap};
use crate::Error;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tokio::sync::Mutex;

const MAX_REDIRECTS: u32 = 5;

/// Seed endpoints and per-connection settings used to bootstrap a [`Router`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub seeds: Vec<String>,
    pub connect_timeout: std::time::Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            connect_timeout: std::time::Duration::from_secs(5),
        }
    }
}

// A cached connection slot: ready (Some) with a use count since the last
// sweep, or not yet dialed (None). Mirrors `gazette::router::DialState`.
//
// A single connection serves requests one at a time, so the slot holds a
// `tokio::sync::Mutex` rather than a `RefCell`: the guard is held across
// the write/read round trip, which is the entire point of an async mutex
// (a `RefCell` borrow can't survive an `.await` without risking a panic the
// moment two commands route to the same connection concurrently — exactly
// what this ingest workload's fan-out does).
type DialState = Rc<Mutex<Option<(Connection, usize)>>>;

struct Inner {
    slots: RefCell<SlotMap>,
    connections: RefCell<HashMap<String, DialState>>,
    control: String,
    connect_timeout: Option<std::time::Duration>,
}

/// Routes commands to the cluster member that owns their key's slot,
/// following `MOVED`/`ASK`/`TRYAGAIN`/`CLUSTERDOWN` redirects as needed.
///
/// Not `Send` — construct and use it from the single cooperative task that
/// owns the ingest session (see `SPEC_FULL.md` §5).
#[derive(Clone)]
pub struct Router {
    inner: Rc<Inner>,
}

impl Router {
    /// Construct a router directly from a known slot map and control
    /// endpoint, bypassing [`crate::topology::Bootstrap`]. Normal callers
    /// should go through `Bootstrap::connect`; this is exposed for tests and
    /// advanced callers that already know their topology.
    pub fn new(slots: SlotMap, control: String) -> Self {
        Self::with_connect_timeout(slots, control, None)
    }

    /// Like [`Router::new`], but bounds every dial with `timeout` (`None`
    /// means unbounded). Used by [`crate::topology::Bootstrap`], which
    /// carries the caller's [`ServerConfig::connect_timeout`].
    pub fn with_connect_timeout(
        slots: SlotMap,
        control: String,
        timeout: Option<std::time::Duration>,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                slots: RefCell::new(slots),
                connections: RefCell::new(HashMap::new()),
                control,
                connect_timeout: timeout,
            }),
        }
    }

    pub fn control_addr(&self) -> String {
        self.inner.control.clone()
    }

    pub fn replace_slots(&self, slots: SlotMap) {
        *self.inner.slots.borrow_mut() = slots;
    }

    /// Issue `cmd`, following redirects until a non-redirect reply is
    /// returned or the redirect budget is exhausted.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn request(&self, cmd: Command) -> Result<Reply, Error> {
        let mut redirects = 0u32;
        loop {
            if redirects > MAX_REDIRECTS {
                return Err(Error::TooManyRedirects(redirects));
            }
            let addr = self.target_for(&cmd)?;
            let state = self.connection_for(&addr).await?;
            let reply = {
                let mut guard = state.lock().await;
                let (conn, _) = guard.as_mut().expect("just dialed or cached");
                conn.request(&cmd).await?
            };

            let Reply::Error(msg) = &reply else {
                return Ok(reply);
            };

            if let Some(rest) = msg.strip_prefix("MOVED ") {
                let (slot, new_addr) = parse_redirect(rest)?;
                tracing::debug!(slot, new_addr, "MOVED redirect, updating slot map");
                self.inner.slots.borrow_mut().apply_moved(slot, new_addr);
                redirects += 1;
                continue;
            }
            if let Some(rest) = msg.strip_prefix("ASK ") {
                let (_slot, new_addr) = parse_redirect(rest)?;
                tracing::debug!(new_addr, "ASK redirect");
                let state = self.connection_for(&new_addr).await?;
                let mut guard = state.lock().await;
                let (conn, _) = guard.as_mut().expect("just dialed or cached");
                conn.request(&Command::keyless(&[Arg::from("ASKING")])).await?;
                return conn.request(&cmd).await;
            }
            if msg.starts_with("TRYAGAIN") || msg.starts_with("CLUSTERDOWN") {
                tracing::debug!(reply = %msg, "transient cluster error, retrying");
                redirects += 1;
                continue;
            }

            return Ok(reply);
        }
    }

    fn target_for(&self, cmd: &Command) -> Result<String, Error> {
        match &cmd.key {
            None => Ok(self.inner.control.clone()),
            Some(key) => {
                let slot = slot_for_key(key);
                self.inner
                    .slots
                    .borrow()
                    .master_for_slot(slot)
                    .map(str::to_string)
                    .ok_or(Error::NoRoute(slot))
            }
        }
    }

    async fn connection_for(&self, addr: &str) -> Result<DialState, Error> {
        let state = {
            let mut conns = self.inner.connections.borrow_mut();
            conns
                .entry(addr.to_string())
                .or_insert_with(|| Rc::new(Mutex::new(None)))
                .clone()
        };

        // Hold the lock across the fast-path check and, on a miss, the dial
        // itself: two requests racing for the same not-yet-dialed address
        // must not both dial.
        let mut guard = state.lock().await;
        match guard.as_mut() {
            Some((_, uses)) => *uses += 1,
            None => {
                let conn = match self.inner.connect_timeout {
                    Some(timeout) => tokio::time::timeout(timeout, Connection::dial(addr))
                        .await
                        .map_err(|_| Error::Connect(std::io::Error::new(
                            std::io::ErrorKind::TimedOut,
                            format!("connect to {addr} timed out"),
                        )))??,
                    None => Connection::dial(addr).await?,
                };
                *guard = Some((conn, 1));
            }
        }
        drop(guard);
        Ok(state)
    }

    /// Prune connections that have not been used since the last sweep.
    /// Mirrors `gazette::router::Router::sweep`. Connections currently
    /// serving a request are left alone (`try_lock` miss) rather than
    /// waited on.
    pub fn sweep(&self) {
        self.inner.connections.borrow_mut().retain(|addr, state| {
            let Ok(mut guard) = state.try_lock() else {
                return true; // in flight right now — keep
            };
            match guard.as_mut() {
                None => true, // never dialed — keep
                Some((_, uses)) => {
                    if *uses == 0 {
                        tracing::debug!(addr, "dropping idle connection");
                        false
                    } else {
                        *uses = 0;
                        true
                    }
                }
            }
        });
    }
}

fn parse_redirect(rest: &str) -> Result<(u16, String), Error> {
    let mut parts = rest.split_whitespace();
    let slot: u16 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or(Error::Protocol("malformed redirect reply"))?;
    let addr = parts
        .next()
        .ok_or(Error::Protocol("malformed redirect reply"))?
        .to_string();
    Ok((slot, addr))
}
