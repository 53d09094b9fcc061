//! Cluster topology bootstrap: `CLUSTER SLOTS` discovery (with the
//! `NOCLUSTER` standalone fallback), optional `COMMAND` keymap loading, and
//! schema version negotiation. Grounded on `redis_load_slots`/
//! `redis_load_keymap`/`redis_load_version` in the original C source, keeping
//! the same state ordering but replacing the callback chain with linear
//! `.await` sequencing.

use crate::command::{Arg, Command, Reply};
use crate::router::{Router, ServerConfig};
use crate::slots::{SlotMap, SlotRange};
use crate::Error;
use std::collections::HashMap;

pub const SCHEMA_VERSION: i64 = 2;
const VERSION_KEY: &str = "pcp:version:schema";

/// Which optional bootstrap steps to perform, beyond mandatory slot
/// discovery. `pmSeriesSetup`'s real call site sets only `version`, skipping
/// the keymap step — see `DESIGN.md`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flags {
    pub keymap: bool,
    pub version: bool,
}

/// Outcome of a bootstrap run, surfaced to the caller for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub standalone: bool,
    pub keymap: HashMap<String, i64>,
    /// `-1` if the schema version was unreadable or unsupported; otherwise
    /// the accepted version (always [`SCHEMA_VERSION`] on success).
    pub version: i64,
}

pub struct Bootstrap;

impl Bootstrap {
    /// Run the full discovery sequence and return a ready [`Router`].
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn connect(config: ServerConfig, flags: Flags) -> Result<(Router, Report), Error> {
        let control = config
            .seeds
            .first()
            .cloned()
            .ok_or(Error::Protocol("no seed endpoints configured"))?;

        // The slot map is irrelevant until populated below: CLUSTER SLOTS
        // and COMMAND are both keyless and always dispatch to `control`.
        let router = Router::with_connect_timeout(
            SlotMap::default(),
            control.clone(),
            Some(config.connect_timeout),
        );
        let mut report = Report::default();

        load_slots(&router, &control, &mut report).await?;

        if flags.keymap {
            load_keymap(&router, &mut report).await?;
        }
        if flags.version {
            load_version(&router, &mut report).await?;
        }

        Ok((router, report))
    }
}

async fn load_slots(router: &Router, control: &str, report: &mut Report) -> Result<(), Error> {
    let reply = router
        .request(Command::keyless(&[Arg::from("CLUSTER"), Arg::from("SLOTS")]))
        .await?;

    match reply {
        Reply::Error(msg) if msg.starts_with("NOCLUSTER") => {
            tracing::debug!("backend is standalone, installing single slot range");
            router.replace_slots(SlotMap::single_range(control.to_string()));
            report.standalone = true;
            Ok(())
        }
        Reply::Error(msg) => Err(Error::Server(msg)),
        Reply::Array(entries) => {
            let ranges = entries
                .iter()
                .map(decode_slot_entry)
                .collect::<Result<Vec<_>, _>>()?;
            router.replace_slots(SlotMap::new(ranges));
            Ok(())
        }
        _ => Err(Error::Protocol("CLUSTER SLOTS did not return an array")),
    }
}

fn decode_slot_entry(entry: &Reply) -> Result<SlotRange, Error> {
    let fields = entry
        .as_array()
        .ok_or(Error::Protocol("malformed CLUSTER SLOTS entry"))?;
    if fields.len() < 3 {
        return Err(Error::Protocol("CLUSTER SLOTS entry missing fields"));
    }
    let start = fields[0]
        .as_integer()
        .ok_or(Error::Protocol("malformed slot range start"))?;
    let end = fields[1]
        .as_integer()
        .ok_or(Error::Protocol("malformed slot range end"))?;
    let master = decode_node_addr(&fields[2])?;
    let replicas = fields[3..]
        .iter()
        .filter_map(|r| decode_node_addr(r).ok())
        .collect();

    Ok(SlotRange {
        start: start as u16,
        end: end as u16,
        master,
        replicas,
    })
}

fn decode_node_addr(node: &Reply) -> Result<String, Error> {
    let fields = node
        .as_array()
        .ok_or(Error::Protocol("malformed node descriptor"))?;
    if fields.len() < 2 {
        return Err(Error::Protocol("node descriptor missing host/port"));
    }
    let host = fields[0]
        .as_bulk_string()
        .ok_or(Error::Protocol("malformed node host"))?;
    let port = fields[1]
        .as_integer()
        .ok_or(Error::Protocol("malformed node port"))?;
    Ok(format!("{host}:{port}"))
}

async fn load_keymap(router: &Router, report: &mut Report) -> Result<(), Error> {
    let reply = router
        .request(Command::keyless(&[Arg::from("COMMAND")]))
        .await?;
    let entries = reply
        .as_array()
        .ok_or(Error::Protocol("COMMAND did not return an array"))?;

    for entry in entries {
        let fields = match entry.as_array() {
            Some(f) if f.len() >= 6 => f,
            _ => continue,
        };
        let name = match fields[0].as_bulk_string() {
            Some(n) => n.to_string(),
            None => continue,
        };
        let first_key_pos = fields[3].as_integer().unwrap_or(0);
        report.keymap.insert(name, first_key_pos);
    }
    Ok(())
}

async fn load_version(router: &Router, report: &mut Report) -> Result<(), Error> {
    let reply = router
        .request(Command::new(
            &[Arg::from("GET"), Arg::from(VERSION_KEY)],
            Some(1),
        ))
        .await?;

    let version = match reply {
        Reply::Nil => Some(0i64),
        Reply::Bulk(_) | Reply::Simple(_) => reply
            .as_bulk_string()
            .and_then(|s| s.parse::<i64>().ok()),
        Reply::Error(msg) => {
            tracing::warn!(error = %msg, "failed to read schema version");
            None
        }
        _ => return Err(Error::Protocol("GET pcp:version:schema returned unexpected type")),
    };

    match version {
        Some(0) => {
            router
                .request(Command::new(
                    &[
                        Arg::from("SET"),
                        Arg::from(VERSION_KEY),
                        Arg::from(SCHEMA_VERSION.to_string()),
                    ],
                    Some(1),
                ))
                .await?;
            report.version = SCHEMA_VERSION;
        }
        Some(v) if v == SCHEMA_VERSION => {
            report.version = SCHEMA_VERSION;
        }
        Some(v) => {
            tracing::warn!(got = v, expected = SCHEMA_VERSION, "unsupported schema version");
            report.version = -1;
        }
        None => {
            report.version = -1;
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decode_node_addr_formats_host_port() {
        let node = Reply::Array(vec![
            Reply::Bulk(b"127.0.0.1".to_vec()),
            Reply::Integer(7000),
            Reply::Bulk(b"nodeid".to_vec()),
        ]);
        assert_eq!(decode_node_addr(&node).unwrap(), "127.0.0.1:7000");
    }

    #[test]
    fn decode_slot_entry_collects_replicas() {
        let entry = Reply::Array(vec![
            Reply::Integer(0),
            Reply::Integer(5460),
            Reply::Array(vec![Reply::Bulk(b"host1".to_vec()), Reply::Integer(7000)]),
            Reply::Array(vec![Reply::Bulk(b"host2".to_vec()), Reply::Integer(7001)]),
        ]);
        let range = decode_slot_entry(&entry).unwrap();
        assert_eq!(range.start, 0);
        assert_eq!(range.end, 5460);
        assert_eq!(range.master, "host1:7000");
        assert_eq!(range.replicas, vec!["host2:7001".to_string()]);
    }
}
