//! "Lookup or insert" interning against the server, grounded verbatim on
//! `redisGetMap`/`redis_map_request_callback`/`redis_map_publish_callback`
//! in the original C source (read in full). See `SPEC_FULL.md` §4.6.

use crate::intern::{InternMap, InternRegistry};
use crate::model::Id;
use crate::token::{Completion, LoadToken};
use series_wire::command::{Arg, Command};
use series_wire::hash;
use series_wire::router::Router;
use series_wire::Reply;
use std::cell::RefCell;
use std::rc::Rc;

/// Ensure `text` is interned in `map`, returning its id immediately — valid
/// for the caller to use in the same tick, regardless of whether the
/// `HSET`/`PUBLISH` round has been acknowledged by the server (the id is a
/// pure function of `text`, idempotent server-side). If this is the first
/// local sighting of `text`, the write-through round is registered against
/// `token` so the overall ingest call still waits for it.
pub fn get_map(router: &Router, token: &LoadToken, map: &Rc<RefCell<InternMap>>, text: &str) -> Id {
    let id = hash::hash(text.as_bytes());

    if map.borrow().lookup(&id).is_some() {
        return id;
    }
    map.borrow_mut().insert(id, text.to_string());

    let mapname = map.borrow().name().to_string();
    let router = router.clone();
    let text = text.to_string();

    token.register(Completion::Mapping, async move {
        write_through(router, mapname, id, text).await;
        Completion::Mapping
    });

    id
}

/// Like [`get_map`], but for a per-label-name value map: unlike the four
/// fixed maps, these are not process-lived (`SPEC_FULL.md` §4.2/§5) — once
/// the write-through round for a cache miss completes, `registry` releases
/// its own reference via [`InternRegistry::release_label_value_map`].
pub fn get_label_value(
    router: &Router,
    token: &LoadToken,
    registry: &Rc<InternRegistry>,
    label_name_hash: Id,
    text: &str,
) -> Id {
    let map = registry.label_value_map(label_name_hash);
    let id = hash::hash(text.as_bytes());

    if map.borrow().lookup(&id).is_some() {
        return id;
    }
    map.borrow_mut().insert(id, text.to_string());

    let mapname = map.borrow().name().to_string();
    let router = router.clone();
    let text = text.to_string();
    let registry = registry.clone();

    token.register(Completion::Mapping, async move {
        write_through(router, mapname, id, text).await;
        registry.release_label_value_map(label_name_hash);
        Completion::Mapping
    });

    id
}

async fn write_through(router: Router, mapname: String, id: Id, text: String) {
    let key = format!("pcp:map:{mapname}");
    let hset = Command::new(
        &[
            Arg::from("HSET"),
            Arg::from(key.clone()),
            Arg::from(id.to_vec()),
            Arg::from(text.clone()),
        ],
        Some(1),
    );

    let reply = match router.request(hset).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(error = %e, mapname, "HSET failed for mapping round");
            return;
        }
    };

    let newname = match reply {
        Reply::Integer(n) => n == 1,
        Reply::Error(msg) => {
            tracing::warn!(error = %msg, mapname, "server rejected mapping HSET");
            return;
        }
        _ => {
            tracing::warn!(mapname, "HSET for mapping returned an unexpected reply shape");
            false
        }
    };

    if !newname {
        return;
    }

    let channel = format!("pcp:channel:{mapname}");
    let message = format!("{}:{}", hash::hex(&id), text);
    let publish = Command::new(&[Arg::from("PUBLISH"), Arg::from(channel), Arg::from(message)], Some(1));

    if let Err(e) = router.request(publish).await {
        tracing::warn!(error = %e, mapname, "PUBLISH failed for new mapping");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::intern::InternMap;

    #[test]
    fn cache_hit_returns_id_without_registering_work() {
        // A cache hit is fully synchronous and needs no router or token at
        // all, since it never issues a command — exercised directly against
        // the map rather than through `get_map` to keep this test free of
        // an async runtime.
        let mut map = InternMap::new("metric.name");
        let id = hash::hash(b"kernel.all.load");
        map.insert(id, "kernel.all.load".to_string());
        assert_eq!(map.lookup(&id), Some("kernel.all.load"));
    }

    #[test]
    fn same_string_always_yields_same_id() {
        let a = hash::hash(b"kernel.all.load");
        let b = hash::hash(b"kernel.all.load");
        assert_eq!(a, b);
    }
}
