//! Descriptor, name↔series, source↔series, instance, and label index
//! writes. Grounded verbatim on `redis_series_source`/`redis_series_metric`/
//! `redis_series_instance`/`redis_series_labelset`/`redis_series_label` in
//! the original C source (read in full; every key name and command arity
//! transcribed into `SPEC_FULL.md` §4.7 first, then into code). See
//! `SPEC_FULL.md` §9 for the three resolved Open Questions this module
//! settles (the `source` field name, `GEOADD` argument order, and the
//! per-name label-write loop that the original's `names[0]` typo drops).

use crate::intern::InternRegistry;
use crate::model::{Context, Desc, Id, Instance, Label, LabelFlags, Metric};
use crate::token::{Completion, LoadToken};
use crate::mapping;
use series_wire::command::{Arg, Command};
use series_wire::hash;
use series_wire::router::Router;
use series_wire::Reply;
use std::rc::Rc;

/// Register a collection context as a source: interns its name, then
/// writes the source↔context and geo indexes. Issued once per context, not
/// once per metric (see `SPEC_FULL.md` §4.7).
pub fn register_source(router: &Router, token: &LoadToken, registry: &Rc<InternRegistry>, ctx: &Context) {
    let ci = mapping::get_map(router, token, &registry.context_name, &ctx.name.text);
    let cid = ctx.hostid.id;
    let ch = ctx.source_hash();

    submit(
        router,
        token,
        Command::new(
            &[
                Arg::from("SADD"),
                Arg::from(format!("pcp:source:context.name:{}", hash::hex(&ci))),
                Arg::from(ch.to_vec()),
            ],
            Some(1),
        ),
    );
    submit(
        router,
        token,
        Command::new(
            &[
                Arg::from("SADD"),
                Arg::from(format!("pcp:source:context.name:{}", hash::hex(&cid))),
                Arg::from(ch.to_vec()),
            ],
            Some(1),
        ),
    );
    submit(
        router,
        token,
        Command::new(
            &[
                Arg::from("SADD"),
                Arg::from(format!("pcp:context.name:source:{}", hash::hex(&ch))),
                Arg::from(ci.to_vec()),
                Arg::from(cid.to_vec()),
            ],
            Some(1),
        ),
    );

    // Location is `(lat, lon)` per `SPEC_FULL.md` §3; `GEOADD` itself wants
    // `lon` first on the wire (§9's resolved Open Question). Unconditional,
    // per §4.7 — unlike the instance/label sections, this write carries no
    // "if present" qualifier.
    let (lat, lon) = ctx.location;
    submit(
        router,
        token,
        Command::new(
            &[
                Arg::from("GEOADD"),
                Arg::from("pcp:source:location"),
                Arg::from(format!("{lon:.8}")),
                Arg::from(format!("{lat:.8}")),
                Arg::from(ch.to_vec()),
            ],
            Some(1),
        ),
    );
}

/// Write the descriptor, name, source, instance, and label indexes for one
/// metric ingest. Does not write the value stream itself — see
/// [`crate::stream`].
pub fn write_metric(router: &Router, token: &LoadToken, registry: &Rc<InternRegistry>, source: &Id, metric: &Metric) {
    let series: Vec<Id> = metric.names.iter().map(|name| metric.series_hash(source, name)).collect();

    for (name, mh) in metric.names.iter().zip(&series) {
        let mi = mapping::get_map(router, token, &registry.metric_name, &name.text);

        submit(
            router,
            token,
            Command::new(
                &[
                    Arg::from("SADD"),
                    Arg::from(format!("pcp:series:metric.name:{}", hash::hex(&mi))),
                    Arg::from(mh.to_vec()),
                ],
                Some(1),
            ),
        );
        submit(
            router,
            token,
            Command::new(
                &[
                    Arg::from("SADD"),
                    Arg::from(format!("pcp:metric.name:series:{}", hash::hex(mh))),
                    Arg::from(mi.to_vec()),
                ],
                Some(1),
            ),
        );
        submit(router, token, desc_command(mh, source, &metric.desc));
    }

    let mut source_set = vec![
        Arg::from("SADD"),
        Arg::from(format!("pcp:series:source:{}", hash::hex(source))),
    ];
    source_set.extend(series.iter().map(|h| Arg::from(h.to_vec())));
    submit(router, token, Command::new(&source_set, Some(1)));

    if metric.desc.indom.is_some() {
        for instance in &metric.instances {
            write_instance(router, token, registry, source, &series, instance);
        }
    }

    for label in &metric.labels {
        write_label(router, token, registry, &series, &series, label);
    }
    for instance in &metric.instances {
        let ih = instance.name.id;
        for label in &instance.labels {
            write_label(router, token, registry, &[ih], &series, label);
        }
    }
}

fn write_instance(
    router: &Router,
    token: &LoadToken,
    registry: &Rc<InternRegistry>,
    source: &Id,
    series: &[Id],
    instance: &Instance,
) {
    let ii = mapping::get_map(router, token, &registry.inst_name, &instance.name.text);
    let ih = instance.name.id;

    let mut inst_names = vec![
        Arg::from("SADD"),
        Arg::from(format!("pcp:series:inst.name:{}", hash::hex(&ii))),
    ];
    inst_names.extend(series.iter().map(|h| Arg::from(h.to_vec())));
    submit(router, token, Command::new(&inst_names, Some(1)));

    for mh in series {
        submit(
            router,
            token,
            Command::new(
                &[
                    Arg::from("SADD"),
                    Arg::from(format!("pcp:instances:series:{}", hash::hex(mh))),
                    Arg::from(ih.to_vec()),
                ],
                Some(1),
            ),
        );
    }

    submit(
        router,
        token,
        Command::new(
            &[
                Arg::from("HMSET"),
                Arg::from(format!("pcp:inst:series:{}", hash::hex(&ih))),
                Arg::from("inst"),
                Arg::from(instance.inst.to_string()),
                Arg::from("name"),
                Arg::from(ii.to_vec()),
                Arg::from("source"),
                Arg::from(hash::hex(source)),
            ],
            Some(1),
        ),
    );
}

fn write_label(
    router: &Router,
    token: &LoadToken,
    registry: &Rc<InternRegistry>,
    targets: &[Id],
    series: &[Id],
    label: &Label,
) {
    let lnh = mapping::get_map(router, token, &registry.label_name, &label.name.text);
    let lvh = mapping::get_label_value(router, token, registry, lnh, &label.value.text);

    for target in targets {
        if label.flags != LabelFlags::Context {
            submit(
                router,
                token,
                Command::new(
                    &[
                        Arg::from("HMSET"),
                        Arg::from(format!("pcp:labelflags:series:{}", hash::hex(target))),
                        Arg::from(lnh.to_vec()),
                        Arg::from((label.flags as i32).to_string()),
                    ],
                    Some(1),
                ),
            );
        }

        submit(
            router,
            token,
            Command::new(
                &[
                    Arg::from("HMSET"),
                    Arg::from(format!("pcp:labelvalue:series:{}", hash::hex(target))),
                    Arg::from(lnh.to_vec()),
                    Arg::from(lvh.to_vec()),
                ],
                Some(1),
            ),
        );
    }

    let mut index = vec![
        Arg::from("SADD"),
        Arg::from(format!(
            "pcp:series:label.{}.value:{}",
            hash::hex(&lnh),
            hash::hex(&lvh)
        )),
    ];
    index.extend(series.iter().map(|h| Arg::from(h.to_vec())));
    submit(router, token, Command::new(&index, Some(1)));
}

fn desc_command(series: &Id, source: &Id, desc: &Desc) -> Command {
    Command::new(
        &[
            Arg::from("HMSET"),
            Arg::from(format!("pcp:desc:series:{}", hash::hex(series))),
            Arg::from("indom"),
            Arg::from(desc.render_indom()),
            Arg::from("pmid"),
            Arg::from(desc.pmid.render()),
            Arg::from("semantics"),
            Arg::from(desc.semantics.render()),
            Arg::from("source"),
            Arg::from(hash::hex(source)),
            Arg::from("type"),
            Arg::from(desc.kind.render()),
            Arg::from("units"),
            Arg::from(desc.units.clone()),
        ],
        Some(1),
    )
}

fn submit(router: &Router, token: &LoadToken, cmd: Command) {
    let router = router.clone();
    token.register(Completion::Load, async move {
        match router.request(cmd).await {
            Ok(Reply::Error(msg)) => tracing::warn!(error = %msg, "server rejected metadata write"),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "metadata write failed"),
        }
        Completion::Load
    });
}
