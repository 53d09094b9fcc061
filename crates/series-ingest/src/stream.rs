//! Per-series value stream appends. Grounded verbatim on
//! `series_stream_value`/`series_stream_append`/`redis_series_streamed` in
//! the original C source (read in full; the type-to-format mapping and the
//! error/scalar/zero-instance/instanced branch order are transcribed
//! exactly). See `SPEC_FULL.md` §4.8.

use crate::model::{Id, Metric, Samples, Value};
use crate::token::{Completion, LoadToken};
use series_wire::command::{Arg, Command};
use series_wire::hash;
use series_wire::router::Router;
use series_wire::Reply;

/// The original's sentinel for a type code this layer doesn't know how to
/// encode (PCP's `PM_ERR_NYI`, "functionality not yet implemented").
const PM_ERR_NYI: i32 = -12380;

/// Append one stream entry per name-hash for `metric`, if its `updated`
/// flag is set. A no-op otherwise, mirroring the original's
/// `metric->updated == 0` early return.
pub fn append(router: &Router, token: &LoadToken, source: &Id, metric: &Metric, timestamp: &str) {
    if !metric.updated {
        return;
    }

    let pairs = encode_pairs(metric);
    for name in &metric.names {
        let series = metric.series_hash(source, name);
        submit_xadd(router, token, &series, timestamp, &pairs);
    }
}

fn encode_pairs(metric: &Metric) -> Vec<(Vec<u8>, Vec<u8>)> {
    if let Some(errno) = metric.error {
        return vec![(b"-1".to_vec(), errno.to_string().into_bytes())];
    }

    match &metric.samples {
        Samples::Scalar(value) => vec![(Vec::new(), encode_value(value))],
        Samples::Instances(values) if values.is_empty() => {
            vec![(b"0".to_vec(), b"0".to_vec())]
        }
        Samples::Instances(values) => values
            .iter()
            .filter_map(|(inst_id, value)| {
                metric
                    .instances
                    .iter()
                    .find(|inst| inst.inst == *inst_id)
                    .map(|inst| (inst.name.id.to_vec(), encode_value(value)))
            })
            .collect(),
    }
}

fn encode_value(value: &Value) -> Vec<u8> {
    match value {
        Value::I32(v) => v.to_string().into_bytes(),
        Value::U32(v) => v.to_string().into_bytes(),
        Value::I64(v) => v.to_string().into_bytes(),
        Value::U64(v) => v.to_string().into_bytes(),
        Value::Float(v) => format!("{:e}", v).into_bytes(),
        Value::Double(v) => format!("{:e}", v).into_bytes(),
        Value::String(s) => s.clone().unwrap_or_else(|| "<null>".to_string()).into_bytes(),
        Value::Aggregate(b) => b.clone().unwrap_or_else(|| b"<null>".to_vec()),
        Value::Unsupported => PM_ERR_NYI.to_string().into_bytes(),
    }
}

fn submit_xadd(router: &Router, token: &LoadToken, series: &Id, timestamp: &str, pairs: &[(Vec<u8>, Vec<u8>)]) {
    let key = format!("pcp:values:series:{}", hash::hex(series));
    let mut args = vec![Arg::from("XADD"), Arg::from(key), Arg::from(timestamp.to_string())];
    for (field, value) in pairs {
        args.push(Arg::from(field.clone()));
        args.push(Arg::from(value.clone()));
    }
    let cmd = Command::new(&args, Some(1));

    let router = router.clone();
    token.register(Completion::Stream, async move {
        match router.request(cmd).await {
            Ok(Reply::Error(msg)) if msg.contains("ESTREAMXADD") => {
                tracing::warn!(error = %msg, "duplicate or early stream insert");
            }
            Ok(Reply::Error(msg)) => tracing::warn!(error = %msg, "server rejected stream append"),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "stream append failed"),
        }
        Completion::Stream
    });
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{Desc, Indom, Name, Pmid, Samples, Semantics, ValueType};

    fn desc(indom: Option<Indom>) -> Desc {
        Desc {
            pmid: Pmid { domain: 60, cluster: 0, item: 2 },
            indom,
            semantics: Semantics::Counter,
            units: "none".to_string(),
            kind: ValueType::I32,
        }
    }

    #[test]
    fn scalar_metric_encodes_single_empty_named_pair() {
        let metric = Metric {
            names: vec![Name::new("kernel.all.load")],
            desc: desc(None),
            instances: vec![],
            labels: vec![],
            samples: Samples::Scalar(Value::I32(42)),
            updated: true,
            error: None,
        };
        let pairs = encode_pairs(&metric);
        assert_eq!(pairs, vec![(Vec::new(), b"42".to_vec())]);
    }

    #[test]
    fn metric_error_overrides_samples() {
        let metric = Metric {
            names: vec![Name::new("kernel.all.load")],
            desc: desc(None),
            instances: vec![],
            labels: vec![],
            samples: Samples::Scalar(Value::I32(0)),
            updated: true,
            error: Some(-12345),
        };
        let pairs = encode_pairs(&metric);
        assert_eq!(pairs, vec![(b"-1".to_vec(), b"-12345".to_vec())]);
    }

    #[test]
    fn zero_instances_present_encodes_sentinel_pair() {
        let metric = Metric {
            names: vec![Name::new("disk.dev.read")],
            desc: desc(Some(Indom { domain: 60, serial: 3 })),
            instances: vec![],
            labels: vec![],
            samples: Samples::Instances(vec![]),
            updated: true,
            error: None,
        };
        let pairs = encode_pairs(&metric);
        assert_eq!(pairs, vec![(b"0".to_vec(), b"0".to_vec())]);
    }

    #[test]
    fn unmatched_instance_id_is_skipped() {
        let metric = Metric {
            names: vec![Name::new("disk.dev.read")],
            desc: desc(Some(Indom { domain: 60, serial: 3 })),
            instances: vec![],
            labels: vec![],
            samples: Samples::Instances(vec![(7, Value::I32(1))]),
            updated: true,
            error: None,
        };
        assert!(encode_pairs(&metric).is_empty());
    }

    #[test]
    fn unupdated_metric_appends_nothing() {
        assert!(!Metric {
            names: vec![Name::new("kernel.all.load")],
            desc: desc(None),
            instances: vec![],
            labels: vec![],
            samples: Samples::Scalar(Value::I32(1)),
            updated: false,
            error: None,
        }
        .updated);
    }
}
