//! Merge-on-read collector over every shard in the shared directory.

use std::collections::BTreeMap;

use prometheus::proto::{self, LabelPair, Metric, MetricFamily};
use serde::Deserialize;

use super::directory::SharedStateDirectory;
use super::shard::{MetricKind, SampleValue, Shard};

/// How gauge values from different processes are combined.
///
/// Counters, histograms and summaries are always summed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GaugeMode {
    /// Sum across processes.
    #[default]
    Sum,
    Max,
    Min,
    /// Value from the most recently written shard.
    MostRecent,
    /// Keep one series per process, distinguished by a `pid` label.
    All,
}

type Labels = Vec<(String, String)>;

#[derive(Debug)]
enum Acc {
    Value { value: f64, at_ms: u64 },
    Histogram { buckets: Vec<(f64, u64)>, sum: f64, count: u64 },
    Summary { sum: f64, count: u64 },
}

#[derive(Debug)]
struct FamilyAcc {
    kind: MetricKind,
    help: String,
    series: BTreeMap<Labels, Acc>,
}

#[derive(Debug, Clone)]
pub struct MultiProcessCollector {
    dir: SharedStateDirectory,
    gauge_mode: GaugeMode,
}

impl MultiProcessCollector {
    pub fn new(dir: SharedStateDirectory, gauge_mode: GaugeMode) -> Self {
        Self { dir, gauge_mode }
    }

    /// Read every shard and merge same-named series. Never fails: an
    /// unreadable directory or shard is logged and contributes nothing.
    pub fn collect(&self) -> Vec<MetricFamily> {
        let files = match self.dir.shard_files() {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list shard directory");
                return Vec::new();
            }
        };

        let mut families: BTreeMap<String, FamilyAcc> = BTreeMap::new();
        for (kind, pid, path) in files {
            let shard = match Shard::read(&path) {
                Ok(shard) => shard,
                Err(e) => {
                    // Removed by mark_process_dead or a reset since listing.
                    tracing::warn!(shard = %path.display(), error = %e, "skipping shard");
                    continue;
                }
            };
            for family in shard.families {
                let acc = families
                    .entry(family.name.clone())
                    .or_insert_with(|| FamilyAcc {
                        kind,
                        help: family.help.clone(),
                        series: BTreeMap::new(),
                    });
                if acc.kind != kind {
                    tracing::warn!(
                        metric = %family.name,
                        expected = acc.kind.as_str(),
                        found = kind.as_str(),
                        "metric kind differs between shards; skipping"
                    );
                    continue;
                }
                for sample in family.samples {
                    let mut labels = sample.labels;
                    if kind == MetricKind::Gauge && self.gauge_mode == GaugeMode::All {
                        labels.push(("pid".to_string(), pid.to_string()));
                        labels.sort();
                    }
                    self.merge(&family.name, acc, labels, sample.value, shard.written_at_ms);
                }
            }
        }

        families
            .into_iter()
            .filter(|(_, f)| !f.series.is_empty())
            .map(|(name, f)| to_proto(name, f))
            .collect()
    }

    fn merge(
        &self,
        name: &str,
        acc: &mut FamilyAcc,
        labels: Labels,
        value: SampleValue,
        at_ms: u64,
    ) {
        use std::collections::btree_map::Entry;

        let kind = acc.kind;
        let incoming = match value {
            SampleValue::Counter { value } | SampleValue::Gauge { value } => Acc::Value { value, at_ms },
            SampleValue::Histogram { buckets, sum, count } => Acc::Histogram { buckets, sum, count },
            SampleValue::Summary { sum, count } => Acc::Summary { sum, count },
        };

        let slot = match acc.series.entry(labels) {
            Entry::Vacant(v) => {
                v.insert(incoming);
                return;
            }
            Entry::Occupied(o) => o.into_mut(),
        };

        match (slot, incoming) {
            (Acc::Value { value, at_ms }, Acc::Value { value: v, at_ms: t }) => {
                if kind == MetricKind::Counter {
                    *value += v;
                    return;
                }
                match self.gauge_mode {
                    GaugeMode::Sum | GaugeMode::All => *value += v,
                    GaugeMode::Max => *value = value.max(v),
                    GaugeMode::Min => *value = value.min(v),
                    GaugeMode::MostRecent => {
                        if t >= *at_ms {
                            *value = v;
                            *at_ms = t;
                        }
                    }
                }
            }
            (
                Acc::Histogram { buckets, sum, count },
                Acc::Histogram { buckets: b, sum: s, count: c },
            ) => {
                // Cumulative counts only add up over identical bounds.
                let same_layout =
                    buckets.len() == b.len() && buckets.iter().zip(&b).all(|(x, y)| x.0 == y.0);
                if !same_layout {
                    tracing::warn!(
                        metric = name,
                        "histogram bucket bounds differ between shards; skipping sample"
                    );
                    return;
                }
                for ((_, n), (_, cumulative)) in buckets.iter_mut().zip(b) {
                    *n += cumulative;
                }
                *sum += s;
                *count += c;
            }
            (Acc::Summary { sum, count }, Acc::Summary { sum: s, count: c }) => {
                *sum += s;
                *count += c;
            }
            // Shape is fixed by kind, which was checked by the caller.
            _ => {}
        }
    }
}

fn to_proto(name: String, family: FamilyAcc) -> MetricFamily {
    let mut mf = MetricFamily::default();
    mf.set_name(name);
    mf.set_help(family.help);
    mf.set_field_type(family.kind.proto());

    for (labels, acc) in family.series {
        let mut m = Metric::default();
        for (k, v) in labels {
            let mut lp = LabelPair::default();
            lp.set_name(k);
            lp.set_value(v);
            m.mut_label().push(lp);
        }
        match acc {
            Acc::Value { value, .. } if family.kind == MetricKind::Counter => {
                let mut c = proto::Counter::default();
                c.set_value(value);
                m.set_counter(c);
            }
            Acc::Value { value, .. } => {
                let mut g = proto::Gauge::default();
                g.set_value(value);
                m.set_gauge(g);
            }
            Acc::Histogram { buckets, sum, count } => {
                let mut h = proto::Histogram::default();
                for (bound, cumulative) in buckets {
                    let mut b = proto::Bucket::default();
                    b.set_upper_bound(bound);
                    b.set_cumulative_count(cumulative);
                    h.mut_bucket().push(b);
                }
                h.set_sample_sum(sum);
                h.set_sample_count(count);
                m.set_histogram(h);
            }
            Acc::Summary { sum, count } => {
                let mut s = proto::Summary::default();
                s.set_sample_sum(sum);
                s.set_sample_count(count);
                m.set_summary(s);
            }
        }
        mf.mut_metric().push(m);
    }
    mf
}
