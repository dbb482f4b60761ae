//! Summary metric (count + sum, no quantiles).
//!
//! The prometheus crate ships no summary type, so this one is built the same
//! way the other vec types are: children keyed by label values in a `DashMap`,
//! values held in atomics, exposed through the `Collector` trait.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use prometheus::core::{Collector, Desc};
use prometheus::proto::{self, LabelPair, Metric, MetricFamily, MetricType};

use mpmetrics_core::error::{MetricsError, Result};

#[derive(Debug, Default)]
struct SummaryCore {
    count: AtomicU64,
    sum_bits: AtomicU64,
}

/// One labelled summary series.
#[derive(Debug, Clone)]
pub struct Summary {
    core: Arc<SummaryCore>,
}

impl Summary {
    /// Record one observation.
    pub fn observe(&self, v: f64) {
        let mut current = self.core.sum_bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + v).to_bits();
            match self.core.sum_bits.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        self.core.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_sample_count(&self) -> u64 {
        self.core.count.load(Ordering::Relaxed)
    }

    pub fn get_sample_sum(&self) -> f64 {
        f64::from_bits(self.core.sum_bits.load(Ordering::Relaxed))
    }
}

struct SummaryVecInner {
    desc: Desc,
    children: DashMap<Vec<String>, Summary>,
}

/// Summary partitioned by label values.
#[derive(Clone)]
pub struct SummaryVec {
    inner: Arc<SummaryVecInner>,
}

impl SummaryVec {
    pub fn new(fq_name: &str, help: &str, label_names: &[String]) -> Result<Self> {
        let desc = Desc::new(
            fq_name.to_string(),
            help.to_string(),
            label_names.to_vec(),
            HashMap::new(),
        )
        .map_err(|e| MetricsError::Configuration(format!("invalid summary {fq_name}: {e}")))?;

        Ok(Self {
            inner: Arc::new(SummaryVecInner {
                desc,
                children: DashMap::new(),
            }),
        })
    }

    /// Child for the given label values, created on first use.
    pub fn get_metric_with_label_values(&self, vals: &[&str]) -> Result<Summary> {
        let expected = self.inner.desc.variable_labels.len();
        if vals.len() != expected {
            return Err(MetricsError::Configuration(format!(
                "{}: expected {expected} label values, got {}",
                self.inner.desc.fq_name,
                vals.len()
            )));
        }
        let key: Vec<String> = vals.iter().map(|v| v.to_string()).collect();
        let child = self
            .inner
            .children
            .entry(key)
            .or_insert_with(|| Summary {
                core: Arc::new(SummaryCore::default()),
            });
        Ok(child.value().clone())
    }

    /// Like [`get_metric_with_label_values`](Self::get_metric_with_label_values).
    ///
    /// # Panics
    /// On a label cardinality mismatch, like the prometheus vec types.
    pub fn with_label_values(&self, vals: &[&str]) -> Summary {
        match self.get_metric_with_label_values(vals) {
            Ok(s) => s,
            Err(e) => panic!("{e}"),
        }
    }
}

impl Collector for SummaryVec {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.inner.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let desc = &self.inner.desc;

        let mut children: Vec<(Vec<String>, Summary)> = self
            .inner
            .children
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        children.sort_by(|a, b| a.0.cmp(&b.0));

        let mut mf = MetricFamily::default();
        mf.set_name(desc.fq_name.clone());
        mf.set_help(desc.help.clone());
        mf.set_field_type(MetricType::SUMMARY);

        for (values, child) in children {
            let mut labels: Vec<(&String, String)> =
                desc.variable_labels.iter().zip(values).collect();
            labels.sort();

            let mut m = Metric::default();
            for (name, value) in labels {
                let mut lp = LabelPair::default();
                lp.set_name(name.clone());
                lp.set_value(value);
                m.mut_label().push(lp);
            }
            let mut s = proto::Summary::default();
            s.set_sample_count(child.get_sample_count());
            s.set_sample_sum(child.get_sample_sum());
            m.set_summary(s);
            mf.mut_metric().push(m);
        }

        vec![mf]
    }
}
