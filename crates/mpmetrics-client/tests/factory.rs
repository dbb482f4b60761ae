//! Metric factory defaults and registration rules (in-process registry).

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;

use mpmetrics_client::config::MetricsConfig;
use mpmetrics_client::{MetricFactory, MetricOpts, MetricsClient, MultiprocRegistry};
use mpmetrics_core::{ErrorKind, CUSTOM_BUCKETS};

fn local(namespace: &str) -> MetricsClient {
    MetricsClient::new(&MetricsConfig::local(namespace)).unwrap()
}

fn scrape(client: &MetricsClient) -> String {
    String::from_utf8(client.generate_latest().unwrap().to_vec()).unwrap()
}

#[test]
fn names_are_prefixed_with_the_namespace() {
    let client = local("bentoml");
    client
        .counter(MetricOpts::new("requests_total", "Total requests").labels(&["endpoint"]))
        .unwrap()
        .with_label_values(&["/predict"])
        .inc();

    let body = scrape(&client);
    assert!(body.contains("# TYPE bentoml_requests_total counter"));
    assert!(body.contains("bentoml_requests_total{endpoint=\"/predict\"} 1"));
}

#[test]
fn empty_namespace_keeps_bare_names() {
    let client = local("");
    client
        .gauge(MetricOpts::new("in_flight", "In-flight requests"))
        .unwrap()
        .with_label_values(&[])
        .set(3.0);

    assert!(scrape(&client).contains("\nin_flight 3\n"));
}

#[test]
fn histogram_defaults_to_the_shared_bucket_set() {
    let client = local("svc");
    let h = client
        .histogram(MetricOpts::new("latency_seconds", "Request latency"))
        .unwrap();
    h.with_label_values(&[]).observe(0.2);

    let body = scrape(&client);
    let buckets = body
        .lines()
        .filter(|l| l.starts_with("svc_latency_seconds_bucket"))
        .count();
    assert_eq!(buckets, CUSTOM_BUCKETS.len() + 1);
    assert!(body.contains("svc_latency_seconds_bucket{le=\"0.0005\"} 0"));
    assert!(body.contains("svc_latency_seconds_bucket{le=\"0.2\"} 1"));
    assert!(body.contains("svc_latency_seconds_bucket{le=\"360\"} 1"));
    assert!(body.contains("svc_latency_seconds_count 1"));
}

#[test]
fn explicit_buckets_win_over_the_default() {
    let client = local("svc");
    client
        .histogram(MetricOpts::new("batch_size", "Batch size").buckets(vec![1.0, 8.0, 32.0]))
        .unwrap()
        .with_label_values(&[])
        .observe(4.0);

    let body = scrape(&client);
    assert!(body.contains("svc_batch_size_bucket{le=\"8\"} 1"));
    assert!(!body.contains("le=\"0.0005\""));
}

#[test]
fn same_name_and_labels_is_the_same_series() {
    let client = local("svc");
    let opts = MetricOpts::new("errors_total", "Errors").labels(&["code"]);
    let a = client.counter(opts.clone()).unwrap();
    let b = client.counter(opts).unwrap();
    a.with_label_values(&["500"]).inc();
    b.with_label_values(&["500"]).inc();

    assert_eq!(a.with_label_values(&["500"]).get(), 2.0);
    assert!(scrape(&client).contains("svc_errors_total{code=\"500\"} 2"));
}

#[test]
fn incompatible_redefinition_is_a_duplicate() {
    let client = local("svc");
    client
        .counter(MetricOpts::new("errors_total", "Errors").labels(&["code"]))
        .unwrap();

    let err = client
        .counter(MetricOpts::new("errors_total", "Errors").labels(&["route"]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateMetric);

    let err = client
        .gauge(MetricOpts::new("errors_total", "Errors").labels(&["code"]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateMetric);
    assert!(err.to_string().contains("already registered as counter with labels"), "{err}");

    client
        .histogram(MetricOpts::new("lat", "Latency"))
        .unwrap();
    let err = client
        .histogram(MetricOpts::new("lat", "Latency").buckets(vec![1.0]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateMetric);
}

#[test]
fn factories_with_different_namespaces_share_a_registry() {
    let registry = Arc::new(MultiprocRegistry::local_only());
    let api = MetricFactory::new("api", Arc::clone(&registry));
    let runner = MetricFactory::new("runner", Arc::clone(&registry));

    api.counter(MetricOpts::new("calls_total", "Calls")).unwrap().with_label_values(&[]).inc();
    runner.counter(MetricOpts::new("calls_total", "Calls")).unwrap().with_label_values(&[]).inc_by(2.0);

    let body = String::from_utf8(mpmetrics_client::exposition::generate_latest(&registry).unwrap().to_vec()).unwrap();
    assert!(body.contains("api_calls_total 1"));
    assert!(body.contains("runner_calls_total 2"));
}

#[test]
fn summary_exposes_sum_and_count() {
    let client = local("svc");
    let s = client
        .summary(MetricOpts::new("payload_bytes", "Payload size").labels(&["route"]))
        .unwrap();
    s.with_label_values(&["a"]).observe(1.5);
    s.with_label_values(&["a"]).observe(1.5);

    let body = scrape(&client);
    assert!(body.contains("# TYPE svc_payload_bytes summary"));
    assert!(body.contains("svc_payload_bytes_sum{route=\"a\"} 3"));
    assert!(body.contains("svc_payload_bytes_count{route=\"a\"} 2"));
}

#[test]
fn summary_rejects_wrong_label_cardinality() {
    let client = local("svc");
    let s = client
        .summary(MetricOpts::new("payload_bytes", "Payload size").labels(&["route"]))
        .unwrap();
    let err = s.get_metric_with_label_values(&["a", "b"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn invalid_metric_name_is_a_configuration_error() {
    let client = local("svc");
    let err = client
        .counter(MetricOpts::new("bad-name", "Bad"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn registry_is_built_once() {
    let client = local("svc");
    let a = Arc::clone(client.registry());
    let b = Arc::clone(client.registry());
    assert!(Arc::ptr_eq(&a, &b));
    assert!(!a.is_multiproc());
    assert_eq!(client.content_type(), "text/plain; version=0.0.4; charset=utf-8");
}
