// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::settings::MetricsSettings;
use crate::domain::models::attempt::AttemptStatus;
use crate::domain::models::run::RunState;

pub const RUNS_SUBMITTED: &str = "crawl_runs_submitted_total";
pub const RUNS_FINISHED: &str = "crawl_runs_finished_total";
pub const ATTEMPTS: &str = "crawl_attempts_total";
pub const ATTEMPT_DURATION: &str = "crawl_attempt_duration_seconds";
pub const RECORDS_STORED: &str = "content_records_stored_total";
pub const DUPLICATES: &str = "content_duplicates_total";
pub const PAYLOAD_PENDING: &str = "payload_pending_total";
pub const PAYLOAD_REPAIRED: &str = "payload_repaired_total";

/// 初始化指标系统
///
/// 安装 Prometheus 记录器并注册指标说明。地址被占用时只记录警告。
pub fn init_metrics(settings: &MetricsSettings) {
    if !settings.enabled {
        info!("Metrics exporter disabled");
        return;
    }

    let addr: SocketAddr = match settings.listen.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Invalid metrics listen address {}: {}", settings.listen, e);
            return;
        }
    };

    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!(
            "Failed to install Prometheus recorder: {}. This might happen if the port is already in use.",
            e
        );
        return;
    }

    describe_counter!(RUNS_SUBMITTED, "Total number of runs admitted");
    describe_counter!(RUNS_FINISHED, "Total number of runs that reached a terminal state");
    describe_counter!(ATTEMPTS, "Total number of task attempts by outcome");
    describe_histogram!(ATTEMPT_DURATION, "Duration of task attempts in seconds");
    describe_counter!(RECORDS_STORED, "Total number of new content records");
    describe_counter!(DUPLICATES, "Total number of units skipped as duplicates");
    describe_counter!(PAYLOAD_PENDING, "Total number of records left payload_pending");
    describe_counter!(PAYLOAD_REPAIRED, "Total number of payload_pending records repaired");

    info!("Metrics exporter listening on {}", addr);
}

pub fn record_submitted(source: &str) {
    counter!(RUNS_SUBMITTED, "source" => source.to_string()).increment(1);
}

pub fn record_finished(source: &str, state: RunState) {
    counter!(RUNS_FINISHED, "source" => source.to_string(), "state" => state.as_str()).increment(1);
}

pub fn record_attempt(source: &str, status: AttemptStatus, elapsed: Duration) {
    counter!(
        ATTEMPTS,
        "source" => source.to_string(),
        "outcome" => status.to_string()
    )
    .increment(1);
    histogram!(ATTEMPT_DURATION, "source" => source.to_string()).record(elapsed.as_secs_f64());
}

pub fn record_stored(source: &str, payload_pending: bool) {
    counter!(RECORDS_STORED, "source" => source.to_string()).increment(1);
    if payload_pending {
        counter!(PAYLOAD_PENDING, "source" => source.to_string()).increment(1);
    }
}

pub fn record_duplicate(source: &str) {
    counter!(DUPLICATES, "source" => source.to_string()).increment(1);
}

pub fn record_repaired(count: u64) {
    counter!(PAYLOAD_REPAIRED).increment(count);
}
