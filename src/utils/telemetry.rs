// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::settings::TelemetrySettings;

/// 初始化日志订阅器
///
/// `RUST_LOG` 未设置时默认 `info,crawlkeeper=debug`；`format = "json"` 时输出结构化 JSON
pub fn init_telemetry(settings: &TelemetrySettings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,crawlkeeper=debug".into());

    let registry = tracing_subscriber::registry().with(filter);

    if settings.format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
