// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Helpers for asserting on exported metrics.

use opentelemetry_sdk::metrics::data::{AggregatedMetrics, MetricData, ResourceMetrics, ScopeMetrics, SumDataPoint};
use opentelemetry_sdk::metrics::{InMemoryMetricExporter, SdkMeterProvider};

use crate::metrics::{GROUP_EVENT, GROUP_EVENT_COUNT_NAME, GROUP_NAME};
use crate::stats::GroupEvent;

/// Collects the metrics of one meter provider in memory.
#[derive(Debug)]
pub(crate) struct MetricTester {
    exporter: InMemoryMetricExporter,
    provider: SdkMeterProvider,
}

impl MetricTester {
    #[must_use]
    pub fn new() -> Self {
        let in_memory = InMemoryMetricExporter::default();

        Self {
            exporter: in_memory.clone(),
            provider: SdkMeterProvider::builder().with_periodic_exporter(in_memory).build(),
        }
    }

    #[must_use]
    pub fn meter_provider(&self) -> &SdkMeterProvider {
        &self.provider
    }

    /// Flushes the provider and returns the cumulative count of `event` for `group`.
    #[must_use]
    pub fn event_count(&self, group: &str, event: GroupEvent) -> u64 {
        self.provider.force_flush().expect("metrics flush");
        let exported = self.exporter.get_finished_metrics().expect("exported metrics");

        exported
            .last()
            .into_iter()
            .flat_map(ResourceMetrics::scope_metrics)
            .flat_map(ScopeMetrics::metrics)
            .filter(|metric| metric.name() == GROUP_EVENT_COUNT_NAME)
            .flat_map(|metric| match metric.data() {
                AggregatedMetrics::U64(MetricData::Sum(sum)) => sum
                    .data_points()
                    .filter(|point| has_attribute(point, GROUP_NAME, group) && has_attribute(point, GROUP_EVENT, event.as_str()))
                    .map(SumDataPoint::value)
                    .collect::<Vec<_>>(),
                _ => Vec::new(),
            })
            .sum()
    }
}

fn has_attribute(point: &SumDataPoint<u64>, key: &str, value: &str) -> bool {
    point.attributes().any(|kv| kv.key.as_str() == key && kv.value.as_str() == value)
}
