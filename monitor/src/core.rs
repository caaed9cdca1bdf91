//! Core wiring: the bus, the ring, and the standing consumers
//!
//! Both the daemon and the attach-mode viewer build the same in-process
//! core: an event bus fanning out to the ring buffer, statistics, log
//! store, and task projection. Consumers are plain subscriptions, so the
//! test suite can build an isolated core per test.

use std::sync::Arc;

use crate::config::Config;
use crate::events::{EventBus, EventRing, MonitorEvent, SubscriptionId, create_event_bus};
use crate::logs::LogStore;
use crate::projection::TaskProjection;
use crate::stats::StatsAggregator;

/// The daemon's internal consumers, wired to one bus
pub struct MonitorCore {
    pub bus: Arc<EventBus>,
    pub ring: Arc<EventRing>,
    pub projection: Arc<TaskProjection>,
    pub logs: Arc<LogStore>,
    pub stats: Arc<StatsAggregator>,
    subscriptions: Vec<SubscriptionId>,
}

impl MonitorCore {
    /// Build and subscribe the standing consumers
    pub fn new(config: &Config) -> Self {
        let bus = create_event_bus();
        let ring = Arc::new(EventRing::new(config.history));
        let projection = Arc::new(TaskProjection::default());
        let logs = Arc::new(LogStore::new(config.max_log_lines));
        let stats = Arc::new(StatsAggregator::new());

        let subscriptions = vec![
            projection.attach(&bus, config.buffer_size),
            logs.attach(&bus, config.buffer_size),
            stats.attach(&bus, config.buffer_size),
        ];

        Self {
            bus,
            ring,
            projection,
            logs,
            stats,
            subscriptions,
        }
    }

    /// Ingest one locally-sourced event (attach-mode pump, tests)
    ///
    /// Bus before ring, same as the IPC reader, so replay stays
    /// duplicate-free.
    pub fn ingest(&self, event: MonitorEvent) {
        self.bus.publish(&event);
        self.ring.append(event);
    }

    /// Unsubscribe the standing consumers and clear the bus
    pub fn shutdown(&self) {
        for id in &self.subscriptions {
            self.bus.unsubscribe(*id);
        }
        self.bus.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::events::EventPayload;

    fn test_config() -> Config {
        Config::default()
    }

    #[tokio::test]
    async fn test_ingest_reaches_every_consumer() {
        let core = MonitorCore::new(&test_config());
        core.ingest(MonitorEvent::new(
            "T1",
            EventPayload::TaskStarted {
                agent_type: "a".to_string(),
                model_hint: None,
                retry_count: 0,
            },
        ));

        assert_eq!(core.ring.len(), 1);
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let ready = core.projection.len() == 1
                    && core.logs.len() == 1
                    && core.stats.current().session.total_events == 1;
                if ready {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_detaches_consumers() {
        let core = MonitorCore::new(&test_config());
        core.shutdown();
        assert_eq!(core.bus.stats().subscribers, 0);

        // Publishing after shutdown is harmless
        core.ingest(MonitorEvent::new("T1", EventPayload::OrchestratorCompleted));
        assert_eq!(core.ring.len(), 1);
    }
}
