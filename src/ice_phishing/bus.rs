//! Alert delivery
//!
//! Publish/subscribe fan-out for alerts raised by the engine, with a bounded
//! buffer of recently published alerts.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::ice_phishing::alerts::{Alert, AlertCategory, Severity};

/// An alert together with where and when it was raised
#[derive(Debug, Clone, Serialize)]
pub struct PublishedAlert {
    pub alert: Alert,
    pub block_number: u64,
    pub published_at: DateTime<Utc>,
}

/// Alert subscriber
pub trait AlertSubscriber: Send + Sync {
    fn on_alert(&self, alert: &PublishedAlert);

    fn name(&self) -> &str;

    /// Alert ids this subscriber wants; empty means all
    fn interested_alerts(&self) -> Vec<&'static str> {
        vec![]
    }
}

/// Alert bus
pub struct AlertBus {
    subscribers: Mutex<Vec<Arc<dyn AlertSubscriber>>>,
    buffer: Mutex<VecDeque<PublishedAlert>>,
    buffer_size: usize,
}

impl AlertBus {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            buffer: Mutex::new(VecDeque::with_capacity(buffer_size)),
            buffer_size,
        }
    }

    pub fn subscribe(&self, subscriber: Arc<dyn AlertSubscriber>) {
        info!(subscriber = subscriber.name(), "Alert subscriber registered");
        self.subscribers.lock().push(subscriber);
    }

    pub fn unsubscribe(&self, subscriber_name: &str) {
        self.subscribers.lock().retain(|s| s.name() != subscriber_name);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Publish every alert raised at `block_number`
    pub fn publish_all(&self, alerts: Vec<Alert>, block_number: u64) {
        for alert in alerts {
            self.publish(alert, block_number);
        }
    }

    pub fn publish(&self, alert: Alert, block_number: u64) {
        let published = PublishedAlert {
            alert,
            block_number,
            published_at: Utc::now(),
        };

        if self.buffer_size > 0 {
            let mut buffer = self.buffer.lock();
            if buffer.len() >= self.buffer_size {
                buffer.pop_front();
            }
            buffer.push_back(published.clone());
        }

        let subscribers = self.subscribers.lock().clone();
        for subscriber in subscribers {
            let interested = subscriber.interested_alerts();
            if interested.is_empty() || interested.contains(&published.alert.alert_id.as_str()) {
                subscriber.on_alert(&published);
            }
        }
    }

    /// Most recent alerts, oldest first
    pub fn get_recent_alerts(&self, count: usize) -> Vec<PublishedAlert> {
        let buffer = self.buffer.lock();
        let start = buffer.len().saturating_sub(count);
        buffer.iter().skip(start).cloned().collect()
    }

    pub fn clear_buffer(&self) {
        self.buffer.lock().clear();
    }
}

impl Default for AlertBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Writes every alert to the log
pub struct LoggingSubscriber {
    name: String,
}

impl LoggingSubscriber {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl AlertSubscriber for LoggingSubscriber {
    fn on_alert(&self, published: &PublishedAlert) {
        let alert = &published.alert;
        let metadata = serde_json::to_string(&alert.metadata).unwrap_or_default();
        warn!(
            alert_id = %alert.alert_id,
            severity = ?alert.severity,
            category = ?alert.category,
            block = published.block_number,
            metadata = %metadata,
            "🚨 {}: {}",
            alert.title,
            alert.description
        );
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Counts alerts by severity and category
pub struct StatisticsSubscriber {
    name: String,
    stats: Mutex<AlertStatistics>,
}

impl StatisticsSubscriber {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stats: Mutex::new(AlertStatistics::default()),
        }
    }

    pub fn get_statistics(&self) -> AlertStatistics {
        self.stats.lock().clone()
    }

    pub fn reset_statistics(&self) {
        *self.stats.lock() = AlertStatistics::default();
    }
}

impl AlertSubscriber for StatisticsSubscriber {
    fn on_alert(&self, published: &PublishedAlert) {
        let mut stats = self.stats.lock();
        stats.total_alerts += 1;

        match published.alert.severity {
            Severity::Low => stats.low += 1,
            Severity::Medium => stats.medium += 1,
            Severity::High => stats.high += 1,
            Severity::Critical => stats.critical += 1,
        }
        match published.alert.category {
            AlertCategory::Suspicious => stats.suspicious += 1,
            AlertCategory::Exploit => stats.exploits += 1,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Alert statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertStatistics {
    pub total_alerts: u64,
    pub low: u64,
    pub medium: u64,
    pub high: u64,
    pub critical: u64,
    pub suspicious: u64,
    pub exploits: u64,
}

impl AlertStatistics {
    pub fn exploit_rate(&self) -> f64 {
        if self.total_alerts == 0 {
            0.0
        } else {
            self.exploits as f64 / self.total_alerts as f64
        }
    }
}
