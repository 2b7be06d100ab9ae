//! SWx proxy statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Events counted by a metrics recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwxEvent {
    MarSent,
    SarSent,
    MaaReceived,
    SaaReceived,
    SendFailure,
    Timeout,
    UnparseableMessage,
    /// Answer whose Session-Id matches no waiting request
    InvalidSession,
    CacheHit,
    CacheMiss,
    RtrReceived,
    AuthorizationDenied,
}

/// Point-in-time request counters used for health evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub requests: u64,
    pub send_failures: u64,
    pub timeouts: u64,
    pub unparseable: u64,
}

impl HealthSnapshot {
    pub fn failures(&self) -> u64 {
        self.send_failures + self.timeouts + self.unparseable
    }

    /// Counter growth since `baseline`
    ///
    /// A counter that went backwards (recorder replaced) counts from zero.
    pub fn delta(&self, baseline: &HealthSnapshot) -> HealthSnapshot {
        let diff = |now: u64, then: u64| now.checked_sub(then).unwrap_or(now);
        HealthSnapshot {
            requests: diff(self.requests, baseline.requests),
            send_failures: diff(self.send_failures, baseline.send_failures),
            timeouts: diff(self.timeouts, baseline.timeouts),
            unparseable: diff(self.unparseable, baseline.unparseable),
        }
    }
}

/// Sink for proxy events
pub trait MetricsRecorder: Send + Sync {
    fn record(&self, event: SwxEvent);

    /// Current request counters
    fn snapshot(&self) -> HealthSnapshot;
}

/// Atomic counters for one proxy instance
#[derive(Debug, Default)]
pub struct SwxMetrics {
    pub mar_sent: AtomicU64,
    pub sar_sent: AtomicU64,
    pub maa_received: AtomicU64,
    pub saa_received: AtomicU64,
    pub send_failures: AtomicU64,
    pub timeouts: AtomicU64,
    pub unparseable: AtomicU64,
    pub invalid_sessions: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub rtr_received: AtomicU64,
    pub authorization_denials: AtomicU64,
}

impl SwxMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, event: SwxEvent) -> &AtomicU64 {
        match event {
            SwxEvent::MarSent => &self.mar_sent,
            SwxEvent::SarSent => &self.sar_sent,
            SwxEvent::MaaReceived => &self.maa_received,
            SwxEvent::SaaReceived => &self.saa_received,
            SwxEvent::SendFailure => &self.send_failures,
            SwxEvent::Timeout => &self.timeouts,
            SwxEvent::UnparseableMessage => &self.unparseable,
            SwxEvent::InvalidSession => &self.invalid_sessions,
            SwxEvent::CacheHit => &self.cache_hits,
            SwxEvent::CacheMiss => &self.cache_misses,
            SwxEvent::RtrReceived => &self.rtr_received,
            SwxEvent::AuthorizationDenied => &self.authorization_denials,
        }
    }

    /// Current value of the counter behind `event`
    pub fn get(&self, event: SwxEvent) -> u64 {
        self.counter(event).load(Ordering::Relaxed)
    }
}

impl MetricsRecorder for SwxMetrics {
    fn record(&self, event: SwxEvent) {
        self.counter(event).fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            requests: self.get(SwxEvent::MarSent) + self.get(SwxEvent::SarSent),
            send_failures: self.get(SwxEvent::SendFailure),
            timeouts: self.get(SwxEvent::Timeout),
            unparseable: self.get(SwxEvent::UnparseableMessage),
        }
    }
}
