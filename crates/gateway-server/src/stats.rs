//! Process-wide connection counters

use crate::pool::PoolStats;
use gateway_proto::StatusToken;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct GatewayStats {
    accepted: AtomicU64,
    active: AtomicU64,
    accept_retries: AtomicU64,
    bytes_client_to_agent: AtomicU64,
    bytes_agent_to_client: AtomicU64,
    status_ok: AtomicU64,
    status_bad_request: AtomicU64,
    status_bad_address: AtomicU64,
    status_dial_error: AtomicU64,
    status_dial_timeout: AtomicU64,
    panics: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    #[serde(rename = "200")]
    pub ok: u64,
    #[serde(rename = "400")]
    pub bad_request: u64,
    #[serde(rename = "401")]
    pub bad_address: u64,
    #[serde(rename = "502")]
    pub dial_error: u64,
    #[serde(rename = "503")]
    pub dial_timeout: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub accepted: u64,
    pub active: u64,
    pub accept_retries: u64,
    pub bytes_client_to_agent: u64,
    pub bytes_agent_to_client: u64,
    pub status: StatusCounts,
    pub panics: u64,
    pub pool: PoolStats,
}

impl GatewayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn accept_retried(&self) {
        self.accept_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_client_to_agent(&self, n: u64) {
        self.bytes_client_to_agent.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_agent_to_client(&self, n: u64) {
        self.bytes_agent_to_client.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_status(&self, token: StatusToken) {
        let counter = match token {
            StatusToken::Ok => &self.status_ok,
            StatusToken::BadRequest => &self.status_bad_request,
            StatusToken::BadAddress => &self.status_bad_address,
            StatusToken::DialError => &self.status_dial_error,
            StatusToken::DialTimeout => &self.status_dial_timeout,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_panic(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn status_count(&self, token: StatusToken) -> u64 {
        let snapshot = self.snapshot(PoolStats::default());
        match token {
            StatusToken::Ok => snapshot.status.ok,
            StatusToken::BadRequest => snapshot.status.bad_request,
            StatusToken::BadAddress => snapshot.status.bad_address,
            StatusToken::DialError => snapshot.status.dial_error,
            StatusToken::DialTimeout => snapshot.status.dial_timeout,
        }
    }

    pub fn snapshot(&self, pool: PoolStats) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            accept_retries: self.accept_retries.load(Ordering::Relaxed),
            bytes_client_to_agent: self.bytes_client_to_agent.load(Ordering::Relaxed),
            bytes_agent_to_client: self.bytes_agent_to_client.load(Ordering::Relaxed),
            status: StatusCounts {
                ok: self.status_ok.load(Ordering::Relaxed),
                bad_request: self.status_bad_request.load(Ordering::Relaxed),
                bad_address: self.status_bad_address.load(Ordering::Relaxed),
                dial_error: self.status_dial_error.load(Ordering::Relaxed),
                dial_timeout: self.status_dial_timeout.load(Ordering::Relaxed),
            },
            panics: self.panics.load(Ordering::Relaxed),
            pool,
        }
    }
}
