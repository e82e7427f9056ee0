//! Audit broadcaster (spec.md §4.F). Appends every scan to the store and
//! fans it out to subscribed dashboards over a push channel.
//!
//! Per the Design Note in spec.md §9 ("WebSocket subscriber set is cyclic
//! in the source... break the cycle by making the manager own handles in a
//! flat collection keyed by an integer subscription id; subscribers never
//! hold a back-reference"), subscribers are tracked in a flat
//! `DashMap<u64, mpsc::Sender<Envelope>>` — no subscriber struct ever
//! references the broadcaster back. This mirrors the teacher's
//! `DashMap`-keyed per-entity state (`clusters`, `rl_key`, `rl_geo`).

use crate::domain::{Direction, ScanLog, ScanResult};
use crate::store::{PassStore, ScanFilter};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone, Timelike, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Serialize, Clone)]
#[serde(tag = "type")]
pub enum Envelope {
    #[serde(rename = "new_scan")]
    NewScan { data: ScanEnvelopeData },
    #[serde(rename = "initial")]
    Initial { data: Vec<ScanEnvelopeData> },
}

#[derive(Serialize, Clone)]
pub struct ScanEnvelopeData {
    pub id: u64,
    pub student_id: String,
    pub student_name: String,
    pub scan_type: String,
    pub result: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
    pub emergency: bool,
}

const SUBSCRIBER_CHANNEL_CAPACITY: usize = 64;

pub struct AuditBroadcaster {
    store: Arc<dyn PassStore>,
    subscribers: DashMap<u64, mpsc::Sender<Envelope>>,
    next_sub_id: AtomicU64,
    backfill: usize,
}

impl AuditBroadcaster {
    pub fn new(store: Arc<dyn PassStore>, backfill: usize) -> Self {
        Self {
            store,
            subscribers: DashMap::new(),
            next_sub_id: AtomicU64::new(1),
            backfill,
        }
    }

    fn envelope_data(&self, scan: &ScanLog) -> ScanEnvelopeData {
        let subject = scan.subject_id.and_then(|id| self.store.get_principal(id));
        ScanEnvelopeData {
            id: scan.id,
            student_id: subject
                .as_ref()
                .and_then(|p| p.subject_code.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            student_name: subject.map(|p| p.name).unwrap_or_else(|| "Unknown".to_string()),
            scan_type: scan.direction.as_str().to_string(),
            result: scan.result.as_str().to_string(),
            detail: scan.detail.clone(),
            timestamp: scan.timestamp,
            emergency: scan.emergency,
        }
    }

    /// Append-then-fan-out. A send that fails (transport closed or the
    /// per-subscriber channel is full) removes that subscriber from the
    /// set; other subscribers are unaffected (spec.md §4.F / §8 property 8).
    pub fn publish(&self, scan: ScanLog) {
        let envelope = Envelope::NewScan {
            data: self.envelope_data(&scan),
        };
        let mut dead = Vec::new();
        for entry in self.subscribers.iter() {
            if entry.value().try_send(envelope.clone()).is_err() {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            self.subscribers.remove(&id);
            warn!(subscriber_id = id, "audit subscriber dropped: send failed");
        }
    }

    /// Register a new subscriber; returns its id and a receiver to forward
    /// into the websocket. Immediately enqueues the most recent `backfill`
    /// records as an `initial` envelope.
    pub fn subscribe(&self) -> (u64, mpsc::Receiver<Envelope>) {
        let id = self.next_sub_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let recent = self.store.recent_scans(self.backfill);
        let initial = Envelope::Initial {
            data: recent.iter().map(|s| self.envelope_data(s)).collect(),
        };
        let _ = tx.try_send(initial);
        self.subscribers.insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

// ---- Analytics (read-only projections over ScanLog, spec.md §4.F) ----

#[derive(Serialize)]
pub struct Statistics {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub entries: u64,
    pub exits: u64,
    pub students_currently_on_campus: u64,
    pub success_rate: f64,
}

#[derive(Serialize)]
pub struct HourlyBucket {
    pub hour: u8,
    pub entries: u64,
    pub exits: u64,
}

#[derive(Serialize)]
pub struct DailyBucket {
    pub date: String,
    pub entries: u64,
    pub exits: u64,
}

#[derive(Serialize)]
pub struct TopActive {
    pub subject_code: String,
    pub name: String,
    pub scan_count: u64,
}

pub struct Analytics {
    store: Arc<dyn PassStore>,
    offset: FixedOffset,
}

impl Analytics {
    pub fn new(store: Arc<dyn PassStore>, offset: FixedOffset) -> Self {
        Self { store, offset }
    }

    fn civil_date(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.offset).date_naive()
    }

    /// Start of `day` (00:00 in `self.offset`) expressed in UTC, used as the
    /// lower bound for queries scoped to one civil day rather than a
    /// lookback from the current instant.
    fn civil_day_start_utc(&self, day: NaiveDate) -> DateTime<Utc> {
        let local_midnight = day.and_hms_opt(0, 0, 0).expect("midnight is a valid time");
        self.offset
            .from_local_datetime(&local_midnight)
            .single()
            .expect("fixed offset has no DST ambiguity")
            .with_timezone(&Utc)
    }

    pub fn recent(&self, limit: usize, offset: usize) -> Vec<ScanLog> {
        self.store.query_scans(&ScanFilter::default(), limit, offset)
    }

    pub fn statistics(&self, days: i64) -> Statistics {
        let since = Utc::now() - chrono::Duration::days(days);
        let scans = self.store.all_scans_since(since);
        let total = scans.len() as u64;
        let successful = scans.iter().filter(|s| s.result == ScanResult::Success).count() as u64;
        let entries = scans.iter().filter(|s| s.direction == Direction::Entry).count() as u64;
        let exits = scans.iter().filter(|s| s.direction == Direction::Exit).count() as u64;

        let today = self.civil_date(Utc::now());
        let today_entries = scans
            .iter()
            .filter(|s| {
                s.result == ScanResult::Success
                    && s.direction == Direction::Entry
                    && self.civil_date(s.timestamp) == today
            })
            .count() as i64;
        let today_exits = scans
            .iter()
            .filter(|s| {
                s.result == ScanResult::Success
                    && s.direction == Direction::Exit
                    && self.civil_date(s.timestamp) == today
            })
            .count() as i64;
        let students_currently_on_campus = (today_entries - today_exits).max(0) as u64;

        Statistics {
            total,
            successful,
            failed: total - successful,
            entries,
            exits,
            students_currently_on_campus,
            success_rate: if total > 0 {
                (successful as f64 / total as f64) * 100.0
            } else {
                0.0
            },
        }
    }

    pub fn hourly(&self, day: NaiveDate) -> Vec<HourlyBucket> {
        let since = self.civil_day_start_utc(day);
        let scans = self.store.all_scans_since(since);
        let mut buckets: Vec<HourlyBucket> = (0..24)
            .map(|hour| HourlyBucket {
                hour,
                entries: 0,
                exits: 0,
            })
            .collect();
        for scan in scans
            .iter()
            .filter(|s| s.result == ScanResult::Success && self.civil_date(s.timestamp) == day)
        {
            let hour = scan.timestamp.with_timezone(&self.offset).hour() as usize;
            match scan.direction {
                Direction::Entry => buckets[hour].entries += 1,
                Direction::Exit => buckets[hour].exits += 1,
            }
        }
        buckets
    }

    pub fn daily(&self, days: i64) -> Vec<DailyBucket> {
        let since = Utc::now() - chrono::Duration::days(days);
        let scans = self.store.all_scans_since(since);
        let today = self.civil_date(Utc::now());
        let mut out: Vec<DailyBucket> = (0..days)
            .map(|i| {
                let date = today - chrono::Duration::days(days - 1 - i);
                DailyBucket {
                    date: date.format("%Y-%m-%d").to_string(),
                    entries: 0,
                    exits: 0,
                }
            })
            .collect();
        for scan in scans.iter().filter(|s| s.result == ScanResult::Success) {
            let date = self.civil_date(scan.timestamp);
            let date_str = date.format("%Y-%m-%d").to_string();
            if let Some(bucket) = out.iter_mut().find(|b| b.date == date_str) {
                match scan.direction {
                    Direction::Entry => bucket.entries += 1,
                    Direction::Exit => bucket.exits += 1,
                }
            }
        }
        out
    }

    pub fn top_active(&self, days: i64, limit: usize) -> Vec<TopActive> {
        let since = Utc::now() - chrono::Duration::days(days);
        let scans = self.store.all_scans_since(since);
        let mut counts: std::collections::HashMap<u64, u64> = std::collections::HashMap::new();
        for scan in &scans {
            if let Some(id) = scan.subject_id {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(u64, u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(limit);
        ranked
            .into_iter()
            .filter_map(|(id, count)| {
                self.store.get_principal(id).map(|p| TopActive {
                    subject_code: p.subject_code.unwrap_or_default(),
                    name: p.name,
                    scan_count: count,
                })
            })
            .collect()
    }

    pub fn search(&self, filter: &ScanFilter, limit: usize) -> Vec<ScanLog> {
        self.store.query_scans(filter, limit, 0)
    }
}
