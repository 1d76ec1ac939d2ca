//! Exposure history: which templates were shown, and when.

use chrono::{DateTime, TimeDelta, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::schema::template::TemplateId;

/// One shown template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureRecord {
    pub template_id: TemplateId,
    pub at: DateTime<Utc>,
}

/// Storage for exposure records. Records are appended in the order cards
/// were accepted.
pub trait ExposureStore: Send + Sync {
    /// Ids shown within `horizon` before `now`.
    fn recent_ids(&self, horizon: TimeDelta, now: DateTime<Utc>) -> FxHashSet<TemplateId>;
    fn append(&mut self, id: TemplateId, at: DateTime<Utc>);
    /// Lifetime number of appends for the template.
    fn visits(&self, id: &TemplateId) -> u64;
    /// Drop records older than `horizon`; returns how many were removed.
    fn prune(&mut self, horizon: TimeDelta, now: DateTime<Utc>) -> usize;
}

/// In-memory exposure history for one session. Visit counts are lifetime
/// totals and survive pruning.
#[derive(Debug, Clone, Default)]
pub struct ExposureHistory {
    records: VecDeque<ExposureRecord>,
    visits: FxHashMap<TemplateId, u64>,
}

impl ExposureHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> impl Iterator<Item = &ExposureRecord> {
        self.records.iter()
    }

    /// Most recent time the template was shown.
    pub fn last_seen(&self, id: &TemplateId) -> Option<DateTime<Utc>> {
        self.records
            .iter()
            .rev()
            .find(|r| &r.template_id == id)
            .map(|r| r.at)
    }

    pub fn visit_counts(&self) -> &FxHashMap<TemplateId, u64> {
        &self.visits
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ExposureStore for ExposureHistory {
    fn recent_ids(&self, horizon: TimeDelta, now: DateTime<Utc>) -> FxHashSet<TemplateId> {
        let cutoff = now - horizon;
        self.records
            .iter()
            .filter(|r| r.at >= cutoff)
            .map(|r| r.template_id.clone())
            .collect()
    }

    fn append(&mut self, id: TemplateId, at: DateTime<Utc>) {
        *self.visits.entry(id.clone()).or_insert(0) += 1;
        self.records.push_back(ExposureRecord {
            template_id: id,
            at,
        });
    }

    fn visits(&self, id: &TemplateId) -> u64 {
        self.visits.get(id).copied().unwrap_or(0)
    }

    fn prune(&mut self, horizon: TimeDelta, now: DateTime<Utc>) -> usize {
        let cutoff = now - horizon;
        let before = self.records.len();
        self.records.retain(|r| r.at >= cutoff);
        before - self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 20, minute, 0).unwrap()
    }

    #[test]
    fn recent_ids_respect_horizon() {
        let mut history = ExposureHistory::new();
        history.append(TemplateId::new("old"), at(0));
        history.append(TemplateId::new("fresh"), at(50));

        let recent = history.recent_ids(TimeDelta::minutes(30), at(55));
        assert!(recent.contains(&TemplateId::new("fresh")));
        assert!(!recent.contains(&TemplateId::new("old")));

        let wide = history.recent_ids(TimeDelta::minutes(60), at(55));
        assert_eq!(wide.len(), 2);
    }

    #[test]
    fn prune_drops_only_old_records() {
        let mut history = ExposureHistory::new();
        history.append(TemplateId::new("a"), at(0));
        history.append(TemplateId::new("b"), at(10));
        history.append(TemplateId::new("a"), at(40));

        assert_eq!(history.prune(TimeDelta::minutes(20), at(45)), 2);
        assert_eq!(history.len(), 1);
        assert_eq!(history.last_seen(&TemplateId::new("a")), Some(at(40)));
        assert_eq!(history.last_seen(&TemplateId::new("b")), None);
        assert_eq!(history.visits(&TemplateId::new("a")), 2);
        assert_eq!(history.visits(&TemplateId::new("b")), 1);
    }

    #[test]
    fn records_keep_append_order() {
        let mut history = ExposureHistory::new();
        history.append(TemplateId::new("second"), at(5));
        history.append(TemplateId::new("first"), at(1));
        let ids: Vec<&str> = history.records().map(|r| r.template_id.as_str()).collect();
        assert_eq!(ids, vec!["second", "first"]);
    }
}
