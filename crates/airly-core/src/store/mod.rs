// ── Reactive unit store ──
//
// Concurrent unit storage with push-based change notification. Reads
// are available to anyone holding the coordinator; writes are reserved
// to the coordinator's writer task.

mod collection;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use self::collection::Collection;
use crate::model::{TimedMode, UnitState};
use crate::stream::UnitStream;

/// Locally stored durations, keyed by unit id.
pub type DurationMap = HashMap<String, BTreeMap<TimedMode, u32>>;

/// Store of every discovered unit.
pub struct UnitStore {
    units: Collection<UnitState>,
    last_poll: watch::Sender<Option<DateTime<Utc>>>,
    last_push: watch::Sender<Option<DateTime<Utc>>>,
}

impl UnitStore {
    pub fn new() -> Self {
        let (last_poll, _) = watch::channel(None);
        let (last_push, _) = watch::channel(None);
        Self {
            units: Collection::new(),
            last_poll,
            last_push,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn units_snapshot(&self) -> Arc<Vec<Arc<UnitState>>> {
        self.units.snapshot()
    }

    pub fn unit(&self, id: &str) -> Option<Arc<UnitState>> {
        self.units.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.units.contains(id)
    }

    pub fn unit_ids(&self) -> Vec<String> {
        self.units.keys()
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn subscribe_units(&self) -> UnitStream {
        UnitStream::new(self.units.subscribe())
    }

    pub fn last_poll(&self) -> Option<DateTime<Utc>> {
        *self.last_poll.borrow()
    }

    pub fn last_push(&self) -> Option<DateTime<Utc>> {
        *self.last_push.borrow()
    }

    /// Every unit's locally stored durations. Units with none are omitted.
    pub fn durations(&self) -> DurationMap {
        self.units
            .snapshot()
            .iter()
            .filter(|u| !u.mode_durations.is_empty())
            .map(|u| (u.id.clone(), u.mode_durations.clone()))
            .collect()
    }

    // ── Writes (coordinator only) ────────────────────────────────────

    /// Register a unit. An existing entry keeps its state.
    pub(crate) fn register(&self, unit: UnitState) -> bool {
        if self.units.contains(&unit.id) {
            return false;
        }
        self.units.upsert(unit.id.clone(), unit)
    }

    pub(crate) fn modify(
        &self,
        id: &str,
        f: impl FnOnce(&mut UnitState),
    ) -> Option<Arc<UnitState>> {
        self.units.modify(id, f)
    }

    /// Merge stored durations into their units. Modes absent from `map`
    /// keep their current value. Returns the ids of unknown units.
    pub(crate) fn restore_durations(&self, map: DurationMap) -> Vec<String> {
        map.into_iter()
            .filter_map(|(unit_id, durations)| {
                self.units
                    .modify(&unit_id, |u| u.mode_durations.extend(durations))
                    .is_none()
                    .then_some(unit_id)
            })
            .collect()
    }

    pub(crate) fn mark_polled(&self) {
        self.last_poll.send_replace(Some(Utc::now()));
    }

    pub(crate) fn mark_push(&self) {
        self.last_push.send_replace(Some(Utc::now()));
    }
}

impl Default for UnitStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn register_does_not_clobber_existing_unit() {
        let store = UnitStore::new();
        let mut unit = UnitState::new("dev1", "Hall");
        unit.temperature_current = Some(20.0);
        assert!(store.register(unit));
        assert!(!store.register(UnitState::new("dev1", "Renamed")));

        let unit = store.unit("dev1").unwrap();
        assert_eq!(unit.name, "Hall");
        assert_eq!(unit.temperature_current, Some(20.0));
    }

    #[test]
    fn durations_skip_units_without_any() {
        let store = UnitStore::new();
        store.register(UnitState::new("a", "A"));
        store.register(UnitState::new("b", "B"));
        store.modify("b", |u| {
            u.mode_durations.insert(TimedMode::Away, 120);
        });

        let durations = store.durations();
        assert_eq!(durations.len(), 1);
        assert_eq!(durations["b"][&TimedMode::Away], 120);
    }

    #[test]
    fn restoring_durations_merges_and_is_repeatable() {
        let store = UnitStore::new();
        store.register(UnitState::new("dev1", "Hall"));
        store.modify("dev1", |u| {
            u.mode_durations.insert(TimedMode::Away, 180);
            u.mode_durations.insert(TimedMode::Fireplace, 45);
        });
        let stored: DurationMap = HashMap::from([(
            "dev1".to_owned(),
            BTreeMap::from([(TimedMode::Fireplace, 30), (TimedMode::Holiday, 1440)]),
        )]);

        assert!(store.restore_durations(stored.clone()).is_empty());
        let first = store.unit("dev1").unwrap().mode_durations.clone();
        assert!(store.restore_durations(stored).is_empty());
        let second = store.unit("dev1").unwrap().mode_durations.clone();

        assert_eq!(first, second);
        assert_eq!(
            second,
            BTreeMap::from([
                (TimedMode::Holiday, 1440),
                (TimedMode::Away, 180),
                (TimedMode::Fireplace, 30),
            ])
        );
    }

    #[test]
    fn restoring_durations_reports_unknown_units() {
        let store = UnitStore::new();
        let stored: DurationMap = HashMap::from([(
            "gone".to_owned(),
            BTreeMap::from([(TimedMode::Away, 60)]),
        )]);
        assert_eq!(store.restore_durations(stored), vec!["gone".to_owned()]);
    }

    #[test]
    fn timestamps_start_empty() {
        let store = UnitStore::new();
        assert!(store.last_poll().is_none());
        store.mark_polled();
        assert!(store.last_poll().is_some());
        assert!(store.last_push().is_none());
    }
}
