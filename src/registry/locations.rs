use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::driver::DriverLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Accepted,
    Stale,
}

#[derive(Debug, Default)]
pub struct LocationRegister {
    latest: DashMap<Uuid, DriverLocation>,
}

impl LocationRegister {
    pub fn new() -> Self {
        Self::default()
    }

    // last write wins by observed_at; an equal timestamp overwrites
    pub fn report(&self, location: DriverLocation) -> ReportOutcome {
        match self.latest.entry(location.driver_id) {
            Entry::Occupied(mut occupied) => {
                if location.observed_at < occupied.get().observed_at {
                    return ReportOutcome::Stale;
                }
                occupied.insert(location);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(location);
            }
        }

        ReportOutcome::Accepted
    }

    pub fn latest(&self, driver_id: &Uuid) -> Option<DriverLocation> {
        self.latest.get(driver_id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}
