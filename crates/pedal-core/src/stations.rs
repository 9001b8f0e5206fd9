//! Station registry: the deduplicated, ordered station roster that indexes the panel.

use crate::diagnostics::Diagnostics;
use crate::types::{Demographics, Station, StationId, TractId};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Ordered roster of stations. Position in the registry is the station's
/// partition index in the panel.
#[derive(Debug, Clone, Default)]
pub struct StationRegistry {
    stations: Vec<Station>,
    index: HashMap<StationId, usize>,
}

impl StationRegistry {
    /// Build a registry, keeping the first occurrence of each station id.
    /// Later duplicates are dropped and noted in `diagnostics`.
    pub fn from_stations(
        stations: impl IntoIterator<Item = Station>,
        diagnostics: &mut Diagnostics,
    ) -> Self {
        let mut registry = StationRegistry::default();
        for station in stations {
            if let Some(&existing) = registry.index.get(&station.id) {
                let kept = &registry.stations[existing];
                if kept.coordinates != station.coordinates || kept.tract != station.tract {
                    diagnostics.add_warning(
                        "schema",
                        &format!(
                            "station '{}' listed more than once with different attributes; keeping first",
                            station.id
                        ),
                    );
                }
                continue;
            }
            registry.index.insert(station.id.clone(), registry.stations.len());
            registry.stations.push(station);
        }
        debug!(stations = registry.len(), "station registry built");
        registry
    }

    /// Attach tract demographics to each station by its tract assignment.
    /// Stations without a tract, or whose tract is missing from `tracts`, keep
    /// `demographics = None` (a join gap, never imputed).
    pub fn attach_demographics(&mut self, tracts: &HashMap<TractId, Demographics>) -> usize {
        let mut missing = 0;
        for station in &mut self.stations {
            station.demographics = station
                .tract
                .as_ref()
                .and_then(|tract| tracts.get(tract))
                .copied();
            if station.demographics.is_none() {
                missing += 1;
            }
        }
        if missing > 0 {
            warn!(
                stations = missing,
                "stations without a demographic snapshot; excluded from demographic models"
            );
        }
        missing
    }

    pub fn index_of(&self, id: &StationId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn get(&self, index: usize) -> Option<&Station> {
        self.stations.get(index)
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}
