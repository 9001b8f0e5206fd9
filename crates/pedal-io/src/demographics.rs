use crate::read_rows;
use anyhow::Result;
use pedal_core::{Demographics, Diagnostics, TractId};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Raw census counts for one tract.
#[derive(Debug, Clone, Deserialize)]
pub struct DemographicRow {
    pub tract_id: String,
    pub total_pop: Option<f64>,
    pub median_income: Option<f64>,
    pub median_age: Option<f64>,
    pub white_pop: Option<f64>,
    pub travel_time_total: Option<f64>,
    pub commuters: Option<f64>,
    pub transit_commuters: Option<f64>,
}

impl DemographicRow {
    /// Derive the station-level snapshot. Returns `None` when any field is
    /// missing or negative (suppressed estimate) or a ratio denominator is zero.
    pub fn snapshot(&self) -> Option<Demographics> {
        let fields = [
            self.total_pop?,
            self.median_income?,
            self.median_age?,
            self.white_pop?,
            self.travel_time_total?,
            self.commuters?,
            self.transit_commuters?,
        ];
        if fields.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return None;
        }
        let [population, median_income, median_age, white, travel, commuters, transit] = fields;
        if population == 0.0 || commuters == 0.0 {
            return None;
        }
        Some(Demographics {
            population,
            median_income,
            median_age,
            pct_white: white / population,
            mean_commute_minutes: travel / commuters,
            pct_transit: transit / commuters,
        })
    }
}

/// Load tract snapshots keyed by tract id. Tracts whose snapshot cannot be
/// derived are left out, which makes them a join gap for their stations.
pub fn load_demographics(path: &Path) -> Result<(HashMap<TractId, Demographics>, Diagnostics)> {
    let mut diagnostics = Diagnostics::new();
    let rows = read_rows::<DemographicRow>(path, "demographics", &mut diagnostics)?;

    let mut tracts = HashMap::with_capacity(rows.len());
    for (line, row) in rows {
        let tract = TractId::new(row.tract_id.clone());
        if tracts.contains_key(&tract) {
            diagnostics.add_warning_at_line(
                "schema",
                &format!("duplicate tract '{tract}'; keeping first"),
                line,
            );
            continue;
        }
        match row.snapshot() {
            Some(snapshot) => {
                tracts.insert(tract, snapshot);
            }
            None => diagnostics.add_warning_at_line(
                "join",
                &format!("tract '{tract}' has incomplete census estimates"),
                line,
            ),
        }
    }
    Ok((tracts, diagnostics))
}
