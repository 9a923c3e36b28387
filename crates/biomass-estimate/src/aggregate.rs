use serde::{Deserialize, Serialize};

use crate::{estimate_counts, ObjectEstimate, SpeciesCatalog};

/// Per-species sums.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeciesTotals {
    pub species: String,
    pub count: u32,
    pub total_weight: f64,
    pub total_volume: f64,
}

impl SpeciesTotals {
    /// Percentage of `grand_total_weight` held by this species, `0` when the
    /// total is not positive.
    pub fn share_of(&self, grand_total_weight: f64) -> f64 {
        if grand_total_weight > 0.0 {
            100.0 * self.total_weight / grand_total_weight
        } else {
            0.0
        }
    }
}

/// All estimates of one run plus grouped totals.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub objects: Vec<ObjectEstimate>,
    /// Sorted by descending total weight; equal weights keep first-seen order.
    /// Labels group ASCII case-insensitively under their first-seen spelling.
    pub species: Vec<SpeciesTotals>,
    pub total_weight: f64,
    pub total_volume: f64,
    /// `false` when the run used the fallback scale.
    pub calibrated: bool,
}

impl AggregateResult {
    /// Group `objects` by species. Degenerate measurements are dropped.
    pub fn from_objects<I>(objects: I, calibrated: bool) -> Self
    where
        I: IntoIterator<Item = ObjectEstimate>,
    {
        let objects: Vec<ObjectEstimate> = objects
            .into_iter()
            .filter(|o| !o.is_degenerate())
            .collect();

        let mut species: Vec<SpeciesTotals> = Vec::new();
        let mut total_weight = 0.0;
        let mut total_volume = 0.0;
        for o in &objects {
            total_weight += o.weight;
            total_volume += o.volume;
            match species.iter_mut().find(|s| s.species.eq_ignore_ascii_case(&o.species)) {
                Some(t) => {
                    t.count += o.count;
                    t.total_weight += o.weight;
                    t.total_volume += o.volume;
                }
                None => species.push(SpeciesTotals {
                    species: o.species.clone(),
                    count: o.count,
                    total_weight: o.weight,
                    total_volume: o.volume,
                }),
            }
        }
        species.sort_by(|a, b| b.total_weight.total_cmp(&a.total_weight));

        Self {
            objects,
            species,
            total_weight,
            total_volume,
            calibrated,
        }
    }

    /// Species summary for detector-only counting. No scale is involved, so
    /// the result counts as calibrated.
    pub fn from_counts<S: AsRef<str>>(catalog: &SpeciesCatalog, counts: &[(S, u32)]) -> Self {
        Self::from_objects(estimate_counts(catalog, counts), true)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn object_count(&self) -> u32 {
        self.objects.iter().map(|o| o.count).sum()
    }
}
