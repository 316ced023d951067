use crate::config::SpeciesGroupConfig;
use crate::constants::{AVOGADRO, ELEMENTARY_CHARGE};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A contiguous slice of the ensemble sharing one mass, charge and
/// cross-section identity. Cohort boundaries are explicit data, never
/// inferred from array position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesCohort {
    pub name: String,
    /// Per-particle mass [kg].
    pub mass: f64,
    /// Per-particle charge [C].
    pub charge: f64,
    /// Column of the cross-section table used by this cohort.
    pub sigma_column: usize,
    pub start: usize,
    pub count: usize,
}

impl SpeciesCohort {
    #[inline(always)]
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.count
    }
}

/// A top-level species group: one or more isotope cohorts plotted and
/// labelled together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesGroup {
    pub name: String,
    pub cohorts: Vec<SpeciesCohort>,
}

impl SpeciesGroup {
    /// Contiguous index span covered by all cohorts of this group.
    pub fn span(&self) -> Range<usize> {
        let start = self.cohorts.first().map_or(0, |c| c.start);
        let end = self.cohorts.last().map_or(start, |c| c.start + c.count);
        start..end
    }
}

/// The full cohort layout of an ensemble of `n_total` particles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesLayout {
    pub n_total: usize,
    pub groups: Vec<SpeciesGroup>,
}

impl SpeciesLayout {
    /// Builds the layout from configured species groups.
    ///
    /// `n_total` is split evenly among the groups, and each group's share is
    /// split evenly among its isotope masses; both divisions must be exact.
    pub fn from_groups(
        n_total: usize,
        charge_e: f64,
        groups: &[SpeciesGroupConfig],
    ) -> Result<Self> {
        if groups.is_empty() {
            anyhow::bail!("at least one species group must be configured");
        }
        if n_total == 0 || n_total % groups.len() != 0 {
            anyhow::bail!(
                "n_total ({}) must be a positive multiple of the group count ({})",
                n_total,
                groups.len()
            );
        }
        let per_group = n_total / groups.len();
        let charge = charge_e * ELEMENTARY_CHARGE;

        let mut out = Vec::with_capacity(groups.len());
        let mut start = 0usize;
        for group in groups {
            if group.molar_masses_kg.is_empty() {
                anyhow::bail!("species group '{}' lists no masses", group.name);
            }
            if group.molar_masses_kg.len() != group.sigma_columns.len() {
                anyhow::bail!(
                    "species group '{}' lists {} masses but {} sigma columns",
                    group.name,
                    group.molar_masses_kg.len(),
                    group.sigma_columns.len()
                );
            }
            if per_group % group.molar_masses_kg.len() != 0 {
                anyhow::bail!(
                    "group share ({}) of '{}' is not divisible by its {} isotope masses",
                    per_group,
                    group.name,
                    group.molar_masses_kg.len()
                );
            }
            let per_cohort = per_group / group.molar_masses_kg.len();

            let mut cohorts = Vec::with_capacity(group.molar_masses_kg.len());
            for (&molar, &sigma_column) in
                group.molar_masses_kg.iter().zip(group.sigma_columns.iter())
            {
                if molar <= 0.0 || !molar.is_finite() {
                    anyhow::bail!("species group '{}' has non-positive mass {}", group.name, molar);
                }
                cohorts.push(SpeciesCohort {
                    name: format!("{}-{}", group.name, (molar * 1000.0).round() as u64),
                    mass: molar / AVOGADRO,
                    charge,
                    sigma_column,
                    start,
                    count: per_cohort,
                });
                start += per_cohort;
            }
            out.push(SpeciesGroup {
                name: group.name.clone(),
                cohorts,
            });
        }

        let layout = Self {
            n_total,
            groups: out,
        };
        layout.validate()?;
        Ok(layout)
    }

    /// Checks that the cohorts tile 0..n_total contiguously with no overlap
    /// or omission.
    pub fn validate(&self) -> Result<()> {
        let mut expected = 0usize;
        for cohort in self.cohorts() {
            if cohort.count == 0 {
                anyhow::bail!("cohort '{}' is empty", cohort.name);
            }
            if cohort.start != expected {
                anyhow::bail!(
                    "cohort '{}' starts at {} but the previous cohort ends at {}",
                    cohort.name,
                    cohort.start,
                    expected
                );
            }
            expected += cohort.count;
        }
        if expected != self.n_total {
            anyhow::bail!(
                "cohorts cover {} particles but the layout declares {}",
                expected,
                self.n_total
            );
        }
        Ok(())
    }

    pub fn cohorts(&self) -> impl Iterator<Item = &SpeciesCohort> {
        self.groups.iter().flat_map(|g| g.cohorts.iter())
    }

    /// Expands the layout into the per-particle mass array.
    pub fn masses(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.n_total);
        for cohort in self.cohorts() {
            out.extend(std::iter::repeat(cohort.mass).take(cohort.count));
        }
        out
    }

    /// Expands the layout into the per-particle charge array.
    pub fn charges(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.n_total);
        for cohort in self.cohorts() {
            out.extend(std::iter::repeat(cohort.charge).take(cohort.count));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_group_config() -> Vec<SpeciesGroupConfig> {
        vec![
            SpeciesGroupConfig {
                name: "uranium".into(),
                molar_masses_kg: vec![0.235, 0.238, 0.239, 0.240],
                sigma_columns: vec![1, 1, 2, 2],
            },
            SpeciesGroupConfig {
                name: "cesium".into(),
                molar_masses_kg: vec![0.137],
                sigma_columns: vec![3],
            },
            SpeciesGroupConfig {
                name: "strontium".into(),
                molar_masses_kg: vec![0.090],
                sigma_columns: vec![4],
            },
        ]
    }

    #[test]
    fn layout_tiles_the_ensemble_exactly() {
        let layout = SpeciesLayout::from_groups(120, 1.0, &three_group_config()).unwrap();
        let counts: Vec<usize> = layout.cohorts().map(|c| c.count).collect();
        assert_eq!(counts, vec![10, 10, 10, 10, 40, 40]);
        layout.validate().unwrap();
        assert_eq!(layout.masses().len(), 120);
        assert_eq!(layout.charges().len(), 120);
    }

    #[test]
    fn indivisible_total_is_rejected() {
        assert!(SpeciesLayout::from_groups(121, 1.0, &three_group_config()).is_err());
        // 3 groups divide 60, but 20 per group does not divide by 4 isotopes.
        assert!(SpeciesLayout::from_groups(60, 1.0, &three_group_config()).is_err());
    }

    #[test]
    fn group_spans_are_contiguous() {
        let layout = SpeciesLayout::from_groups(120, 1.0, &three_group_config()).unwrap();
        let spans: Vec<_> = layout.groups.iter().map(|g| g.span()).collect();
        assert_eq!(spans, vec![0..40, 40..80, 80..120]);
    }
}
