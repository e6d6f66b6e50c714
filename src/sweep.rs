//! Cartesian expansion of multi-valued overrides.
//!
//! `hyperparameters=small,large connection.port=5432,6432` yields four
//! combinations. The first declared axis varies slowest, so the order is
//! `(small, 5432) (small, 6432) (large, 5432) (large, 6432)`.

use crate::compose::{Composer, RunConfiguration};
use crate::config::{OverrideSpec, SweepTarget};
use crate::error::{ResolveError, ResolveResult, SweepError};

/// Fixed overrides plus the sweep axes, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPlan {
    fixed: Vec<OverrideSpec>,
    axes: Vec<(SweepTarget, Vec<String>)>,
    len: usize,
}

impl SweepPlan {
    /// Split `overrides` into fixed overrides and axes.
    ///
    /// Fails with `InvalidOverride` when the number of combinations does not
    /// fit in a `usize`.
    pub fn new(overrides: &[OverrideSpec]) -> ResolveResult<Self> {
        let mut fixed = Vec::new();
        let mut axes = Vec::new();
        for spec in overrides {
            match spec {
                OverrideSpec::MultiValue { target, values } => {
                    axes.push((target.clone(), values.clone()))
                }
                other => fixed.push(other.clone()),
            }
        }
        let len = axes
            .iter()
            .try_fold(1usize, |total, (_, values)| total.checked_mul(values.len()))
            .ok_or_else(|| {
                let raw = axes
                    .iter()
                    .map(|(target, values)| format!("{}={}", target, values.join(",")))
                    .collect::<Vec<_>>()
                    .join(" ");
                ResolveError::invalid_override(&raw, "sweep too large")
            })?;
        Ok(Self { fixed, axes, len })
    }

    /// Number of combinations; 1 when there are no axes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn axis_count(&self) -> usize {
        self.axes.len()
    }

    /// Concrete overrides for combination `index`: fixed overrides first,
    /// then one value per axis.
    ///
    /// Indices decompose mixed-radix with the last axis as the lowest digit.
    pub fn combination(&self, index: usize) -> Vec<OverrideSpec> {
        let mut digits = vec![0; self.axes.len()];
        let mut rest = index;
        for (slot, (_, values)) in digits.iter_mut().zip(&self.axes).rev() {
            *slot = rest % values.len();
            rest /= values.len();
        }

        let mut overrides = self.fixed.clone();
        overrides.extend(
            self.axes
                .iter()
                .zip(digits)
                .map(|((target, values), digit)| target.select(&values[digit])),
        );
        overrides
    }
}

/// Lazy sequence of run configurations, one per combination.
///
/// Each item is composed only when requested. A failing combination yields
/// its error and iteration continues with the next index.
pub struct Sweep<'a> {
    composer: &'a Composer,
    plan: SweepPlan,
    next: usize,
}

impl<'a> Sweep<'a> {
    pub(crate) fn new(composer: &'a Composer, plan: SweepPlan) -> Self {
        Self {
            composer,
            plan,
            next: 0,
        }
    }

    pub fn plan(&self) -> &SweepPlan {
        &self.plan
    }

    /// Total combinations, including ones already yielded.
    pub fn len(&self) -> usize {
        self.plan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plan.is_empty()
    }

    /// Compose every remaining combination, stopping at the first failure.
    pub fn collect_all(self) -> Result<Vec<RunConfiguration>, SweepError> {
        self.collect()
    }
}

impl Iterator for Sweep<'_> {
    type Item = Result<RunConfiguration, SweepError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.plan.len {
            return None;
        }
        let index = self.next;
        self.next += 1;
        let overrides = self.plan.combination(index);
        Some(
            self.composer
                .run(index, overrides)
                .map_err(|source| SweepError { index, source }),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.plan.len - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Sweep<'_> {}
