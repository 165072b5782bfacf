//! Variable-rate Kingman coalescent.
//!
//! The simulator receives the heights of a set of lineages, measured backward in time from the
//! most recent one, and merges them pairwise until a single ancestor remains or the coalescent
//! boundary (the infection of the host) is reached. Waiting times are drawn on the intensity
//! scale of a [`Demography`] and mapped back to heights through the inverse intensity.

use rand::Rng;
use rand_distr::Exp1;

use super::demography::Demography;

/// Index of a lineage in a [`Genealogy`]. Tips come first, merges follow in creation order.
pub type LineageId = usize;

/// A binary genealogy over a set of tips, possibly consisting of several disconnected roots.
#[derive(Clone, Debug, PartialEq)]
pub struct Genealogy {
    heights: Vec<f64>,
    children: Vec<Option<(LineageId, LineageId)>>,
    roots: Vec<LineageId>,
    tip_count: usize,
}

impl Genealogy {
    pub fn tip_count(&self) -> usize {
        self.tip_count
    }

    pub fn merge_count(&self) -> usize {
        self.heights.len() - self.tip_count
    }

    /// Roots of the genealogy in a stable order. Contains more than one lineage whenever the
    /// process reached the boundary before all lineages merged.
    pub fn roots(&self) -> &[LineageId] {
        &self.roots
    }

    pub fn is_complete(&self) -> bool {
        self.roots.len() <= 1
    }

    pub fn height(&self, lineage: LineageId) -> f64 {
        self.heights[lineage]
    }

    /// The two lineages merged into `lineage`, or `None` for tips.
    pub fn children(&self, lineage: LineageId) -> Option<(LineageId, LineageId)> {
        self.children[lineage]
    }
}

/// Result of a successful simulation.
#[derive(Clone, Debug)]
pub struct Simulation {
    pub genealogy: Genealogy,

    /// Probability that at least one coalescence happens between the oldest tip and the
    /// boundary. Purely diagnostic.
    pub plausibility: f64,

    /// Number of attempts discarded because the lineages did not fully coalesce.
    pub failed_attempts: usize,
}

/// Forced coalescence failed for the given number of attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttemptsExhausted(pub usize);

#[derive(Clone, Debug)]
pub struct CoalescentSimulator {
    demography: Demography,
    force_coalescence: bool,
    max_attempts: Option<usize>,
}

impl CoalescentSimulator {
    pub fn new(demography: Demography, force_coalescence: bool) -> Self {
        Self {
            demography,
            force_coalescence,
            max_attempts: None,
        }
    }

    /// Bound the number of attempts of a forced coalescence. `None` retries until success.
    pub fn with_max_attempts(mut self, max_attempts: Option<usize>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn force_coalescence(&self) -> bool {
        self.force_coalescence
    }

    /// Simulate a genealogy of lineages with the given tip heights below the boundary
    /// `max_height`.
    ///
    /// With forced coalescence, incomplete attempts are discarded and redrawn until a single
    /// root emerges or the attempt budget is spent.
    pub fn simulate<R: Rng + ?Sized>(
        &self,
        tip_heights: &[f64],
        max_height: f64,
        rng: &mut R,
    ) -> Result<Simulation, AttemptsExhausted> {
        let plausibility = self.plausibility(tip_heights, max_height);

        let mut order: Vec<usize> = (0..tip_heights.len()).collect();
        order.sort_by(|&a, &b| tip_heights[a].total_cmp(&tip_heights[b]));

        let mut failed_attempts = 0;
        loop {
            let genealogy = self.attempt(tip_heights, &order, max_height, rng);
            if genealogy.is_complete() || !self.force_coalescence {
                return Ok(Simulation {
                    genealogy,
                    plausibility,
                    failed_attempts,
                });
            }

            failed_attempts += 1;
            log::debug!("Failed to coalesce lineages: {failed_attempts}");
            if let Some(max_attempts) = self.max_attempts
                && failed_attempts >= max_attempts
            {
                return Err(AttemptsExhausted(failed_attempts));
            }
        }
    }

    /// Probability of at least one coalescence of a pair between the oldest tip and the boundary.
    fn plausibility(&self, tip_heights: &[f64], max_height: f64) -> f64 {
        if tip_heights.len() < 2 {
            return 1.;
        }
        let oldest = tip_heights
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let interval = self.demography.intensity(max_height) - self.demography.intensity(oldest);
        -(-interval).exp_m1()
    }

    fn attempt<R: Rng + ?Sized>(
        &self,
        tip_heights: &[f64],
        order: &[usize],
        max_height: f64,
        rng: &mut R,
    ) -> Genealogy {
        let tip_count = tip_heights.len();
        let mut heights = tip_heights.to_vec();
        let mut children = vec![None; tip_count];
        let mut active: Vec<LineageId> = Vec::with_capacity(tip_count);
        let mut next_tip = 0;
        let mut remaining = tip_count;

        let mut current = order
            .first()
            .map(|&tip| tip_heights[tip])
            .unwrap_or_default();
        Self::activate(tip_heights, order, &mut next_tip, &mut active, current);

        while remaining > 1 {
            // at least two lineages are needed before anything can merge
            while active.len() < 2 {
                current = tip_heights[order[next_tip]];
                Self::activate(tip_heights, order, &mut next_tip, &mut active, current);
            }

            let pairs = (active.len() * (active.len() - 1)) as f64 / 2.;
            let gap: f64 = rng.sample::<f64, _>(Exp1) / pairs;
            let target = self.demography.intensity(current) + gap;
            let proposed = self.demography.inverse_intensity_from(current, target);

            // a pending tip below the proposal joins first, even past the boundary
            if next_tip < tip_count && proposed >= tip_heights[order[next_tip]] {
                current = tip_heights[order[next_tip]];
                Self::activate(tip_heights, order, &mut next_tip, &mut active, current);
                continue;
            }

            if proposed >= max_height {
                break;
            }

            let first = rng.random_range(0..active.len());
            let mut second = rng.random_range(0..active.len() - 1);
            if second >= first {
                second += 1;
            }
            let right = active.swap_remove(first.max(second));
            let left = active.swap_remove(first.min(second));

            let ancestor = heights.len();
            heights.push(proposed);
            children.push(Some((left, right)));
            active.push(ancestor);

            current = proposed;
            remaining -= 1;
        }

        let mut roots = active;
        roots.extend(order[next_tip..].iter().copied());

        Genealogy {
            heights,
            children,
            roots,
            tip_count,
        }
    }

    fn activate(
        tip_heights: &[f64],
        order: &[usize],
        next_tip: &mut usize,
        active: &mut Vec<LineageId>,
        height: f64,
    ) {
        while *next_tip < order.len() && tip_heights[order[*next_tip]] <= height {
            active.push(order[*next_tip]);
            *next_tip += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn leaves_below(genealogy: &Genealogy, lineage: LineageId) -> usize {
        match genealogy.children(lineage) {
            None => 1,
            Some((left, right)) => leaves_below(genealogy, left) + leaves_below(genealogy, right),
        }
    }

    #[test]
    fn forced_coalescence_yields_single_root() {
        let mut rng = StdRng::seed_from_u64(7);
        let simulator = CoalescentSimulator::new(Demography::Constant { n0: 0.5 }, true);
        for k in 2..12 {
            let tips = vec![0.; k];
            let simulation = simulator.simulate(&tips, 10., &mut rng).unwrap();
            let genealogy = &simulation.genealogy;
            assert_eq!(genealogy.roots().len(), 1);
            assert_eq!(genealogy.merge_count(), k - 1);
            let root = genealogy.roots()[0];
            assert!(genealogy.height(root) >= 0.);
            assert!(genealogy.height(root) < 10.);
            assert_eq!(leaves_below(genealogy, root), k);
        }
    }

    #[test]
    fn parents_are_older_than_children() {
        let mut rng = StdRng::seed_from_u64(11);
        let simulator = CoalescentSimulator::new(
            Demography::Exponential {
                n0: 1.,
                growth_rate: 0.5,
            },
            true,
        );
        let tips = [0., 0.3, 0.3, 1.2, 2.5, 0.1];
        let simulation = simulator.simulate(&tips, 20., &mut rng).unwrap();
        let genealogy = simulation.genealogy;
        for lineage in genealogy.tip_count()..genealogy.tip_count() + genealogy.merge_count() {
            let (left, right) = genealogy.children(lineage).unwrap();
            assert!(genealogy.height(lineage) >= genealogy.height(left));
            assert!(genealogy.height(lineage) >= genealogy.height(right));
        }
        let root = genealogy.roots()[0];
        assert!(genealogy.height(root) >= 2.5);
    }

    #[test]
    fn impossible_coalescence_returns_all_lineages() {
        let mut rng = StdRng::seed_from_u64(3);
        let simulator = CoalescentSimulator::new(Demography::Constant { n0: 1e300 }, false);
        let tips = [0., 0.5, 1.];
        let simulation = simulator.simulate(&tips, 2., &mut rng).unwrap();
        assert_eq!(simulation.genealogy.roots().len(), 3);
        assert_eq!(simulation.genealogy.merge_count(), 0);
        assert_eq!(simulation.failed_attempts, 0);
    }

    #[test]
    fn attempt_budget_is_enforced() {
        let mut rng = StdRng::seed_from_u64(5);
        let simulator = CoalescentSimulator::new(Demography::Constant { n0: 1e300 }, true)
            .with_max_attempts(Some(25));
        let result = simulator.simulate(&[0., 0.], 1., &mut rng);
        assert_eq!(result.unwrap_err(), AttemptsExhausted(25));
    }

    #[test]
    fn staggered_tips_join_before_boundary() {
        // one pair on [0, 0.5], three pairs on [0.5, 1]
        let simulator = CoalescentSimulator::new(Demography::Constant { n0: 1. }, false);
        let mut rng = StdRng::seed_from_u64(13);
        let runs = 20_000;
        let mut unmerged = 0;
        for _ in 0..runs {
            let simulation = simulator.simulate(&[0., 0., 0.5], 1., &mut rng).unwrap();
            let genealogy = simulation.genealogy;
            assert_eq!(genealogy.roots().len() + genealogy.merge_count(), 3);
            if genealogy.merge_count() == 0 {
                unmerged += 1;
            }
        }
        let expected = (-0.5f64).exp() * (-1.5f64).exp();
        let observed = unmerged as f64 / runs as f64;
        assert!(
            (observed - expected).abs() < 0.015,
            "observed {observed}, expected {expected}"
        );
    }

    #[test]
    fn single_tip_is_its_own_root() {
        let mut rng = StdRng::seed_from_u64(1);
        let simulator = CoalescentSimulator::new(Demography::default(), true);
        let simulation = simulator.simulate(&[0.], 1., &mut rng).unwrap();
        assert_eq!(simulation.genealogy.roots(), &[0]);
        assert_eq!(simulation.plausibility, 1.);
    }

    #[test]
    fn plausibility_follows_intensity_of_last_interval() {
        let simulator = CoalescentSimulator::new(Demography::Constant { n0: 2. }, false);
        let expected = 1. - (-(3. - 1.) / 2f64).exp();
        assert!((simulator.plausibility(&[0., 1.], 3.) - expected).abs() < 1e-12);
    }

    #[test]
    fn simulation_is_reproducible() {
        let simulator = CoalescentSimulator::new(Demography::Constant { n0: 1. }, true);
        let tips = [0., 0.2, 0.4, 0.6];
        let first = simulator
            .simulate(&tips, 50., &mut StdRng::seed_from_u64(42))
            .unwrap();
        let second = simulator
            .simulate(&tips, 50., &mut StdRng::seed_from_u64(42))
            .unwrap();
        assert_eq!(first.genealogy, second.genealogy);
    }
}
