//! Within-host demographic models.
//!
//! A demographic model describes the effective population size `N(t)` of the pathogen inside a
//! host, where `t` is measured backward in time from the latest relevant event of that host. The
//! coalescent simulator never looks at `N(t)` directly. It works on the coalescent intensity
//!
//! ```text
//! I(t) = ∫₀ᵗ 1 / N(s) ds
//! ```
//!
//! under which pairs of lineages merge at rate one, and converts waiting times back into
//! calendar time through the inverse of `I`.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, VirusTreeError};

/// Relative tolerance of the numerical intensity inversion.
const INVERSION_TOLERANCE: f64 = 1e-12;

/// Upper bound of Newton/bisection iterations for the numerical inversion.
const MAX_INVERSION_STEPS: usize = 200;

/// Effective population size model.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum Demography {
    /// Constant size `n0`.
    Constant { n0: f64 },

    /// Exponential growth toward the present, `N(t) = n0 · exp(-growth_rate · t)`.
    Exponential { n0: f64, growth_rate: f64 },

    /// Logistic growth toward the asymptotic size `n0`, `N(t) = n0 / (1 + exp(r · (t - t50)))`.
    /// The population has half its asymptotic size at `t50`.
    Logistic { n0: f64, growth_rate: f64, t50: f64 },
}

impl Default for Demography {
    fn default() -> Self {
        Demography::Constant { n0: 1. }
    }
}

impl Demography {
    /// Check that all parameters describe a proper, strictly positive population size.
    pub fn validate(&self) -> Result<()> {
        let (n0, growth_rate, t50) = match *self {
            Demography::Constant { n0 } => (n0, 0., 0.),
            Demography::Exponential { n0, growth_rate } => (n0, growth_rate, 0.),
            Demography::Logistic {
                n0,
                growth_rate,
                t50,
            } => (n0, growth_rate, t50),
        };
        if !n0.is_finite() || n0 <= 0. {
            return Err(VirusTreeError::InvalidParameter(format!(
                "n0 must be positive and finite, got {n0}"
            )));
        }
        if !growth_rate.is_finite() {
            return Err(VirusTreeError::InvalidParameter(format!(
                "growth rate must be finite, got {growth_rate}"
            )));
        }
        if !t50.is_finite() {
            return Err(VirusTreeError::InvalidParameter(format!(
                "t50 must be finite, got {t50}"
            )));
        }
        Ok(())
    }

    /// Effective population size at time `t`.
    pub fn population_size(&self, t: f64) -> f64 {
        match *self {
            Demography::Constant { n0 } => n0,
            Demography::Exponential { n0, growth_rate } => n0 * (-growth_rate * t).exp(),
            Demography::Logistic {
                n0,
                growth_rate,
                t50,
            } => n0 / (1. + (growth_rate * (t - t50)).exp()),
        }
    }

    /// Cumulative coalescent intensity `I(t)`.
    pub fn intensity(&self, t: f64) -> f64 {
        match *self {
            Demography::Constant { n0 } => t / n0,
            Demography::Exponential { n0, growth_rate } => {
                if growth_rate == 0. {
                    t / n0
                } else {
                    (growth_rate * t).exp_m1() / (growth_rate * n0)
                }
            }
            Demography::Logistic {
                n0,
                growth_rate,
                t50,
            } => {
                if growth_rate == 0. {
                    2. * t / n0
                } else {
                    let excess = ((growth_rate * (t - t50)).exp()
                        - (-growth_rate * t50).exp())
                        / growth_rate;
                    (t + excess) / n0
                }
            }
        }
    }

    /// Supremum of the intensity as `t` goes to infinity.
    ///
    /// Only exponential models with negative growth accumulate a finite total intensity.
    pub fn total_intensity(&self) -> f64 {
        match *self {
            Demography::Exponential { n0, growth_rate } if growth_rate < 0. => {
                -1. / (growth_rate * n0)
            }
            _ => f64::INFINITY,
        }
    }

    /// Find the time `t` at which the intensity reaches `target`.
    ///
    /// Returns `+inf` when the target lies beyond the total intensity of the model.
    pub fn inverse_intensity(&self, target: f64) -> f64 {
        if target <= 0. {
            return 0.;
        }
        if target >= self.total_intensity() {
            return f64::INFINITY;
        }
        match *self {
            Demography::Constant { n0 } => target * n0,
            Demography::Exponential { n0, growth_rate } => {
                if growth_rate == 0. {
                    target * n0
                } else {
                    (target * growth_rate * n0).ln_1p() / growth_rate
                }
            }
            Demography::Logistic { growth_rate, .. } if growth_rate == 0. => {
                target * self.population_size(0.)
            }
            Demography::Logistic { .. } => self.solve_intensity(target),
        }
    }

    /// Find `t ≥ start` with `I(t) = target`, for `target ≥ I(start)`.
    pub fn inverse_intensity_from(&self, start: f64, target: f64) -> f64 {
        self.inverse_intensity(target).max(start)
    }

    /// Safeguarded Newton iteration on the monotone intensity.
    fn solve_intensity(&self, target: f64) -> f64 {
        // I grows at least as fast as t / n0 for the logistic kernel
        let mut lower = 0.;
        let mut upper = 1.;
        while self.intensity(upper) < target {
            lower = upper;
            upper *= 2.;
            if !upper.is_finite() {
                return f64::INFINITY;
            }
        }

        let mut t = 0.5 * (lower + upper);
        for _ in 0..MAX_INVERSION_STEPS {
            let residual = self.intensity(t) - target;
            if residual.abs() <= INVERSION_TOLERANCE * target.max(1.) {
                return t;
            }
            if residual > 0. {
                upper = t;
            } else {
                lower = t;
            }

            let newton = t - residual * self.population_size(t);
            t = if newton > lower && newton < upper && newton.is_finite() {
                newton
            } else {
                0.5 * (lower + upper)
            };

            if upper - lower <= INVERSION_TOLERANCE * upper {
                break;
            }
        }
        t
    }
}
