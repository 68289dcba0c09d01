//! Frequentist tests and likelihood helpers on marker read counts.

pub mod quadrature;

use crate::Observation;
use clonetrack_phylo::Relation;
use color_eyre::eyre::{eyre, Report, Result};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use statrs::function::factorial::ln_binomial;

/// Fractions are clamped to `[EPSILON, 1 - EPSILON]` before taking logarithms.
const FRACTION_EPSILON: f64 = 1e-16;

/// The outcome of a single hypothesis test.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct TestOutcome {
    pub reject: bool,
    pub statistic: f64,
    pub critical: f64,
}

/// Returns the Bonferroni corrected significance level, `alpha / comparisons`.
///
/// ```rust
/// use clonetrack::stats::bonferroni;
/// assert_eq!(bonferroni(0.05, 10.0), 0.005);
/// assert_eq!(bonferroni(0.05, 0.0), 0.05);
/// ```
pub fn bonferroni(alpha: f64, comparisons: f64) -> f64 {
    alpha / comparisons.max(1.0)
}

/// Returns the number of unordered pairs among `n` markers, `n(n-1)/2`.
pub fn pair_count(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

/// One-sided (or for [`Relation::Same`], two-sided) Wald test on two marker fractions.
///
/// The null hypothesis is that the fractions agree with the `relation` of `first` to `second`:
///
/// - [`Relation::Ancestor`]: the second (descendant) fraction does not exceed the first.
/// - [`Relation::Descendant`]: the first (descendant) fraction does not exceed the second.
/// - [`Relation::Same`]: the fractions are equal.
/// - [`Relation::Unrelated`]: no constraint, never rejects.
///
/// The standard error is `sqrt(f1(1-f1)/d1) + sqrt(f2(1-f2)/d2)`, each marker with its own depth.
/// The critical value is the standard normal quantile at `1 - alpha/comparisons`
/// (`1 - alpha/(2 comparisons)` for the two-sided test). With a standard error of zero,
/// any strictly positive violation rejects.
///
/// ```rust
/// use clonetrack::{stats::wald_test, Observation};
/// use clonetrack_phylo::Relation;
/// let tp53 = Observation::new("TP53", 50, 100)?;
/// let kras = Observation::new("KRAS", 80, 100)?;
/// // the descendant can not be at a higher fraction than its ancestor
/// assert!(wald_test(&tp53, &kras, Relation::Ancestor, 1.0, 0.05)?.reject);
/// assert!(!wald_test(&kras, &tp53, Relation::Ancestor, 1.0, 0.05)?.reject);
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn wald_test(
    first: &Observation,
    second: &Observation,
    relation: Relation,
    comparisons: f64,
    alpha: f64,
) -> Result<TestOutcome, Report> {
    let (f1, f2) = (first.fraction(), second.fraction());
    let standard_error = (f1 * (1.0 - f1) / first.total as f64).sqrt()
        + (f2 * (1.0 - f2) / second.total as f64).sqrt();

    let (difference, level) = match relation {
        Relation::Ancestor => (f2 - f1, bonferroni(alpha, comparisons)),
        Relation::Descendant => (f1 - f2, bonferroni(alpha, comparisons)),
        Relation::Same => ((f1 - f2).abs(), bonferroni(alpha, comparisons) / 2.0),
        Relation::Unrelated => {
            return Ok(TestOutcome { reject: false, statistic: 0.0, critical: f64::INFINITY })
        }
    };

    let critical = Normal::new(0.0, 1.0)?.inverse_cdf(1.0 - level);
    let statistic = match standard_error > 0.0 {
        true => difference / standard_error,
        false if difference > 0.0 => f64::INFINITY,
        false => 0.0,
    };
    Ok(TestOutcome { reject: statistic > critical, statistic, critical })
}

/// Chi-square goodness of fit test of an observed marker count against a clonal prevalence.
///
/// The expected counts are `prevalence * depth` (mutant) and `(1 - prevalence) * depth`
/// (wild-type), with 1 degree of freedom and a critical value at `1 - alpha/comparisons`.
/// A cell with an expected count of zero contributes nothing if it was also observed as
/// zero, otherwise the statistic is infinite.
///
/// ```rust
/// use clonetrack::{stats::chi_square_test, Observation};
/// let observation = Observation::new("TP53", 52, 100)?;
/// assert!(!chi_square_test(&observation, 0.5, 1.0, 0.05)?.reject);
/// assert!(chi_square_test(&observation, 0.1, 1.0, 0.05)?.reject);
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn chi_square_test(
    observation: &Observation,
    prevalence: f64,
    comparisons: f64,
    alpha: f64,
) -> Result<TestOutcome, Report> {
    if !(0.0..=1.0).contains(&prevalence) {
        return Err(eyre!("Clonal prevalence must be within [0, 1], found {prevalence}."));
    }
    let depth = observation.total as f64;
    let cells = [
        (observation.mutant as f64, prevalence * depth),
        ((observation.total - observation.mutant) as f64, (1.0 - prevalence) * depth),
    ];
    let statistic = cells
        .iter()
        .map(|(observed, expected)| match *expected > 0.0 {
            true => (observed - expected).powi(2) / expected,
            false if *observed == 0.0 => 0.0,
            false => f64::INFINITY,
        })
        .sum::<f64>();

    // a chi-square variable with 1 degree of freedom is a squared standard normal
    let z = Normal::new(0.0, 1.0)?.inverse_cdf(1.0 - bonferroni(alpha, comparisons) / 2.0);
    let critical = z * z;
    Ok(TestOutcome { reject: statistic > critical, statistic, critical })
}

/// The binomial log likelihood of an observed count, as a function of the fraction.
///
/// The log binomial coefficient is computed once, so that repeated evaluation during
/// numerical integration only costs two logarithms.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BinomialLikelihood {
    ln_coefficient: f64,
    k: f64,
    n: f64,
}

impl BinomialLikelihood {
    /// Returns the likelihood of `k` successes in `n` trials.
    pub fn new(k: u64, n: u64) -> Self {
        BinomialLikelihood { ln_coefficient: ln_binomial(n, k), k: k as f64, n: n as f64 }
    }

    /// Returns the natural log of the binomial probability at fraction `f`.
    ///
    /// `f` is clamped away from 0 and 1, so the result is always finite.
    pub fn ln_pmf(&self, f: f64) -> f64 {
        let f = f.clamp(FRACTION_EPSILON, 1.0 - FRACTION_EPSILON);
        self.ln_coefficient + self.k * f.ln() + (self.n - self.k) * (1.0 - f).ln()
    }
}

impl From<&Observation> for BinomialLikelihood {
    fn from(observation: &Observation) -> Self {
        BinomialLikelihood::new(observation.mutant, observation.total)
    }
}

/// Returns the natural log of the binomial probability of `k` successes in `n` trials at fraction `f`.
///
/// ```rust
/// use clonetrack::stats::ln_binomial_pmf;
/// assert!((ln_binomial_pmf(1, 2, 0.5) - 0.5_f64.ln()).abs() < 1e-12);
/// assert!(ln_binomial_pmf(5, 10, 0.0).is_finite());
/// ```
pub fn ln_binomial_pmf(k: u64, n: u64, f: f64) -> f64 {
    BinomialLikelihood::new(k, n).ln_pmf(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wald_same_is_two_sided() -> Result<(), Report> {
        let a = Observation::new("A", 30, 100)?;
        let b = Observation::new("B", 60, 100)?;
        let forward = wald_test(&a, &b, Relation::Same, 3.0, 0.05)?;
        let reverse = wald_test(&b, &a, Relation::Same, 3.0, 0.05)?;
        assert_eq!(forward, reverse);
        assert!(forward.reject);
        let one_sided = wald_test(&a, &b, Relation::Ancestor, 3.0, 0.05)?;
        assert!(forward.critical > one_sided.critical);
        Ok(())
    }

    #[test]
    fn wald_zero_standard_error() -> Result<(), Report> {
        let clonal = Observation::new("A", 100, 100)?;
        let absent = Observation::new("B", 0, 100)?;
        assert!(!wald_test(&clonal, &absent, Relation::Ancestor, 1.0, 0.05)?.reject);
        assert!(wald_test(&absent, &clonal, Relation::Ancestor, 1.0, 0.05)?.reject);
        assert!(!wald_test(&clonal, &clonal, Relation::Same, 1.0, 0.05)?.reject);
        Ok(())
    }

    #[test]
    fn wald_unrelated_never_rejects() -> Result<(), Report> {
        let a = Observation::new("A", 1, 1000)?;
        let b = Observation::new("B", 999, 1000)?;
        assert!(!wald_test(&a, &b, Relation::Unrelated, 1.0, 0.05)?.reject);
        Ok(())
    }

    #[test]
    fn chi_square_zero_expectation() -> Result<(), Report> {
        let absent = Observation::new("A", 0, 100)?;
        assert_eq!(chi_square_test(&absent, 0.0, 1.0, 0.05)?.statistic, 0.0);
        let present = Observation::new("A", 1, 100)?;
        assert!(chi_square_test(&present, 0.0, 1.0, 0.05)?.reject);
        assert!(chi_square_test(&present, 1.5, 1.0, 0.05).is_err());
        Ok(())
    }

    #[test]
    fn chi_square_critical_value() -> Result<(), Report> {
        let observation = Observation::new("A", 50, 100)?;
        let outcome = chi_square_test(&observation, 0.5, 1.0, 0.05)?;
        assert!((outcome.critical - 3.841).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn pairs() {
        assert_eq!(pair_count(0), 0);
        assert_eq!(pair_count(1), 0);
        assert_eq!(pair_count(4), 6);
    }
}
