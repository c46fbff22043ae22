// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use idl_core::IdealizeError;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Model-selection score used to compare candidate fits.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InformationCriterion {
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "BIC"))]
    Bic,
}

impl FromStr for InformationCriterion {
    type Err = IdealizeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bic" => Ok(Self::Bic),
            _ => Err(IdealizeError::not_supported(format!(
                "unsupported information criterion '{raw}'; expected one of: 'BIC'"
            ))),
        }
    }
}

impl fmt::Display for InformationCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bic => f.write_str("BIC"),
        }
    }
}

/// How the residual term of the BIC is evaluated.
///
/// Both variants differ by a constant for a given trace, so they always rank
/// candidate fits identically.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BicMethod {
    /// Exact Gaussian `-2 log L` with the maximum-likelihood noise variance.
    #[default]
    Full,
    /// `N ln(MSE)` only.
    Approx,
}

impl FromStr for BicMethod {
    type Err = IdealizeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "approx" => Ok(Self::Approx),
            _ => Err(IdealizeError::not_supported(format!(
                "unsupported BIC method '{raw}'; expected one of: 'full', 'approx'"
            ))),
        }
    }
}

/// Sufficient statistics of a fit for scoring.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitSummary {
    pub n: usize,
    pub n_changepoints: usize,
    pub n_states: usize,
    pub sse: f64,
    pub exact: bool,
}

impl FitSummary {
    pub fn from_fit(data: &[f64], fit: &[f64]) -> Result<Self, IdealizeError> {
        if data.len() != fit.len() {
            return Err(IdealizeError::invalid_input(format!(
                "data/fit length mismatch: data={}, fit={}",
                data.len(),
                fit.len()
            )));
        }
        if data.is_empty() {
            return Err(IdealizeError::invalid_input(
                "information criterion requires >= 1 sample",
            ));
        }

        let n_changepoints = fit.windows(2).filter(|w| w[1] != w[0]).count();
        let mut levels = fit.to_vec();
        levels.sort_by(f64::total_cmp);
        levels.dedup();

        let mut sse = 0.0;
        let mut exact = true;
        for (&x, &f) in data.iter().zip(fit) {
            if x != f {
                exact = false;
            }
            sse += (x - f) * (x - f);
        }

        Ok(Self {
            n: data.len(),
            n_changepoints,
            n_states: levels.len(),
            sse,
            exact,
        })
    }
}

/// Scores a fit summary; lower is better.
pub fn score_summary(
    summary: &FitSummary,
    criterion: InformationCriterion,
    method: BicMethod,
) -> f64 {
    match criterion {
        InformationCriterion::Bic => {
            let n = summary.n as f64;
            let penalty = (summary.n_changepoints + summary.n_states) as f64 * n.ln();
            if summary.exact {
                return penalty;
            }
            let mse = (summary.sse / n).max(f64::MIN_POSITIVE);
            let residual = n * mse.ln();
            match method {
                BicMethod::Approx => penalty + residual,
                BicMethod::Full => penalty + residual + n * ((2.0 * PI).ln() + 1.0),
            }
        }
    }
}

/// Scores `fit` against `data`; lower is better.
pub fn information_criterion(
    data: &[f64],
    fit: &[f64],
    criterion: InformationCriterion,
    method: BicMethod,
) -> Result<f64, IdealizeError> {
    let summary = FitSummary::from_fit(data, fit)?;
    Ok(score_summary(&summary, criterion, method))
}

#[cfg(test)]
mod tests {
    use super::{BicMethod, FitSummary, InformationCriterion, information_criterion};
    use std::str::FromStr;

    #[test]
    fn parses_bic_case_insensitively_and_rejects_unknown() {
        assert_eq!(
            InformationCriterion::from_str("BIC").expect("BIC parses"),
            InformationCriterion::Bic
        );
        assert_eq!(
            InformationCriterion::from_str(" bic ").expect("bic parses"),
            InformationCriterion::Bic
        );

        let err = InformationCriterion::from_str("AIC").expect_err("AIC is not supported");
        assert!(err.to_string().starts_with("not supported"));
        assert!(err.to_string().contains("'AIC'"));

        assert_eq!(BicMethod::from_str("approx").expect("approx"), BicMethod::Approx);
        assert!(BicMethod::from_str("exact").is_err());
        assert_eq!(InformationCriterion::Bic.to_string(), "BIC");
    }

    #[test]
    fn summary_counts_changepoints_states_and_residual() {
        let data = [0.1, -0.1, 1.1, 0.9, 0.0];
        let fit = [0.0, 0.0, 1.0, 1.0, 0.0];
        let summary = FitSummary::from_fit(&data, &fit).expect("summary should compute");
        assert_eq!(summary.n, 5);
        assert_eq!(summary.n_changepoints, 2);
        assert_eq!(summary.n_states, 2);
        assert!((summary.sse - 0.04).abs() < 1e-12);
        assert!(!summary.exact);
    }

    #[test]
    fn exact_fit_scores_penalty_only() {
        let data = [1.0, 1.0, 2.0, 2.0];
        let score = information_criterion(&data, &data, InformationCriterion::Bic, BicMethod::Full)
            .expect("score should compute");
        assert!((score - 3.0 * 4.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn full_and_approx_rank_fits_identically() {
        let data = [0.0, 0.2, -0.1, 1.0, 1.2, 0.9, 0.1, 0.0];
        let two_level = [0.03, 0.03, 0.03, 1.03, 1.03, 1.03, 0.05, 0.05];
        let one_level = [0.4125; 8];

        for method in [BicMethod::Full, BicMethod::Approx] {
            let a = information_criterion(&data, &two_level, InformationCriterion::Bic, method)
                .expect("two-level score");
            let b = information_criterion(&data, &one_level, InformationCriterion::Bic, method)
                .expect("one-level score");
            assert!(a < b, "two-level fit should win under {method:?}");
        }

        let full = information_criterion(&data, &one_level, InformationCriterion::Bic, BicMethod::Full)
            .expect("full");
        let approx =
            information_criterion(&data, &one_level, InformationCriterion::Bic, BicMethod::Approx)
                .expect("approx");
        let offset = 8.0 * ((2.0 * std::f64::consts::PI).ln() + 1.0);
        assert!((full - approx - offset).abs() < 1e-9);
    }

    #[test]
    fn length_mismatch_and_empty_are_rejected() {
        assert!(
            information_criterion(&[1.0], &[1.0, 2.0], InformationCriterion::Bic, BicMethod::Full)
                .is_err()
        );
        assert!(
            information_criterion(&[], &[], InformationCriterion::Bic, BicMethod::Full).is_err()
        );
    }
}
