//! Return models and per-trial return paths

use rand::Rng;
use rand_distr::{Distribution, Normal, StandardNormal};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::assumptions::HistoricalData;
use crate::error::{PlannerError, PlannerResult};
use crate::types::{rate_from_f64, Rate};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundParams {
    /// Arithmetic mean annual return
    pub mean: f64,
    pub std_dev: f64,
}

/// How each trial's annual returns are generated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReturnModel {
    /// Contiguous blocks of historical years, drawn with replacement and
    /// wrapping at the end of the record
    Historical { block_length: usize },

    /// Independent annual normal draws, correlated across funds
    Parametric {
        funds: Vec<FundParams>,
        /// Fund-by-fund correlation matrix
        correlation: Vec<Vec<f64>>,
        inflation_mean: f64,
        inflation_std: f64,
    },

    /// Same returns every year, mostly for tests and what-ifs
    Fixed { fund_returns: Vec<Rate>, inflation: Rate },
}

impl Default for ReturnModel {
    fn default() -> Self {
        ReturnModel::Historical { block_length: 5 }
    }
}

/// Returns for one trial: `fund_returns[year][fund]`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReturnPath {
    pub fund_returns: Vec<Vec<Rate>>,
    pub inflation: Vec<Rate>,
}

impl ReturnPath {
    pub fn len(&self) -> usize {
        self.inflation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflation.is_empty()
    }

    /// Allocation-weighted return per year
    pub fn portfolio_returns(&self, allocation: &[Rate]) -> PlannerResult<Vec<Rate>> {
        self.fund_returns
            .iter()
            .map(|year| {
                if year.len() != allocation.len() {
                    return Err(PlannerError::config(
                        "allocation",
                        format!("{} weights for {} funds", allocation.len(), year.len()),
                    ));
                }
                Ok(year
                    .iter()
                    .zip(allocation)
                    .map(|(r, w)| r * w)
                    .sum::<Decimal>()
                    .round_dp(8))
            })
            .collect()
    }
}

/// Lower-triangular `L` with `L * L^T == matrix`
pub fn cholesky(matrix: &[Vec<f64>]) -> PlannerResult<Vec<Vec<f64>>> {
    let n = matrix.len();
    if matrix.iter().any(|row| row.len() != n) {
        return Err(PlannerError::config("correlation", "matrix must be square"));
    }
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            if (matrix[i][j] - matrix[j][i]).abs() > 1e-9 {
                return Err(PlannerError::config("correlation", "matrix must be symmetric"));
            }
            let sum: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let d = matrix[i][i] - sum;
                if d <= 0.0 {
                    return Err(PlannerError::config("correlation", "matrix is not positive definite"));
                }
                l[i][j] = d.sqrt();
            } else {
                l[i][j] = (matrix[i][j] - sum) / l[j][j];
            }
        }
    }
    Ok(l)
}

fn clamp_return(r: Rate) -> Rate {
    r.max(-Decimal::ONE)
}

/// A validated model ready to draw paths
pub struct PathGenerator<'a> {
    model: &'a ReturnModel,
    historical: &'a HistoricalData,
    factor: Vec<Vec<f64>>,
}

impl<'a> PathGenerator<'a> {
    pub fn new(model: &'a ReturnModel, historical: &'a HistoricalData) -> PlannerResult<Self> {
        let mut factor = Vec::new();
        match model {
            ReturnModel::Historical { block_length } => {
                if *block_length == 0 {
                    return Err(PlannerError::config("model.block_length", "must be at least 1"));
                }
                if historical.is_empty() {
                    return Err(PlannerError::config("historical", "no historical records loaded"));
                }
            }
            ReturnModel::Parametric {
                funds,
                correlation,
                inflation_std,
                ..
            } => {
                if funds.is_empty() {
                    return Err(PlannerError::config("model.funds", "at least one fund is required"));
                }
                if correlation.len() != funds.len() {
                    return Err(PlannerError::config(
                        "model.correlation",
                        format!("{}x{} matrix for {} funds", correlation.len(), correlation.len(), funds.len()),
                    ));
                }
                if funds.iter().any(|f| !(f.std_dev >= 0.0) || !f.mean.is_finite()) || !(*inflation_std >= 0.0) {
                    return Err(PlannerError::config("model.funds", "std_dev must be non-negative and finite"));
                }
                factor = cholesky(correlation)?;
            }
            ReturnModel::Fixed { fund_returns, .. } => {
                if fund_returns.is_empty() {
                    return Err(PlannerError::config("model.fund_returns", "at least one fund is required"));
                }
            }
        }
        Ok(Self {
            model,
            historical,
            factor,
        })
    }

    pub fn fund_count(&self) -> usize {
        match self.model {
            ReturnModel::Historical { .. } => self.historical.fund_count(),
            ReturnModel::Parametric { funds, .. } => funds.len(),
            ReturnModel::Fixed { fund_returns, .. } => fund_returns.len(),
        }
    }

    /// Draw `years` of returns
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R, years: usize) -> PlannerResult<ReturnPath> {
        let mut path = ReturnPath {
            fund_returns: Vec::with_capacity(years),
            inflation: Vec::with_capacity(years),
        };
        match self.model {
            ReturnModel::Historical { block_length } => {
                let len = self.historical.len();
                while path.len() < years {
                    let start = rng.gen_range(0..len);
                    for i in 0..*block_length {
                        if path.len() >= years {
                            break;
                        }
                        let idx = (start + i) % len;
                        let record = self.historical.record_at(idx).ok_or_else(|| {
                            PlannerError::missing_data("historical", self.historical.first_year() + idx as i32)
                        })?;
                        path.fund_returns
                            .push(record.returns.iter().copied().map(clamp_return).collect());
                        path.inflation.push(record.inflation);
                    }
                }
            }
            ReturnModel::Parametric {
                funds,
                inflation_mean,
                inflation_std,
                ..
            } => {
                let inflation_dist = Normal::new(*inflation_mean, *inflation_std)
                    .map_err(|e| PlannerError::config("model.inflation_std", e.to_string()))?;
                for _ in 0..years {
                    let z: Vec<f64> = (0..funds.len()).map(|_| StandardNormal.sample(rng)).collect();
                    let mut year = Vec::with_capacity(funds.len());
                    for (i, fund) in funds.iter().enumerate() {
                        let correlated: f64 = (0..=i).map(|k| self.factor[i][k] * z[k]).sum();
                        year.push(clamp_return(rate_from_f64(fund.mean + fund.std_dev * correlated)?));
                    }
                    path.fund_returns.push(year);
                    path.inflation.push(rate_from_f64(inflation_dist.sample(rng))?);
                }
            }
            ReturnModel::Fixed {
                fund_returns,
                inflation,
            } => {
                let year: Vec<Rate> = fund_returns.iter().copied().map(clamp_return).collect();
                path.fund_returns = vec![year; years];
                path.inflation = vec![*inflation; years];
            }
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cholesky_two_by_two() {
        let l = cholesky(&[vec![1.0, 0.5], vec![0.5, 1.0]]).unwrap();
        assert_relative_eq!(l[0][0], 1.0);
        assert_relative_eq!(l[1][0], 0.5);
        assert_relative_eq!(l[1][1], 0.75_f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(l[0][1], 0.0);
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let err = cholesky(&[vec![1.0, 1.5], vec![1.5, 1.0]]).unwrap_err();
        assert!(matches!(err, PlannerError::Configuration { .. }));
    }

    #[test]
    fn test_historical_blocks_are_contiguous_and_wrap() {
        let data = HistoricalData::us_default();
        let model = ReturnModel::Historical { block_length: 5 };
        let generator = PathGenerator::new(&model, &data).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let path = generator.generate(&mut rng, 25).unwrap();
        assert_eq!(path.len(), 25);
        assert_eq!(path.fund_returns[0].len(), 2);

        // Each year in a block is the historical successor of the one before
        let successor = |a: usize, b: usize| {
            let ia = (0..data.len())
                .find(|&i| data.record_at(i).unwrap().inflation == path.inflation[a]
                    && data.record_at(i).unwrap().returns == path.fund_returns[a])
                .unwrap();
            let next = data.record_at((ia + 1) % data.len()).unwrap();
            next.inflation == path.inflation[b] && next.returns == path.fund_returns[b]
        };
        for block in 0..5 {
            for i in 0..4 {
                assert!(successor(block * 5 + i, block * 5 + i + 1));
            }
        }
    }

    #[test]
    fn test_parametric_means_roughly_match() {
        let data = HistoricalData::us_default();
        let model = ReturnModel::Parametric {
            funds: vec![
                FundParams { mean: 0.08, std_dev: 0.16 },
                FundParams { mean: 0.04, std_dev: 0.06 },
            ],
            correlation: vec![vec![1.0, 0.2], vec![0.2, 1.0]],
            inflation_mean: 0.03,
            inflation_std: 0.01,
        };
        let generator = PathGenerator::new(&model, &data).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let path = generator.generate(&mut rng, 20_000).unwrap();

        let mean = |f: usize| {
            path.fund_returns.iter().map(|y| crate::types::to_f64(y[f])).sum::<f64>() / path.len() as f64
        };
        assert_relative_eq!(mean(0), 0.08, epsilon = 0.01);
        assert_relative_eq!(mean(1), 0.04, epsilon = 0.005);
        assert!(path.fund_returns.iter().flatten().all(|r| *r >= dec!(-1)));
    }

    #[test]
    fn test_portfolio_returns_weighted() {
        let path = ReturnPath {
            fund_returns: vec![vec![dec!(0.10), dec!(0.02)]],
            inflation: vec![dec!(0.03)],
        };
        let returns = path.portfolio_returns(&[dec!(0.6), dec!(0.4)]).unwrap();
        assert_eq!(returns, vec![dec!(0.068)]);
        assert!(path.portfolio_returns(&[dec!(1)]).is_err());
    }
}
