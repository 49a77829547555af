// src/sampler.rs
//
// Monte Carlo frontier: random long-only portfolios drawn by normalizing
// independent Uniform[0,1) draws. The draw is not uniform over the simplex;
// it favours interior weights.

use crate::error::FrontierError;
use crate::returns::ReturnsMatrix;
use crate::stats::{AnnualizedMoments, PortfolioMetrics};
use ordered_float::OrderedFloat;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

pub const MAX_SAMPLES: usize = 10_000_000;
pub const DEFAULT_SAMPLE_COUNT: usize = 10_000;

/// Samples per parallel work unit. Each chunk gets its own seeded stream.
pub const CHUNK_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrontierPoint {
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe: f64,
}

impl From<PortfolioMetrics> for FrontierPoint {
    fn from(metrics: PortfolioMetrics) -> Self {
        FrontierPoint {
            expected_return: metrics.expected_return,
            volatility: metrics.volatility,
            sharpe: metrics.sharpe,
        }
    }
}

/// Highest-Sharpe draw and the weights that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestSample {
    pub index: usize,
    pub point: FrontierPoint,
    pub weights: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frontier {
    pub points: Vec<FrontierPoint>,
    pub best: BestSample,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrontierSampler {
    risk_free_rate: f64,
    annualization_factor: f64,
    sample_count: usize,
}

impl FrontierSampler {
    pub fn new(risk_free_rate: f64, annualization_factor: f64, sample_count: usize) -> Result<Self, FrontierError> {
        if sample_count == 0 || sample_count > MAX_SAMPLES {
            return Err(FrontierError::SampleBudget {
                requested: sample_count,
                max: MAX_SAMPLES,
            });
        }

        Ok(FrontierSampler {
            risk_free_rate,
            annualization_factor,
            sample_count,
        })
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn sample<R: Rng + ?Sized>(&self, returns: &ReturnsMatrix, rng: &mut R) -> Result<Frontier, FrontierError> {
        let moments = AnnualizedMoments::from_returns(returns, self.annualization_factor);
        self.sample_moments(&moments, rng)
    }

    pub fn sample_par<R: Rng + ?Sized>(&self, returns: &ReturnsMatrix, rng: &mut R) -> Result<Frontier, FrontierError> {
        let moments = AnnualizedMoments::from_returns(returns, self.annualization_factor);
        self.sample_moments_par(&moments, rng)
    }

    /// Draws every sample from `rng` in order.
    pub fn sample_moments<R: Rng + ?Sized>(
        &self,
        moments: &AnnualizedMoments,
        rng: &mut R,
    ) -> Result<Frontier, FrontierError> {
        let chunk = draw_chunk(moments, self.risk_free_rate, 0, self.sample_count, rng)?;
        let frontier = assemble(vec![chunk])?;
        log_frontier(&frontier, moments.n_assets());
        Ok(frontier)
    }

    /// Splits the draws into `CHUNK_SIZE` chunks, seeds each chunk from `rng`,
    /// and runs them on the rayon pool. Output depends on `rng` only.
    pub fn sample_moments_par<R: Rng + ?Sized>(
        &self,
        moments: &AnnualizedMoments,
        rng: &mut R,
    ) -> Result<Frontier, FrontierError> {
        let n_chunks = (self.sample_count + CHUNK_SIZE - 1) / CHUNK_SIZE;
        let seeds: Vec<u64> = (0..n_chunks).map(|_| rng.next_u64()).collect();
        debug!(chunks = n_chunks, "Sampling frontier in parallel");

        let chunks = seeds
            .into_par_iter()
            .enumerate()
            .map(|(c, seed)| {
                let offset = c * CHUNK_SIZE;
                let len = CHUNK_SIZE.min(self.sample_count - offset);
                let mut chunk_rng = StdRng::seed_from_u64(seed);
                draw_chunk(moments, self.risk_free_rate, offset, len, &mut chunk_rng)
            })
            .collect::<Result<Vec<_>, FrontierError>>()?;

        let frontier = assemble(chunks)?;
        log_frontier(&frontier, moments.n_assets());
        Ok(frontier)
    }
}

/// Sequential sampling with a one-off sampler.
pub fn sample<R: Rng + ?Sized>(
    returns: &ReturnsMatrix,
    risk_free_rate: f64,
    annualization_factor: f64,
    sample_count: usize,
    rng: &mut R,
) -> Result<Frontier, FrontierError> {
    FrontierSampler::new(risk_free_rate, annualization_factor, sample_count)?.sample(returns, rng)
}

pub fn sample_par<R: Rng + ?Sized>(
    returns: &ReturnsMatrix,
    risk_free_rate: f64,
    annualization_factor: f64,
    sample_count: usize,
    rng: &mut R,
) -> Result<Frontier, FrontierError> {
    FrontierSampler::new(risk_free_rate, annualization_factor, sample_count)?.sample_par(returns, rng)
}

/// Normalized Uniform[0,1) draws, one per asset.
pub fn random_weights<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<f64> {
    let unit = Uniform::new(0.0, 1.0);
    loop {
        let raw: Vec<f64> = (0..n).map(|_| unit.sample(rng)).collect();
        let total: f64 = raw.iter().sum();
        if total > 0.0 {
            return raw.into_iter().map(|x| x / total).collect();
        }
    }
}

struct Chunk {
    points: Vec<FrontierPoint>,
    best: Option<BestSample>,
}

fn draw_chunk<R: Rng + ?Sized>(
    moments: &AnnualizedMoments,
    risk_free_rate: f64,
    offset: usize,
    len: usize,
    rng: &mut R,
) -> Result<Chunk, FrontierError> {
    let n = moments.n_assets();
    let mut points = Vec::with_capacity(len);
    let mut best: Option<BestSample> = None;

    for i in 0..len {
        let weights = random_weights(n, rng);
        let point = FrontierPoint::from(moments.evaluate(&weights, risk_free_rate)?);
        points.push(point);

        let improves = best
            .as_ref()
            .map_or(true, |b| OrderedFloat(point.sharpe) > OrderedFloat(b.point.sharpe));
        if improves {
            best = Some(BestSample {
                index: offset + i,
                point,
                weights,
            });
        }
    }

    Ok(Chunk { points, best })
}

// Concatenates chunks in order; ties on Sharpe keep the earliest draw.
fn assemble(chunks: Vec<Chunk>) -> Result<Frontier, FrontierError> {
    let total = chunks.iter().map(|c| c.points.len()).sum();
    let mut points = Vec::with_capacity(total);
    let mut best: Option<BestSample> = None;

    for chunk in chunks {
        points.extend(chunk.points);
        if let Some(candidate) = chunk.best {
            let improves = best
                .as_ref()
                .map_or(true, |b| OrderedFloat(candidate.point.sharpe) > OrderedFloat(b.point.sharpe));
            if improves {
                best = Some(candidate);
            }
        }
    }

    match best {
        Some(best) => Ok(Frontier { points, best }),
        None => Err(FrontierError::SampleBudget {
            requested: 0,
            max: MAX_SAMPLES,
        }),
    }
}

fn log_frontier(frontier: &Frontier, n_assets: usize) {
    info!(
        samples = frontier.points.len(),
        assets = n_assets,
        best_index = frontier.best.index,
        best_sharpe = frontier.best.point.sharpe,
        "Sampled frontier"
    );
}
