// src/lib.rs

pub mod error;
pub mod returns;
pub mod sampler;
pub mod stats;

pub use error::FrontierError;
pub use returns::{build, ReturnsMatrix, MIN_RETURN_ROWS};
pub use sampler::{
    sample, sample_par, BestSample, Frontier, FrontierPoint, FrontierSampler, CHUNK_SIZE,
    DEFAULT_SAMPLE_COUNT, MAX_SAMPLES,
};
pub use stats::{equal_weights, AnnualizedMoments, PortfolioMetrics, VOLATILITY_FLOOR};
