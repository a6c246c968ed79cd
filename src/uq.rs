//! Monte Carlo uncertainty quantification.
//!
//! The driver is generic over a caller-owned *scenario context* `Ctx`,
//! typically a struct bundling a flowsheet with whatever collaborators the
//! study varies (economic parameters, kinetics, ...). Uncertain parameters
//! are (distribution, setter) pairs writing into the context; output
//! responses are named readers over it. Per sample the driver draws every
//! parameter, applies the setters, runs the caller's solve closure, and
//! records the responses.
//!
//! A failed solve skips that sample with a warning and continues: the
//! skip-and-continue policy lives here, in the outer driver, never in the
//! flowsheet solver itself.
//!
//! # Example
//!
//! ```
//! use rand::SeedableRng;
//! use seqmod::uq::{Distribution, MonteCarlo};
//!
//! // Toy scenario: the "flowsheet" is a single value.
//! struct Scenario { volume: f64 }
//!
//! let mut mc = MonteCarlo::new(100);
//! mc.add_uncertain_parameter(
//!     Distribution::normal(10.0, 0.5).unwrap(),
//!     |ctx: &mut Scenario, v| ctx.volume = v,
//! );
//! mc.add_output_response("volume", |ctx: &Scenario| ctx.volume);
//!
//! let mut ctx = Scenario { volume: 10.0 };
//! let mut rng = rand::rngs::StdRng::seed_from_u64(42);
//! let results = mc.run(&mut ctx, |_ctx| Ok::<(), seqmod::solver::SolveError>(()), &mut rng);
//!
//! assert_eq!(results.len("volume"), Some(100));
//! ```

use std::io::Write;

use indexmap::IndexMap;
use rand::Rng;
use rand_distr::Distribution as SampleDistribution;
use serde::Serialize;
use tracing::{info, warn};

/// Errors raised while configuring an uncertainty study.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UqError {
    /// Distribution parameters are out of range (e.g. non-positive spread).
    #[error("invalid distribution: {0}")]
    InvalidDistribution(String),
    /// Writing results failed.
    #[error("failed to export results: {0}")]
    Export(String),
}

/// Sampling distribution for an uncertain parameter.
#[derive(Debug, Clone, Copy)]
pub enum Distribution {
    Normal(rand_distr::Normal<f64>),
    Uniform(rand_distr::Uniform<f64>),
    LogNormal(rand_distr::LogNormal<f64>),
}

impl Distribution {
    /// Normal distribution with the given mean and standard deviation.
    pub fn normal(mean: f64, std_dev: f64) -> Result<Self, UqError> {
        rand_distr::Normal::new(mean, std_dev)
            .map(Distribution::Normal)
            .map_err(|e| UqError::InvalidDistribution(e.to_string()))
    }

    /// Uniform distribution on `[low, high)`.
    pub fn uniform(low: f64, high: f64) -> Result<Self, UqError> {
        if !(low < high) {
            return Err(UqError::InvalidDistribution(format!(
                "uniform bounds must satisfy low < high (got {low} >= {high})"
            )));
        }
        Ok(Distribution::Uniform(rand_distr::Uniform::new(low, high)))
    }

    /// Log-normal distribution parameterized by the underlying normal's
    /// mu and sigma.
    pub fn log_normal(mu: f64, sigma: f64) -> Result<Self, UqError> {
        rand_distr::LogNormal::new(mu, sigma)
            .map(Distribution::LogNormal)
            .map_err(|e| UqError::InvalidDistribution(e.to_string()))
    }

    /// Draws one sample.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Distribution::Normal(d) => d.sample(rng),
            Distribution::Uniform(d) => d.sample(rng),
            Distribution::LogNormal(d) => d.sample(rng),
        }
    }
}

struct UncertainParameter<Ctx> {
    distribution: Distribution,
    setter: Box<dyn FnMut(&mut Ctx, f64)>,
}

struct OutputResponse<Ctx> {
    name: String,
    response: Box<dyn Fn(&Ctx) -> f64>,
}

/// Monte Carlo simulation over a scenario context.
pub struct MonteCarlo<Ctx> {
    num_samples: usize,
    parameters: Vec<UncertainParameter<Ctx>>,
    responses: Vec<OutputResponse<Ctx>>,
}

impl<Ctx> MonteCarlo<Ctx> {
    pub fn new(num_samples: usize) -> Self {
        MonteCarlo { num_samples, parameters: Vec::new(), responses: Vec::new() }
    }

    /// Adds an uncertain parameter: each sample draws from `distribution`
    /// and hands the value to `setter` to place it in the scenario.
    pub fn add_uncertain_parameter(
        &mut self,
        distribution: Distribution,
        setter: impl FnMut(&mut Ctx, f64) + 'static,
    ) {
        self.parameters.push(UncertainParameter { distribution, setter: Box::new(setter) });
    }

    /// Adds a named output response recorded after each successful sample.
    pub fn add_output_response(&mut self, name: impl Into<String>, response: impl Fn(&Ctx) -> f64 + 'static) {
        self.responses.push(OutputResponse { name: name.into(), response: Box::new(response) });
    }

    /// Runs the simulation.
    ///
    /// `solve` re-evaluates the scenario after the setters have been
    /// applied; an `Err` skips the sample (with a warning) and the run
    /// continues. The caller supplies the RNG, so studies are reproducible
    /// under a seeded generator.
    pub fn run<R, S, E>(&mut self, ctx: &mut Ctx, mut solve: S, rng: &mut R) -> McResults
    where
        R: Rng + ?Sized,
        S: FnMut(&mut Ctx) -> Result<(), E>,
        E: std::fmt::Display,
    {
        let mut samples: IndexMap<String, Vec<f64>> = self
            .responses
            .iter()
            .map(|r| (r.name.clone(), Vec::with_capacity(self.num_samples)))
            .collect();
        let mut failures = 0;

        info!("running Monte Carlo simulation ({} samples)", self.num_samples);
        let progress_step = (self.num_samples / 10).max(1);

        for i in 0..self.num_samples {
            for parameter in &mut self.parameters {
                let value = parameter.distribution.sample(rng);
                (parameter.setter)(ctx, value);
            }

            if let Err(e) = solve(ctx) {
                warn!("sample {} failed to solve, skipping: {}", i + 1, e);
                failures += 1;
                continue;
            }

            for response in &self.responses {
                let value = (response.response)(ctx);
                if let Some(column) = samples.get_mut(&response.name) {
                    column.push(value);
                }
            }

            if (i + 1) % progress_step == 0 {
                info!("completed {}/{} samples", i + 1, self.num_samples);
            }
        }

        info!("Monte Carlo simulation complete ({} failed samples)", failures);
        McResults { samples, requested: self.num_samples, failures }
    }
}

/// Summary statistics of one output response.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseStats {
    pub name: String,
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

/// Recorded samples of a Monte Carlo run.
#[derive(Debug, Clone, Serialize)]
pub struct McResults {
    samples: IndexMap<String, Vec<f64>>,
    requested: usize,
    failures: usize,
}

impl McResults {
    /// Number of samples requested, including failed ones.
    pub fn requested(&self) -> usize {
        self.requested
    }

    /// Number of samples skipped because the scenario failed to solve.
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Recorded values of a response.
    pub fn samples(&self, response: &str) -> Option<&[f64]> {
        self.samples.get(response).map(Vec::as_slice)
    }

    /// Number of recorded values of a response.
    pub fn len(&self, response: &str) -> Option<usize> {
        self.samples.get(response).map(Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.values().all(Vec::is_empty)
    }

    /// Per-response summary statistics (sample standard deviation).
    pub fn summary(&self) -> Vec<ResponseStats> {
        self.samples
            .iter()
            .map(|(name, values)| {
                let count = values.len();
                let mean =
                    if count > 0 { values.iter().sum::<f64>() / count as f64 } else { 0.0 };
                let std_dev = if count > 1 {
                    let ss: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
                    (ss / (count - 1) as f64).sqrt()
                } else {
                    0.0
                };
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                ResponseStats { name: name.clone(), count, mean, std_dev, min, max }
            })
            .collect()
    }

    /// Writes the samples as CSV, one column per response, one row per
    /// successful sample.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), UqError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer
            .write_record(self.samples.keys())
            .map_err(|e| UqError::Export(e.to_string()))?;

        let rows = self.samples.values().map(Vec::len).max().unwrap_or(0);
        for row in 0..rows {
            let record: Vec<String> = self
                .samples
                .values()
                .map(|column| {
                    column.get(row).map(|v| v.to_string()).unwrap_or_default()
                })
                .collect();
            csv_writer.write_record(&record).map_err(|e| UqError::Export(e.to_string()))?;
        }
        csv_writer.flush().map_err(|e| UqError::Export(e.to_string()))?;
        Ok(())
    }
}
