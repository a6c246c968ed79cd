//! Model adaptation: tuning kinetic parameters against plant data.
//!
//! When the model drifts from the plant, the estimator re-fits a kinetic
//! parameter so the model reproduces a recorded operating point. The caller
//! says *how* a candidate parameter value becomes a reaction (typically the
//! Arrhenius pre-exponential factor inside a closure); the estimator owns
//! the rest: build the inlet from the historian record, solve the staged
//! model, square the prediction error, and minimize it with a 1-D
//! Nelder-Mead search. Tuning probes the model without committing to it:
//! the model's original reaction is restored afterwards.

use std::rc::Rc;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::data::CsvDataReader;
use crate::kinetics::ReactionKinetics;
use crate::models::{UnitModel, CSTR};
use crate::optimization::NelderMead;
use crate::validation::{fermentation_inlet, stage_unit, InletMapper, TargetMap};

/// Errors raised while tuning a parameter.
#[derive(Debug, thiserror::Error)]
pub enum AdaptationError {
    /// No historian record at or before the requested timestamp.
    #[error("no historical data at or before {0}")]
    NoData(NaiveDateTime),
    /// The target data column is absent from the record.
    #[error("historical record has no '{0}' column")]
    MissingColumn(String),
    /// The inlet mapper could not build a stream from the record.
    #[error("historical record is missing data for the inlet mapping")]
    InletMapping,
    /// The search did not converge within its iteration budget.
    #[error("parameter tuning failed to converge after {iterations} iterations")]
    NotConverged { iterations: usize },
}

/// Tunes model parameters to minimize the error against historical data.
pub struct ParameterEstimator<'a> {
    reader: &'a CsvDataReader,
    target: TargetMap,
    inlet_mapper: InletMapper,
    optimizer: NelderMead,
}

impl<'a> ParameterEstimator<'a> {
    pub fn new(reader: &'a CsvDataReader, target: TargetMap) -> Self {
        ParameterEstimator {
            reader,
            target,
            inlet_mapper: Box::new(fermentation_inlet),
            optimizer: NelderMead::new(1e-12, 200),
        }
    }

    pub fn with_optimizer(mut self, optimizer: NelderMead) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Finds the parameter value minimizing the squared prediction error at
    /// one recorded operating point.
    ///
    /// `make_reaction` maps a candidate value to a reaction object; the
    /// returned value is the best candidate found. The model's reaction is
    /// restored to its original before returning, whether or not tuning
    /// succeeds. A candidate whose solve fails scores +infinity and the
    /// search moves on.
    pub fn tune_parameter(
        &self,
        model: &mut CSTR,
        timestamp: NaiveDateTime,
        make_reaction: impl Fn(f64) -> Rc<dyn ReactionKinetics>,
        initial_guess: f64,
    ) -> Result<f64, AdaptationError> {
        let record = self
            .reader
            .get_data_at_timestamp(timestamp)
            .ok_or(AdaptationError::NoData(timestamp))?;
        let actual = record
            .get(&self.target.data_column)
            .ok_or_else(|| AdaptationError::MissingColumn(self.target.data_column.clone()))?
            * self.target.scale;
        let inlet = (self.inlet_mapper)(record).ok_or(AdaptationError::InletMapping)?;

        let original_reaction = model.reaction();
        let target_component = self.target.model_component.clone();

        let objective = |x: &[f64]| -> f64 {
            model.set_reaction(make_reaction(x[0]));
            let (_inlet_ref, outlet_ref) = stage_unit(model, inlet.clone());
            match model.solve() {
                Ok(()) => {
                    let predicted = outlet_ref
                        .borrow()
                        .composition
                        .get(&target_component)
                        .copied()
                        .unwrap_or(0.0);
                    (predicted - actual) * (predicted - actual)
                }
                Err(e) => {
                    warn!("candidate parameter {} failed to solve: {}", x[0], e);
                    f64::INFINITY
                }
            }
        };

        let outcome = self.optimizer.minimize(objective, &[initial_guess], None);
        model.set_reaction(original_reaction);

        if !outcome.converged {
            return Err(AdaptationError::NotConverged { iterations: outcome.iterations });
        }
        info!(
            "tuned parameter {} -> {} (squared error {:.3e}, {} iterations)",
            initial_guess, outcome.x[0], outcome.objective, outcome.iterations
        );
        Ok(outcome.x[0])
    }
}
