//! Unit operation models.
//!
//! Every node in a flowsheet implements the [`UnitModel`] trait:
//!
//! - **Passthrough**: the base variant for feeds, product sinks, and other
//!   conceptual nodes; uses the trait's default solve.
//! - **CSTR**: continuous stirred-tank reactor with an internal fixed-point
//!   mass-balance iteration.
//! - **Separator**: light-key component splitter.
//!
//! Custom units are first-class: implement [`UnitModel`] and override
//! `solve` where the default passthrough behavior is not enough. The default
//! lives on the trait rather than a mandatory base type, so a unit opts into
//! exactly the behavior it needs.
//!
//! # Solve contract
//!
//! `solve` reads the unit's inlet streams (already finalized by upstream
//! units in evaluation order) and writes final values into its outlet
//! streams. A unit must not read its own outlets except to overwrite them.
//! Any error returned from `solve` aborts the surrounding flowsheet solve;
//! see [`crate::solver`].

mod cstr;
mod passthrough;
mod separator;

pub use cstr::CSTR;
pub use passthrough::Passthrough;
pub use separator::Separator;

use std::any::Any;

use tracing::warn;

use crate::kinetics::KineticsError;
use crate::stream::StreamRef;

/// Errors a unit solve may raise.
///
/// All variants are fatal to the current flowsheet solve: the solver reports
/// which unit failed and stops without evaluating downstream units.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    /// Composition failed to normalize (e.g. all fractions zero).
    #[error("invalid composition: {0}")]
    InvalidComposition(String),
    /// A species required by the reaction is absent from the composition.
    #[error("reactant '{reactant}' not found in composition")]
    MissingReactant { reactant: String },
    /// Residence-time computation would divide by zero.
    #[error("stream '{stream}' carries no flow; residence time is undefined")]
    ZeroFlow { stream: String },
    /// A required stream condition has not been set.
    #[error("stream '{stream}' has no {field} set")]
    MissingCondition { stream: String, field: &'static str },
    /// The unit is missing a required inlet or outlet connection.
    #[error("unit '{unit}' is not connected: {detail}")]
    NotConnected { unit: String, detail: &'static str },
    /// Escape hatch for custom unit implementations.
    #[error("{0}")]
    Other(String),
}

impl From<KineticsError> for UnitError {
    fn from(err: KineticsError) -> Self {
        match err {
            KineticsError::MissingReactant { reactant } => {
                UnitError::MissingReactant { reactant }
            }
        }
    }
}

/// Inlet and outlet stream slots of a unit.
///
/// Slots are ordered: connection order is slot order. The flowsheet fills
/// these during [`crate::Flowsheet::connect`]; standalone harnesses (model
/// validation, parameter estimation) may `reset` them to drive a single unit
/// outside a flowsheet.
#[derive(Debug, Default)]
pub struct Ports {
    inlets: Vec<StreamRef>,
    outlets: Vec<StreamRef>,
}

impl Ports {
    /// Creates an unconnected port set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an inlet stream reference.
    pub fn add_inlet(&mut self, stream: StreamRef) {
        self.inlets.push(stream);
    }

    /// Appends an outlet stream reference.
    pub fn add_outlet(&mut self, stream: StreamRef) {
        self.outlets.push(stream);
    }

    /// Replaces every connection. Used by harnesses that re-stage a unit
    /// against synthetic streams.
    pub fn reset(&mut self, inlets: Vec<StreamRef>, outlets: Vec<StreamRef>) {
        self.inlets = inlets;
        self.outlets = outlets;
    }

    /// Inlet slots in connection order.
    pub fn inlets(&self) -> &[StreamRef] {
        &self.inlets
    }

    /// Outlet slots in connection order.
    pub fn outlets(&self) -> &[StreamRef] {
        &self.outlets
    }

    pub fn n_inlets(&self) -> usize {
        self.inlets.len()
    }

    pub fn n_outlets(&self) -> usize {
        self.outlets.len()
    }
}

/// Capital-cost basis a unit exposes to the economics collaborator.
///
/// `equipment` keys into the cost-curve table; `capacity` is the scaling
/// quantity (reactor volume, inlet flow rate, exchanger area, ...).
#[derive(Debug, Clone, Copy)]
pub struct CostBasis {
    pub equipment: &'static str,
    pub capacity: f64,
}

/// A unit operation in a flowsheet.
///
/// The trait is the polymorphism seam: the solver only ever sees
/// `&mut dyn UnitModel`. `as_any`/`as_any_mut` give outer callers
/// (optimization, uncertainty studies) typed access to unit parameters, e.g.
/// to vary a reactor volume between solves.
pub trait UnitModel {
    /// Unit name, unique within its flowsheet.
    fn name(&self) -> &str;

    /// Immutable access to the unit's stream connections.
    fn ports(&self) -> &Ports;

    /// Mutable access to the unit's stream connections.
    fn ports_mut(&mut self) -> &mut Ports;

    /// Solves the unit's local model.
    ///
    /// The default implementation is the passthrough behavior shared by
    /// feeds, sinks, and conceptual nodes: with zero inlets it is a no-op
    /// (a source's outlets were pre-seeded by the caller); otherwise it
    /// copies the first inlet's full field set into every outlet. When more
    /// than one inlet is connected only the first is used and a warning is
    /// emitted (an acknowledged simplification, not silent data loss).
    fn solve(&mut self) -> Result<(), UnitError> {
        let name = self.name().to_owned();
        passthrough_solve(&name, self.ports())
    }

    /// Capital-cost basis for economic evaluation; `None` for conceptual
    /// units (feeds, sinks) that carry no equipment cost.
    fn cost_basis(&self) -> Option<CostBasis> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// The reusable default solve: copy the first inlet to every outlet.
pub(crate) fn passthrough_solve(name: &str, ports: &Ports) -> Result<(), UnitError> {
    if ports.inlets().is_empty() {
        // Source unit: outlets were pre-seeded by the caller.
        return Ok(());
    }
    if ports.n_inlets() > 1 {
        warn!("default solve for unit '{}' uses only the first inlet", name);
    }

    let inlet = ports.inlets()[0].borrow().clone();
    for outlet in ports.outlets() {
        outlet.borrow_mut().copy_state_from(&inlet);
    }
    Ok(())
}
