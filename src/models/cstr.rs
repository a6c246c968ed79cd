//! Continuous Stirred-Tank Reactor (CSTR) model.
//!
//! The one unit in the crate with real numerical structure: a steady-state
//! component mass balance closed by fixed-point iteration.
//!
//! # Balance
//!
//! For the limiting reactant A with residence time tau = V / F_in, the
//! implicit steady-state balance C_in - C_out - tau * rate = 0 is iterated as
//!
//! ```text
//! C_out = C_in / (1 + tau * rate / C_in)
//! ```
//!
//! with the rate evaluated at the current outlet guess. Compositions stand
//! in for concentrations (dilute simplification); flow, temperature, and
//! pressure pass through unchanged; no energy or overall mass balance is
//! modeled.
//!
//! # Known limitations
//!
//! - Exactly [`FIXED_POINT_PASSES`] iteration passes, with no convergence
//!   check. Kept for reproducible output; stiff kinetics may not have
//!   converged after the fixed budget.
//! - Single reaction, single limiting reactant (the first entry of the
//!   reaction's reactant-order mapping). Multi-reaction networks are out of
//!   scope.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use indexmap::IndexMap;
//! use seqmod::kinetics::PowerLawReaction;
//! use seqmod::models::{CSTR, UnitModel};
//! use seqmod::properties::{Component, PropertyPackage};
//! use seqmod::stream::Stream;
//!
//! let package = Rc::new(PropertyPackage::new(vec![
//!     Component::new("Ethanol", "C2H6O", 46.07),
//!     Component::new("Water", "H2O", 18.02),
//! ]));
//! let stoichiometry: IndexMap<String, i32> =
//!     [("Ethanol".to_string(), -1), ("Product".to_string(), 1)].into_iter().collect();
//! let orders: IndexMap<String, f64> = [("Ethanol".to_string(), 1.0)].into_iter().collect();
//! let reaction = Rc::new(PowerLawReaction::new("r1", stoichiometry, orders, |_t| 0.1));
//!
//! let mut reactor = CSTR::new("R-101", 10.0, package, reaction);
//!
//! let inlet_composition: IndexMap<String, f64> = [
//!     ("Ethanol".to_string(), 0.8),
//!     ("Water".to_string(), 0.2),
//!     ("Product".to_string(), 0.0),
//! ].into_iter().collect();
//! let inlet = Stream::new("in", 0.1, 353.15, 101_325.0, inlet_composition).into_ref();
//! let outlet = Stream::placeholder("out").into_ref();
//! reactor.ports_mut().add_inlet(inlet);
//! reactor.ports_mut().add_outlet(outlet.clone());
//!
//! reactor.solve().unwrap();
//! assert!(outlet.borrow().composition["Product"] > 0.0);
//! ```

use std::any::Any;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::info;

use crate::kinetics::ReactionKinetics;
use crate::models::{CostBasis, Ports, UnitError, UnitModel};
use crate::properties::PropertyPackage;
use crate::stream::normalized;

/// Fixed iteration budget of the mass-balance loop.
pub const FIXED_POINT_PASSES: usize = 10;

/// Floor applied to the inlet concentration in the implicit update, guarding
/// the division against a near-zero C_in.
const CONCENTRATION_FLOOR: f64 = 1e-12;

/// Tolerance below which an inlet composition counts as already normalized
/// and is left untouched on the stream.
const NORMALIZATION_TOLERANCE: f64 = 1e-8;

/// Continuous stirred-tank reactor with a single power-law reaction.
pub struct CSTR {
    name: String,
    ports: Ports,
    /// Reactor volume [m³].
    pub volume: f64,
    prop_pkg: Rc<PropertyPackage>,
    reaction: Rc<dyn ReactionKinetics>,
    conversion: Option<f64>,
}

impl CSTR {
    /// Creates a reactor of fixed `volume` [m³] over a shared property
    /// package and reaction.
    pub fn new(
        name: impl Into<String>,
        volume: f64,
        prop_pkg: Rc<PropertyPackage>,
        reaction: Rc<dyn ReactionKinetics>,
    ) -> Self {
        CSTR {
            name: name.into(),
            ports: Ports::new(),
            volume,
            prop_pkg,
            reaction,
            conversion: None,
        }
    }

    /// Limiting-reactant conversion of the most recent solve, clamped to
    /// [0, 1]. Observational only; `None` before the first solve.
    pub fn conversion(&self) -> Option<f64> {
        self.conversion
    }

    /// The reaction currently bound to the reactor.
    pub fn reaction(&self) -> Rc<dyn ReactionKinetics> {
        Rc::clone(&self.reaction)
    }

    /// Rebinds the reaction, e.g. while a parameter estimator probes
    /// candidate kinetics.
    pub fn set_reaction(&mut self, reaction: Rc<dyn ReactionKinetics>) {
        self.reaction = reaction;
    }

    /// The property package the reactor's component names are declared in.
    pub fn property_package(&self) -> &Rc<PropertyPackage> {
        &self.prop_pkg
    }
}

impl UnitModel for CSTR {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> &Ports {
        &self.ports
    }

    fn ports_mut(&mut self) -> &mut Ports {
        &mut self.ports
    }

    fn solve(&mut self) -> Result<(), UnitError> {
        let inlet_ref = self.ports.inlets().first().cloned().ok_or(UnitError::NotConnected {
            unit: self.name.clone(),
            detail: "no inlet stream",
        })?;
        let outlet_ref = self.ports.outlets().first().cloned().ok_or(UnitError::NotConnected {
            unit: self.name.clone(),
            detail: "no outlet stream",
        })?;
        let inlet = inlet_ref.borrow().clone();

        // 1. Normalize the inlet composition: clamp to >= 0, rescale to unit
        // sum. Order matters: clamp first, then normalize.
        let inlet_comp = normalized(&inlet.composition).ok_or_else(|| {
            UnitError::InvalidComposition("inlet composition cannot be all zeros".to_string())
        })?;
        if (inlet.composition_total() - 1.0).abs() > NORMALIZATION_TOLERANCE {
            inlet_ref.borrow_mut().composition = inlet_comp.clone();
        }

        let temperature = inlet.temperature.ok_or(UnitError::MissingCondition {
            stream: inlet.name.clone(),
            field: "temperature",
        })?;

        // 2. Residence time.
        if inlet.flow_rate <= 0.0 {
            return Err(UnitError::ZeroFlow { stream: inlet.name.clone() });
        }
        let tau = self.volume / inlet.flow_rate;

        // 3. Limiting reactant: first key of the reactant-order mapping.
        let main_reactant = self
            .reaction
            .reactant_orders()
            .keys()
            .next()
            .cloned()
            .ok_or_else(|| UnitError::Other("reaction defines no reactants".to_string()))?;
        let c_in = inlet_comp
            .get(&main_reactant)
            .copied()
            .ok_or_else(|| UnitError::MissingReactant { reactant: main_reactant.clone() })?;

        // 4. Fixed-point iteration on the outlet composition.
        let mut outlet_comp: IndexMap<String, f64> = inlet_comp.clone();
        for _ in 0..FIXED_POINT_PASSES {
            let rate = self.reaction.rate(&outlet_comp, temperature)?;

            let c_out = c_in / (1.0 + tau * rate / c_in.max(CONCENTRATION_FLOOR));
            let c_out = c_out.clamp(0.0, c_in);
            outlet_comp.insert(main_reactant.clone(), c_out);

            // Propagate stoichiometric deltas to the other species, floored
            // at zero.
            for (component, &coefficient) in self.reaction.stoichiometry() {
                if component != &main_reactant {
                    let delta = (c_in - c_out) * f64::from(-coefficient);
                    let base = inlet_comp.get(component).copied().unwrap_or(0.0);
                    outlet_comp.insert(component.clone(), (base + delta).max(0.0));
                }
            }
        }

        // 5. Renormalize the outlet composition.
        let outlet_comp = normalized(&outlet_comp).ok_or_else(|| {
            UnitError::InvalidComposition("outlet composition collapsed to zero".to_string())
        })?;

        // 6. Write the outlet: conditions pass through, composition is the
        // converged result.
        let c_final = outlet_comp.get(&main_reactant).copied().unwrap_or(0.0);
        {
            let mut outlet = outlet_ref.borrow_mut();
            outlet.copy_conditions_from(&inlet);
            outlet.composition = outlet_comp;
        }

        // 7. Conversion, clamped to [0, 1] for reporting.
        let conversion =
            if c_in > 0.0 { ((c_in - c_final) / c_in).clamp(0.0, 1.0) } else { 0.0 };
        self.conversion = Some(conversion);
        info!("CSTR '{}' solved with conversion {:.2}%", self.name, conversion * 100.0);

        Ok(())
    }

    fn cost_basis(&self) -> Option<CostBasis> {
        Some(CostBasis { equipment: "CSTR", capacity: self.volume })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl std::fmt::Debug for CSTR {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CSTR")
            .field("name", &self.name)
            .field("volume", &self.volume)
            .field("reaction", &self.reaction.name())
            .field("conversion", &self.conversion)
            .finish_non_exhaustive()
    }
}
