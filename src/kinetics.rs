//! Reaction kinetics: the rate models driving reacting units.
//!
//! The core consumes kinetics through the [`ReactionKinetics`] trait and
//! never defines chemistry beyond the power-law form. A reaction supplies
//! three things:
//!
//! - a **stoichiometry** mapping component -> signed integer coefficient
//!   (negative for reactants, positive for products),
//! - a temperature-dependent **rate-constant function** k(T),
//! - a **reactant-order** mapping, whose *first* entry is treated as the
//!   limiting reactant by the CSTR's single-reaction simplification.
//!
//! # Example
//!
//! ```
//! use seqmod::kinetics::PowerLawReaction;
//! use indexmap::IndexMap;
//!
//! let stoichiometry: IndexMap<String, i32> =
//!     [("A".to_string(), -1), ("B".to_string(), 1)].into_iter().collect();
//! let orders: IndexMap<String, f64> = [("A".to_string(), 1.0)].into_iter().collect();
//!
//! // Arrhenius rate constant: k = A * exp(-Ea / (R * T))
//! let reaction = PowerLawReaction::new("A_to_B", stoichiometry, orders, |t| {
//!     1e10 * (-7e4 / (8.314 * t)).exp()
//! });
//! ```

use indexmap::IndexMap;

/// Errors raised while evaluating a rate expression.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KineticsError {
    /// A reactant named in the order mapping is absent from the composition.
    #[error("reactant '{reactant}' not found in composition")]
    MissingReactant { reactant: String },
}

/// Temperature-dependent rate constant, k(T) with T in Kelvin.
pub type RateConstantFn = Box<dyn Fn(f64) -> f64>;

/// A chemical reaction as seen by reacting units.
///
/// Implementations own their stoichiometry and reactant orders; the CSTR
/// reads both and calls [`rate`](ReactionKinetics::rate) once per iteration
/// pass.
pub trait ReactionKinetics {
    /// Reaction name, for reporting.
    fn name(&self) -> &str;

    /// Component -> signed stoichiometric coefficient (reactants negative).
    fn stoichiometry(&self) -> &IndexMap<String, i32>;

    /// Reactant -> kinetic order, in declaration order. The first entry is
    /// the limiting reactant under the single-reaction simplification.
    fn reactant_orders(&self) -> &IndexMap<String, f64>;

    /// Instantaneous reaction rate for a composition (fractions, used as
    /// concentrations under the dilute simplification) at a temperature [K].
    fn rate(&self, composition: &IndexMap<String, f64>, temperature: f64)
        -> Result<f64, KineticsError>;
}

/// A reaction following a power-law rate expression:
/// rate = k(T) * prod(C_i ^ order_i).
pub struct PowerLawReaction {
    name: String,
    stoichiometry: IndexMap<String, i32>,
    reactants: IndexMap<String, f64>,
    rate_constant: RateConstantFn,
}

impl PowerLawReaction {
    /// Creates a power-law reaction.
    ///
    /// `reactants` maps each rate-determining species to its kinetic order;
    /// its insertion order is meaningful (first entry = limiting reactant).
    pub fn new(
        name: impl Into<String>,
        stoichiometry: IndexMap<String, i32>,
        reactants: IndexMap<String, f64>,
        rate_constant: impl Fn(f64) -> f64 + 'static,
    ) -> Self {
        PowerLawReaction {
            name: name.into(),
            stoichiometry,
            reactants,
            rate_constant: Box::new(rate_constant),
        }
    }

    /// Evaluates the rate constant at `temperature` [K].
    pub fn rate_constant(&self, temperature: f64) -> f64 {
        (self.rate_constant)(temperature)
    }
}

impl ReactionKinetics for PowerLawReaction {
    fn name(&self) -> &str {
        &self.name
    }

    fn stoichiometry(&self) -> &IndexMap<String, i32> {
        &self.stoichiometry
    }

    fn reactant_orders(&self) -> &IndexMap<String, f64> {
        &self.reactants
    }

    fn rate(
        &self,
        composition: &IndexMap<String, f64>,
        temperature: f64,
    ) -> Result<f64, KineticsError> {
        let mut rate = (self.rate_constant)(temperature);
        for (reactant, &order) in &self.reactants {
            let concentration = composition
                .get(reactant)
                .copied()
                .ok_or_else(|| KineticsError::MissingReactant { reactant: reactant.clone() })?;
            rate *= concentration.powf(order);
        }
        Ok(rate)
    }
}

impl std::fmt::Debug for PowerLawReaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerLawReaction")
            .field("name", &self.name)
            .field("stoichiometry", &self.stoichiometry)
            .field("reactants", &self.reactants)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_f64(pairs: &[(&str, f64)]) -> IndexMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn map_i32(pairs: &[(&str, i32)]) -> IndexMap<String, i32> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_power_law_rate() {
        // rate = 2.0 * C_A^1 * C_B^2
        let reaction = PowerLawReaction::new(
            "r1",
            map_i32(&[("A", -1), ("C", 1)]),
            map_f64(&[("A", 1.0), ("B", 2.0)]),
            |_t| 2.0,
        );
        let composition = map_f64(&[("A", 0.5), ("B", 0.1), ("C", 0.4)]);

        let rate = reaction.rate(&composition, 350.0).unwrap();
        assert!((rate - 2.0 * 0.5 * 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_missing_reactant_is_an_error() {
        let reaction = PowerLawReaction::new(
            "r1",
            map_i32(&[("A", -1)]),
            map_f64(&[("A", 1.0)]),
            |_t| 1.0,
        );
        let composition = map_f64(&[("B", 1.0)]);

        let err = reaction.rate(&composition, 300.0).unwrap_err();
        assert!(matches!(err, KineticsError::MissingReactant { reactant } if reactant == "A"));
    }

    #[test]
    fn test_arrhenius_rate_constant_increases_with_temperature() {
        let reaction = PowerLawReaction::new(
            "arrhenius",
            map_i32(&[("A", -1), ("B", 1)]),
            map_f64(&[("A", 1.0)]),
            |t| 1e10 * (-7e4 / (8.314 * t)).exp(),
        );

        assert!(reaction.rate_constant(400.0) > reaction.rate_constant(300.0));
    }

    #[test]
    fn test_first_reactant_order_is_preserved() {
        let reaction = PowerLawReaction::new(
            "r1",
            map_i32(&[("B", 1), ("A", -1)]),
            map_f64(&[("A", 1.0), ("B", 0.5)]),
            |_t| 1.0,
        );
        // Declaration order, not alphabetical or stoichiometric order.
        assert_eq!(reaction.reactant_orders().keys().next().unwrap(), "A");
    }
}
