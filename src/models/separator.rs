//! Light-key component separator.

use std::any::Any;

use indexmap::IndexMap;

use crate::models::{CostBasis, Ports, UnitError, UnitModel};
use crate::stream::normalized;

/// A sharp two-product component splitter.
///
/// One inlet, two outlets: the overhead receives `efficiency` of the light
/// key and `1 - efficiency` of every other component; the bottoms receive
/// the complement. Outlet compositions are renormalized and outlet flow
/// rates scaled by the split totals, so each written stream satisfies the
/// composition invariant and total flow is conserved across the split.
/// Temperature and pressure pass through to both products.
///
/// # Example
///
/// ```
/// use seqmod::models::Separator;
///
/// let column = Separator::new("S-101", "Ethanol", 0.99);
/// assert_eq!(column.light_key, "Ethanol");
/// ```
#[derive(Debug)]
pub struct Separator {
    name: String,
    ports: Ports,
    /// Component preferentially sent overhead.
    pub light_key: String,
    /// Fraction of the light key recovered overhead, in (0, 1].
    pub efficiency: f64,
}

impl Separator {
    pub fn new(name: impl Into<String>, light_key: impl Into<String>, efficiency: f64) -> Self {
        Separator {
            name: name.into(),
            ports: Ports::new(),
            light_key: light_key.into(),
            efficiency,
        }
    }

    /// Fraction of `component` routed to the overhead product.
    fn overhead_split(&self, component: &str) -> f64 {
        if component == self.light_key {
            self.efficiency
        } else {
            1.0 - self.efficiency
        }
    }
}

impl UnitModel for Separator {
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
        if self.ports.n_outlets() < 2 {
            return Err(UnitError::NotConnected {
                unit: self.name.clone(),
                detail: "a separator needs two outlet streams",
            });
        }
        let inlet = inlet_ref.borrow().clone();

        for (slot, outlet_ref) in self.ports.outlets().iter().take(2).enumerate() {
            let split: IndexMap<String, f64> = inlet
                .composition
                .iter()
                .map(|(component, &fraction)| {
                    let overhead = self.overhead_split(component);
                    let share = if slot == 0 { overhead } else { 1.0 - overhead };
                    (component.clone(), fraction.max(0.0) * share)
                })
                .collect();

            let split_total: f64 = split.values().sum();
            let composition = normalized(&split).ok_or_else(|| {
                UnitError::InvalidComposition(format!(
                    "separator '{}' produced an empty product",
                    self.name
                ))
            })?;

            let mut outlet = outlet_ref.borrow_mut();
            outlet.copy_conditions_from(&inlet);
            outlet.flow_rate = inlet.flow_rate * split_total;
            outlet.composition = composition;
        }
        Ok(())
    }

    fn cost_basis(&self) -> Option<CostBasis> {
        // Sized by inlet throughput; the cost-curve reference capacity
        // stands in before connection.
        let capacity =
            self.ports.inlets().first().map(|s| s.borrow().flow_rate).unwrap_or(0.1);
        Some(CostBasis { equipment: "Separator", capacity })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
