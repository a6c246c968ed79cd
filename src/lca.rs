//! Life-cycle assessment: emission inventory and impact characterization.
//!
//! The inventory step turns a flowsheet into annual emission masses
//! (substance -> kg/year) from two contributions: utility consumption
//! (grid-electricity emission factors over each unit's assumed power draw)
//! and fugitive losses (a small fixed fraction of every feed component's
//! mass flow). The impact step characterizes the inventory, currently as
//! GWP100 (IPCC AR5 factors).

use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use crate::flowsheet::Flowsheet;

/// Annual emissions by substance [kg/year].
pub type Inventory = IndexMap<String, f64>;

/// Life-cycle inventory generator.
#[derive(Debug, Clone)]
pub struct LciGenerator {
    /// Annual operating hours.
    pub operating_hours: f64,
    /// Flat electrical draw assumed per unit operation [kW].
    pub unit_power_kw: f64,
    /// Electricity emission factors [kg substance / kWh], simplified from
    /// ecoinvent-style LCI databases.
    pub electricity_factors: IndexMap<String, f64>,
    /// Steam emission factors [kg substance / kg steam]; unused until unit
    /// models report steam duties.
    pub steam_factors: IndexMap<String, f64>,
    /// Fraction of each feed component's mass flow lost as fugitive
    /// emissions.
    pub fugitive_fraction: f64,
    /// Density assumed for feed streams [kg/m³].
    pub feed_density: f64,
}

impl Default for LciGenerator {
    fn default() -> Self {
        LciGenerator {
            operating_hours: 8000.0,
            unit_power_kw: 10.0,
            electricity_factors: IndexMap::from([
                ("CO2".to_string(), 0.4),
                ("CH4".to_string(), 2e-5),
            ]),
            steam_factors: IndexMap::from([("CO2".to_string(), 0.1)]),
            fugitive_fraction: 1e-4,
            feed_density: 1000.0,
        }
    }
}

impl LciGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates the complete inventory for a flowsheet.
    pub fn generate_inventory(&self, flowsheet: &Flowsheet) -> Inventory {
        let mut inventory = Inventory::new();

        // Utility consumption: every unit draws a flat electrical load.
        let annual_kwh = self.unit_power_kw * self.operating_hours;
        for _unit in flowsheet.units() {
            for (substance, &factor) in &self.electricity_factors {
                *inventory.entry(substance.clone()).or_insert(0.0) += annual_kwh * factor;
            }
        }

        // Fugitive losses from feed components.
        let feeds = flowsheet.feed_streams();
        if feeds.is_empty() {
            warn!(
                "no feed streams found in flowsheet '{}' for fugitive emissions",
                flowsheet.name()
            );
        }
        for feed in feeds {
            let feed = feed.borrow();
            let mass_flow_kg_s = feed.flow_rate * self.feed_density;
            for (component, &fraction) in &feed.composition {
                let fugitive_kg_s = mass_flow_kg_s * fraction * self.fugitive_fraction;
                let annual_kg = fugitive_kg_s * 3600.0 * self.operating_hours;
                *inventory.entry(component.clone()).or_insert(0.0) += annual_kg;
            }
        }

        inventory
    }
}

/// Characterizes an inventory into impact-category scores.
#[derive(Debug, Clone)]
pub struct ImpactAssessment {
    /// GWP100 characterization factors [kg CO2-eq / kg], IPCC AR5.
    pub gwp_factors: IndexMap<String, f64>,
}

impl Default for ImpactAssessment {
    fn default() -> Self {
        ImpactAssessment {
            gwp_factors: IndexMap::from([
                ("CO2".to_string(), 1.0),
                ("CH4".to_string(), 28.0),
                ("N2O".to_string(), 265.0),
                ("Ethanol".to_string(), 2.1),
            ]),
        }
    }
}

impl ImpactAssessment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total global warming potential [kg CO2-eq/year]. Substances without
    /// a factor contribute nothing, with a warning.
    pub fn gwp100(&self, inventory: &Inventory) -> f64 {
        let mut total = 0.0;
        for (substance, &mass) in inventory {
            match self.gwp_factors.get(substance) {
                Some(&factor) => total += mass * factor,
                None => warn!("no GWP factor for '{}', ignoring", substance),
            }
        }
        total
    }
}

/// Combined LCA report.
#[derive(Debug, Clone, Serialize)]
pub struct LcaSummary {
    pub inventory: Inventory,
    pub gwp100: f64,
}

impl LcaSummary {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Full life-cycle assessment over a flowsheet.
#[derive(Debug, Clone, Default)]
pub struct LcaCalculator {
    pub lci: LciGenerator,
    pub impact: ImpactAssessment,
}

impl LcaCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_analysis(&self, flowsheet: &Flowsheet) -> LcaSummary {
        let inventory = self.lci.generate_inventory(flowsheet);
        let gwp100 = self.impact.gwp100(&inventory);
        LcaSummary { inventory, gwp100 }
    }
}
