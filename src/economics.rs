//! Techno-economic analysis: capital and operating cost estimation.
//!
//! All numbers here are screening-level engineering estimates: power-law
//! cost curves with CEPCI inflation indexing and a Lang factor for installed
//! cost, a flat per-unit utility draw, and raw-material costs taken off the
//! flowsheet's feed streams. Parameters are plain public fields with
//! defaults; outer studies (optimization, Monte Carlo) mutate them between
//! evaluations.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use crate::flowsheet::Flowsheet;
use crate::models::UnitModel;

/// Power-law cost curve: cost = base * (capacity / reference) ^ exponent.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CostCurve {
    pub base_cost: f64,
    pub reference_capacity: f64,
    pub exponent: f64,
}

/// Capital cost estimator.
///
/// Cost-curve data is simplified from engineering handbooks; the CEPCI
/// table (Chemical Engineering Plant Cost Index) rebases the 2020 curves to
/// the analysis year.
#[derive(Debug, Clone)]
pub struct CapexEstimator {
    /// Analysis year for CEPCI indexing.
    pub year: u32,
    /// Lang factor for total installed cost (4.74 = fluid processing plant).
    pub lang_factor: f64,
    cost_data: IndexMap<&'static str, CostCurve>,
    cepci: IndexMap<u32, f64>,
}

impl Default for CapexEstimator {
    fn default() -> Self {
        let cost_data = IndexMap::from([
            ("CSTR", CostCurve { base_cost: 50_000.0, reference_capacity: 10.0, exponent: 0.6 }),
            (
                "DistillationColumn",
                CostCurve { base_cost: 200_000.0, reference_capacity: 1.0, exponent: 0.65 },
            ),
            (
                "HeatExchanger",
                CostCurve { base_cost: 25_000.0, reference_capacity: 50.0, exponent: 0.7 },
            ),
            ("Pump", CostCurve { base_cost: 10_000.0, reference_capacity: 100.0, exponent: 0.8 }),
            (
                "Separator",
                CostCurve { base_cost: 15_000.0, reference_capacity: 0.1, exponent: 0.6 },
            ),
        ]);
        let cepci = IndexMap::from([(2020, 607.5), (2023, 708.0)]);
        CapexEstimator { year: 2023, lang_factor: 4.74, cost_data, cepci }
    }
}

impl CapexEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the analysis year (must be present in the CEPCI table to take
    /// effect).
    pub fn with_year(mut self, year: u32) -> Self {
        self.year = year;
        self
    }

    /// Estimated purchase cost of a single unit using cost-scaling laws.
    ///
    /// Units without a cost basis (feeds, sinks, conceptual nodes) cost
    /// nothing; so do equipment types missing from the cost table, with a
    /// warning.
    pub fn estimate_unit_cost(&self, unit: &dyn UnitModel) -> f64 {
        let Some(basis) = unit.cost_basis() else {
            return 0.0;
        };
        let Some(curve) = self.cost_data.get(basis.equipment) else {
            warn!(
                "no cost data for equipment type '{}' (unit '{}'), skipping",
                basis.equipment,
                unit.name()
            );
            return 0.0;
        };

        let cost_2020 =
            curve.base_cost * (basis.capacity / curve.reference_capacity).powf(curve.exponent);

        let base_index = self.cepci.get(&2020).copied().unwrap_or(1.0);
        let Some(&index) = self.cepci.get(&self.year) else {
            warn!("no CEPCI entry for year {}, reporting 2020 cost", self.year);
            return cost_2020;
        };
        cost_2020 * index / base_index
    }

    /// Total installed capital cost for the flowsheet (Lang factor applied
    /// to the summed equipment cost).
    pub fn total_capex(&self, flowsheet: &Flowsheet) -> f64 {
        let equipment: f64 =
            flowsheet.units().map(|unit| self.estimate_unit_cost(unit)).sum();
        equipment * self.lang_factor
    }
}

/// Operating cost estimator.
#[derive(Debug, Clone)]
pub struct OpexEstimator {
    /// Annual operating hours.
    pub operating_hours: f64,
    /// Utility prices: CoolingWater [$/m³], Steam [$/t], Electricity [$/kWh].
    pub utility_prices: IndexMap<String, f64>,
    /// Raw material prices [$/kg] by component.
    pub raw_material_costs: IndexMap<String, f64>,
    /// Flat electrical draw assumed per unit operation [kW].
    pub unit_power_kw: f64,
    /// Density assumed when converting feed volumetric flow to mass [kg/m³].
    pub feed_density: f64,
}

impl Default for OpexEstimator {
    fn default() -> Self {
        let utility_prices = IndexMap::from([
            ("CoolingWater".to_string(), 0.25),
            ("Steam".to_string(), 15.0),
            ("Electricity".to_string(), 0.12),
        ]);
        let raw_material_costs =
            IndexMap::from([("Ethanol".to_string(), 0.7), ("Water".to_string(), 0.001)]);
        OpexEstimator {
            operating_hours: 8000.0,
            utility_prices,
            raw_material_costs,
            unit_power_kw: 10.0,
            feed_density: 1000.0,
        }
    }
}

impl OpexEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operating_hours(mut self, hours: f64) -> Self {
        self.operating_hours = hours;
        self
    }

    /// Annual utility cost. Every unit is assumed to draw a flat electrical
    /// load; querying real duties from exchangers and pumps is future work
    /// their models do not yet support.
    pub fn utility_cost(&self, flowsheet: &Flowsheet) -> f64 {
        let electricity =
            self.utility_prices.get("Electricity").copied().unwrap_or_default();
        let annual_kwh_per_unit = self.unit_power_kw * self.operating_hours;
        flowsheet.n_units() as f64 * annual_kwh_per_unit * electricity
    }

    /// Annual raw material cost over all feed streams (outlets of zero-inlet
    /// units). Components without a price entry are free.
    pub fn raw_material_cost(&self, flowsheet: &Flowsheet) -> f64 {
        let feeds = flowsheet.feed_streams();
        if feeds.is_empty() {
            warn!("no feed streams found in flowsheet '{}'", flowsheet.name());
            return 0.0;
        }

        let mut total = 0.0;
        for feed in feeds {
            let feed = feed.borrow();
            let mass_flow_kg_s = feed.flow_rate * self.feed_density;
            for (component, &fraction) in &feed.composition {
                if let Some(&price) = self.raw_material_costs.get(component) {
                    let annual_kg =
                        mass_flow_kg_s * fraction * 3600.0 * self.operating_hours;
                    total += annual_kg * price;
                }
            }
        }
        total
    }

    /// Total annual operating cost (labor and maintenance, usually estimated
    /// as a fraction of capex, are not included).
    pub fn total_opex(&self, flowsheet: &Flowsheet) -> f64 {
        self.utility_cost(flowsheet) + self.raw_material_cost(flowsheet)
    }
}

/// Summary of a techno-economic analysis, all values in $/year except
/// `total_capex` [$].
#[derive(Debug, Clone, Serialize)]
pub struct EconomicSummary {
    pub total_capex: f64,
    pub annualized_capex: f64,
    pub utility_cost: f64,
    pub raw_material_cost: f64,
    pub total_opex: f64,
    pub total_annual_cost: f64,
    pub interest_rate: f64,
    pub plant_life_years: u32,
}

impl EconomicSummary {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Complete techno-economic analysis over a flowsheet.
#[derive(Debug, Clone)]
pub struct EconomicCalculator {
    pub capex: CapexEstimator,
    pub opex: OpexEstimator,
    pub interest_rate: f64,
    pub plant_life_years: u32,
}

impl Default for EconomicCalculator {
    fn default() -> Self {
        EconomicCalculator {
            capex: CapexEstimator::default(),
            opex: OpexEstimator::default(),
            interest_rate: 0.08,
            plant_life_years: 20,
        }
    }
}

impl EconomicCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capital recovery factor for the configured interest rate and plant
    /// life.
    pub fn capital_recovery_factor(&self) -> f64 {
        let i = self.interest_rate;
        let n = self.plant_life_years as f64;
        let growth = (1.0 + i).powf(n);
        i * growth / (growth - 1.0)
    }

    /// Runs capex + opex and annualizes into a summary report.
    pub fn run_analysis(&self, flowsheet: &Flowsheet) -> EconomicSummary {
        let total_capex = self.capex.total_capex(flowsheet);
        let utility_cost = self.opex.utility_cost(flowsheet);
        let raw_material_cost = self.opex.raw_material_cost(flowsheet);
        let total_opex = utility_cost + raw_material_cost;
        let annualized_capex = total_capex * self.capital_recovery_factor();

        EconomicSummary {
            total_capex,
            annualized_capex,
            utility_cost,
            raw_material_cost,
            total_opex,
            total_annual_cost: annualized_capex + total_opex,
            interest_rate: self.interest_rate,
            plant_life_years: self.plant_life_years,
        }
    }
}
