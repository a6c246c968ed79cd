//! # Seqmod: Sequential-Modular Process Flowsheet Simulation
//!
//! A steady-state process simulator: a chemical plant is a directed graph of
//! unit operations connected by shared material streams, and the solver
//! computes a self-consistent set of stream conditions by solving each
//! unit's local model in topological order: the sequential-modular
//! approach, exactly how an engineer would calculate the plant by hand.
//!
//! ## Layers
//!
//! - [`stream`], [`flowsheet`], [`solver`]: the graph model and the
//!   calculation-order/evaluation core.
//! - [`models`], [`kinetics`], [`properties`]: unit operations (passthrough,
//!   CSTR, separator), power-law reaction kinetics, and component data.
//! - [`economics`], [`lca`]: techno-economic analysis and life-cycle
//!   assessment over a solved flowsheet.
//! - [`uq`], [`optimization`]: Monte Carlo uncertainty studies and
//!   derivative-free optimization, both driving repeated flowsheet solves.
//! - [`data`], [`validation`], [`adaptation`]: the historian interface and
//!   the digital-twin loop (validate against plant data, re-fit kinetics).
//!
//! ## Example
//!
//! ```
//! use std::rc::Rc;
//! use indexmap::IndexMap;
//! use seqmod::kinetics::PowerLawReaction;
//! use seqmod::models::{Passthrough, CSTR};
//! use seqmod::properties::{Component, PropertyPackage};
//! use seqmod::stream::Stream;
//! use seqmod::{Flowsheet, SequentialModularSolver};
//!
//! // Components and reaction: Ethanol -> Product.
//! let package = Rc::new(PropertyPackage::new(vec![
//!     Component::new("Ethanol", "C2H6O", 46.07),
//!     Component::new("Water", "H2O", 18.02),
//!     Component::new("Product", "Prod", 100.0),
//! ]));
//! let stoichiometry: IndexMap<String, i32> =
//!     [("Ethanol".to_string(), -1), ("Product".to_string(), 1)].into_iter().collect();
//! let orders: IndexMap<String, f64> = [("Ethanol".to_string(), 1.0)].into_iter().collect();
//! let reaction = Rc::new(PowerLawReaction::new("r1", stoichiometry, orders, |_t| 0.1));
//!
//! // Flowsheet: Feed -> R-101 -> Product.
//! let mut flowsheet = Flowsheet::new("demo");
//! flowsheet.add_unit(Passthrough::new("Feed")).unwrap();
//! flowsheet.add_unit(CSTR::new("R-101", 10.0, package, reaction)).unwrap();
//! flowsheet.add_unit(Passthrough::new("Product")).unwrap();
//!
//! let composition: IndexMap<String, f64> = [
//!     ("Ethanol".to_string(), 0.8),
//!     ("Water".to_string(), 0.2),
//!     ("Product".to_string(), 0.0),
//! ].into_iter().collect();
//! flowsheet.add_stream(Stream::new("feed_stream", 0.1, 353.15, 101_325.0, composition));
//! flowsheet.connect("feed_stream", "Feed", "R-101").unwrap();
//! flowsheet.connect("reactor_outlet", "R-101", "Product").unwrap();
//!
//! SequentialModularSolver::new().solve(&mut flowsheet).unwrap();
//!
//! let outlet = flowsheet.stream("reactor_outlet").unwrap();
//! assert!(outlet.borrow().composition["Product"] > 0.0);
//! ```
//!
//! ## Known limitations
//!
//! Recycle loops are detected and rejected, not converged. Tear-stream
//! iteration is the natural next step but is deliberately absent, and a
//! cyclic flowsheet fails loudly. The CSTR uses a fixed iteration budget
//! with no convergence check, a single reaction, and no energy balance.
//! See the module docs for the details.

pub mod adaptation;
pub mod data;
pub mod economics;
pub mod flowsheet;
pub mod kinetics;
pub mod lca;
pub mod models;
pub mod optimization;
pub mod properties;
pub mod solver;
pub mod stream;
pub mod uq;
pub mod validation;

pub use flowsheet::{Flowsheet, FlowsheetError};
pub use models::{Passthrough, Separator, UnitError, UnitModel, CSTR};
pub use solver::{SequentialModularSolver, SolveError};
pub use stream::{Stream, StreamRef};

#[cfg(test)]
mod tests {
    //! End-to-end test over the bioethanol demonstration process:
    //! simulate, analyze economics and emissions, optimize, and quantify
    //! uncertainty: the full outer-caller protocol against one flowsheet.

    use std::rc::Rc;

    use indexmap::IndexMap;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::economics::EconomicCalculator;
    use crate::kinetics::PowerLawReaction;
    use crate::lca::LcaCalculator;
    use crate::models::{Passthrough, Separator, CSTR};
    use crate::optimization::{NelderMead, OptimizationProblem};
    use crate::properties::{Component, PropertyPackage};
    use crate::stream::Stream;
    use crate::uq::{Distribution, MonteCarlo};
    use crate::{Flowsheet, SequentialModularSolver};

    fn composition(pairs: &[(&str, f64)]) -> IndexMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn build_flowsheet(reactor_volume: f64) -> Flowsheet {
        let package = Rc::new(PropertyPackage::new(vec![
            Component::new("Ethanol", "C2H6O", 46.07),
            Component::new("Water", "H2O", 18.02),
            Component::new("Product", "Prod", 100.0),
        ]));
        let stoichiometry: IndexMap<String, i32> =
            [("Ethanol".to_string(), -1), ("Product".to_string(), 1)].into_iter().collect();
        let orders: IndexMap<String, f64> = [("Ethanol".to_string(), 1.0)].into_iter().collect();
        let reaction = Rc::new(PowerLawReaction::new("r1", stoichiometry, orders, |_t| 0.1));

        let mut fs = Flowsheet::new("Bioethanol Process");
        fs.add_unit(Passthrough::new("Feed")).unwrap();
        fs.add_unit(CSTR::new("R-101", reactor_volume, package, reaction)).unwrap();
        fs.add_unit(Separator::new("S-101", "Product", 0.99)).unwrap();
        fs.add_unit(Passthrough::new("Product")).unwrap();
        fs.add_unit(Passthrough::new("Waste")).unwrap();

        fs.add_stream(Stream::new(
            "feed_stream",
            0.1,
            353.15,
            101_325.0,
            composition(&[("Ethanol", 0.8), ("Water", 0.2), ("Product", 0.0)]),
        ));
        fs.connect("feed_stream", "Feed", "R-101").unwrap();
        fs.connect("reactor_outlet", "R-101", "S-101").unwrap();
        fs.connect("product_stream", "S-101", "Product").unwrap();
        fs.connect("waste_stream", "S-101", "Waste").unwrap();
        fs
    }

    #[test]
    fn test_baseline_simulation_and_analysis() {
        let mut fs = build_flowsheet(20.0);
        SequentialModularSolver::new().solve(&mut fs).unwrap();

        // The separator's overhead concentrates the product.
        let product = fs.stream("product_stream").unwrap();
        let reactor_out = fs.stream("reactor_outlet").unwrap();
        assert!(
            product.borrow().composition["Product"]
                > reactor_out.borrow().composition["Product"]
        );
        assert!(product.borrow().is_normalized(1e-9));
        assert!(fs.stream("waste_stream").unwrap().borrow().is_normalized(1e-9));

        let conversion = fs
            .unit("R-101")
            .unwrap()
            .as_any()
            .downcast_ref::<CSTR>()
            .unwrap()
            .conversion()
            .unwrap();
        assert!(conversion > 0.0 && conversion < 1.0);

        // Economics and LCA read the solved flowsheet.
        let tea = EconomicCalculator::default().run_analysis(&fs);
        assert!(tea.total_capex > 0.0);
        assert!(tea.total_annual_cost > tea.total_opex);

        let lca = LcaCalculator::default().run_analysis(&fs);
        assert!(lca.gwp100 > 0.0);
        assert!(lca.inventory.contains_key("Ethanol"));
    }

    #[test]
    fn test_volume_optimization_drives_down_cost() {
        // With flat utility and raw-material costs, capex scales with
        // volume^0.6 and the total annualized cost is minimized at the
        // lower volume bound.
        struct Scenario {
            flowsheet: Flowsheet,
            tea: EconomicCalculator,
        }

        let mut problem =
            OptimizationProblem::new("MinimizeCost", |ctx: &mut Scenario| {
                SequentialModularSolver::new().solve(&mut ctx.flowsheet)?;
                Ok(ctx.tea.run_analysis(&ctx.flowsheet).total_annual_cost)
            });
        problem.add_variable("reactor_volume", (5.0, 50.0), |ctx: &mut Scenario, volume| {
            if let Some(unit) = ctx.flowsheet.unit_mut("R-101") {
                if let Some(reactor) = unit.as_any_mut().downcast_mut::<CSTR>() {
                    reactor.volume = volume;
                }
            }
        });

        let mut ctx =
            Scenario { flowsheet: build_flowsheet(20.0), tea: EconomicCalculator::default() };
        let outcome = NelderMead::new(1e-6, 300).solve(&mut problem, &mut ctx);

        assert!(outcome.objective.is_finite());
        assert!(outcome.x[0] < 6.0, "expected the lower bound, got {}", outcome.x[0]);
    }

    #[test]
    fn test_uncertainty_study_over_ethanol_price() {
        struct Scenario {
            flowsheet: Flowsheet,
            tea: EconomicCalculator,
        }

        let mut mc = MonteCarlo::new(50);
        mc.add_uncertain_parameter(
            Distribution::normal(0.7, 0.07).unwrap(),
            |ctx: &mut Scenario, price| {
                ctx.tea.opex.raw_material_costs.insert("Ethanol".to_string(), price);
            },
        );
        mc.add_output_response("TotalAnnualCost", |ctx: &Scenario| {
            ctx.tea.run_analysis(&ctx.flowsheet).total_annual_cost
        });

        let mut ctx =
            Scenario { flowsheet: build_flowsheet(20.0), tea: EconomicCalculator::default() };
        let mut rng = StdRng::seed_from_u64(99);
        let results = mc.run(
            &mut ctx,
            |ctx| SequentialModularSolver::new().solve(&mut ctx.flowsheet),
            &mut rng,
        );

        assert_eq!(results.failures(), 0);
        let stats = &results.summary()[0];
        assert_eq!(stats.count, 50);
        assert!(stats.mean > 0.0);
        assert!(stats.std_dev > 0.0);
        // The cost distribution spreads around the deterministic baseline.
        let baseline = EconomicCalculator::default()
            .run_analysis(&ctx.flowsheet)
            .total_annual_cost;
        assert!((stats.mean - baseline).abs() / baseline < 0.1);
    }
}
