//! Sequential modular solver.
//!
//! The flowsheet is solved unit by unit in a fixed sequence, the way an
//! engineer would calculate it by hand: each unit takes its finalized inlet
//! streams, solves its local model, and writes its outlet streams for the
//! units downstream.
//!
//! # Calculation order
//!
//! The order is a topological sort of the unit graph (Kahn's algorithm over
//! the recorded edge list). Ties (several units simultaneously ready) are
//! broken by unit registration order, so identical flowsheet construction
//! always produces identical evaluation sequences and identical final
//! stream states.
//!
//! # Cycles
//!
//! A cycle in the graph is a recycle loop, which would need tear-stream
//! convergence (Wegstein- or Newton-accelerated iteration) to solve.
//! That machinery is deliberately not implemented: a cyclic flowsheet fails
//! with [`SolveError::CycleDetected`] before any unit is evaluated, leaving
//! every stream untouched.
//!
//! # Failure policy
//!
//! Unit evaluation is fail-fast: the first unit error aborts the run with
//! the failing unit's name attached. Upstream units keep their valid
//! finished state; downstream units are never invoked, so their outlets
//! still hold pre-solve values. The partially updated flowsheet is
//! explicitly inconsistent; callers re-run or discard it. There is no
//! retry logic here; resampling policy belongs to outer drivers like the
//! Monte Carlo loop.
//!
//! # Example
//!
//! ```
//! use seqmod::flowsheet::Flowsheet;
//! use seqmod::models::Passthrough;
//! use seqmod::solver::SequentialModularSolver;
//! use seqmod::stream::Stream;
//! use indexmap::IndexMap;
//!
//! let mut flowsheet = Flowsheet::new("demo");
//! flowsheet.add_unit(Passthrough::new("Feed")).unwrap();
//! flowsheet.add_unit(Passthrough::new("Product")).unwrap();
//! let composition: IndexMap<String, f64> = [("Water".to_string(), 1.0)].into_iter().collect();
//! flowsheet.add_stream(Stream::new("s1", 0.1, 298.15, 101_325.0, composition));
//! flowsheet.connect("s1", "Feed", "Product").unwrap();
//!
//! SequentialModularSolver::new().solve(&mut flowsheet).unwrap();
//! ```

use std::collections::VecDeque;

use indexmap::IndexMap;
use tracing::{error, info};

use crate::flowsheet::Flowsheet;
use crate::models::UnitError;

/// Errors that abort a flowsheet solve.
#[derive(Debug, thiserror::Error)]
pub enum SolveError {
    /// The unit graph contains a directed cycle (a recycle loop). Tear-stream
    /// convergence is not implemented; no unit was evaluated.
    #[error("cycle detected in flowsheet '{flowsheet}': recycle convergence is not implemented")]
    CycleDetected { flowsheet: String },
    /// A unit's local solve failed. Units evaluated before it hold valid
    /// state; units after it were not invoked.
    #[error("unit '{unit}' failed to solve")]
    UnitFailed {
        unit: String,
        #[source]
        source: UnitError,
    },
}

/// Solves a flowsheet by sequential modular evaluation.
///
/// The solver is stateless and does not own the flowsheet; its entire effect
/// is mutation of the flowsheet's streams through each unit's `solve`.
/// Evaluation is single-threaded and synchronous; at most one solve per
/// flowsheet may be in flight at a time.
#[derive(Debug, Default)]
pub struct SequentialModularSolver;

impl SequentialModularSolver {
    pub fn new() -> Self {
        SequentialModularSolver
    }

    /// Determines the calculation order of units and detects cycles.
    ///
    /// Kahn's algorithm: repeatedly take a unit with no unevaluated
    /// upstream dependencies, seeding and tie-breaking in registration
    /// order. If the produced order is shorter than the unit count, the
    /// remaining units sit on a cycle.
    pub fn calculation_order(&self, flowsheet: &Flowsheet) -> Result<Vec<String>, SolveError> {
        let mut in_degree: IndexMap<&str, usize> =
            flowsheet.unit_names().map(|name| (name, 0)).collect();
        let mut adjacency: IndexMap<&str, Vec<&str>> =
            flowsheet.unit_names().map(|name| (name, Vec::new())).collect();

        for (source, dest) in flowsheet.connections() {
            if let Some(downstream) = adjacency.get_mut(source.as_str()) {
                downstream.push(dest.as_str());
            }
            if let Some(degree) = in_degree.get_mut(dest.as_str()) {
                *degree += 1;
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&name, _)| name)
            .collect();
        let mut order = Vec::with_capacity(flowsheet.n_units());

        while let Some(unit) = queue.pop_front() {
            order.push(unit.to_owned());
            if let Some(downstream) = adjacency.get(unit) {
                for &dest in downstream {
                    if let Some(degree) = in_degree.get_mut(dest) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(dest);
                        }
                    }
                }
            }
        }

        if order.len() != flowsheet.n_units() {
            return Err(SolveError::CycleDetected {
                flowsheet: flowsheet.name().to_owned(),
            });
        }
        Ok(order)
    }

    /// Executes each unit's solve in topologically sorted order.
    ///
    /// Returns at the first failure without touching downstream units; see
    /// the module docs for the exact failure policy.
    pub fn solve(&self, flowsheet: &mut Flowsheet) -> Result<(), SolveError> {
        info!("solving flowsheet '{}'", flowsheet.name());
        let order = self.calculation_order(flowsheet)?;
        info!("calculation order determined: {}", order.join(" -> "));

        for unit_name in &order {
            info!("solving unit '{}'", unit_name);
            if let Some(unit) = flowsheet.unit_mut(unit_name) {
                if let Err(source) = unit.solve() {
                    error!("unit '{}' failed to solve: {}", unit_name, source);
                    return Err(SolveError::UnitFailed { unit: unit_name.clone(), source });
                }
            }
        }
        info!("flowsheet '{}' solution complete", flowsheet.name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Passthrough, CSTR};
    use crate::stream::Stream;
    use indexmap::IndexMap;
    use std::rc::Rc;

    use crate::kinetics::PowerLawReaction;
    use crate::properties::{Component, PropertyPackage};

    fn composition(pairs: &[(&str, f64)]) -> IndexMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn ethanol_reactor(name: &str, volume: f64) -> CSTR {
        let package = Rc::new(PropertyPackage::new(vec![
            Component::new("Ethanol", "C2H6O", 46.07),
            Component::new("Water", "H2O", 18.02),
            Component::new("Product", "Prod", 100.0),
        ]));
        let stoichiometry: IndexMap<String, i32> =
            [("Ethanol".to_string(), -1), ("Product".to_string(), 1)].into_iter().collect();
        let orders: IndexMap<String, f64> = [("Ethanol".to_string(), 1.0)].into_iter().collect();
        let reaction = Rc::new(PowerLawReaction::new("r1", stoichiometry, orders, |_t| 0.1));
        CSTR::new(name, volume, package, reaction)
    }

    /// Diamond flowsheet: Feed -> {A, B} -> Sink.
    fn diamond() -> Flowsheet {
        let mut fs = Flowsheet::new("diamond");
        for name in ["Feed", "A", "B", "Sink"] {
            fs.add_unit(Passthrough::new(name)).unwrap();
        }
        fs.add_stream(Stream::new("f", 0.1, 300.0, 1e5, composition(&[("W", 1.0)])));
        fs.connect("f", "Feed", "A").unwrap();
        fs.connect("f2", "Feed", "B").unwrap();
        fs.connect("a_out", "A", "Sink").unwrap();
        fs.connect("b_out", "B", "Sink").unwrap();
        fs
    }

    #[test]
    fn test_order_is_topological_and_deterministic() {
        let solver = SequentialModularSolver::new();
        let first = solver.calculation_order(&diamond()).unwrap();
        let second = solver.calculation_order(&diamond()).unwrap();

        assert_eq!(first, vec!["Feed", "A", "B", "Sink"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_identical_construction_gives_identical_final_state() {
        let solver = SequentialModularSolver::new();
        let mut fs1 = diamond();
        let mut fs2 = diamond();
        solver.solve(&mut fs1).unwrap();
        solver.solve(&mut fs2).unwrap();

        for name in ["a_out", "b_out"] {
            let s1 = fs1.stream(name).unwrap();
            let s2 = fs2.stream(name).unwrap();
            assert_eq!(s1.borrow().flow_rate, s2.borrow().flow_rate);
            assert_eq!(s1.borrow().composition, s2.borrow().composition);
        }
    }

    #[test]
    fn test_cycle_is_detected_and_no_stream_is_mutated() {
        let mut fs = Flowsheet::new("recycle");
        fs.add_unit(Passthrough::new("A")).unwrap();
        fs.add_unit(Passthrough::new("B")).unwrap();
        fs.connect("c1", "A", "B").unwrap();
        fs.connect("c2", "B", "A").unwrap();

        let err = SequentialModularSolver::new().solve(&mut fs).unwrap_err();
        assert!(matches!(err, SolveError::CycleDetected { .. }));

        for name in ["c1", "c2"] {
            let stream = fs.stream(name).unwrap();
            assert_eq!(stream.borrow().flow_rate, 0.0);
            assert!(stream.borrow().composition.is_empty());
        }
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let mut fs = Flowsheet::new("loop");
        fs.add_unit(Passthrough::new("A")).unwrap();
        fs.connect("s", "A", "A").unwrap();

        let err = SequentialModularSolver::new().calculation_order(&fs).unwrap_err();
        assert!(matches!(err, SolveError::CycleDetected { .. }));
    }

    #[test]
    fn test_chain_propagates_feed_state() {
        let mut fs = Flowsheet::new("chain");
        for name in ["Feed", "P1", "P2"] {
            fs.add_unit(Passthrough::new(name)).unwrap();
        }
        fs.add_stream(Stream::new(
            "s1",
            0.1,
            353.15,
            101_325.0,
            composition(&[("Ethanol", 0.8), ("Water", 0.2)]),
        ));
        fs.connect("s1", "Feed", "P1").unwrap();
        fs.connect("s2", "P1", "P2").unwrap();

        SequentialModularSolver::new().solve(&mut fs).unwrap();

        let s2 = fs.stream("s2").unwrap();
        assert_eq!(s2.borrow().flow_rate, 0.1);
        assert_eq!(s2.borrow().composition["Ethanol"], 0.8);
    }

    #[test]
    fn test_feed_to_cstr_scenario() {
        let mut fs = Flowsheet::new("ethanol");
        fs.add_unit(Passthrough::new("Feed")).unwrap();
        fs.add_unit(ethanol_reactor("R-101", 10.0)).unwrap();
        fs.add_unit(Passthrough::new("Product")).unwrap();
        fs.add_stream(Stream::new(
            "s1",
            0.1,
            353.15,
            101_325.0,
            composition(&[("Ethanol", 0.8), ("Water", 0.2), ("Product", 0.0)]),
        ));
        fs.connect("s1", "Feed", "R-101").unwrap();
        fs.connect("s2", "R-101", "Product").unwrap();

        SequentialModularSolver::new().solve(&mut fs).unwrap();

        let out = fs.stream("s2").unwrap();
        let out = out.borrow();
        assert!(out.composition["Product"] > 0.0 && out.composition["Product"] < 0.8);
        assert!(out.composition["Ethanol"] < 0.8);
        assert!(out.is_normalized(1e-9));
    }

    #[test]
    fn test_fail_fast_leaves_downstream_untouched() {
        let mut fs = Flowsheet::new("failing");
        fs.add_unit(Passthrough::new("Feed")).unwrap();
        fs.add_unit(Passthrough::new("P1")).unwrap();
        fs.add_unit(ethanol_reactor("R-101", 10.0)).unwrap();
        fs.add_unit(Passthrough::new("P2")).unwrap();

        // Zero-flow feed: P1 copies it through, then the reactor's
        // residence-time computation fails.
        fs.add_stream(Stream::new(
            "s1",
            0.0,
            353.15,
            101_325.0,
            composition(&[("Ethanol", 0.8), ("Water", 0.2)]),
        ));
        fs.connect("s1", "Feed", "P1").unwrap();
        fs.connect("s2", "P1", "R-101").unwrap();
        fs.connect("s3", "R-101", "P2").unwrap();

        let err = SequentialModularSolver::new().solve(&mut fs).unwrap_err();
        match err {
            SolveError::UnitFailed { unit, source } => {
                assert_eq!(unit, "R-101");
                assert!(matches!(source, UnitError::ZeroFlow { .. }));
            }
            other => panic!("expected UnitFailed, got {other:?}"),
        }

        // Upstream of the failure: P1 finished and wrote s2.
        let s2 = fs.stream("s2").unwrap();
        assert_eq!(s2.borrow().composition["Ethanol"], 0.8);

        // Downstream of the failure: s3 is still the untouched placeholder.
        let s3 = fs.stream("s3").unwrap();
        assert_eq!(s3.borrow().flow_rate, 0.0);
        assert!(s3.borrow().composition.is_empty());
    }
}
