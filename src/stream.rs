//! Process streams: the shared mutable state propagated between units.
//!
//! A [`Stream`] is a named bag of physical fields: volumetric flow rate,
//! temperature, pressure, and a component composition.
//! Exactly one unit produces a stream (it appears in that unit's outlet
//! slots) and one or more units consume it. Both sides hold the *same*
//! [`StreamRef`] handle, so a mutation by the producing unit is immediately
//! visible downstream. This sharing is the propagation medium of the
//! sequential-modular solver, not an accident of representation.
//!
//! A freshly connected stream is a placeholder: zero flow, unset temperature
//! and pressure, empty composition. Units overwrite these fields as the
//! flowsheet is evaluated.
//!
//! # Example
//!
//! ```
//! use seqmod::stream::Stream;
//! use indexmap::IndexMap;
//!
//! let mut composition = IndexMap::new();
//! composition.insert("Ethanol".to_string(), 0.8);
//! composition.insert("Water".to_string(), 0.2);
//!
//! let feed = Stream::new("feed", 0.1, 353.15, 101_325.0, composition);
//! assert!(feed.is_normalized(1e-9));
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Serialize;

/// Shared handle to a stream, held by the flowsheet, the producing unit's
/// outlet slot, and every consuming unit's inlet slot.
pub type StreamRef = Rc<RefCell<Stream>>;

/// A material stream between two unit operations.
///
/// Fields use SI units throughout: flow rate in m³/s, temperature in K,
/// pressure in Pa. Composition maps component names to fractions; after any
/// successful unit solve the fractions sum to 1.0 and are non-negative.
/// A flow rate of zero marks a not-yet-computed placeholder.
#[derive(Debug, Clone, Serialize)]
pub struct Stream {
    /// Stream identity, unique within a flowsheet.
    pub name: String,
    /// Volumetric flow rate [m³/s]; 0.0 for placeholders.
    pub flow_rate: f64,
    /// Temperature [K]; `None` until set by a feed or an upstream unit.
    pub temperature: Option<f64>,
    /// Pressure [Pa]; `None` until set by a feed or an upstream unit.
    pub pressure: Option<f64>,
    /// Component name -> fraction, in insertion order.
    pub composition: IndexMap<String, f64>,
}

impl Stream {
    /// Creates a fully specified stream (typically a feed).
    pub fn new(
        name: impl Into<String>,
        flow_rate: f64,
        temperature: f64,
        pressure: f64,
        composition: IndexMap<String, f64>,
    ) -> Self {
        Stream {
            name: name.into(),
            flow_rate,
            temperature: Some(temperature),
            pressure: Some(pressure),
            composition,
        }
    }

    /// Creates an empty placeholder stream, as `connect` does for stream
    /// names that have not been pre-seeded.
    pub fn placeholder(name: impl Into<String>) -> Self {
        Stream {
            name: name.into(),
            flow_rate: 0.0,
            temperature: None,
            pressure: None,
            composition: IndexMap::new(),
        }
    }

    /// Wraps the stream in a shared handle.
    pub fn into_ref(self) -> StreamRef {
        Rc::new(RefCell::new(self))
    }

    /// Copies every physical field except the composition from `other`.
    ///
    /// The stream's name is identity, not state, and is never copied.
    pub fn copy_conditions_from(&mut self, other: &Stream) {
        self.flow_rate = other.flow_rate;
        self.temperature = other.temperature;
        self.pressure = other.pressure;
    }

    /// Copies the full physical field set (conditions and composition) from
    /// `other`. This is what the default passthrough solve writes.
    pub fn copy_state_from(&mut self, other: &Stream) {
        self.copy_conditions_from(other);
        self.composition = other.composition.clone();
    }

    /// Sum of all composition fractions.
    pub fn composition_total(&self) -> f64 {
        self.composition.values().sum()
    }

    /// Whether the composition sums to 1.0 within `tolerance` with no
    /// negative fractions.
    pub fn is_normalized(&self, tolerance: f64) -> bool {
        self.composition.values().all(|&x| x >= 0.0)
            && (self.composition_total() - 1.0).abs() <= tolerance
    }
}

/// Clamps every fraction to be non-negative, then rescales so the fractions
/// sum to exactly 1.0.
///
/// The clamp-then-normalize order matters: a negative fraction is treated as
/// zero *before* the total is computed, so it cannot drag other fractions
/// up. Returns `None` when every fraction clamps to zero, which callers
/// surface as an invalid-composition error.
pub fn normalized(composition: &IndexMap<String, f64>) -> Option<IndexMap<String, f64>> {
    let clamped: IndexMap<String, f64> =
        composition.iter().map(|(k, &v)| (k.clone(), v.max(0.0))).collect();
    let total: f64 = clamped.values().sum();
    if total == 0.0 {
        return None;
    }
    Some(clamped.into_iter().map(|(k, v)| (k, v / total)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composition(pairs: &[(&str, f64)]) -> IndexMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_placeholder_is_empty() {
        let s = Stream::placeholder("s1");
        assert_eq!(s.flow_rate, 0.0);
        assert!(s.temperature.is_none());
        assert!(s.pressure.is_none());
        assert!(s.composition.is_empty());
    }

    #[test]
    fn test_copy_state_preserves_name() {
        let feed = Stream::new("feed", 0.1, 353.15, 101_325.0, composition(&[("A", 1.0)]));
        let mut out = Stream::placeholder("out");
        out.copy_state_from(&feed);

        assert_eq!(out.name, "out");
        assert_eq!(out.flow_rate, 0.1);
        assert_eq!(out.temperature, Some(353.15));
        assert_eq!(out.composition["A"], 1.0);
    }

    #[test]
    fn test_normalized_rescales() {
        let comp = composition(&[("A", 2.0), ("B", 2.0)]);
        let norm = normalized(&comp).unwrap();
        assert!((norm["A"] - 0.5).abs() < 1e-12);
        assert!((norm["B"] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_normalized_clamps_before_rescaling() {
        // -0.5 must clamp to zero first; it must not inflate the total.
        let comp = composition(&[("A", 1.0), ("B", -0.5)]);
        let norm = normalized(&comp).unwrap();
        assert!((norm["A"] - 1.0).abs() < 1e-12);
        assert_eq!(norm["B"], 0.0);
    }

    #[test]
    fn test_normalized_all_zero_is_none() {
        assert!(normalized(&composition(&[("A", 0.0), ("B", -1.0)])).is_none());
        assert!(normalized(&IndexMap::new()).is_none());
    }

    #[test]
    fn test_is_normalized() {
        let s = Stream::new("s", 1.0, 300.0, 1e5, composition(&[("A", 0.6), ("B", 0.4)]));
        assert!(s.is_normalized(1e-9));

        let bad = Stream::new("s", 1.0, 300.0, 1e5, composition(&[("A", 0.6), ("B", 0.5)]));
        assert!(!bad.is_normalized(1e-9));
    }

    #[test]
    fn test_shared_handle_aliases() {
        let feed = Stream::new("feed", 0.1, 353.15, 101_325.0, composition(&[("A", 1.0)]));
        let handle = feed.into_ref();
        let alias = Rc::clone(&handle);

        handle.borrow_mut().flow_rate = 0.2;
        assert_eq!(alias.borrow().flow_rate, 0.2);
    }
}
