//! Flowsheet: the graph of unit operations and streams.
//!
//! A flowsheet owns its units and streams and records connectivity as a
//! directed edge list labeled by stream identity. Construction is pure graph
//! building; no numerical computation happens here, the
//! [`crate::solver::SequentialModularSolver`] walks the finished graph.
//!
//! Registration order is meaningful: the unit registry iterates in insertion
//! order, which the solver uses to break ties in the calculation order so
//! that identical construction yields identical evaluation sequences.
//!
//! # Example
//!
//! ```
//! use seqmod::flowsheet::Flowsheet;
//! use seqmod::models::Passthrough;
//! use seqmod::stream::Stream;
//! use indexmap::IndexMap;
//!
//! let mut flowsheet = Flowsheet::new("demo");
//! flowsheet.add_unit(Passthrough::new("Feed")).unwrap();
//! flowsheet.add_unit(Passthrough::new("Product")).unwrap();
//!
//! // Pre-seed the feed stream, then wire it in by name.
//! let composition: IndexMap<String, f64> = [("Water".to_string(), 1.0)].into_iter().collect();
//! flowsheet.add_stream(Stream::new("s1", 0.1, 298.15, 101_325.0, composition));
//! flowsheet.connect("s1", "Feed", "Product").unwrap();
//! ```

use indexmap::IndexMap;

use crate::models::UnitModel;
use crate::stream::{Stream, StreamRef};

/// Errors raised during graph construction. Always fatal to the operation
/// that raised them; the flowsheet is left unchanged.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FlowsheetError {
    /// A unit with this name is already registered.
    #[error("unit '{0}' already exists in the flowsheet")]
    DuplicateUnit(String),
    /// A connection endpoint names an unregistered unit.
    #[error("unit '{0}' not found in the flowsheet")]
    UnknownUnit(String),
}

/// The process graph: units, streams, and directed connections.
pub struct Flowsheet {
    name: String,
    units: IndexMap<String, Box<dyn UnitModel>>,
    streams: IndexMap<String, StreamRef>,
    connections: Vec<(String, String)>,
}

impl Flowsheet {
    pub fn new(name: impl Into<String>) -> Self {
        Flowsheet {
            name: name.into(),
            units: IndexMap::new(),
            streams: IndexMap::new(),
            connections: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a unit under its own name.
    pub fn add_unit(&mut self, unit: impl UnitModel + 'static) -> Result<(), FlowsheetError> {
        let name = unit.name().to_owned();
        if self.units.contains_key(&name) {
            return Err(FlowsheetError::DuplicateUnit(name));
        }
        self.units.insert(name, Box::new(unit));
        Ok(())
    }

    /// Registers a stream by name ahead of `connect`, typically to seed a
    /// feed with known conditions. An existing stream of the same name is
    /// replaced.
    pub fn add_stream(&mut self, stream: Stream) -> StreamRef {
        let name = stream.name.clone();
        let handle = stream.into_ref();
        self.streams.insert(name, handle.clone());
        handle
    }

    /// Connects two registered units with the named stream.
    ///
    /// If `stream_name` is already registered that stream object is reused
    /// (this is how a pre-seeded feed gets wired in); otherwise a placeholder
    /// is created. The shared handle is appended to the source unit's outlet
    /// slots and the destination unit's inlet slots, and the directed edge
    /// is recorded for the solver's ordering pass.
    pub fn connect(
        &mut self,
        stream_name: &str,
        source_unit: &str,
        dest_unit: &str,
    ) -> Result<StreamRef, FlowsheetError> {
        if !self.units.contains_key(source_unit) {
            return Err(FlowsheetError::UnknownUnit(source_unit.to_owned()));
        }
        if !self.units.contains_key(dest_unit) {
            return Err(FlowsheetError::UnknownUnit(dest_unit.to_owned()));
        }

        let stream = self
            .streams
            .entry(stream_name.to_owned())
            .or_insert_with(|| Stream::placeholder(stream_name).into_ref())
            .clone();

        if let Some(source) = self.units.get_mut(source_unit) {
            source.ports_mut().add_outlet(stream.clone());
        }
        if let Some(dest) = self.units.get_mut(dest_unit) {
            dest.ports_mut().add_inlet(stream.clone());
        }
        self.connections.push((source_unit.to_owned(), dest_unit.to_owned()));
        Ok(stream)
    }

    /// A unit by name.
    pub fn unit(&self, name: &str) -> Option<&dyn UnitModel> {
        self.units.get(name).map(|u| u.as_ref())
    }

    /// Mutable access to a unit, e.g. for outer callers varying a parameter
    /// between solves.
    pub fn unit_mut(&mut self, name: &str) -> Option<&mut Box<dyn UnitModel>> {
        self.units.get_mut(name)
    }

    /// Units in registration order.
    pub fn units(&self) -> impl Iterator<Item = &dyn UnitModel> {
        self.units.values().map(|u| u.as_ref())
    }

    /// Unit names in registration order.
    pub fn unit_names(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    pub fn n_units(&self) -> usize {
        self.units.len()
    }

    /// A shared stream handle by name.
    pub fn stream(&self, name: &str) -> Option<StreamRef> {
        self.streams.get(name).cloned()
    }

    /// Streams in registration order.
    pub fn streams(&self) -> impl Iterator<Item = (&str, &StreamRef)> {
        self.streams.iter().map(|(name, stream)| (name.as_str(), stream))
    }

    /// The directed edge list, in connection order.
    pub fn connections(&self) -> &[(String, String)] {
        &self.connections
    }

    /// Feed streams: every outlet of a unit with zero inlets. Used by the
    /// economics and LCA collaborators to find raw-material inputs.
    pub fn feed_streams(&self) -> Vec<StreamRef> {
        self.units
            .values()
            .filter(|unit| unit.ports().n_inlets() == 0)
            .flat_map(|unit| unit.ports().outlets().iter().cloned())
            .collect()
    }
}

impl std::fmt::Debug for Flowsheet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flowsheet")
            .field("name", &self.name)
            .field("units", &self.units.keys().collect::<Vec<_>>())
            .field("streams", &self.streams.keys().collect::<Vec<_>>())
            .field("connections", &self.connections)
            .finish()
    }
}
