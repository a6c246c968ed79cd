//! Passthrough unit: the base variant for conceptual flowsheet nodes.

use std::any::Any;

use crate::models::{Ports, UnitModel};

/// A unit with no model of its own.
///
/// Used for feeds (zero inlets, outlets pre-seeded by the caller), product
/// and waste sinks (zero outlets), and any node that should forward its
/// first inlet unchanged. The behavior is entirely the [`UnitModel`] default
/// solve.
///
/// # Example
///
/// ```
/// use seqmod::models::{Passthrough, UnitModel};
///
/// let feed = Passthrough::new("Feed");
/// assert_eq!(feed.name(), "Feed");
/// assert_eq!(feed.ports().n_inlets(), 0);
/// ```
#[derive(Debug, Default)]
pub struct Passthrough {
    name: String,
    ports: Ports,
}

impl Passthrough {
    pub fn new(name: impl Into<String>) -> Self {
        Passthrough { name: name.into(), ports: Ports::new() }
    }
}

impl UnitModel for Passthrough {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> &Ports {
        &self.ports
    }

    fn ports_mut(&mut self) -> &mut Ports {
        &mut self.ports
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
