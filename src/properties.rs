//! Component data and property packages.
//!
//! The property package is the core's registry of chemical species. Within
//! the flowsheet solver it is used only to validate that composition key
//! sets are consistent with the declared components; rigorous thermodynamic
//! property calculation is out of scope, so molar masses are supplied as
//! explicit data, the same way pseudo-components without database entries
//! are declared.

use indexmap::IndexMap;

/// Errors raised by property-package validation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PropertyError {
    /// A composition names a component the package does not know.
    #[error("component '{0}' is not part of the property package")]
    UnknownComponent(String),
    /// A declared component is missing from a composition.
    #[error("component '{0}' is missing from the composition")]
    MissingComponent(String),
}

/// A single chemical component.
#[derive(Debug, Clone)]
pub struct Component {
    pub name: String,
    pub formula: String,
    /// Molar mass [g/mol].
    pub molar_mass: f64,
}

impl Component {
    pub fn new(name: impl Into<String>, formula: impl Into<String>, molar_mass: f64) -> Self {
        Component { name: name.into(), formula: formula.into(), molar_mass }
    }
}

/// A registry of components for one process model.
///
/// # Example
///
/// ```
/// use seqmod::properties::{Component, PropertyPackage};
///
/// let package = PropertyPackage::new(vec![
///     Component::new("Ethanol", "C2H6O", 46.07),
///     Component::new("Water", "H2O", 18.02),
/// ]);
///
/// assert!(package.contains("Water"));
/// assert_eq!(package.molar_mass("Ethanol"), Some(46.07));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PropertyPackage {
    components: IndexMap<String, Component>,
}

impl PropertyPackage {
    pub fn new(components: Vec<Component>) -> Self {
        PropertyPackage {
            components: components.into_iter().map(|c| (c.name.clone(), c)).collect(),
        }
    }

    /// Component names in declaration order.
    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.get(name)
    }

    /// Molar mass [g/mol] of a component, if declared.
    pub fn molar_mass(&self, name: &str) -> Option<f64> {
        self.components.get(name).map(|c| c.molar_mass)
    }

    /// Checks that a composition's key set matches the declared components
    /// exactly: no unknown species, no declared species absent.
    pub fn validate_composition(
        &self,
        composition: &IndexMap<String, f64>,
    ) -> Result<(), PropertyError> {
        for key in composition.keys() {
            if !self.components.contains_key(key) {
                return Err(PropertyError::UnknownComponent(key.clone()));
            }
        }
        for name in self.components.keys() {
            if !composition.contains_key(name) {
                return Err(PropertyError::MissingComponent(name.clone()));
            }
        }
        Ok(())
    }
}
