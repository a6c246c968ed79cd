//! Model validation against historical plant data.
//!
//! Compares a reactor model's prediction with what the plant actually did:
//! a historian record is mapped onto an inlet stream, the model is staged
//! with fresh inlet/outlet streams and solved standalone (outside any
//! flowsheet), and the predicted target concentration is compared with the
//! recorded one.

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::info;

use crate::data::{CsvDataReader, HistoricalRecord};
use crate::models::{UnitError, UnitModel, CSTR};
use crate::stream::{Stream, StreamRef};

/// Errors raised during a validation run.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// The inlet mapper could not build a stream from the record (a needed
    /// column is absent).
    #[error("historical record is missing data for the inlet mapping")]
    InletMapping,
    /// The target data column is absent from the record.
    #[error("historical record has no '{0}' column")]
    MissingColumn(String),
    /// The model itself failed to solve.
    #[error("model failed to solve")]
    Model(#[from] UnitError),
}

/// Which model output is compared against which data column.
#[derive(Debug, Clone)]
pub struct TargetMap {
    /// Composition key read from the model's outlet.
    pub model_component: String,
    /// Historian column holding the measured value.
    pub data_column: String,
    /// Scale applied to the measured value before comparison (unit
    /// conversion; the historian records g/L, the model works in fractions).
    pub scale: f64,
}

impl TargetMap {
    pub fn new(model_component: impl Into<String>, data_column: impl Into<String>) -> Self {
        TargetMap {
            model_component: model_component.into(),
            data_column: data_column.into(),
            scale: 1e-3,
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }
}

/// Outcome of validating one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub timestamp: NaiveDateTime,
    pub predicted: f64,
    pub actual: f64,
    pub absolute_error: f64,
}

/// Maps a historian record onto a model inlet stream; `None` when a needed
/// column is absent.
pub type InletMapper = Box<dyn Fn(&HistoricalRecord) -> Option<Stream>>;

/// The default inlet mapping for the fermentation historian layout:
/// `feed_flow_rate` [m³/h] -> m³/s, `reactor_temp` [°C] -> K, atmospheric
/// pressure, and `feed_cellulose` [%] read as the ethanol-precursor
/// fraction.
pub fn fermentation_inlet(record: &HistoricalRecord) -> Option<Stream> {
    let flow_rate = record.get("feed_flow_rate")? / 3600.0;
    let temperature = record.get("reactor_temp")? + 273.15;
    let cellulose = record.get("feed_cellulose")? / 100.0;

    let composition: IndexMap<String, f64> = [
        ("Ethanol".to_string(), cellulose),
        ("Water".to_string(), 1.0 - cellulose),
        ("Product".to_string(), 0.0),
    ]
    .into_iter()
    .collect();
    Some(Stream::new("historian_inlet", flow_rate, temperature, 101_325.0, composition))
}

/// Re-wires a unit to a synthetic inlet, with the outlet starting as a copy
/// of the inlet, and returns both handles. Used by validation and parameter
/// estimation to drive a single model outside a flowsheet.
pub fn stage_unit(unit: &mut dyn UnitModel, inlet: Stream) -> (StreamRef, StreamRef) {
    let mut outlet = inlet.clone();
    outlet.name = format!("{}_out", inlet.name);
    let inlet_ref = inlet.into_ref();
    let outlet_ref = outlet.into_ref();
    unit.ports_mut().reset(vec![inlet_ref.clone()], vec![outlet_ref.clone()]);
    (inlet_ref, outlet_ref)
}

/// Compares simulation output with historical data.
pub struct ValidationEngine<'a> {
    reader: &'a CsvDataReader,
    target: TargetMap,
    inlet_mapper: InletMapper,
}

impl<'a> ValidationEngine<'a> {
    /// Creates an engine with the default fermentation inlet mapping.
    pub fn new(reader: &'a CsvDataReader, target: TargetMap) -> Self {
        ValidationEngine { reader, target, inlet_mapper: Box::new(fermentation_inlet) }
    }

    /// Replaces the record-to-inlet mapping.
    pub fn with_inlet_mapper(
        mut self,
        mapper: impl Fn(&HistoricalRecord) -> Option<Stream> + 'static,
    ) -> Self {
        self.inlet_mapper = Box::new(mapper);
        self
    }

    /// Validates the model at one point in time.
    ///
    /// Returns `Ok(None)` when the historian has no record at or before the
    /// timestamp.
    pub fn validate_at(
        &self,
        model: &mut CSTR,
        timestamp: NaiveDateTime,
    ) -> Result<Option<ValidationResult>, ValidationError> {
        let Some(record) = self.reader.get_data_at_timestamp(timestamp) else {
            info!("no historical data at or before {}", timestamp);
            return Ok(None);
        };

        let actual = record
            .get(&self.target.data_column)
            .ok_or_else(|| ValidationError::MissingColumn(self.target.data_column.clone()))?
            * self.target.scale;

        let inlet = (self.inlet_mapper)(record).ok_or(ValidationError::InletMapping)?;
        let (_inlet_ref, outlet_ref) = stage_unit(model, inlet);
        model.solve()?;

        let predicted = outlet_ref
            .borrow()
            .composition
            .get(&self.target.model_component)
            .copied()
            .unwrap_or(0.0);

        Ok(Some(ValidationResult {
            timestamp,
            predicted,
            actual,
            absolute_error: (predicted - actual).abs(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinetics::PowerLawReaction;
    use crate::properties::{Component, PropertyPackage};
    use std::io::Write;
    use std::path::PathBuf;
    use std::rc::Rc;

    const FIXTURE: &str = "\
timestamp,feed_flow_rate,reactor_temp,feed_cellulose,product_bioethanol_concentration
2023-01-10 10:00:00,360.0,35.0,40.0,120.0
2023-01-10 12:00:00,360.0,36.0,42.0,130.0
";

    fn write_fixture(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("seqmod_{}_{}", std::process::id(), name));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(FIXTURE.as_bytes()).unwrap();
        path
    }

    fn fermentation_reactor() -> CSTR {
        let package = Rc::new(PropertyPackage::new(vec![
            Component::new("Ethanol", "C2H6O", 46.07),
            Component::new("Water", "H2O", 18.02),
            Component::new("Product", "Prod", 100.0),
        ]));
        let stoichiometry: IndexMap<String, i32> =
            [("Ethanol".to_string(), -1), ("Product".to_string(), 1)].into_iter().collect();
        let orders: IndexMap<String, f64> = [("Ethanol".to_string(), 1.0)].into_iter().collect();
        let reaction = Rc::new(PowerLawReaction::new("fermentation", stoichiometry, orders, |t| {
            0.005 * (5000.0 * (1.0 / 310.0 - 1.0 / t)).exp()
        }));
        CSTR::new("R-101", 50.0, package, reaction)
    }

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_validate_at_timestamp() {
        let path = write_fixture("validate.csv");
        let reader = CsvDataReader::from_path(&path).unwrap();
        let engine = ValidationEngine::new(
            &reader,
            TargetMap::new("Product", "product_bioethanol_concentration"),
        );
        let mut model = fermentation_reactor();

        let result =
            engine.validate_at(&mut model, ts("2023-01-10 11:00:00")).unwrap().unwrap();

        assert!(result.predicted > 0.0);
        assert!((result.actual - 0.12).abs() < 1e-12);
        assert!(result.absolute_error.is_finite());
        assert_eq!(result.timestamp, ts("2023-01-10 11:00:00"));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_no_record_before_first_timestamp() {
        let path = write_fixture("validate_early.csv");
        let reader = CsvDataReader::from_path(&path).unwrap();
        let engine = ValidationEngine::new(
            &reader,
            TargetMap::new("Product", "product_bioethanol_concentration"),
        );
        let mut model = fermentation_reactor();

        let result = engine.validate_at(&mut model, ts("2022-01-01 00:00:00")).unwrap();
        assert!(result.is_none());

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_target_column_is_an_error() {
        let path = write_fixture("validate_col.csv");
        let reader = CsvDataReader::from_path(&path).unwrap();
        let engine =
            ValidationEngine::new(&reader, TargetMap::new("Product", "no_such_column"));
        let mut model = fermentation_reactor();

        let err = engine.validate_at(&mut model, ts("2023-01-10 11:00:00")).unwrap_err();
        assert!(matches!(err, ValidationError::MissingColumn(column) if column == "no_such_column"));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_stage_unit_rewires_ports() {
        let mut model = fermentation_reactor();
        let composition: IndexMap<String, f64> = [
            ("Ethanol".to_string(), 0.5),
            ("Water".to_string(), 0.5),
            ("Product".to_string(), 0.0),
        ]
        .into_iter()
        .collect();
        let inlet = Stream::new("in", 0.1, 310.0, 101_325.0, composition);

        let (inlet_ref, outlet_ref) = stage_unit(&mut model, inlet);
        assert_eq!(model.ports().n_inlets(), 1);
        assert_eq!(model.ports().n_outlets(), 1);
        assert_eq!(outlet_ref.borrow().name, "in_out");

        model.solve().unwrap();
        assert!(
            outlet_ref.borrow().composition["Product"]
                > inlet_ref.borrow().composition["Product"]
        );
    }
}
