//! Feature rows and input schema.
//!
//! A `FeatureRow` is one 1-second snapshot of derived market features for a
//! single entity. Every numeric feature is optional: an absent value (JSON
//! `null`) or a non-finite value marks the row as low quality, and consumers
//! skip it explicitly instead of letting NaN flow through arithmetic.
//!
//! Absence of a whole column is a different matter: it is a schema error and
//! aborts processing.

use crate::entity::{EntityId, TimestampMs};
use crate::error::{CoreError, Result, SchemaError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::io::BufRead;

/// Every column a feature source may provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeatureField {
    Ts,
    EntityId,
    Ret1s,
    Accel1s,
    ZVol1s,
    TicksPerSec,
    Spread,
    MicropriceSlope,
    Price,
}

impl FeatureField {
    pub const ALL: [FeatureField; 9] = [
        Self::Ts,
        Self::EntityId,
        Self::Ret1s,
        Self::Accel1s,
        Self::ZVol1s,
        Self::TicksPerSec,
        Self::Spread,
        Self::MicropriceSlope,
        Self::Price,
    ];

    /// Columns required by the detection engine regardless of refractory mode.
    pub const REQUIRED: [FeatureField; 8] = [
        Self::Ts,
        Self::EntityId,
        Self::Ret1s,
        Self::Accel1s,
        Self::ZVol1s,
        Self::TicksPerSec,
        Self::Spread,
        Self::MicropriceSlope,
    ];

    /// Column name in the input.
    pub fn column(self) -> &'static str {
        match self {
            Self::Ts => "ts",
            Self::EntityId => "entity_id",
            Self::Ret1s => "ret_1s",
            Self::Accel1s => "accel_1s",
            Self::ZVol1s => "z_vol_1s",
            Self::TicksPerSec => "ticks_per_sec",
            Self::Spread => "spread",
            Self::MicropriceSlope => "microprice_slope",
            Self::Price => "price",
        }
    }

    pub fn from_column(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.column() == name)
    }
}

impl fmt::Display for FeatureField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// One row of derived features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Epoch milliseconds. Non-decreasing per entity.
    pub ts: TimestampMs,
    pub entity_id: EntityId,
    pub ret_1s: Option<f64>,
    pub accel_1s: Option<f64>,
    pub z_vol_1s: Option<f64>,
    pub ticks_per_sec: Option<f64>,
    pub spread: Option<f64>,
    pub microprice_slope: Option<f64>,
    /// Only consumed by the price-driven refractory state machine.
    #[serde(default)]
    pub price: Option<f64>,
}

impl FeatureRow {
    /// Create a row with every feature absent.
    pub fn empty(ts: TimestampMs, entity_id: impl Into<EntityId>) -> Self {
        Self {
            ts,
            entity_id: entity_id.into(),
            ret_1s: None,
            accel_1s: None,
            z_vol_1s: None,
            ticks_per_sec: None,
            spread: None,
            microprice_slope: None,
            price: None,
        }
    }

    /// Get a numeric feature, treating non-finite values as absent.
    ///
    /// Returns None for `Ts` and `EntityId`.
    pub fn get(&self, field: FeatureField) -> Option<f64> {
        let raw = match field {
            FeatureField::Ts | FeatureField::EntityId => None,
            FeatureField::Ret1s => self.ret_1s,
            FeatureField::Accel1s => self.accel_1s,
            FeatureField::ZVol1s => self.z_vol_1s,
            FeatureField::TicksPerSec => self.ticks_per_sec,
            FeatureField::Spread => self.spread,
            FeatureField::MicropriceSlope => self.microprice_slope,
            FeatureField::Price => self.price,
        };
        raw.filter(|v| v.is_finite())
    }

    pub fn ret(&self) -> Option<f64> {
        self.get(FeatureField::Ret1s)
    }

    pub fn accel(&self) -> Option<f64> {
        self.get(FeatureField::Accel1s)
    }

    pub fn z_vol(&self) -> Option<f64> {
        self.get(FeatureField::ZVol1s)
    }

    pub fn ticks(&self) -> Option<f64> {
        self.get(FeatureField::TicksPerSec)
    }

    pub fn spread(&self) -> Option<f64> {
        self.get(FeatureField::Spread)
    }

    pub fn microprice_slope(&self) -> Option<f64> {
        self.get(FeatureField::MicropriceSlope)
    }

    pub fn price(&self) -> Option<f64> {
        self.get(FeatureField::Price)
    }

    /// First missing field among `fields`, if any.
    pub fn first_missing(&self, fields: &[FeatureField]) -> Option<FeatureField> {
        fields.iter().copied().find(|f| self.get(*f).is_none())
    }
}

/// The set of columns present in an input source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeatureSchema {
    fields: BTreeSet<FeatureField>,
}

impl FeatureSchema {
    /// Schema carrying every known column.
    pub fn full() -> Self {
        Self {
            fields: FeatureField::ALL.into_iter().collect(),
        }
    }

    /// Build a schema from column names. Unknown columns are ignored.
    pub fn from_columns<'a, I>(columns: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self {
            fields: columns
                .into_iter()
                .filter_map(FeatureField::from_column)
                .collect(),
        }
    }

    pub fn contains(&self, field: FeatureField) -> bool {
        self.fields.contains(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = FeatureField> + '_ {
        self.fields.iter().copied()
    }

    /// Check that every field in `required` is present.
    pub fn require(&self, required: &[FeatureField]) -> std::result::Result<(), SchemaError> {
        match required.iter().find(|f| !self.contains(**f)) {
            Some(missing) => Err(SchemaError::MissingColumn(missing.column())),
            None => Ok(()),
        }
    }
}

/// A batch of rows together with the schema of the source they came from.
#[derive(Debug, Clone, Default)]
pub struct FeatureBatch {
    pub schema: FeatureSchema,
    pub rows: Vec<FeatureRow>,
}

impl FeatureBatch {
    pub fn new(schema: FeatureSchema, rows: Vec<FeatureRow>) -> Self {
        Self { schema, rows }
    }

    /// Batch built in memory, with every column present.
    pub fn from_rows(rows: Vec<FeatureRow>) -> Self {
        Self::new(FeatureSchema::full(), rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Decode a whole JSON-lines source.
    pub fn from_json_lines<R: BufRead>(reader: R) -> Result<Self> {
        let mut decoder = RowDecoder::new();
        let mut rows = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if let Some(row) = decoder.decode_line(&line)? {
                rows.push(row);
            }
        }
        let schema = decoder.into_schema().unwrap_or_default();
        Ok(Self { schema, rows })
    }
}

/// Incremental JSON-lines decoder.
///
/// The first non-blank line fixes the schema; every later line must carry
/// all columns of that schema (values may be `null`).
#[derive(Debug, Default)]
pub struct RowDecoder {
    schema: Option<FeatureSchema>,
    line_no: usize,
}

impl RowDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema fixed by the first decoded line.
    pub fn schema(&self) -> Option<&FeatureSchema> {
        self.schema.as_ref()
    }

    pub fn into_schema(self) -> Option<FeatureSchema> {
        self.schema
    }

    /// Decode one line. Blank lines yield `Ok(None)`.
    pub fn decode_line(&mut self, line: &str) -> Result<Option<FeatureRow>> {
        self.line_no += 1;
        let line_no = self.line_no;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let value: serde_json::Value =
            serde_json::from_str(trimmed).map_err(|source| CoreError::Parse {
                line: line_no,
                source,
            })?;
        let object = value
            .as_object()
            .ok_or(SchemaError::NotAnObject { line: line_no })?;

        let schema = self
            .schema
            .get_or_insert_with(|| FeatureSchema::from_columns(object.keys().map(String::as_str)));

        for field in [FeatureField::Ts, FeatureField::EntityId] {
            if !object.contains_key(field.column()) {
                return Err(SchemaError::MissingInRow {
                    column: field.column(),
                    line: line_no,
                }
                .into());
            }
        }
        if let Some(missing) = schema
            .fields()
            .find(|f| !object.contains_key(f.column()))
        {
            return Err(SchemaError::MissingInRow {
                column: missing.column(),
                line: line_no,
            }
            .into());
        }

        let row = serde_json::from_value(value).map_err(|source| CoreError::Parse {
            line: line_no,
            source,
        })?;
        Ok(Some(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_LINE: &str = r#"{"ts":1000,"entity_id":"ABC","ret_1s":0.001,"accel_1s":0.0,"z_vol_1s":1.2,"ticks_per_sec":4,"spread":0.02,"microprice_slope":0.0,"price":10.5}"#;

    #[test]
    fn test_nan_treated_as_missing() {
        let mut row = FeatureRow::empty(0, "A");
        row.ret_1s = Some(f64::NAN);
        row.z_vol_1s = Some(1.0);
        assert_eq!(row.ret(), None);
        assert_eq!(row.z_vol(), Some(1.0));
        assert_eq!(
            row.first_missing(&[FeatureField::ZVol1s, FeatureField::Ret1s]),
            Some(FeatureField::Ret1s)
        );
    }

    #[test]
    fn test_schema_require() {
        let schema = FeatureSchema::from_columns(["ts", "entity_id", "ret_1s"]);
        assert!(schema.require(&[FeatureField::Ts, FeatureField::Ret1s]).is_ok());
        assert_eq!(
            schema.require(&FeatureField::REQUIRED),
            Err(SchemaError::MissingColumn("accel_1s"))
        );
        assert!(FeatureSchema::full().require(&FeatureField::ALL).is_ok());
    }

    #[test]
    fn test_decode_full_line() {
        let mut decoder = RowDecoder::new();
        let row = decoder.decode_line(FULL_LINE).unwrap().unwrap();
        assert_eq!(row.ts, 1000);
        assert_eq!(row.entity_id.as_str(), "ABC");
        assert_eq!(row.ticks(), Some(4.0));
        assert_eq!(row.price(), Some(10.5));
        assert!(decoder.schema().unwrap().contains(FeatureField::Price));
    }

    #[test]
    fn test_decode_null_is_missing_value_not_schema_error() {
        let mut decoder = RowDecoder::new();
        decoder.decode_line(FULL_LINE).unwrap();
        let line = FULL_LINE.replace("\"ret_1s\":0.001", "\"ret_1s\":null");
        let row = decoder.decode_line(&line).unwrap().unwrap();
        assert_eq!(row.ret(), None);
    }

    #[test]
    fn test_decode_missing_column_is_fatal() {
        let mut decoder = RowDecoder::new();
        decoder.decode_line(FULL_LINE).unwrap();
        let line = FULL_LINE.replace("\"spread\":0.02,", "");
        let err = decoder.decode_line(&line).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Schema(SchemaError::MissingInRow {
                column: "spread",
                line: 2
            })
        ));
    }

    #[test]
    fn test_decode_blank_and_garbage() {
        let mut decoder = RowDecoder::new();
        assert!(decoder.decode_line("   ").unwrap().is_none());
        assert!(matches!(
            decoder.decode_line("not json"),
            Err(CoreError::Parse { line: 2, .. })
        ));
        assert!(matches!(
            decoder.decode_line("[1,2]"),
            Err(CoreError::Schema(SchemaError::NotAnObject { line: 3 }))
        ));
    }

    #[test]
    fn test_batch_from_json_lines() {
        let input = format!("{FULL_LINE}\n\n{FULL_LINE}\n");
        let batch = FeatureBatch::from_json_lines(input.as_bytes()).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.schema.require(&FeatureField::REQUIRED).is_ok());
    }
}
