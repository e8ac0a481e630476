use std::collections::HashMap;
use std::path::PathBuf;

use polars::datatypes::TimeUnit;
use polars::prelude::StrptimeOptions;
use polars::prelude::*;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{DashboardOptions, StatusPolicy};
use crate::error::OdkError;
use crate::schema::*;
use crate::visualization;

/// Timestamp layout used by every datetime column in the order dataset.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// In-memory application state: the loaded order and state-shape tables.
///
/// Both tables are read-only after loading; every dashboard interaction
/// recomputes its aggregates from them via [`crate::aggregation`].
pub struct OdkModel {
    base_path: PathBuf,
    orders: Option<DataFrame>,
    states: Option<DataFrame>,
}

impl OdkModel {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            orders: None,
            states: None,
        }
    }

    // ── Data loading ────────────────────────────────────────────────────────

    /// Load any CSV into a Polars DataFrame with all columns as strings.
    /// Optionally rename columns via a map.
    pub fn load_csv(
        &self,
        filename: &str,
        rename: Option<HashMap<String, String>>,
    ) -> Result<DataFrame, OdkError> {
        self.read_csv_as_strings(filename, rename)
    }

    /// Load the order CSV.
    ///
    /// Required columns:
    ///     order_id, customer_id, customer_state, order_status,
    ///     order_approved_at, payment_value, payment_type
    ///
    /// Every timestamp column present in the file is parsed strictly as
    /// `%Y-%m-%d %H:%M:%S`; empty fields stay null, malformed non-empty
    /// values fail the load. `payment_value` is cast to Float64.
    /// All other columns are preserved as strings.
    pub fn load_orders(&mut self, filename: Option<&str>) -> Result<&DataFrame, OdkError> {
        let fname = filename.unwrap_or("main_data.csv");
        let raw = self.read_csv_as_strings(fname, None)?;

        Self::require_columns(&raw, &order::REQUIRED)?;

        let mut df = raw;
        for ts_col in order::TIMESTAMPS {
            df = Self::parse_datetime_column(df, ts_col, TIMESTAMP_FORMAT)?;
        }
        let df = Self::parse_float_column(df, order::PAYMENT_VALUE)?;

        info!(file = fname, rows = df.height(), "loaded orders");
        self.orders = Some(df);
        Ok(self.orders.as_ref().unwrap())
    }

    /// Load the state-shape GeoJSON.
    ///
    /// Expects a FeatureCollection whose features carry `sigla` and `name`
    /// properties. The resulting frame has one row per feature with the
    /// feature's geometry kept as its raw JSON string.
    pub fn load_state_shapes(&mut self, filename: Option<&str>) -> Result<&DataFrame, OdkError> {
        let fname = filename.unwrap_or("brazil-states.geojson");
        let path = self.base_path.join(fname);
        let text = std::fs::read_to_string(&path)?;
        let root: Value = serde_json::from_str(&text)?;

        let features = root
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                OdkError::InvalidData(format!("{fname} is not a GeoJSON FeatureCollection"))
            })?;

        let mut siglas: Vec<String> = Vec::with_capacity(features.len());
        let mut names: Vec<String> = Vec::with_capacity(features.len());
        let mut geometries: Vec<String> = Vec::with_capacity(features.len());

        for (i, feature) in features.iter().enumerate() {
            let properties = feature.get("properties").ok_or_else(|| {
                OdkError::InvalidData(format!("feature {i} has no properties"))
            })?;
            let sigla = properties
                .get(geo::SIGLA)
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    OdkError::InvalidData(format!("feature {i} has no '{}' property", geo::SIGLA))
                })?;
            let name = properties
                .get(geo::NAME)
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    OdkError::InvalidData(format!("feature {i} has no '{}' property", geo::NAME))
                })?;
            let geometry = feature.get("geometry").ok_or_else(|| {
                OdkError::InvalidData(format!("feature {i} has no geometry"))
            })?;

            siglas.push(sigla.to_string());
            names.push(name.to_string());
            geometries.push(serde_json::to_string(geometry)?);
        }

        let df = DataFrame::new(vec![
            Series::new(geo::SIGLA.into(), siglas).into(),
            Series::new(geo::NAME.into(), names).into(),
            Series::new(geo::GEOMETRY.into(), geometries).into(),
        ])?;

        info!(file = fname, states = df.height(), "loaded state shapes");
        self.states = Some(df);
        Ok(self.states.as_ref().unwrap())
    }

    // ── Date window ─────────────────────────────────────────────────────────

    /// Min and max `order_approved_at` over the loaded orders, the bounds
    /// offered to the date pickers.
    pub fn approved_window(&self) -> Result<(NaiveDateTime, NaiveDateTime), OdkError> {
        let orders = self.orders()?;
        let approved = orders
            .column(order::ORDER_APPROVED_AT)?
            .as_materialized_series()
            .datetime()?
            .clone();

        let min_us = approved.phys.min().ok_or_else(|| {
            OdkError::InvalidData("no parsed order_approved_at timestamps".into())
        })?;
        let max_us = approved.phys.max().ok_or_else(|| {
            OdkError::InvalidData("no parsed order_approved_at timestamps".into())
        })?;

        Ok((Self::us_to_datetime(min_us)?, Self::us_to_datetime(max_us)?))
    }

    /// Orders whose `order_approved_at` falls inside the inclusive calendar
    /// window `[start, end]`. The entire end day is included.
    pub fn select_window(&self, start: NaiveDate, end: NaiveDate) -> Result<DataFrame, OdkError> {
        if start > end {
            return Err(OdkError::Validation(format!(
                "start date {start} is after end date {end}"
            )));
        }
        let orders = self.orders()?;

        let start_us = start
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp_micros();
        let end_excl = end
            .succ_opt()
            .ok_or_else(|| OdkError::Validation(format!("end date {end} out of range")))?;
        let end_us = end_excl.and_time(NaiveTime::MIN).and_utc().timestamp_micros();

        let df = orders
            .clone()
            .lazy()
            .filter(
                col(order::ORDER_APPROVED_AT)
                    .gt_eq(lit(start_us))
                    .and(col(order::ORDER_APPROVED_AT).lt(lit(end_us))),
            )
            .collect()?;

        debug!(%start, %end, rows = df.height(), "selected date window");
        Ok(df)
    }

    // ── Status filter ───────────────────────────────────────────────────────

    /// Apply the configured status policy to a (date-filtered) order frame.
    pub fn apply_status_policy(
        orders: &DataFrame,
        policy: StatusPolicy,
    ) -> Result<DataFrame, OdkError> {
        let statuses: Vec<String> = policy.statuses().iter().map(|s| s.to_string()).collect();
        let statuses = Series::new(order::ORDER_STATUS.into(), statuses);

        let matches = col(order::ORDER_STATUS).is_in(lit(statuses), false);
        let keep = if policy.is_allow_list() {
            matches
        } else {
            matches.not()
        };

        let df = orders.clone().lazy().filter(keep).collect()?;
        debug!(?policy, rows = df.height(), "applied status policy");
        Ok(df)
    }

    // ── Properties ──────────────────────────────────────────────────────────

    pub fn orders_df(&self) -> Option<&DataFrame> {
        self.orders.as_ref()
    }

    pub fn states_df(&self) -> Option<&DataFrame> {
        self.states.as_ref()
    }

    pub(crate) fn orders(&self) -> Result<&DataFrame, OdkError> {
        self.orders
            .as_ref()
            .ok_or_else(|| OdkError::NotLoaded("orders".into()))
    }

    pub(crate) fn states(&self) -> Result<&DataFrame, OdkError> {
        self.states
            .as_ref()
            .ok_or_else(|| OdkError::NotLoaded("states".into()))
    }

    // ── Visualization ───────────────────────────────────────────────────────

    /// Render the dashboard page for a date window: filter, aggregate, and
    /// emit one self-contained HTML string.
    pub fn render_dashboard(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        options: &DashboardOptions,
    ) -> Result<String, OdkError> {
        let windowed = self.select_window(start, end)?;
        visualization::generate_dashboard_html(&windowed, self.states()?, options)
    }
}

// ── Private helpers ─────────────────────────────────────────────────────────

impl OdkModel {
    /// Read a CSV file with all columns as String dtype.
    /// Trims whitespace from column names and applies optional rename.
    fn read_csv_as_strings(
        &self,
        filename: &str,
        rename: Option<HashMap<String, String>>,
    ) -> Result<DataFrame, OdkError> {
        let path = self.base_path.join(filename);
        let mut df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0)) // all columns as String
            .try_into_reader_with_file_path(Some(path))?
            .finish()?;

        // Trim whitespace from column names
        let trimmed: Vec<String> = df
            .get_column_names_str()
            .iter()
            .map(|c| c.trim().to_string())
            .collect();
        df.set_column_names(trimmed.as_slice())?;

        // Apply optional column rename
        if let Some(map) = rename {
            let old: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
            let new: Vec<&str> = map.values().map(|s| s.as_str()).collect();
            df = df.lazy().rename(old, new, true).collect()?;
        }

        Ok(df)
    }

    fn require_columns(df: &DataFrame, required: &[&str]) -> Result<(), OdkError> {
        for &col_name in required {
            if df.column(col_name).is_err() {
                return Err(OdkError::MissingColumn(col_name.to_string()));
            }
        }
        Ok(())
    }

    /// Parse a string column to Datetime. Missing columns are left alone;
    /// null values pass through, malformed non-null values raise.
    fn parse_datetime_column(
        df: DataFrame,
        column: &str,
        format: &str,
    ) -> Result<DataFrame, OdkError> {
        if df.column(column).is_ok() {
            let df = df
                .lazy()
                .with_columns([col(column)
                    .str()
                    .strip_chars(lit(" \t\r\n"))
                    .str()
                    .to_datetime(
                        Some(TimeUnit::Microseconds),
                        None,
                        StrptimeOptions {
                            format: Some(format.into()),
                            strict: true,
                            ..Default::default()
                        },
                        lit("raise"),
                    )])
                .collect()?;
            Ok(df)
        } else {
            Ok(df)
        }
    }

    /// Parse a string column to Float64.
    fn parse_float_column(df: DataFrame, column: &str) -> Result<DataFrame, OdkError> {
        let df = df
            .lazy()
            .with_columns([col(column)
                .str()
                .strip_chars(lit(" \t\r\n"))
                .cast(DataType::Float64)])
            .collect()?;
        Ok(df)
    }

    fn us_to_datetime(us: i64) -> Result<NaiveDateTime, OdkError> {
        DateTime::from_timestamp_micros(us)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| OdkError::InvalidData(format!("timestamp {us} out of range")))
    }
}
