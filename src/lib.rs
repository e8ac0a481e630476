//! order-dashkit: the data path of a single-page e-commerce analytics
//! dashboard.
//!
//! Load the order CSV and the state-shape GeoJSON once into in-memory
//! DataFrames ([`OdkModel`]), narrow them to a date window and a status
//! policy, compute the summary aggregates ([`aggregation`]), and render the
//! dashboard page as one self-contained HTML string ([`visualization`]).

pub mod aggregation;
pub mod config;
pub mod error;
pub mod model;
pub mod schema;
pub mod visualization;

pub use aggregation::Granularity;
pub use config::{DashboardOptions, DemographicView, PerformanceView, StatusPolicy};
pub use error::OdkError;
pub use model::OdkModel;
pub use visualization::generate_dashboard_html;
