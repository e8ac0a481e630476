use serde::Deserialize;

use crate::schema::status;

/// Which order statuses survive the status filter.
///
/// The dashboard only counts orders that are actually moving through
/// fulfillment. Two equivalent-looking formulations exist for the canonical
/// status set; they differ for statuses outside it, so the choice is an
/// explicit configuration rather than an implementation detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPolicy {
    /// Keep only statuses on the fulfillment path
    /// (created, processing, invoiced, shipped, delivered).
    /// Unknown statuses are dropped.
    #[default]
    FulfillmentOnly,
    /// Drop canceled and unavailable orders, keep everything else.
    /// Unknown statuses are kept.
    ExcludeCancellations,
}

impl StatusPolicy {
    /// Status values the policy matches against.
    pub fn statuses(&self) -> &'static [&'static str] {
        match self {
            StatusPolicy::FulfillmentOnly => &status::FULFILLMENT,
            StatusPolicy::ExcludeCancellations => &status::CANCELLATION,
        }
    }

    /// Whether a match with [`Self::statuses`] keeps the row or drops it.
    pub fn is_allow_list(&self) -> bool {
        matches!(self, StatusPolicy::FulfillmentOnly)
    }
}

/// The demographics chart views, mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemographicView {
    /// Choropleth map of customers per state.
    #[default]
    Map,
    /// Top/bottom states by customer count, side by side.
    StateBars,
    /// Order counts per payment type.
    PaymentTypes,
}

/// The sales-performance chart views, mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceView {
    DailyRevenue,
    MonthlyRevenue,
    DailyDeliveries,
    MonthlyDeliveries,
}

/// Presentation and filtering options for one dashboard render.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardOptions {
    /// Page title shown in the dashboard header.
    pub title: String,
    /// Symbol prefixed to the revenue metric, e.g. "$".
    pub currency_symbol: String,
    /// How many states each bar panel shows (top N and bottom N).
    pub bar_states: usize,
    /// Status filter applied before the customer/revenue aggregates.
    pub status_policy: StatusPolicy,
    /// Demographics view visible when the page opens.
    pub initial_demographic: DemographicView,
    /// Performance view visible when the page opens; `None` shows a hint
    /// asking the user to pick one.
    pub initial_performance: Option<PerformanceView>,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            title: "Order Analytics".to_string(),
            currency_symbol: "$".to_string(),
            bar_states: 5,
            status_policy: StatusPolicy::default(),
            initial_demographic: DemographicView::default(),
            initial_performance: None,
        }
    }
}
