/// Visualization module: the dashboard page as one self-contained HTML string.
///
/// Produces inline SVG for every chart view:
/// - Choropleth map of customers per state, with min/max state labels
/// - Top/bottom state bar panels
/// - Daily/monthly revenue and delivered-order line charts
/// - Payment-type bar chart with the leading bucket highlighted
///
/// The page carries all views at once; a small inline script switches the
/// visible panel when a view-selector button is pressed. No external assets.
use std::fmt::Write as FmtWrite;

use chrono::DateTime;
use polars::prelude::*;
use serde_json::Value;

use crate::aggregation::{self, Granularity};
use crate::config::{DashboardOptions, DemographicView, PerformanceView};
use crate::error::OdkError;
use crate::model::OdkModel;
use crate::schema::*;

// ── Layout constants ────────────────────────────────────────────────────────

const CHART_W: f64 = 760.0;
const CHART_H: f64 = 360.0;
const MAP_SIZE: f64 = 640.0;
const MARGIN_LEFT: f64 = 64.0;
const MARGIN_RIGHT: f64 = 24.0;
const MARGIN_TOP: f64 = 24.0;
const MARGIN_BOTTOM: f64 = 48.0;

const BAR_ROW_H: f64 = 34.0;
const BAR_LABEL_W: f64 = 140.0;

// Original palette: leading bar blue, leading payment bucket green.
const HIGHLIGHT_BLUE: &str = "#90CAF9";
const HIGHLIGHT_GREEN: &str = "#A8CD89";
const BAR_GRAY: &str = "#D3D3D3";
const MAP_EDGE: &str = "#9AA6B2";

// ── Intermediate data structures ────────────────────────────────────────────

struct StateShape {
    sigla: String,
    name: String,
    customer_count: u32,
    revenue: f64,
    rings: Vec<Vec<(f64, f64)>>,
}

struct SeriesPoint {
    label: String,
    value: f64,
}

struct BarDatum {
    label: String,
    value: f64,
}

// ── Entry point ─────────────────────────────────────────────────────────────

/// Generate the full dashboard page from a date-windowed order frame and
/// the state shapes.
///
/// The status policy is applied here to the metric and time-series inputs;
/// the geographic and payment-type aggregates read the windowed frame
/// directly, matching what each view reports.
pub fn generate_dashboard_html(
    windowed_orders: &DataFrame,
    state_shapes: &DataFrame,
    options: &DashboardOptions,
) -> Result<String, OdkError> {
    let filtered = OdkModel::apply_status_policy(windowed_orders, options.status_policy)?;

    // Headline metrics
    let customers = aggregation::customer_count(&filtered)?;
    let delivered = aggregation::delivered_order_count(&filtered)?;
    let revenue = aggregation::revenue_total(&filtered)?;

    // Demographics
    let state_totals = aggregation::aggregate_by_state(windowed_orders, state_shapes)?;
    let shapes = extract_state_shapes(&state_totals)?;
    let leading = extract_bars(
        &aggregation::leading_states(&state_totals, options.bar_states)?,
        geo::NAME,
        aggregate::CUSTOMER_COUNT,
    )?;
    let trailing = extract_bars(
        &aggregation::trailing_states(&state_totals, options.bar_states)?,
        geo::NAME,
        aggregate::CUSTOMER_COUNT,
    )?;
    let payments = extract_bars(
        &aggregation::payment_type_counts(windowed_orders)?,
        order::PAYMENT_TYPE,
        aggregate::PAYMENT_COUNT,
    )?;

    // Performance series
    let daily_revenue = extract_series(
        &aggregation::revenue_by_bucket(&filtered, Granularity::Daily)?,
        aggregate::REVENUE,
        Granularity::Daily,
    )?;
    let monthly_revenue = extract_series(
        &aggregation::revenue_by_bucket(&filtered, Granularity::Monthly)?,
        aggregate::REVENUE,
        Granularity::Monthly,
    )?;
    let daily_deliveries = extract_series(
        &aggregation::delivered_by_bucket(&filtered, Granularity::Daily)?,
        aggregate::ORDER_COUNT,
        Granularity::Daily,
    )?;
    let monthly_deliveries = extract_series(
        &aggregation::delivered_by_bucket(&filtered, Granularity::Monthly)?,
        aggregate::ORDER_COUNT,
        Granularity::Monthly,
    )?;

    let metrics = metric_cards(
        customers,
        delivered,
        &format!("{}{}", options.currency_symbol, format_money(revenue)),
    );

    let demo_buttons = button_row(
        "demo",
        &[
            ("demo-map", "State Map"),
            ("demo-bars", "State Ranking"),
            ("demo-payments", "Payment Types"),
        ],
    );
    let demo_panels = [
        panel(
            "demo",
            "demo-map",
            options.initial_demographic == DemographicView::Map,
            &render_choropleth(&shapes),
        ),
        panel(
            "demo",
            "demo-bars",
            options.initial_demographic == DemographicView::StateBars,
            &render_state_bars(&leading, &trailing),
        ),
        panel(
            "demo",
            "demo-payments",
            options.initial_demographic == DemographicView::PaymentTypes,
            &render_payment_bars(&payments),
        ),
    ]
    .concat();

    let perf_buttons = button_row(
        "perf",
        &[
            ("perf-daily-revenue", "Daily Revenue"),
            ("perf-monthly-revenue", "Monthly Revenue"),
            ("perf-daily-deliveries", "Daily Deliveries"),
            ("perf-monthly-deliveries", "Monthly Deliveries"),
        ],
    );
    let perf = options.initial_performance;
    let perf_panels = [
        panel(
            "perf",
            "perf-hint",
            perf.is_none(),
            r#"<p class="odk-note">Select one of the views above to display a chart.</p>"#,
        ),
        panel(
            "perf",
            "perf-daily-revenue",
            perf == Some(PerformanceView::DailyRevenue),
            &with_note(
                "Best with a short date range.",
                &render_line_chart(&daily_revenue, "Revenue per day"),
            ),
        ),
        panel(
            "perf",
            "perf-monthly-revenue",
            perf == Some(PerformanceView::MonthlyRevenue),
            &with_note(
                "Best with a range spanning several months.",
                &render_line_chart(&monthly_revenue, "Revenue per month"),
            ),
        ),
        panel(
            "perf",
            "perf-daily-deliveries",
            perf == Some(PerformanceView::DailyDeliveries),
            &with_note(
                "Best with a short date range.",
                &render_line_chart(&daily_deliveries, "Successful deliveries per day"),
            ),
        ),
        panel(
            "perf",
            "perf-monthly-deliveries",
            perf == Some(PerformanceView::MonthlyDeliveries),
            &with_note(
                "Best with a range spanning several months.",
                &render_line_chart(&monthly_deliveries, "Successful deliveries per month"),
            ),
        ),
    ]
    .concat();

    let html = format!(
        r##"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>{css}</style>
</head>
<body>
<div class="odk-page">
<h1>{title}</h1>
<h2>Daily Report</h2>
<div class="odk-metrics">{metrics}</div>
<h2>Customer Demographics</h2>
{demo_buttons}
{demo_panels}
<h2>Revenue &amp; Delivery Performance</h2>
{perf_buttons}
{perf_panels}
</div>
<script>{js}</script>
</body>
</html>"##,
        title = escape_html(&options.title),
        css = PAGE_CSS,
        metrics = metrics,
        demo_buttons = demo_buttons,
        demo_panels = demo_panels,
        perf_buttons = perf_buttons,
        perf_panels = perf_panels,
        js = TOGGLE_JS,
    );

    Ok(html)
}

const PAGE_CSS: &str = "\
body { margin: 0; background: #f8f9fa; font-family: sans-serif; color: #343a40; }
.odk-page { max-width: 860px; margin: 0 auto; padding: 16px 24px 48px; }
h1 { font-size: 24px; margin-bottom: 4px; }
h2 { font-size: 16px; margin-top: 28px; color: #495057; }
.odk-metrics { display: flex; gap: 12px; }
.odk-card { flex: 1; background: #fff; border: 1px solid #dee2e6; border-radius: 4px; padding: 12px 16px; }
.odk-card .odk-card-label { font-size: 12px; color: #868e96; }
.odk-card .odk-card-value { font-size: 22px; font-weight: 600; }
.odk-btn { cursor: pointer; padding: 4px 12px; margin-right: 8px; border: 1px solid #ced4da; border-radius: 4px; background: #fff; font-size: 13px; }
.odk-btn:hover { background: #e9ecef; }
.odk-panel { background: #fff; border: 1px solid #dee2e6; border-radius: 4px; margin-top: 12px; padding: 12px; }
.odk-empty { color: #868e96; font-size: 14px; padding: 24px; text-align: center; }
.odk-note { color: #868e96; font-size: 12px; margin: 0 0 8px; }
";

const TOGGLE_JS: &str = "\
function odkShow(group, id) {
  var panels = document.querySelectorAll('[data-group=\"' + group + '\"]');
  for (var i = 0; i < panels.length; i++) { panels[i].style.display = 'none'; }
  var el = document.getElementById(id);
  if (el) { el.style.display = 'block'; }
}
";

// ── Page fragments ──────────────────────────────────────────────────────────

fn metric_cards(customers: usize, delivered: usize, revenue: &str) -> String {
    let card = |label: &str, value: &str| {
        format!(
            r#"<div class="odk-card"><div class="odk-card-label">{}</div><div class="odk-card-value">{}</div></div>"#,
            label, value,
        )
    };
    [
        card("Total customers", &format_count(customers)),
        card("Total delivered orders", &format_count(delivered)),
        card("Total revenue", &escape_html(revenue)),
    ]
    .concat()
}

fn button_row(group: &str, buttons: &[(&str, &str)]) -> String {
    let mut s = String::from("<div>");
    for (id, label) in buttons {
        write!(
            s,
            r#"<button class="odk-btn" onclick="odkShow('{group}','{id}')">{label}</button>"#,
        )
        .unwrap();
    }
    s.push_str("</div>");
    s
}

fn panel(group: &str, id: &str, visible: bool, body: &str) -> String {
    format!(
        r#"<div class="odk-panel" id="{id}" data-group="{group}" style="display:{display}">{body}</div>"#,
        display = if visible { "block" } else { "none" },
    )
}

fn with_note(note: &str, body: &str) -> String {
    format!(r#"<p class="odk-note">{}</p>{}"#, escape_html(note), body)
}

fn empty_panel() -> String {
    r#"<div class="odk-empty">No orders in the selected period.</div>"#.to_string()
}

// ── Data extraction ─────────────────────────────────────────────────────────

fn extract_state_shapes(state_totals: &DataFrame) -> Result<Vec<StateShape>, OdkError> {
    let n = state_totals.height();
    let siglas = state_totals.column(geo::SIGLA)?.str()?;
    let names = state_totals.column(geo::NAME)?.str()?;
    let counts = state_totals
        .column(aggregate::CUSTOMER_COUNT)?
        .as_materialized_series()
        .u32()?
        .clone();
    let revenues = state_totals
        .column(aggregate::REVENUE)?
        .as_materialized_series()
        .f64()?
        .clone();
    let geometries = state_totals.column(geo::GEOMETRY)?.str()?;

    let mut shapes = Vec::with_capacity(n);
    for i in 0..n {
        let geometry = geometries.get(i).ok_or_else(|| {
            OdkError::InvalidData(format!("state row {i} has no geometry"))
        })?;
        shapes.push(StateShape {
            sigla: siglas.get(i).unwrap_or("").to_string(),
            name: names.get(i).unwrap_or("").to_string(),
            customer_count: counts.get(i).unwrap_or(0),
            revenue: revenues.get(i).unwrap_or(0.0),
            rings: polygon_rings(geometry)?,
        });
    }
    Ok(shapes)
}

/// Outer rings of a GeoJSON Polygon or MultiPolygon geometry.
fn polygon_rings(geometry_json: &str) -> Result<Vec<Vec<(f64, f64)>>, OdkError> {
    let value: Value = serde_json::from_str(geometry_json)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| OdkError::InvalidData("geometry has no type".into()))?;
    let coordinates = value
        .get("coordinates")
        .and_then(Value::as_array)
        .ok_or_else(|| OdkError::InvalidData("geometry has no coordinates".into()))?;

    match kind {
        "Polygon" => match coordinates.first() {
            Some(outer) => Ok(vec![ring_points(outer)?]),
            None => Ok(Vec::new()),
        },
        "MultiPolygon" => {
            let mut rings = Vec::with_capacity(coordinates.len());
            for polygon in coordinates {
                let outer = polygon
                    .as_array()
                    .and_then(|rings| rings.first())
                    .ok_or_else(|| OdkError::InvalidData("empty polygon in MultiPolygon".into()))?;
                rings.push(ring_points(outer)?);
            }
            Ok(rings)
        }
        other => Err(OdkError::InvalidData(format!(
            "unsupported geometry type: {other}"
        ))),
    }
}

fn ring_points(ring: &Value) -> Result<Vec<(f64, f64)>, OdkError> {
    let points = ring
        .as_array()
        .ok_or_else(|| OdkError::InvalidData("ring is not an array".into()))?;
    points
        .iter()
        .map(|p| {
            let pair = p
                .as_array()
                .filter(|pair| pair.len() >= 2)
                .ok_or_else(|| OdkError::InvalidData("ring point is not [lon, lat]".into()))?;
            let lon = pair[0]
                .as_f64()
                .ok_or_else(|| OdkError::InvalidData("non-numeric longitude".into()))?;
            let lat = pair[1]
                .as_f64()
                .ok_or_else(|| OdkError::InvalidData("non-numeric latitude".into()))?;
            Ok((lon, lat))
        })
        .collect()
}

fn extract_series(
    df: &DataFrame,
    value_col: &str,
    granularity: Granularity,
) -> Result<Vec<SeriesPoint>, OdkError> {
    let n = df.height();
    let buckets = df
        .column(bucket::BUCKET)?
        .as_materialized_series()
        .datetime()?
        .clone();
    let values = df
        .column(value_col)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    let values = values.f64()?.clone();
    let months = if granularity == Granularity::Monthly {
        Some(df.column(bucket::MONTH)?.str()?.clone())
    } else {
        None
    };

    let mut points = Vec::with_capacity(n);
    for i in 0..n {
        let label = match &months {
            Some(months) => months.get(i).unwrap_or("").to_string(),
            None => {
                let us = buckets.phys.get(i).unwrap_or(0);
                DateTime::from_timestamp_micros(us)
                    .map(|dt| dt.naive_utc().format("%Y-%m-%d").to_string())
                    .unwrap_or_default()
            }
        };
        points.push(SeriesPoint {
            label,
            value: values.get(i).unwrap_or(0.0),
        });
    }
    Ok(points)
}

fn extract_bars(df: &DataFrame, label_col: &str, value_col: &str) -> Result<Vec<BarDatum>, OdkError> {
    let labels = df.column(label_col)?.str()?;
    let values = df
        .column(value_col)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    let values = values.f64()?.clone();

    let mut bars = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        bars.push(BarDatum {
            label: labels.get(i).unwrap_or("").to_string(),
            value: values.get(i).unwrap_or(0.0),
        });
    }
    Ok(bars)
}

// ── Choropleth ──────────────────────────────────────────────────────────────

fn render_choropleth(shapes: &[StateShape]) -> String {
    let all_points: Vec<(f64, f64)> = shapes
        .iter()
        .flat_map(|s| s.rings.iter().flatten().copied())
        .collect();
    if all_points.is_empty() {
        return empty_panel();
    }

    let min_x = all_points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let max_x = all_points.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    let min_y = all_points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let max_y = all_points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);

    let margin = 16.0;
    let span_x = (max_x - min_x).max(1e-9);
    let span_y = (max_y - min_y).max(1e-9);
    let scale = ((MAP_SIZE - 2.0 * margin) / span_x).min((MAP_SIZE - 2.0 * margin) / span_y);
    let project = |(lon, lat): (f64, f64)| {
        let x = (lon - min_x) * scale + margin;
        let y = (max_y - lat) * scale + margin;
        (x, y)
    };

    let min_count = shapes.iter().map(|s| s.customer_count).min().unwrap_or(0);
    let max_count = shapes.iter().map(|s| s.customer_count).max().unwrap_or(0);
    let count_span = (max_count.saturating_sub(min_count)).max(1) as f64;

    let height = ((max_y - min_y) * scale + 2.0 * margin).ceil();
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {w} {h}" width="100%">"#,
        w = MAP_SIZE,
        h = height.max(120.0),
    );

    for shape in shapes {
        let t = if max_count == min_count {
            0.5
        } else {
            (shape.customer_count - min_count) as f64 / count_span
        };
        let fill = ramp_color(t);
        for ring in &shape.rings {
            if ring.is_empty() {
                continue;
            }
            let mut points = String::new();
            for &p in ring {
                let (x, y) = project(p);
                write!(points, "{x:.2},{y:.2} ").unwrap();
            }
            write!(
                svg,
                r#"<polygon points="{points}" fill="{fill}" stroke="{MAP_EDGE}" stroke-width="0.8"><title>{title}</title></polygon>"#,
                points = points.trim_end(),
                title = escape_html(&format!(
                    "{} ({}): customers {}, revenue {}",
                    shape.name,
                    shape.sigla,
                    shape.customer_count,
                    format_money(shape.revenue)
                )),
            )
            .unwrap();
        }
    }

    // Centroid markers and labels on the extreme states
    for shape in shapes {
        if shape.rings.is_empty()
            || (shape.customer_count != min_count && shape.customer_count != max_count)
        {
            continue;
        }
        if let Some(centroid) = centroid(&shape.rings) {
            let (x, y) = project(centroid);
            write!(
                svg,
                r##"<circle cx="{x:.2}" cy="{y:.2}" r="3" fill="#000"/><text x="{x:.2}" y="{ty:.2}" font-size="11" text-anchor="middle" fill="#000">{label}</text>"##,
                ty = y + 14.0,
                label = escape_html(&shape.name),
            )
            .unwrap();
        }
    }

    // Color legend
    write!(
        svg,
        r##"<defs><linearGradient id="odk-ramp" x1="0" y1="1" x2="0" y2="0"><stop offset="0" stop-color="{low}"/><stop offset="1" stop-color="{high}"/></linearGradient></defs><rect x="{lx:.0}" y="{ly:.0}" width="12" height="120" fill="url(#odk-ramp)" stroke="{MAP_EDGE}" stroke-width="0.5"/><text x="{tx:.0}" y="{ly_top:.0}" font-size="10" fill="#495057">{max_count}</text><text x="{tx:.0}" y="{ly_bottom:.0}" font-size="10" fill="#495057">{min_count}</text>"##,
        low = ramp_color(0.0),
        high = ramp_color(1.0),
        lx = MAP_SIZE - 40.0,
        ly = 16.0,
        tx = MAP_SIZE - 24.0,
        ly_top = 24.0,
        ly_bottom = 136.0,
    )
    .unwrap();

    svg.push_str("</svg>");
    svg
}

fn centroid(rings: &[Vec<(f64, f64)>]) -> Option<(f64, f64)> {
    let mut sum = (0.0, 0.0);
    let mut n = 0usize;
    for ring in rings {
        for &(x, y) in ring {
            sum.0 += x;
            sum.1 += y;
            n += 1;
        }
    }
    if n == 0 {
        None
    } else {
        Some((sum.0 / n as f64, sum.1 / n as f64))
    }
}

/// Sequential light-to-dark ramp used for the choropleth fill.
fn ramp_color(t: f64) -> String {
    let t = t.clamp(0.0, 1.0);
    let lerp = |a: f64, b: f64| (a + (b - a) * t).round() as u8;
    format!(
        "#{:02X}{:02X}{:02X}",
        lerp(255.0, 127.0),
        lerp(247.0, 16.0),
        lerp(236.0, 8.0)
    )
}

// ── Bar charts ──────────────────────────────────────────────────────────────

/// Two horizontal bar panels: states with the most customers (descending)
/// and with the fewest (ascending, mirrored axis).
fn render_state_bars(leading: &[BarDatum], trailing: &[BarDatum]) -> String {
    if leading.is_empty() && trailing.is_empty() {
        return empty_panel();
    }
    let rows = leading.len().max(trailing.len());
    let half_w = CHART_W / 2.0 - 8.0;
    let height = rows as f64 * BAR_ROW_H + 40.0;

    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {CHART_W} {height}" width="100%">"#,
    );
    write!(
        svg,
        r##"<text x="{x:.0}" y="16" font-size="13" text-anchor="middle" fill="#343a40">Most customers</text>"##,
        x = half_w / 2.0,
    )
    .unwrap();
    write!(
        svg,
        r##"<text x="{x:.0}" y="16" font-size="13" text-anchor="middle" fill="#343a40">Fewest customers</text>"##,
        x = CHART_W - half_w / 2.0,
    )
    .unwrap();

    let max_value = leading
        .iter()
        .chain(trailing)
        .map(|b| b.value)
        .fold(0.0, f64::max)
        .max(1e-9);
    let bar_span = half_w - BAR_LABEL_W - 48.0;

    for (i, bar) in leading.iter().enumerate() {
        let y = 28.0 + i as f64 * BAR_ROW_H;
        let w = bar.value / max_value * bar_span;
        let fill = if i == 0 { HIGHLIGHT_BLUE } else { BAR_GRAY };
        write!(
            svg,
            r##"<text x="{lx:.0}" y="{ty:.1}" font-size="11" text-anchor="end" fill="#495057">{label}</text><rect x="{bx:.0}" y="{y:.1}" width="{w:.2}" height="{h:.0}" fill="{fill}"/><text x="{vx:.2}" y="{ty:.1}" font-size="11" fill="#495057">{value}</text>"##,
            lx = BAR_LABEL_W - 6.0,
            ty = y + BAR_ROW_H / 2.0 + 2.0,
            bx = BAR_LABEL_W,
            h = BAR_ROW_H - 10.0,
            vx = BAR_LABEL_W + w + 6.0,
            label = escape_html(&bar.label),
            value = format_count(bar.value.round() as usize),
        )
        .unwrap();
    }

    // Mirrored half: bars grow leftward, labels on the right edge
    for (i, bar) in trailing.iter().enumerate() {
        let y = 28.0 + i as f64 * BAR_ROW_H;
        let w = bar.value / max_value * bar_span;
        let fill = if i == 0 { HIGHLIGHT_BLUE } else { BAR_GRAY };
        let right = CHART_W - BAR_LABEL_W;
        write!(
            svg,
            r##"<text x="{lx:.0}" y="{ty:.1}" font-size="11" fill="#495057">{label}</text><rect x="{bx:.2}" y="{y:.1}" width="{w:.2}" height="{h:.0}" fill="{fill}"/><text x="{vx:.2}" y="{ty:.1}" font-size="11" text-anchor="end" fill="#495057">{value}</text>"##,
            lx = CHART_W - BAR_LABEL_W + 6.0,
            ty = y + BAR_ROW_H / 2.0 + 2.0,
            bx = right - w,
            h = BAR_ROW_H - 10.0,
            vx = right - w - 6.0,
            label = escape_html(&bar.label),
            value = format_count(bar.value.round() as usize),
        )
        .unwrap();
    }

    svg.push_str("</svg>");
    svg
}

/// Vertical bar chart of payment-type counts, leading bucket highlighted.
fn render_payment_bars(bars: &[BarDatum]) -> String {
    if bars.is_empty() {
        return empty_panel();
    }
    let max_value = bars.iter().map(|b| b.value).fold(0.0, f64::max).max(1e-9);
    let plot_w = CHART_W - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = CHART_H - MARGIN_TOP - MARGIN_BOTTOM;
    let slot = plot_w / bars.len() as f64;
    let bar_w = (slot * 0.6).min(96.0);

    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {CHART_W} {CHART_H}" width="100%">"#,
    );
    for (i, bar) in bars.iter().enumerate() {
        let h = bar.value / max_value * plot_h;
        let x = MARGIN_LEFT + i as f64 * slot + (slot - bar_w) / 2.0;
        let y = MARGIN_TOP + plot_h - h;
        let fill = if bar.value == max_value {
            HIGHLIGHT_GREEN
        } else {
            BAR_GRAY
        };
        write!(
            svg,
            r##"<rect x="{x:.2}" y="{y:.2}" width="{bar_w:.2}" height="{h:.2}" fill="{fill}"/><text x="{cx:.2}" y="{vy:.2}" font-size="11" text-anchor="middle" fill="#495057">{value}</text><text x="{cx:.2}" y="{ly:.2}" font-size="11" text-anchor="middle" fill="#495057">{label}</text>"##,
            cx = x + bar_w / 2.0,
            vy = y - 6.0,
            ly = MARGIN_TOP + plot_h + 18.0,
            value = format_count(bar.value.round() as usize),
            label = escape_html(&bar.label),
        )
        .unwrap();
    }
    write!(
        svg,
        r##"<line x1="{MARGIN_LEFT}" y1="{base:.1}" x2="{x2:.1}" y2="{base:.1}" stroke="#adb5bd" stroke-width="1"/>"##,
        base = MARGIN_TOP + plot_h,
        x2 = CHART_W - MARGIN_RIGHT,
    )
    .unwrap();
    svg.push_str("</svg>");
    svg
}

// ── Line charts ─────────────────────────────────────────────────────────────

/// Line chart with point markers, y axis anchored at zero.
fn render_line_chart(points: &[SeriesPoint], title: &str) -> String {
    if points.is_empty() {
        return empty_panel();
    }
    let max_value = points.iter().map(|p| p.value).fold(0.0, f64::max).max(1e-9);
    let y_top = max_value * 1.05;
    let plot_w = CHART_W - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = CHART_H - MARGIN_TOP - MARGIN_BOTTOM;
    let step = if points.len() > 1 {
        plot_w / (points.len() - 1) as f64
    } else {
        0.0
    };
    let x_at = |i: usize| {
        if points.len() > 1 {
            MARGIN_LEFT + i as f64 * step
        } else {
            MARGIN_LEFT + plot_w / 2.0
        }
    };
    let y_at = |v: f64| MARGIN_TOP + plot_h - (v / y_top) * plot_h;

    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {CHART_W} {CHART_H}" width="100%">"#,
    );
    write!(
        svg,
        r##"<text x="{cx:.0}" y="16" font-size="13" text-anchor="middle" fill="#343a40">{title}</text>"##,
        cx = CHART_W / 2.0,
        title = escape_html(title),
    )
    .unwrap();

    // Horizontal grid and y tick labels
    for i in 0..=4 {
        let v = max_value * i as f64 / 4.0;
        let y = y_at(v);
        write!(
            svg,
            r##"<line x1="{MARGIN_LEFT}" y1="{y:.2}" x2="{x2:.1}" y2="{y:.2}" stroke="#e9ecef" stroke-width="1"/><text x="{tx:.1}" y="{ty:.2}" font-size="10" text-anchor="end" fill="#868e96">{label}</text>"##,
            x2 = CHART_W - MARGIN_RIGHT,
            tx = MARGIN_LEFT - 6.0,
            ty = y + 3.0,
            label = format_axis_value(v, max_value),
        )
        .unwrap();
    }

    // Polyline and markers
    if points.len() > 1 {
        let mut path = String::new();
        for (i, p) in points.iter().enumerate() {
            write!(path, "{:.2},{:.2} ", x_at(i), y_at(p.value)).unwrap();
        }
        write!(
            svg,
            r##"<polyline points="{points}" fill="none" stroke="#339af0" stroke-width="1.5"/>"##,
            points = path.trim_end(),
        )
        .unwrap();
    }
    for (i, p) in points.iter().enumerate() {
        write!(
            svg,
            r##"<circle cx="{x:.2}" cy="{y:.2}" r="3" fill="#339af0"><title>{title}</title></circle>"##,
            x = x_at(i),
            y = y_at(p.value),
            title = escape_html(&format!("{}: {}", p.label, format_money(p.value))),
        )
        .unwrap();
    }

    // X labels, thinned to at most eight
    let stride = (points.len() + 7) / 8;
    for (i, p) in points.iter().enumerate() {
        if i % stride.max(1) != 0 && i != points.len() - 1 {
            continue;
        }
        write!(
            svg,
            r##"<text x="{x:.2}" y="{y:.1}" font-size="10" text-anchor="middle" fill="#868e96">{label}</text>"##,
            x = x_at(i),
            y = MARGIN_TOP + plot_h + 18.0,
            label = escape_html(&p.label),
        )
        .unwrap();
    }

    svg.push_str("</svg>");
    svg
}

// ── Formatting helpers ──────────────────────────────────────────────────────

/// Group an integer's digits with thousands separators.
fn group_thousands(digits: &str) -> String {
    let (sign, digits) = match digits.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", digits),
    };
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{sign}{grouped}")
}

/// Currency-style formatting: thousands separators, two decimals.
pub fn format_money(value: f64) -> String {
    let formatted = format!("{value:.2}");
    match formatted.split_once('.') {
        Some((int_part, dec_part)) => format!("{}.{}", group_thousands(int_part), dec_part),
        None => group_thousands(&formatted),
    }
}

/// Integer metric formatting with thousands separators.
pub fn format_count(value: usize) -> String {
    group_thousands(&value.to_string())
}

fn format_axis_value(value: f64, max_value: f64) -> String {
    if max_value < 10.0 {
        format!("{value:.1}")
    } else {
        group_thousands(&format!("{value:.0}"))
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StatusPolicy;
    use crate::model::TIMESTAMP_FORMAT;

    fn parse_approved(df: DataFrame) -> DataFrame {
        df.lazy()
            .with_columns([col(order::ORDER_APPROVED_AT).str().to_datetime(
                Some(TimeUnit::Microseconds),
                None,
                StrptimeOptions {
                    format: Some(TIMESTAMP_FORMAT.into()),
                    strict: true,
                    ..Default::default()
                },
                lit("raise"),
            )])
            .collect()
            .unwrap()
    }

    fn orders_fixture() -> DataFrame {
        let df = df!(
            order::ORDER_ID => ["o1", "o2", "o3"],
            order::CUSTOMER_ID => ["c1", "c2", "c3"],
            order::CUSTOMER_STATE => ["SP", "SP", "RJ"],
            order::ORDER_STATUS => ["delivered", "delivered", "delivered"],
            order::ORDER_APPROVED_AT => [
                "2018-01-05 10:00:00",
                "2018-01-20 12:30:00",
                "2018-02-01 08:15:00",
            ],
            order::PAYMENT_VALUE => [10.0, 20.0, 30.0],
            order::PAYMENT_TYPE => ["credit_card", "boleto", "credit_card"],
        )
        .unwrap();
        parse_approved(df)
    }

    fn states_fixture() -> DataFrame {
        df!(
            geo::SIGLA => ["RJ", "SP"],
            geo::NAME => ["Rio & Janeiro", "Sao Paulo"],
            geo::GEOMETRY => [
                r#"{"type":"Polygon","coordinates":[[[2.0,0.0],[3.0,0.0],[3.0,1.0],[2.0,0.0]]]}"#,
                r#"{"type":"MultiPolygon","coordinates":[[[[0.0,0.0],[1.0,0.0],[1.0,1.0],[0.0,0.0]]]]}"#,
            ],
        )
        .unwrap()
    }

    #[test]
    fn parses_polygon_and_multipolygon_outer_rings() {
        let polygon =
            polygon_rings(r#"{"type":"Polygon","coordinates":[[[0.0,0.0],[1.0,1.0]]]}"#).unwrap();
        assert_eq!(polygon, vec![vec![(0.0, 0.0), (1.0, 1.0)]]);

        let multi = polygon_rings(
            r#"{"type":"MultiPolygon","coordinates":[[[[0.0,0.0]]],[[[2.0,2.0]]]]}"#,
        )
        .unwrap();
        assert_eq!(multi.len(), 2);

        assert!(polygon_rings(r#"{"type":"Point","coordinates":[0.0,0.0]}"#).is_err());
    }

    #[test]
    fn money_and_count_formatting() {
        assert_eq!(format_money(1234.56), "1,234.56");
        assert_eq!(format_money(1234567.891), "1,234,567.89");
        assert_eq!(format_money(0.0), "0.00");
        assert_eq!(format_money(-1234.5), "-1,234.50");
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(1234567), "1,234,567");
    }

    #[test]
    fn dashboard_contains_metrics_and_all_panels() {
        let html = generate_dashboard_html(
            &orders_fixture(),
            &states_fixture(),
            &DashboardOptions::default(),
        )
        .unwrap();

        assert!(html.contains("$60.00"));
        assert!(html.contains("Total customers"));
        for id in [
            "demo-map",
            "demo-bars",
            "demo-payments",
            "perf-hint",
            "perf-daily-revenue",
            "perf-monthly-revenue",
            "perf-daily-deliveries",
            "perf-monthly-deliveries",
        ] {
            assert!(html.contains(&format!("id=\"{id}\"")), "missing panel {id}");
        }
        // default views: map visible, performance hint visible
        assert!(html.contains(r#"id="demo-map" data-group="demo" style="display:block""#));
        assert!(html.contains(r#"id="perf-hint" data-group="perf" style="display:block""#));
        // month label makes it onto the monthly chart
        assert!(html.contains("January"));
    }

    #[test]
    fn dashboard_escapes_data_derived_text() {
        let html = generate_dashboard_html(
            &orders_fixture(),
            &states_fixture(),
            &DashboardOptions::default(),
        )
        .unwrap();
        assert!(html.contains("Rio &amp; Janeiro"));
        assert!(!html.contains("Rio & Janeiro<"));
    }

    #[test]
    fn empty_window_renders_placeholders_not_errors() {
        let empty = orders_fixture().head(Some(0));
        let html = generate_dashboard_html(&empty, &states_fixture(), &DashboardOptions::default())
            .unwrap();
        assert!(html.contains("$0.00"));
        assert!(html.contains("No orders in the selected period."));
        // the map still draws every state, just without customers
        assert!(html.contains("<polygon"));
    }

    #[test]
    fn status_policy_feeds_the_metrics() {
        let df = df!(
            order::ORDER_ID => ["o1", "o2"],
            order::CUSTOMER_ID => ["c1", "c2"],
            order::CUSTOMER_STATE => ["SP", "SP"],
            order::ORDER_STATUS => ["delivered", "canceled"],
            order::ORDER_APPROVED_AT => ["2018-01-05 10:00:00", "2018-01-06 10:00:00"],
            order::PAYMENT_VALUE => [10.0, 99.0],
            order::PAYMENT_TYPE => ["credit_card", "voucher"],
        )
        .unwrap();
        let orders = parse_approved(df);

        let options = DashboardOptions {
            status_policy: StatusPolicy::FulfillmentOnly,
            ..Default::default()
        };
        let html = generate_dashboard_html(&orders, &states_fixture(), &options).unwrap();
        // canceled order's 99.0 is excluded from revenue
        assert!(html.contains("$10.00"));
    }
}
