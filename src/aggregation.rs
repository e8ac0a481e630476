use polars::prelude::*;
use tracing::debug;

use crate::error::OdkError;
use crate::schema::*;

/// Width of a time bucket for the resampled views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Daily,
    Monthly,
}

impl Granularity {
    fn every(&self) -> &'static str {
        match self {
            Granularity::Daily => "1d",
            Granularity::Monthly => "1mo",
        }
    }
}

// ── Headline metrics ────────────────────────────────────────────────────────

/// Distinct customers in the given order frame.
pub fn customer_count(orders: &DataFrame) -> Result<usize, OdkError> {
    let n = orders
        .column(order::CUSTOMER_ID)?
        .as_materialized_series()
        .drop_nulls()
        .n_unique()?;
    Ok(n)
}

/// Distinct delivered orders in the given order frame.
pub fn delivered_order_count(orders: &DataFrame) -> Result<usize, OdkError> {
    let delivered = orders
        .clone()
        .lazy()
        .filter(col(order::ORDER_STATUS).eq(lit(status::DELIVERED)))
        .select([col(order::ORDER_ID)])
        .collect()?;
    let n = delivered
        .column(order::ORDER_ID)?
        .as_materialized_series()
        .drop_nulls()
        .n_unique()?;
    Ok(n)
}

/// Total payment value, rounded to cents.
pub fn revenue_total(orders: &DataFrame) -> Result<f64, OdkError> {
    let sum = orders
        .column(order::PAYMENT_VALUE)?
        .as_materialized_series()
        .f64()?
        .sum()
        .unwrap_or(0.0);
    Ok((sum * 100.0).round() / 100.0)
}

// ── Geographic aggregate ────────────────────────────────────────────────────

/// Per-state customer and revenue totals.
///
/// Left-joins the state shapes to the filtered orders so that states with
/// no matching orders still appear with a zero customer count and zero
/// revenue. One row per `sigla`, sorted by `sigla`.
pub fn aggregate_by_state(
    orders: &DataFrame,
    states: &DataFrame,
) -> Result<DataFrame, OdkError> {
    let df = states
        .clone()
        .lazy()
        .select([col(geo::SIGLA), col(geo::NAME), col(geo::GEOMETRY)])
        .join(
            orders.clone().lazy(),
            [col(geo::SIGLA)],
            [col(order::CUSTOMER_STATE)],
            JoinArgs::new(JoinType::Left),
        )
        .group_by([col(geo::SIGLA)])
        .agg([
            col(geo::NAME).first(),
            col(order::CUSTOMER_ID)
                .drop_nulls()
                .n_unique()
                .alias(aggregate::CUSTOMER_COUNT),
            col(order::PAYMENT_VALUE).sum().alias(aggregate::REVENUE),
            col(geo::GEOMETRY).first(),
        ])
        .with_columns([col(aggregate::REVENUE).fill_null(lit(0.0))])
        .sort([geo::SIGLA], SortMultipleOptions::default())
        .collect()?;

    debug!(states = df.height(), "aggregated orders by state");
    Ok(df)
}

/// The `n` states with the most customers, descending.
pub fn leading_states(state_totals: &DataFrame, n: usize) -> Result<DataFrame, OdkError> {
    let sorted = state_totals.sort(
        [aggregate::CUSTOMER_COUNT],
        SortMultipleOptions::default().with_order_descending(true),
    )?;
    Ok(sorted.head(Some(n)))
}

/// The `n` states with the fewest customers, ascending.
pub fn trailing_states(state_totals: &DataFrame, n: usize) -> Result<DataFrame, OdkError> {
    let sorted = state_totals.sort(
        [aggregate::CUSTOMER_COUNT],
        SortMultipleOptions::default(),
    )?;
    Ok(sorted.head(Some(n)))
}

/// States holding the maximum or minimum customer count, used for the
/// map's centroid labels. May return more than two rows on ties.
pub fn extreme_states(state_totals: &DataFrame) -> Result<DataFrame, OdkError> {
    let df = state_totals
        .clone()
        .lazy()
        .filter(
            col(aggregate::CUSTOMER_COUNT)
                .eq(col(aggregate::CUSTOMER_COUNT).max())
                .or(col(aggregate::CUSTOMER_COUNT).eq(col(aggregate::CUSTOMER_COUNT).min())),
        )
        .collect()?;
    Ok(df)
}

// ── Time-bucketed aggregates ────────────────────────────────────────────────

/// Summed payment value per calendar bucket of `order_approved_at`.
pub fn revenue_by_bucket(
    orders: &DataFrame,
    granularity: Granularity,
) -> Result<DataFrame, OdkError> {
    bucketed(
        orders,
        granularity,
        col(order::PAYMENT_VALUE).sum().alias(aggregate::REVENUE),
    )
}

/// Distinct delivered-order count per calendar bucket of `order_approved_at`.
pub fn delivered_by_bucket(
    orders: &DataFrame,
    granularity: Granularity,
) -> Result<DataFrame, OdkError> {
    let delivered = orders
        .clone()
        .lazy()
        .filter(col(order::ORDER_STATUS).eq(lit(status::DELIVERED)))
        .collect()?;
    bucketed(
        &delivered,
        granularity,
        col(order::ORDER_ID)
            .drop_nulls()
            .n_unique()
            .alias(aggregate::ORDER_COUNT),
    )
}

/// Shared bucketing machinery: truncate `order_approved_at` to the bucket
/// width, group, aggregate, sort. Rows without an approved timestamp are
/// excluded. Monthly frames carry a `%B` month label.
fn bucketed(
    orders: &DataFrame,
    granularity: Granularity,
    value: Expr,
) -> Result<DataFrame, OdkError> {
    let mut lazy = orders
        .clone()
        .lazy()
        .filter(col(order::ORDER_APPROVED_AT).is_not_null())
        .with_columns([col(order::ORDER_APPROVED_AT)
            .dt()
            .truncate(lit(granularity.every()))
            .alias(bucket::BUCKET)])
        .group_by([col(bucket::BUCKET)])
        .agg([value])
        .sort([bucket::BUCKET], SortMultipleOptions::default());

    if granularity == Granularity::Monthly {
        lazy = lazy.with_columns([col(bucket::BUCKET)
            .dt()
            .to_string("%B")
            .alias(bucket::MONTH)]);
    }

    Ok(lazy.collect()?)
}

// ── Payment-type aggregate ──────────────────────────────────────────────────

/// Order count per payment type over the date-filtered (but not
/// status-filtered) order frame, most frequent first.
pub fn payment_type_counts(orders: &DataFrame) -> Result<DataFrame, OdkError> {
    let df = orders
        .clone()
        .lazy()
        .group_by([col(order::PAYMENT_TYPE)])
        .agg([len().alias(aggregate::PAYMENT_COUNT)])
        .sort(
            [aggregate::PAYMENT_COUNT, order::PAYMENT_TYPE],
            SortMultipleOptions::default().with_order_descending_multi([true, false]),
        )
        .collect()?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
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
            geo::SIGLA => ["MG", "RJ", "SP"],
            geo::NAME => ["Minas Gerais", "Rio de Janeiro", "Sao Paulo"],
            geo::GEOMETRY => ["{}", "{}", "{}"],
        )
        .unwrap()
    }

    fn empty_orders() -> DataFrame {
        orders_fixture().head(Some(0))
    }

    fn f64_col(df: &DataFrame, name: &str) -> Vec<f64> {
        df.column(name)
            .unwrap()
            .as_materialized_series()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect()
    }

    fn str_col(df: &DataFrame, name: &str) -> Vec<String> {
        df.column(name)
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn count_col(df: &DataFrame, name: &str) -> Vec<u32> {
        df.column(name)
            .unwrap()
            .as_materialized_series()
            .u32()
            .unwrap()
            .into_no_null_iter()
            .collect()
    }

    #[test]
    fn headline_metrics() {
        let orders = orders_fixture();
        assert_eq!(customer_count(&orders).unwrap(), 3);
        assert_eq!(delivered_order_count(&orders).unwrap(), 3);
        assert_eq!(revenue_total(&orders).unwrap(), 60.0);
    }

    #[test]
    fn headline_metrics_on_empty_input_are_zero() {
        let orders = empty_orders();
        assert_eq!(customer_count(&orders).unwrap(), 0);
        assert_eq!(delivered_order_count(&orders).unwrap(), 0);
        assert_eq!(revenue_total(&orders).unwrap(), 0.0);
    }

    #[test]
    fn state_aggregate_keeps_states_without_orders() {
        let totals = aggregate_by_state(&orders_fixture(), &states_fixture()).unwrap();
        assert_eq!(totals.height(), 3);
        assert_eq!(str_col(&totals, geo::SIGLA), ["MG", "RJ", "SP"]);
        assert_eq!(count_col(&totals, aggregate::CUSTOMER_COUNT), [0, 1, 2]);
        assert_eq!(f64_col(&totals, aggregate::REVENUE), [0.0, 30.0, 30.0]);
    }

    #[test]
    fn state_revenue_sums_to_input_revenue() {
        let orders = orders_fixture();
        let totals = aggregate_by_state(&orders, &states_fixture()).unwrap();
        let by_state: f64 = f64_col(&totals, aggregate::REVENUE).iter().sum();
        assert_eq!(by_state, revenue_total(&orders).unwrap());
    }

    #[test]
    fn distinct_customers_bounded_by_rows_per_state() {
        let orders = orders_fixture();
        let totals = aggregate_by_state(&orders, &states_fixture()).unwrap();
        for (sigla, count) in str_col(&totals, geo::SIGLA)
            .into_iter()
            .zip(count_col(&totals, aggregate::CUSTOMER_COUNT))
        {
            let rows = str_col(&orders, order::CUSTOMER_STATE)
                .into_iter()
                .filter(|s| *s == sigla)
                .count();
            assert!(count as usize <= rows);
        }
    }

    #[test]
    fn leading_and_trailing_state_slices() {
        let totals = aggregate_by_state(&orders_fixture(), &states_fixture()).unwrap();
        let top = leading_states(&totals, 2).unwrap();
        assert_eq!(str_col(&top, geo::SIGLA), ["SP", "RJ"]);
        let bottom = trailing_states(&totals, 2).unwrap();
        assert_eq!(str_col(&bottom, geo::SIGLA), ["MG", "RJ"]);

        let extremes = extreme_states(&totals).unwrap();
        let extreme_siglas = str_col(&extremes, geo::SIGLA);
        assert!(extreme_siglas.contains(&"SP".to_string()));
        assert!(extreme_siglas.contains(&"MG".to_string()));
    }

    #[test]
    fn daily_and_monthly_revenue_buckets() {
        let orders = orders_fixture();

        let daily = revenue_by_bucket(&orders, Granularity::Daily).unwrap();
        assert_eq!(daily.height(), 3);
        assert_eq!(f64_col(&daily, aggregate::REVENUE), [10.0, 20.0, 30.0]);

        let monthly = revenue_by_bucket(&orders, Granularity::Monthly).unwrap();
        assert_eq!(monthly.height(), 2);
        assert_eq!(f64_col(&monthly, aggregate::REVENUE), [30.0, 30.0]);
        assert_eq!(str_col(&monthly, bucket::MONTH), ["January", "February"]);
    }

    #[test]
    fn daily_buckets_sum_to_the_monthly_bucket() {
        let orders = orders_fixture();
        let daily = revenue_by_bucket(&orders, Granularity::Daily).unwrap();
        let monthly = revenue_by_bucket(&orders, Granularity::Monthly).unwrap();

        let daily_buckets: Vec<i64> = daily
            .column(bucket::BUCKET)
            .unwrap()
            .as_materialized_series()
            .datetime()
            .unwrap()
            .phys
            .into_no_null_iter()
            .collect();
        let daily_values = f64_col(&daily, aggregate::REVENUE);

        let monthly_buckets: Vec<i64> = monthly
            .column(bucket::BUCKET)
            .unwrap()
            .as_materialized_series()
            .datetime()
            .unwrap()
            .phys
            .into_no_null_iter()
            .collect();
        let monthly_values = f64_col(&monthly, aggregate::REVENUE);

        for (month_start, month_total) in monthly_buckets.iter().zip(monthly_values) {
            let next_month: i64 = monthly_buckets
                .iter()
                .copied()
                .filter(|b| b > month_start)
                .min()
                .unwrap_or(i64::MAX);
            let summed: f64 = daily_buckets
                .iter()
                .zip(&daily_values)
                .filter(|(b, _)| **b >= *month_start && **b < next_month)
                .map(|(_, v)| v)
                .sum();
            assert_eq!(summed, month_total);
        }
    }

    #[test]
    fn delivered_buckets_count_distinct_orders() {
        let orders = orders_fixture();
        let daily = delivered_by_bucket(&orders, Granularity::Daily).unwrap();
        assert_eq!(count_col(&daily, aggregate::ORDER_COUNT), [1, 1, 1]);

        let monthly = delivered_by_bucket(&orders, Granularity::Monthly).unwrap();
        assert_eq!(count_col(&monthly, aggregate::ORDER_COUNT), [2, 1]);
        assert_eq!(str_col(&monthly, bucket::MONTH), ["January", "February"]);
    }

    #[test]
    fn bucketing_empty_input_yields_empty_frames() {
        let orders = empty_orders();
        assert_eq!(
            revenue_by_bucket(&orders, Granularity::Daily).unwrap().height(),
            0
        );
        assert_eq!(
            delivered_by_bucket(&orders, Granularity::Monthly)
                .unwrap()
                .height(),
            0
        );
        assert_eq!(payment_type_counts(&orders).unwrap().height(), 0);
    }

    #[test]
    fn payment_types_count_rows_most_frequent_first() {
        let counts = payment_type_counts(&orders_fixture()).unwrap();
        assert_eq!(str_col(&counts, order::PAYMENT_TYPE), ["credit_card", "boleto"]);
        assert_eq!(count_col(&counts, aggregate::PAYMENT_COUNT), [2, 1]);
    }
}
