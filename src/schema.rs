/// Column-name and status-value constants for order-dashkit.
/// Single source of truth for every frame the pipeline produces.

// ── Order columns ───────────────────────────────────────────────────────────
pub mod order {
    pub const ORDER_ID: &str = "order_id";
    pub const CUSTOMER_ID: &str = "customer_id";
    pub const CUSTOMER_STATE: &str = "customer_state";
    pub const ORDER_STATUS: &str = "order_status";
    pub const ORDER_APPROVED_AT: &str = "order_approved_at";
    pub const PAYMENT_VALUE: &str = "payment_value";
    pub const PAYMENT_TYPE: &str = "payment_type";

    pub const ORDER_PURCHASE_TIMESTAMP: &str = "order_purchase_timestamp";
    pub const ORDER_DELIVERED_CARRIER_DATE: &str = "order_delivered_carrier_date";
    pub const ORDER_DELIVERED_CUSTOMER_DATE: &str = "order_delivered_customer_date";
    pub const ORDER_ESTIMATED_DELIVERY_DATE: &str = "order_estimated_delivery_date";

    pub const REQUIRED: [&str; 7] = [
        ORDER_ID,
        CUSTOMER_ID,
        CUSTOMER_STATE,
        ORDER_STATUS,
        ORDER_APPROVED_AT,
        PAYMENT_VALUE,
        PAYMENT_TYPE,
    ];

    /// Timestamp columns parsed at load time when present.
    pub const TIMESTAMPS: [&str; 5] = [
        ORDER_PURCHASE_TIMESTAMP,
        ORDER_APPROVED_AT,
        ORDER_DELIVERED_CARRIER_DATE,
        ORDER_DELIVERED_CUSTOMER_DATE,
        ORDER_ESTIMATED_DELIVERY_DATE,
    ];
}

// ── Order status values ─────────────────────────────────────────────────────
pub mod status {
    pub const CREATED: &str = "created";
    pub const PROCESSING: &str = "processing";
    pub const INVOICED: &str = "invoiced";
    pub const SHIPPED: &str = "shipped";
    pub const DELIVERED: &str = "delivered";
    pub const CANCELED: &str = "canceled";
    pub const UNAVAILABLE: &str = "unavailable";

    /// Statuses on the fulfillment path (the allow-list policy).
    pub const FULFILLMENT: [&str; 5] = [CREATED, PROCESSING, INVOICED, SHIPPED, DELIVERED];

    /// Statuses dropped by the deny-list policy.
    pub const CANCELLATION: [&str; 2] = [CANCELED, UNAVAILABLE];
}

// ── State-shape columns ─────────────────────────────────────────────────────
pub mod geo {
    pub const SIGLA: &str = "sigla";
    pub const NAME: &str = "name";
    pub const GEOMETRY: &str = "geometry";
}

// ── Derived aggregate columns ───────────────────────────────────────────────
pub mod aggregate {
    pub const CUSTOMER_COUNT: &str = "customer_count";
    pub const ORDER_COUNT: &str = "order_count";
    pub const REVENUE: &str = "revenue";
    pub const PAYMENT_COUNT: &str = "payment_count";
}

// ── Time-bucket columns ─────────────────────────────────────────────────────
pub mod bucket {
    pub const BUCKET: &str = "bucket";
    pub const MONTH: &str = "month";
}
