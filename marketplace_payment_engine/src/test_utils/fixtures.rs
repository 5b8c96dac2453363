use chrono::Utc;
use mpe_common::Money;

use crate::db_types::{LineItem, Order, OrderStatus, PaymentMethod};

/// A one-item card order for `cust-1` at `market-a`: 3 × 30.00 of one product plus a 10.00 delivery fee.
pub fn order(id: &str, status: OrderStatus) -> Order {
    let now = Utc::now();
    Order {
        id: 0,
        order_id: id.into(),
        market_id: "market-a".into(),
        customer_id: "cust-1".to_string(),
        status,
        payment_method: PaymentMethod::Card,
        paid_in_app: true,
        payment_id: None,
        payment_description: None,
        card_token: Some("tok-1".to_string()),
        pix_code: None,
        pix_expires_at: None,
        total: Money::from_major(100),
        market_amount: Money::from_major(90),
        delivery_fee: Money::from_major(10),
        customer_debit: None,
        credit_used: None,
        debit_market_id: None,
        debit_amount: None,
        items: vec![LineItem {
            product_id: "prod-1".to_string(),
            unit_price: Money::from_major(30),
            quantity: 3,
            discount: None,
            kit_items: None,
            total: Money::from_major(90),
        }],
        missing_items: None,
        finished_at: None,
        created_at: now,
        updated_at: now,
    }
}
