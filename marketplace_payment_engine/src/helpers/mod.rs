mod confirmation_token;

pub use confirmation_token::{CompletionClaims, CompletionTokenIssuer, TokenError};

use chrono::{DateTime, Utc};

/// The `YYYY-MM` key the monthly earnings aggregate is bucketed by.
pub fn month_key(when: DateTime<Utc>) -> String {
    when.format("%Y-%m").to_string()
}
