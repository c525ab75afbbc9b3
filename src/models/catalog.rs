use serde::{Deserialize, Serialize};

/// How a content product is sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    OneTime,
    Subscription,
}

impl ProductKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneTime => "one_time",
            Self::Subscription => "subscription",
        }
    }
}

impl std::str::FromStr for ProductKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one_time" => Ok(Self::OneTime),
            "subscription" => Ok(Self::Subscription),
            _ => Err(()),
        }
    }
}

/// A sellable content product (collection, practice-area bundle, plan).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentProduct {
    pub id: String,
    pub name: String,
    pub kind: ProductKind,
    pub price_cents: i64,
    pub currency: String,
    pub created_at: i64,
}

/// A single legal document sellable on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalDocument {
    pub id: String,
    pub title: String,
    pub price_cents: i64,
    pub currency: String,
    pub created_at: i64,
}

/// An institutional subscriber. Seat capacity is consumed through the
/// opaque reserve-seat operation; `seat_limit` 0 means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Institution {
    pub id: String,
    pub name: String,
    pub seat_limit: i64,
    pub seats_reserved: i64,
    pub created_at: i64,
}
