// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

use crate::session::Session;

/// Login form body.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// `POST /login` response.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(deserialize_with = "de::string_or_number")]
    pub id: String,
    pub role: String,
}

impl LoginResponse {
    pub fn into_session(self) -> Session {
        Session {
            access_token: Some(self.access_token),
            refresh_token: Some(self.refresh_token),
            user_id: Some(self.id),
            user_role: Some(self.role),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyOtpResponse {
    pub reset_token: String,
}

/// A purchasable subscription plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(deserialize_with = "de::string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(deserialize_with = "de::string_or_number")]
    pub price: String,
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub discounted_price: Option<String>,
    #[serde(default)]
    pub discount_percent: f64,
    #[serde(default)]
    pub billing_interval: String,
    #[serde(default)]
    pub features: Vec<String>,
}

impl Plan {
    /// Price the customer actually pays.
    pub fn effective_price(&self) -> &str {
        match self.discounted_price {
            Some(ref discounted) if self.discount_percent > 0.0 => discounted,
            _ => &self.price,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlansResponse {
    pub plans: PlanPage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanPage {
    #[serde(default)]
    pub data: Vec<Plan>,
}

/// `POST /family-subscriptions` response.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeResponse {
    #[serde(default, deserialize_with = "de::opt_string_or_number")]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub checkout_url: Option<String>,
}

/// A created subscription awaiting payment at the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub subscription_id: Option<String>,
    pub status: String,
    pub checkout_url: String,
}

mod de {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Backend ids and prices arrive as either JSON strings or numbers.
    pub fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        match Value::deserialize(d)? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(D::Error::custom(format!("expected string or number, got {other}"))),
        }
    }

    pub fn opt_string_or_number<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<String>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            Value::Number(n) => Ok(Some(n.to_string())),
            other => Err(D::Error::custom(format!("expected string or number, got {other}"))),
        }
    }
}
