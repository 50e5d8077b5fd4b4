// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription plans, checkout and cancellation.

use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::info;

use crate::api::client::check_status;
use crate::api::models::{Checkout, Plan, PlansResponse, SubscribeResponse};
use crate::api::{ApiClient, ApiRequest};
use crate::error::ApiError;
use crate::session::keys;

pub const PLANS_PATH: &str = "/api/v1/subscription-plans";
pub const SUBSCRIPTIONS_PATH: &str = "/api/v1/family-subscriptions";
pub const CANCEL_PATH: &str = "/api/v1/family-subscriptions/cancel";

impl ApiClient {
    pub async fn plans(&self) -> Result<Vec<Plan>, ApiError> {
        let resp: PlansResponse = self.call(&ApiRequest::get(PLANS_PATH)).await?;
        Ok(resp.plans.data)
    }

    /// Create a subscription for `plan` and return the checkout to redirect to.
    ///
    /// The chosen plan, subscription id and checkout status are cached in
    /// the token store until the session is cleared.
    pub async fn subscribe(&self, plan: &Plan) -> Result<Checkout, ApiError> {
        let req =
            ApiRequest::post(SUBSCRIPTIONS_PATH).json(json!({ "subscription_plan_id": plan.id }));
        let resp: SubscribeResponse = self.call(&req).await?;

        let selected = serde_json::to_string(plan).map_err(|e| ApiError::Decode(e.to_string()))?;
        self.session().store().set_many(&[
            (keys::SELECTED_PLAN, Some(selected)),
            (keys::SUBSCRIPTION_ID, resp.subscription_id.clone()),
            (keys::CHECKOUT_STATUS, Some(resp.status.clone())),
        ]);

        let checkout_url = resp.checkout_url.ok_or(ApiError::MissingCheckoutUrl)?;
        info!(plan = %plan.id, status = %resp.status, "subscription created");
        Ok(Checkout { subscription_id: resp.subscription_id, status: resp.status, checkout_url })
    }

    /// The family's current subscription, or `None` if there is none.
    pub async fn current_subscription(&self) -> Result<Option<Value>, ApiError> {
        let resp = self.execute(&ApiRequest::get(SUBSCRIPTIONS_PATH)).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check_status(resp).await?;
        Ok(Some(resp.json().await?))
    }

    pub async fn cancel_subscription(&self) -> Result<(), ApiError> {
        self.call_unit(&ApiRequest::post(CANCEL_PATH)).await?;
        info!("subscription cancelled");
        Ok(())
    }
}
