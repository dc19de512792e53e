/*
 *
 *    Copyright (c) 2020-2022 Project CHIP Authors
 *
 *    Licensed under the Apache License, Version 2.0 (the "License");
 *    you may not use this file except in compliance with the License.
 *    You may obtain a copy of the License at
 *
 *        http://www.apache.org/licenses/LICENSE-2.0
 *
 *    Unless required by applicable law or agreed to in writing, software
 *    distributed under the License is distributed on an "AS IS" BASIS,
 *    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *    See the License for the specific language governing permissions and
 *    limitations under the License.
 */

//! The collaborator seams consumed by the price contexts.
//!
//! The core never sleeps and never transmits by itself: all waiting goes
//! through [`TickTimer`] and all outgoing commands through [`CommandSink`].
//! The notification traits are fired exactly once per activation/expiration
//! transition and default to no-ops.

use core::time::Duration;

use crate::common::EventInfo;
use crate::client::PriceEntry;
use crate::proto::{CppAuth, PublishCppEvent, Response};
use crate::server::{
    BillingPeriod, BlockPeriod, BlockThresholds, CalorificValue, Co2Value, ConsolidatedBill,
    ConversionFactor, PriceMatrix, TariffInformation,
};
use crate::EndpointId;

/// The external one-shot timer facility.
///
/// `schedule` arms (or re-arms) the timer for the given endpoint; when it
/// fires, the owner must invoke the corresponding context's tick entry point.
/// `deactivate` is the only cancellation primitive: it stops future
/// rescheduling, never an in-flight action.
pub trait TickTimer {
    fn schedule(&self, endpoint: EndpointId, delay: Duration);
    fn deactivate(&self, endpoint: EndpointId);
}

/// Transmits a fully-populated outgoing command on behalf of the core.
pub trait CommandSink {
    fn send(&self, endpoint: EndpointId, response: &Response);
}

/// Client-side application notifications.
pub trait ClientHooks {
    /// The given price just became the active one.
    fn price_started(&self, endpoint: EndpointId, price: &PriceEntry) {
        let _ = (endpoint, price);
    }

    /// The given price just expired (or was superseded while active).
    fn price_expired(&self, endpoint: EndpointId, price: &PriceEntry) {
        let _ = (endpoint, price);
    }

    /// Asks the application whether to accept a Critical Peak Pricing event.
    fn cpp_event_authorization(&self, endpoint: EndpointId, event: &PublishCppEvent) -> CppAuth {
        let _ = (endpoint, event);

        CppAuth::Accepted
    }
}

/// Server-side application notifications, fired by the tick scheduler as
/// table entries become active.
pub trait ServerHooks {
    fn billing_period_started(&self, endpoint: EndpointId, info: &EventInfo, period: &BillingPeriod) {
        let _ = (endpoint, info, period);
    }

    fn block_period_started(&self, endpoint: EndpointId, info: &EventInfo, period: &BlockPeriod) {
        let _ = (endpoint, info, period);
    }

    fn calorific_value_changed(&self, endpoint: EndpointId, info: &EventInfo, value: &CalorificValue) {
        let _ = (endpoint, info, value);
    }

    fn co2_value_changed(&self, endpoint: EndpointId, info: &EventInfo, value: &Co2Value) {
        let _ = (endpoint, info, value);
    }

    fn conversion_factor_changed(
        &self,
        endpoint: EndpointId,
        info: &EventInfo,
        factor: &ConversionFactor,
    ) {
        let _ = (endpoint, info, factor);
    }

    fn tariff_activated(&self, endpoint: EndpointId, info: &EventInfo, tariff: &TariffInformation) {
        let _ = (endpoint, info, tariff);
    }

    fn price_matrix_activated(&self, endpoint: EndpointId, info: &EventInfo, matrix: &PriceMatrix) {
        let _ = (endpoint, info, matrix);
    }

    fn block_thresholds_activated(
        &self,
        endpoint: EndpointId,
        info: &EventInfo,
        thresholds: &BlockThresholds,
    ) {
        let _ = (endpoint, info, thresholds);
    }

    fn consolidated_bill_started(
        &self,
        endpoint: EndpointId,
        info: &EventInfo,
        bill: &ConsolidatedBill,
    ) {
        let _ = (endpoint, info, bill);
    }
}

/// A no-op implementation of every seam, convenient for contexts that only
/// need a subset of the notifications.
pub struct NoHooks;

impl ClientHooks for NoHooks {}
impl ServerHooks for NoHooks {}
