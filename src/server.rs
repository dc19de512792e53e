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

//! The server side of the Price cluster.
//!
//! [`PriceServer`] owns, per endpoint, the scheduled-price table plus one
//! [`EventTable`] for each of the other data kinds (billing periods, block
//! periods, calorific values, CO2 values, conversion factors, tariff
//! information, price matrices, block thresholds, consolidated bills, credit
//! payments, currency conversions, tier labels), a single CPP event slot, and
//! the pending-event mask driven by the tick scheduler in [`crate::tick`].

use crate::epoch::{zigbee_now, Epoch};
use crate::hooks::{CommandSink, ServerHooks, TickTimer};
use crate::proto::{CppAuth, PublishCppEvent, Response, Status};
use crate::table::EventTable;
use crate::tick::PendingEvents;
use crate::EndpointId;

pub use bills::*;
pub use price::*;
pub use tables::*;

mod bills;
mod price;
mod tables;

pub const BILLING_PERIOD_TABLE_SIZE: usize = 2;
pub const BLOCK_PERIOD_TABLE_SIZE: usize = 2;
pub const CALORIFIC_VALUE_TABLE_SIZE: usize = 2;
pub const CO2_VALUE_TABLE_SIZE: usize = 2;
pub const CONVERSION_FACTOR_TABLE_SIZE: usize = 2;
pub const TARIFF_TABLE_SIZE: usize = 2;
pub const PRICE_MATRIX_TABLE_SIZE: usize = 2;
pub const BLOCK_THRESHOLDS_TABLE_SIZE: usize = 2;
pub const CONSOLIDATED_BILL_TABLE_SIZE: usize = 5;
pub const CREDIT_PAYMENT_TABLE_SIZE: usize = 5;
pub const CURRENCY_CONVERSION_TABLE_SIZE: usize = 2;
pub const TIER_LABELS_TABLE_SIZE: usize = 2;

pub(crate) struct ServerEndpoint {
    pub(crate) id: EndpointId,
    pub(crate) pending: PendingEvents,
    pub(crate) prices: [ScheduledPrice; PRICE_SERVER_TABLE_SIZE],
    pub(crate) billing_periods: EventTable<BillingPeriod, BILLING_PERIOD_TABLE_SIZE>,
    pub(crate) block_periods: EventTable<BlockPeriod, BLOCK_PERIOD_TABLE_SIZE>,
    pub(crate) calorific_values: EventTable<CalorificValue, CALORIFIC_VALUE_TABLE_SIZE>,
    pub(crate) co2_values: EventTable<Co2Value, CO2_VALUE_TABLE_SIZE>,
    pub(crate) conversion_factors: EventTable<ConversionFactor, CONVERSION_FACTOR_TABLE_SIZE>,
    pub(crate) tariffs: EventTable<TariffInformation, TARIFF_TABLE_SIZE>,
    pub(crate) price_matrices: EventTable<PriceMatrix, PRICE_MATRIX_TABLE_SIZE>,
    pub(crate) block_thresholds: EventTable<BlockThresholds, BLOCK_THRESHOLDS_TABLE_SIZE>,
    pub(crate) consolidated_bills: EventTable<ConsolidatedBill, CONSOLIDATED_BILL_TABLE_SIZE>,
    pub(crate) credit_payments: EventTable<CreditPayment, CREDIT_PAYMENT_TABLE_SIZE>,
    pub(crate) currency_conversions: EventTable<CurrencyConversion, CURRENCY_CONVERSION_TABLE_SIZE>,
    pub(crate) tier_labels: EventTable<TierLabels, TIER_LABELS_TABLE_SIZE>,
    pub(crate) cpp_event: Option<(PublishCppEvent, CppAuth)>,
}

impl ServerEndpoint {
    fn new(id: EndpointId) -> Self {
        Self {
            id,
            pending: PendingEvents::empty(),
            prices: core::array::from_fn(|_| ScheduledPrice::default()),
            billing_periods: EventTable::new(),
            block_periods: EventTable::new(),
            calorific_values: EventTable::new(),
            co2_values: EventTable::new(),
            conversion_factors: EventTable::new(),
            tariffs: EventTable::new(),
            price_matrices: EventTable::new(),
            block_thresholds: EventTable::new(),
            consolidated_bills: EventTable::new(),
            credit_payments: EventTable::new(),
            currency_conversions: EventTable::new(),
            tier_labels: EventTable::new(),
            cpp_event: None,
        }
    }

    fn clear(&mut self) {
        self.pending = PendingEvents::empty();
        self.prices = core::array::from_fn(|_| ScheduledPrice::default());
        self.billing_periods.clear();
        self.block_periods.clear();
        self.calorific_values.clear();
        self.co2_values.clear();
        self.conversion_factors.clear();
        self.tariffs.clear();
        self.price_matrices.clear();
        self.block_thresholds.clear();
        self.consolidated_bills.clear();
        self.credit_payments.clear();
        self.currency_conversions.clear();
        self.tier_labels.clear();
        self.cpp_event = None;
    }
}

/// The price-cluster server context.
pub struct PriceServer<'a, const EPS: usize = 1> {
    pub(crate) epoch: Epoch,
    pub(crate) timer: &'a dyn TickTimer,
    pub(crate) sink: &'a dyn CommandSink,
    pub(crate) hooks: &'a dyn ServerHooks,
    pub(crate) endpoints: [ServerEndpoint; EPS],
    /// At most one GetScheduledPrices transaction may be in flight per device
    /// (not per endpoint), hence a single cursor on the context.
    pub(crate) partner: ScheduledPricesPartner,
}

impl<'a, const EPS: usize> PriceServer<'a, EPS> {
    pub fn new(
        endpoints: [EndpointId; EPS],
        epoch: Epoch,
        timer: &'a dyn TickTimer,
        sink: &'a dyn CommandSink,
        hooks: &'a dyn ServerHooks,
    ) -> Self {
        Self {
            epoch,
            timer,
            sink,
            hooks,
            endpoints: endpoints.map(ServerEndpoint::new),
            partner: ScheduledPricesPartner::default(),
        }
    }

    pub(crate) fn now(&self) -> u32 {
        zigbee_now(self.epoch)
    }

    pub(crate) fn endpoint_index(&self, endpoint: EndpointId) -> Option<usize> {
        self.endpoints.iter().position(|ep| ep.id == endpoint)
    }

    pub(crate) fn reject(&self, endpoint: EndpointId, status: Status) -> Status {
        self.sink.send(endpoint, &Response::Default(status));
        status
    }

    /// Marks every table of the endpoint empty. Idempotent; an unknown
    /// endpoint is silently ignored.
    pub fn init(&mut self, endpoint: EndpointId) {
        if let Some(ep) = self.endpoint_index(endpoint) {
            self.endpoints[ep].clear();
            if self.partner.endpoint == endpoint {
                self.partner = ScheduledPricesPartner::default();
            }
        }
    }

    /// Handles a received CppEventResponse from a client, recording the
    /// client's authorization for the outstanding CPP event.
    pub fn cpp_event_response(&mut self, endpoint: EndpointId, resp: &crate::proto::CppEventResponse) -> Status {
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        match &mut self.endpoints[ep].cpp_event {
            Some((event, auth)) if event.issuer_event_id == resp.issuer_event_id => {
                *auth = resp.cpp_auth;
                Status::Success
            }
            _ => self.reject(endpoint, Status::NotFound),
        }
    }

    /// Issues a CPP event to clients. The authorization field must be
    /// `Pending` or `Forced`; the client's answer arrives via
    /// [`Self::cpp_event_response`].
    pub fn publish_cpp_event(&mut self, endpoint: EndpointId, cmd: &PublishCppEvent) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        if !matches!(cmd.cpp_auth, CppAuth::Pending | CppAuth::Forced) {
            return self.reject(endpoint, Status::InvalidField);
        }

        let mut event = *cmd;
        if event.start_time == 0 {
            event.start_time = now;
        }

        self.endpoints[ep].cpp_event = Some((event, event.cpp_auth));
        self.sink.send(endpoint, &Response::PublishCppEvent(event));

        Status::Success
    }

    pub fn cpp_event(&self, endpoint: EndpointId) -> Option<&(PublishCppEvent, CppAuth)> {
        let ep = self.endpoint_index(endpoint)?;

        self.endpoints[ep].cpp_event.as_ref()
    }

    /// Diagnostic dump of every table of the endpoint.
    pub fn log_tables(&self, endpoint: EndpointId) {
        let Some(ep) = self.endpoint_index(endpoint) else {
            return;
        };

        self.log_price_table(endpoint);

        let endpoint = &self.endpoints[ep];
        endpoint.billing_periods.log("billing period");
        endpoint.block_periods.log("block period");
        endpoint.calorific_values.log("calorific value");
        endpoint.co2_values.log("co2 value");
        endpoint.conversion_factors.log("conversion factor");
        endpoint.tariffs.log("tariff");
        endpoint.price_matrices.log("price matrix");
        endpoint.block_thresholds.log("block thresholds");
        endpoint.consolidated_bills.log("consolidated bill");
        endpoint.credit_payments.log("credit payment");
        endpoint.currency_conversions.log("currency conversion");
        endpoint.tier_labels.log("tier labels");
    }
}
