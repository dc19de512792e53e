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

//! Shared fixtures: a controllable clock, recording implementations of the
//! timer/sink/notification seams, and command builders.

// Not every test binary exercises every fixture.
#![allow(dead_code)]
#![allow(unused_macros)]

use core::time::Duration;
use std::cell::RefCell;

use rs_price::client::PriceEntry;
use rs_price::common::EventInfo;
use rs_price::hooks::{ClientHooks, CommandSink, ServerHooks, TickTimer};
use rs_price::proto::{PublishPrice, Response};
use rs_price::server::{BillingPeriod, ConsolidatedBill, ConversionFactor, TariffInformation};
use rs_price::EndpointId;

pub fn init_env_logger() {
    let _ = env_logger::try_init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
}

/// Expands to a `(epoch, set)` pair backed by a static private to the call
/// site, so every test controls its own clock. `set` takes seconds since the
/// Zigbee epoch.
macro_rules! test_clock {
    () => {{
        use core::sync::atomic::{AtomicU64, Ordering};

        static NOW: AtomicU64 = AtomicU64::new(rs_price::epoch::ZIGBEE_EPOCH_SECS);

        fn epoch() -> core::time::Duration {
            core::time::Duration::from_secs(NOW.load(Ordering::Relaxed))
        }

        fn set(zigbee_secs: u64) {
            NOW.store(
                rs_price::epoch::ZIGBEE_EPOCH_SECS + zigbee_secs,
                Ordering::Relaxed,
            );
        }

        (epoch as rs_price::epoch::Epoch, set as fn(u64))
    }};
}

/// Captures every outgoing command.
#[derive(Default)]
pub struct RecordingSink {
    pub sent: RefCell<Vec<(EndpointId, Response)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<Response> {
        self.sent.borrow().last().map(|(_, r)| r.clone())
    }

    pub fn published_price_ids(&self) -> Vec<u32> {
        self.sent
            .borrow()
            .iter()
            .filter_map(|(_, r)| match r {
                Response::PublishPrice(p) => Some(p.issuer_event_id),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.sent.borrow_mut().clear();
    }
}

impl CommandSink for RecordingSink {
    fn send(&self, endpoint: EndpointId, response: &Response) {
        self.sent.borrow_mut().push((endpoint, response.clone()));
    }
}

/// Remembers the most recent schedule/deactivate call.
#[derive(Default)]
pub struct RecordingTimer {
    pub armed: RefCell<Option<(EndpointId, Duration)>>,
}

impl RecordingTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn armed_for(&self, endpoint: EndpointId) -> Option<Duration> {
        match &*self.armed.borrow() {
            Some((ep, delay)) if *ep == endpoint => Some(*delay),
            _ => None,
        }
    }
}

impl TickTimer for RecordingTimer {
    fn schedule(&self, endpoint: EndpointId, delay: Duration) {
        *self.armed.borrow_mut() = Some((endpoint, delay));
    }

    fn deactivate(&self, endpoint: EndpointId) {
        let mut armed = self.armed.borrow_mut();
        if matches!(&*armed, Some((ep, _)) if *ep == endpoint) {
            *armed = None;
        }
    }
}

/// Records the event ids passed to the client notifications.
#[derive(Default)]
pub struct ClientRecorder {
    pub started: RefCell<Vec<u32>>,
    pub expired: RefCell<Vec<u32>>,
}

impl ClientRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClientHooks for ClientRecorder {
    fn price_started(&self, _endpoint: EndpointId, price: &PriceEntry) {
        self.started.borrow_mut().push(price.price.issuer_event_id);
    }

    fn price_expired(&self, _endpoint: EndpointId, price: &PriceEntry) {
        self.expired.borrow_mut().push(price.price.issuer_event_id);
    }
}

/// Records the event ids passed to the server notifications.
#[derive(Default)]
pub struct ServerRecorder {
    pub billing_periods: RefCell<Vec<u32>>,
    pub conversion_factors: RefCell<Vec<u32>>,
    pub tariffs: RefCell<Vec<u32>>,
    pub bills: RefCell<Vec<u32>>,
}

impl ServerRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ServerHooks for ServerRecorder {
    fn billing_period_started(
        &self,
        _endpoint: EndpointId,
        info: &EventInfo,
        _period: &BillingPeriod,
    ) {
        self.billing_periods.borrow_mut().push(info.issuer_event_id);
    }

    fn conversion_factor_changed(
        &self,
        _endpoint: EndpointId,
        info: &EventInfo,
        _factor: &ConversionFactor,
    ) {
        self.conversion_factors.borrow_mut().push(info.issuer_event_id);
    }

    fn tariff_activated(&self, _endpoint: EndpointId, info: &EventInfo, _tariff: &TariffInformation) {
        self.tariffs.borrow_mut().push(info.issuer_event_id);
    }

    fn consolidated_bill_started(
        &self,
        _endpoint: EndpointId,
        info: &EventInfo,
        _bill: &ConsolidatedBill,
    ) {
        self.bills.borrow_mut().push(info.issuer_event_id);
    }
}

/// A minimal PublishPrice with the fields the scheduling logic looks at.
pub fn price(id: u32, start_time: u32, duration_in_minutes: u16) -> PublishPrice {
    PublishPrice {
        provider_id: 1,
        issuer_event_id: id,
        start_time,
        duration_in_minutes,
        ..Default::default()
    }
}
