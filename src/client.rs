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

//! The client side of the Price cluster: the received-price table and the
//! Critical Peak Pricing event handler.
//!
//! Prices are richer than the generic scheduled events: an entry carries an
//! explicit `[start_time, end_time)` window and a separate `active` flag, and
//! an incoming newer price may *truncate* a currently active older one
//! (graceful handoff) rather than just evict it.

use core::time::Duration;

use crate::common::NO_PENDING_EVENTS;
use crate::epoch::{zigbee_now, Epoch};
use crate::hooks::{ClientHooks, CommandSink, TickTimer};
use crate::proto::{
    CppAuth, CppEventResponse, PriceAcknowledgement, PriceControl, PublishCppEvent, PublishPrice,
    Response, Status, PRICE_DURATION_UNTIL_CHANGED,
};
use crate::time::SECONDS_PER_MINUTE;
use crate::EndpointId;

pub const PRICE_CLIENT_TABLE_SIZE: usize = 5;

/// "Runs until changed" end time.
pub const END_TIME_NEVER: u32 = u32::MAX;

/// One received price.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PriceEntry {
    pub valid: bool,
    /// Whether `price_started` has fired for this entry and `price_expired`
    /// has not. Distinct from `valid`.
    pub active: bool,
    /// Absolute window, resolved at receipt ("start now" already applied).
    pub start_time: u32,
    /// [`END_TIME_NEVER`] when the price runs until changed.
    pub end_time: u32,
    pub price: PublishPrice,
}

struct ClientEndpoint {
    id: EndpointId,
    prices: [PriceEntry; PRICE_CLIENT_TABLE_SIZE],
    cpp_event: Option<(PublishCppEvent, CppAuth)>,
}

impl ClientEndpoint {
    fn new(id: EndpointId) -> Self {
        Self {
            id,
            prices: core::array::from_fn(|_| PriceEntry::default()),
            cpp_event: None,
        }
    }
}

/// The price-cluster client context: one price table per served endpoint.
pub struct PriceClient<'a, const EPS: usize = 1> {
    epoch: Epoch,
    timer: &'a dyn TickTimer,
    sink: &'a dyn CommandSink,
    hooks: &'a dyn ClientHooks,
    endpoints: [ClientEndpoint; EPS],
}

impl<'a, const EPS: usize> PriceClient<'a, EPS> {
    pub fn new(
        endpoints: [EndpointId; EPS],
        epoch: Epoch,
        timer: &'a dyn TickTimer,
        sink: &'a dyn CommandSink,
        hooks: &'a dyn ClientHooks,
    ) -> Self {
        Self {
            epoch,
            timer,
            sink,
            hooks,
            endpoints: endpoints.map(ClientEndpoint::new),
        }
    }

    fn now(&self) -> u32 {
        zigbee_now(self.epoch)
    }

    fn endpoint_index(&self, endpoint: EndpointId) -> Option<usize> {
        self.endpoints.iter().position(|ep| ep.id == endpoint)
    }

    fn reject(&self, endpoint: EndpointId, status: Status) -> Status {
        self.sink.send(endpoint, &Response::Default(status));
        status
    }

    /// Marks every price slot invalid for the endpoint. Idempotent; an
    /// unknown endpoint is silently ignored.
    pub fn init(&mut self, endpoint: EndpointId) {
        if let Some(ep) = self.endpoint_index(endpoint) {
            for entry in &mut self.endpoints[ep].prices {
                *entry = PriceEntry::default();
            }
            self.endpoints[ep].cpp_event = None;
        }
    }

    /// Handles a received PublishPrice command.
    ///
    /// Overlap resolution: every existing entry whose window overlaps the
    /// incoming one either loses (smaller event id: truncated if currently
    /// active and the new price starts later, invalidated otherwise) or wins
    /// (larger or equal event id: the incoming price is rejected). A full
    /// table evicts the latest-starting entry, unless the new price starts
    /// after every existing one, which is an `InsufficientSpace` rejection.
    ///
    /// Acceptance answers with a `PriceAcknowledgement` when the ack-required
    /// control bit is set, with a success default response otherwise, and
    /// re-runs the tick pass so an immediately-due price activates and the
    /// wake-up timer is re-armed.
    pub fn publish_price(&mut self, endpoint: EndpointId, cmd: &PublishPrice) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        let mut price = cmd.clone();
        if price.start_time == 0 {
            price.start_time = now;
            price.price_control |= PriceControl::STARTED_NOW;
        }
        let start = price.start_time;
        let end = if price.duration_in_minutes == PRICE_DURATION_UNTIL_CHANGED {
            END_TIME_NEVER
        } else {
            start.saturating_add(price.duration_in_minutes as u32 * SECONDS_PER_MINUTE)
        };

        if end <= now {
            warn!(
                "Rejecting price event {}: already expired (end {} <= now {})",
                price.issuer_event_id, end, now
            );
            return self.reject(endpoint, Status::Failure);
        }

        if self.endpoints[ep]
            .prices
            .iter()
            .any(|e| e.valid && e.price.issuer_event_id == price.issuer_event_id)
        {
            return self.reject(endpoint, Status::DuplicateExists);
        }

        let hooks = self.hooks;

        // Resolve overlaps against every existing entry.
        for i in 0..PRICE_CLIENT_TABLE_SIZE {
            let entry = &self.endpoints[ep].prices[i];
            if !entry.valid || entry.start_time >= end || start >= entry.end_time {
                continue;
            }

            if entry.price.issuer_event_id >= price.issuer_event_id {
                warn!(
                    "Rejecting price event {}: overlaps newer event {}",
                    price.issuer_event_id, entry.price.issuer_event_id
                );
                return self.reject(endpoint, Status::Failure);
            }

            let entry = &mut self.endpoints[ep].prices[i];
            if entry.active && start > now {
                // Graceful handoff: the active price now runs exactly until
                // the newer one starts.
                entry.end_time = start;
                entry.price.duration_in_minutes = PRICE_DURATION_UNTIL_CHANGED;
            } else {
                let was_active = entry.active;
                entry.valid = false;
                entry.active = false;
                if was_active {
                    let expired = entry.clone();
                    hooks.price_expired(endpoint, &expired);
                }
            }
        }

        let slot = match self.endpoints[ep].prices.iter().position(|e| !e.valid) {
            Some(slot) => slot,
            None => {
                let prices = &self.endpoints[ep].prices;
                let latest = (0..PRICE_CLIENT_TABLE_SIZE)
                    .max_by_key(|&i| (prices[i].start_time, i))
                    .unwrap_or(0);
                if start > prices[latest].start_time {
                    return self.reject(endpoint, Status::InsufficientSpace);
                }

                let entry = &mut self.endpoints[ep].prices[latest];
                let was_active = entry.active;
                entry.valid = false;
                entry.active = false;
                if was_active {
                    let expired = entry.clone();
                    hooks.price_expired(endpoint, &expired);
                }
                latest
            }
        };

        self.endpoints[ep].prices[slot] = PriceEntry {
            valid: true,
            active: false,
            start_time: start,
            end_time: end,
            price: price.clone(),
        };

        self.tick(endpoint);

        if price.price_control.contains(PriceControl::ACK_REQUIRED) {
            self.sink.send(
                endpoint,
                &Response::PriceAcknowledgement(PriceAcknowledgement {
                    provider_id: price.provider_id,
                    issuer_event_id: price.issuer_event_id,
                    price_ack_time: now,
                    control: price.price_control,
                }),
            );
        } else {
            self.sink.send(endpoint, &Response::Default(Status::Success));
        }

        Status::Success
    }

    /// One pass of the client scheduler: expire entries whose end passed,
    /// activate entries whose window now contains the current time, then
    /// re-arm (or deactivate) the wake-up timer for the nearest transition.
    pub fn tick(&mut self, endpoint: EndpointId) {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return;
        };

        let hooks = self.hooks;
        let mut next = NO_PENDING_EVENTS;

        for i in 0..PRICE_CLIENT_TABLE_SIZE {
            let entry = &mut self.endpoints[ep].prices[i];
            if !entry.valid {
                continue;
            }

            if entry.end_time <= now {
                let was_active = entry.active;
                entry.valid = false;
                entry.active = false;
                if was_active {
                    let expired = entry.clone();
                    hooks.price_expired(endpoint, &expired);
                }
                continue;
            }

            if !entry.active && entry.start_time <= now {
                entry.active = true;
                let started = entry.clone();
                hooks.price_started(endpoint, &started);
            }

            let entry = &self.endpoints[ep].prices[i];
            if entry.active {
                if entry.end_time != END_TIME_NEVER {
                    next = next.min(entry.end_time - now);
                }
            } else {
                next = next.min(entry.start_time - now);
            }
        }

        if next == NO_PENDING_EVENTS {
            self.timer.deactivate(endpoint);
        } else {
            self.timer.schedule(endpoint, Duration::from_secs(next as u64));
        }
    }

    pub fn price_by_event_id(&self, endpoint: EndpointId, event_id: u32) -> Option<&PriceEntry> {
        let ep = self.endpoint_index(endpoint)?;

        self.endpoints[ep]
            .prices
            .iter()
            .find(|e| e.valid && e.price.issuer_event_id == event_id)
    }

    pub fn price_entry(&self, endpoint: EndpointId, index: usize) -> Option<&PriceEntry> {
        let ep = self.endpoint_index(endpoint)?;

        self.endpoints[ep].prices.get(index).filter(|e| e.valid)
    }

    /// Handles a received PublishCppEvent: asks the application for
    /// authorization (a forced event skips the question) and answers with a
    /// CppEventResponse.
    pub fn publish_cpp_event(&mut self, endpoint: EndpointId, cmd: &PublishCppEvent) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        let mut event = *cmd;
        if event.start_time == 0 {
            event.start_time = now;
        }

        let auth = if event.cpp_auth == CppAuth::Forced {
            CppAuth::Forced
        } else {
            self.hooks.cpp_event_authorization(endpoint, &event)
        };

        self.endpoints[ep].cpp_event = Some((event, auth));
        self.sink.send(
            endpoint,
            &Response::CppEventResponse(CppEventResponse {
                issuer_event_id: event.issuer_event_id,
                cpp_auth: auth,
            }),
        );

        Status::Success
    }

    pub fn cpp_event(&self, endpoint: EndpointId) -> Option<&(PublishCppEvent, CppAuth)> {
        let ep = self.endpoint_index(endpoint)?;

        self.endpoints[ep].cpp_event.as_ref()
    }

    /// Diagnostic dump of the endpoint's price table.
    pub fn log_table(&self, endpoint: EndpointId) {
        let Some(ep) = self.endpoint_index(endpoint) else {
            return;
        };

        for (i, entry) in self.endpoints[ep].prices.iter().enumerate() {
            if entry.valid {
                info!(
                    "price[{}]: event id {}, provider {}, window [{}, {}), active {}",
                    i,
                    entry.price.issuer_event_id,
                    entry.price.provider_id,
                    entry.start_time,
                    entry.end_time,
                    entry.active,
                );
            } else {
                info!("price[{}]: <unused>", i);
            }
        }
    }
}
