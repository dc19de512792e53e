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

//! The server price table and the paginated GetScheduledPrices transaction.

use crate::error::{Error, ErrorCode};
use crate::proto::{
    GetCurrentPrice, GetScheduledPrices, PublishPrice, Response, Status,
    PRICE_DURATION_UNTIL_CHANGED,
};
use crate::tick::PendingEvents;
use crate::time::SECONDS_PER_MINUTE;
use crate::EndpointId;

use super::PriceServer;

pub const PRICE_SERVER_TABLE_SIZE: usize = 5;

/// "Runs until changed" end time.
pub const END_TIME_NEVER: u32 = u32::MAX;

/// Sentinel for "send all matching prices" in a pagination cursor.
const REMAINING_ALL: u8 = 0xFF;

/// One programmatically-provisioned price.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScheduledPrice {
    pub valid: bool,
    /// Absolute window, resolved when the entry is set ("start now" applied).
    pub start_time: u32,
    /// [`END_TIME_NEVER`] when the price runs until changed.
    pub end_time: u32,
    pub price: PublishPrice,
}

impl ScheduledPrice {
    pub fn current_or_scheduled(&self, start_time: u32) -> bool {
        self.valid && self.end_time > start_time
    }
}

/// The single in-flight GetScheduledPrices cursor.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct ScheduledPricesPartner {
    pub(crate) active: bool,
    pub(crate) endpoint: EndpointId,
    pub(crate) start_time: u32,
    /// [`REMAINING_ALL`] means no cap was requested.
    pub(crate) remaining: u8,
    pub(crate) index: u8,
}

impl<const EPS: usize> PriceServer<'_, EPS> {
    /// Provisions (or with `None`, invalidates) one slot of the endpoint's
    /// price table. A zero start time means "now"; the window is resolved to
    /// absolute times at this point.
    pub fn set_price_table_entry(
        &mut self,
        endpoint: EndpointId,
        index: u8,
        price: Option<&PublishPrice>,
    ) -> Result<(), Error> {
        let now = self.now();
        let ep = self.endpoint_index(endpoint).ok_or(ErrorCode::NoEndpoint)?;
        let slot = self.endpoints[ep]
            .prices
            .get_mut(index as usize)
            .ok_or(ErrorCode::Invalid)?;

        match price {
            Some(price) => {
                let mut price = price.clone();
                if price.start_time == 0 {
                    price.start_time = now;
                }
                let start_time = price.start_time;
                let end_time = if price.duration_in_minutes == PRICE_DURATION_UNTIL_CHANGED {
                    END_TIME_NEVER
                } else {
                    start_time
                        .saturating_add(price.duration_in_minutes as u32 * SECONDS_PER_MINUTE)
                };

                if end_time <= now {
                    return Err(ErrorCode::InvalidTime.into());
                }

                *slot = ScheduledPrice {
                    valid: true,
                    start_time,
                    end_time,
                    price,
                };
            }
            None => *slot = ScheduledPrice::default(),
        }

        Ok(())
    }

    pub fn price_table_entry(&self, endpoint: EndpointId, index: u8) -> Option<&ScheduledPrice> {
        let ep = self.endpoint_index(endpoint)?;

        self.endpoints[ep]
            .prices
            .get(index as usize)
            .filter(|e| e.valid)
    }

    pub fn price_by_event_id(&self, endpoint: EndpointId, event_id: u32) -> Option<&ScheduledPrice> {
        let ep = self.endpoint_index(endpoint)?;

        self.endpoints[ep]
            .prices
            .iter()
            .find(|e| e.valid && e.price.issuer_event_id == event_id)
    }

    /// Answers a GetCurrentPrice request with the currently active price:
    /// among valid entries whose window contains now, the one with the
    /// largest issuer event id.
    pub fn get_current_price(&mut self, endpoint: EndpointId, _cmd: &GetCurrentPrice) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        let active = self.endpoints[ep]
            .prices
            .iter()
            .filter(|e| e.valid && e.start_time <= now && e.end_time > now)
            .max_by_key(|e| e.price.issuer_event_id);

        match active {
            Some(entry) => {
                let mut cmd = entry.price.clone();
                cmd.start_time = entry.start_time;
                self.sink.send(endpoint, &Response::PublishPrice(cmd));
                Status::Success
            }
            None => self.reject(endpoint, Status::NotFound),
        }
    }

    /// Starts a paginated GetScheduledPrices transaction.
    ///
    /// At most one such transaction may be outstanding per device; a second
    /// request while one is in flight is rejected. The actual sending happens
    /// one price per scheduler pass (see [`Self::send_next_scheduled_price`]).
    pub fn get_scheduled_prices(
        &mut self,
        endpoint: EndpointId,
        cmd: &GetScheduledPrices,
    ) -> Status {
        let now = self.now();
        if self.endpoint_index(endpoint).is_none() {
            return self.reject(endpoint, Status::Failure);
        }

        if self.partner.active {
            warn!(
                "Rejecting GetScheduledPrices on endpoint {}: a transaction is already in flight",
                endpoint
            );
            return self.reject(endpoint, ErrorCode::InvalidState.into());
        }

        self.partner = ScheduledPricesPartner {
            active: true,
            endpoint,
            start_time: if cmd.start_time == 0 { now } else { cmd.start_time },
            remaining: if cmd.number_of_events == 0 {
                REMAINING_ALL
            } else {
                cmd.number_of_events
            },
            index: 0,
        };

        self.schedule_tick_event(endpoint, PendingEvents::SCHEDULED_PRICES);

        Status::Success
    }

    pub(crate) fn scheduled_prices_due(&self, ep: usize) -> u32 {
        if self.partner.active && self.partner.endpoint == self.endpoints[ep].id {
            0
        } else {
            crate::common::NO_PENDING_EVENTS
        }
    }

    /// One pagination step: advances the cursor to the next
    /// current-or-scheduled price and sends it. Resets the cursor to idle at
    /// exhaustion or table end.
    pub(crate) fn send_next_scheduled_price(&mut self, ep: usize) {
        let sink = self.sink;
        let endpoint = self.endpoints[ep].id;
        let prices = &self.endpoints[ep].prices;
        let partner = &mut self.partner;

        let mut sent = false;
        while (partner.index as usize) < PRICE_SERVER_TABLE_SIZE {
            let entry = &prices[partner.index as usize];
            partner.index += 1;

            if entry.current_or_scheduled(partner.start_time) {
                let mut cmd = entry.price.clone();
                cmd.start_time = entry.start_time;
                sink.send(endpoint, &Response::PublishPrice(cmd));
                sent = true;

                if partner.remaining != REMAINING_ALL {
                    partner.remaining -= 1;
                    if partner.remaining == 0 {
                        partner.active = false;
                    }
                }
                break;
            }
        }

        if !sent {
            partner.active = false;
        }
    }

    /// Diagnostic dump of the endpoint's price table.
    pub fn log_price_table(&self, endpoint: EndpointId) {
        let Some(ep) = self.endpoint_index(endpoint) else {
            return;
        };

        for (i, entry) in self.endpoints[ep].prices.iter().enumerate() {
            if entry.valid {
                info!(
                    "price[{}]: event id {}, provider {}, window [{}, {})",
                    i,
                    entry.price.issuer_event_id,
                    entry.price.provider_id,
                    entry.start_time,
                    entry.end_time,
                );
            } else {
                info!("price[{}]: <unused>", i);
            }
        }
    }
}
