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

//! Billing periods and consolidated bills.
//!
//! Both kinds deviate from the plain table managers in [`super::tables`] in
//! one way: an incoming event *cancels* (invalidates) every overlapping
//! existing entry with a smaller event id instead of merely sorting around
//! it. Billing periods additionally auto-repeat: a period received with a
//! zero start time regenerates itself when it elapses.

use crate::common::EventInfo;
use crate::proto::{
    GetScheduledEvents, PublishBillingPeriod, PublishConsolidatedBill, Response, Status,
};
use crate::table::EventTable;
use crate::tick::PendingEvents;
use crate::time::{adjusted_start_time, duration_to_seconds, DurationType};
use crate::EndpointId;

use super::tables::{send_matching, synthesize_repeat};
use super::PriceServer;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BillingPeriod {
    /// Raw duration in duration-type units, kept for re-publishing and for
    /// auto-repeat synthesis.
    pub raw_duration: u32,
    pub duration_type: DurationType,
    pub tariff_type: u8,
    /// Set when the period was received with a zero start time.
    pub repeating: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConsolidatedBill {
    pub raw_duration: u32,
    pub duration_type: DurationType,
    pub amount: u32,
    pub currency: u16,
    pub trailing_digit: u8,
}

/// Invalidates every valid entry whose window overlaps `[start_time,
/// start_time + duration_sec)` and whose event id is smaller than the
/// incoming one.
fn cancel_overlapping<P: Default, const N: usize>(
    table: &mut EventTable<P, N>,
    event_id: u32,
    start_time: u32,
    duration_sec: u32,
) {
    let end = start_time as u64 + duration_sec as u64;

    // Invalidation re-sorts the table, hence the restart after each hit.
    loop {
        let overlapping = (0..table.capacity()).find(|&i| {
            table.entry(i).is_some_and(|(info, _)| {
                info.issuer_event_id < event_id
                    && (info.start_time as u64) < end
                    && (start_time as u64) < info.start_time as u64 + info.duration_sec as u64
            })
        });

        match overlapping {
            Some(i) => {
                if let Some((info, _)) = table.entry(i) {
                    info!(
                        "Cancelling event {}: overlaps incoming event {}",
                        info.issuer_event_id, event_id
                    );
                }
                table.invalidate(i);
            }
            None => break,
        }
    }
}

impl<const EPS: usize> PriceServer<'_, EPS> {
    // --- Billing period ---

    pub fn publish_billing_period(
        &mut self,
        endpoint: EndpointId,
        cmd: &PublishBillingPeriod,
    ) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        let start_time = adjusted_start_time(cmd.start_time, cmd.duration_type, now);
        let duration_sec = duration_to_seconds(start_time, cmd.duration, cmd.duration_type);

        let table = &mut self.endpoints[ep].billing_periods;
        cancel_overlapping(table, cmd.issuer_event_id, start_time, duration_sec);

        let info = EventInfo {
            valid: true,
            issuer_event_id: cmd.issuer_event_id,
            provider_id: cmd.provider_id,
            start_time,
            duration_sec,
            actions_pending: true,
        };
        let payload = BillingPeriod {
            raw_duration: cmd.duration,
            duration_type: cmd.duration_type,
            tariff_type: cmd.tariff_type,
            repeating: cmd.start_time == 0,
        };

        match table.insert(Some(cmd.provider_id), info, payload) {
            Ok(_) => {
                self.schedule_tick_event(endpoint, PendingEvents::BILLING_PERIOD);
                self.sink.send(endpoint, &Response::Default(Status::Success));
                Status::Success
            }
            Err(err) => self.reject(endpoint, (&err).into()),
        }
    }

    pub fn get_billing_period(&mut self, endpoint: EndpointId, req: &GetScheduledEvents) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        send_matching(
            self.sink,
            endpoint,
            &self.endpoints[ep].billing_periods,
            req,
            now,
            |info, p| {
                Response::PublishBillingPeriod(PublishBillingPeriod {
                    provider_id: info.provider_id,
                    issuer_event_id: info.issuer_event_id,
                    start_time: info.start_time,
                    duration: p.raw_duration,
                    duration_type: p.duration_type,
                    tariff_type: p.tariff_type,
                })
            },
        )
    }

    pub fn billing_period_by_event_id(
        &self,
        endpoint: EndpointId,
        event_id: u32,
    ) -> Option<(&EventInfo, &BillingPeriod)> {
        let ep = self.endpoint_index(endpoint)?;

        self.endpoints[ep].billing_periods.entry_by_event_id(event_id)
    }

    pub(crate) fn refresh_billing_periods(&mut self, ep: usize, now: u32) {
        let hooks = self.hooks;
        let endpoint = self.endpoints[ep].id;

        if let Some(index) = self.endpoints[ep].billing_periods.refresh(now) {
            if let Some((info, payload)) = self.endpoints[ep].billing_periods.entry(index) {
                hooks.billing_period_started(endpoint, info, payload);
            }
        }

        synthesize_repeat(&mut self.endpoints[ep].billing_periods, now, |p| {
            p.repeating.then_some((p.raw_duration, p.duration_type))
        });
    }

    // --- Consolidated bill ---

    /// Handles a received PublishConsolidatedBill. Bills are not
    /// tick-scheduled; a bill whose window already contains the current time
    /// fires [`crate::hooks::ServerHooks::consolidated_bill_started`] right
    /// here.
    pub fn publish_consolidated_bill(
        &mut self,
        endpoint: EndpointId,
        cmd: &PublishConsolidatedBill,
    ) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        let start_time = adjusted_start_time(cmd.start_time, cmd.duration_type, now);
        let duration_sec = duration_to_seconds(start_time, cmd.duration, cmd.duration_type);

        let hooks = self.hooks;
        let table = &mut self.endpoints[ep].consolidated_bills;
        cancel_overlapping(table, cmd.issuer_event_id, start_time, duration_sec);

        let info = EventInfo {
            valid: true,
            issuer_event_id: cmd.issuer_event_id,
            provider_id: cmd.provider_id,
            start_time,
            duration_sec,
            actions_pending: true,
        };
        let payload = ConsolidatedBill {
            raw_duration: cmd.duration,
            duration_type: cmd.duration_type,
            amount: cmd.consolidated_bill,
            currency: cmd.currency,
            trailing_digit: cmd.bill_trailing_digit,
        };

        let index = match table.insert(Some(cmd.provider_id), info, payload) {
            Ok(index) => index,
            Err(err) => return self.reject(endpoint, (&err).into()),
        };

        if table.active(now) == Some(index) {
            if let Some(info) = table.info_mut(index) {
                info.actions_pending = false;
            }
            if let Some((info, payload)) = table.entry(index) {
                hooks.consolidated_bill_started(endpoint, info, payload);
            }
        }

        self.sink.send(endpoint, &Response::Default(Status::Success));

        Status::Success
    }

    pub fn get_consolidated_bill(
        &mut self,
        endpoint: EndpointId,
        req: &GetScheduledEvents,
    ) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        send_matching(
            self.sink,
            endpoint,
            &self.endpoints[ep].consolidated_bills,
            req,
            now,
            |info, p| {
                Response::PublishConsolidatedBill(PublishConsolidatedBill {
                    provider_id: info.provider_id,
                    issuer_event_id: info.issuer_event_id,
                    start_time: info.start_time,
                    duration: p.raw_duration,
                    duration_type: p.duration_type,
                    consolidated_bill: p.amount,
                    currency: p.currency,
                    bill_trailing_digit: p.trailing_digit,
                })
            },
        )
    }

    pub fn consolidated_bill_by_event_id(
        &self,
        endpoint: EndpointId,
        event_id: u32,
    ) -> Option<(&EventInfo, &ConsolidatedBill)> {
        let ep = self.endpoint_index(endpoint)?;

        self.endpoints[ep].consolidated_bills.entry_by_event_id(event_id)
    }
}
