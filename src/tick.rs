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

//! The server's cooperative tick scheduler.
//!
//! Each endpoint carries a [`PendingEvents`] mask of kinds with outstanding
//! work. A tick pass walks the kinds in fixed priority order: a kind that is
//! due runs its refresh action (activation hooks, auto-repeat synthesis, one
//! pagination step), a kind with nothing left pending drops out of the mask,
//! and the pass ends by re-arming the [`crate::hooks::TickTimer`] for the
//! nearest remaining deadline.

use core::time::Duration;

use crate::common::NO_PENDING_EVENTS;
use crate::flags::bitflags;
use crate::server::PriceServer;
use crate::EndpointId;

bitflags! {
    /// The per-endpoint mask of event kinds with outstanding work.
    #[repr(transparent)]
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct PendingEvents: u16 {
        const SCHEDULED_PRICES = 0x0001;
        const BILLING_PERIOD = 0x0002;
        const BLOCK_PERIOD = 0x0004;
        const CALORIFIC_VALUE = 0x0008;
        const CO2_VALUE = 0x0010;
        const CONVERSION_FACTOR = 0x0020;
        const TARIFF_INFORMATION = 0x0040;
        const PRICE_MATRIX = 0x0080;
        const BLOCK_THRESHOLDS = 0x0100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    ScheduledPrices,
    BillingPeriod,
    BlockPeriod,
    CalorificValue,
    Co2Value,
    ConversionFactor,
    TariffInformation,
    PriceMatrix,
    BlockThresholds,
}

impl EventKind {
    const fn pending_bit(self) -> PendingEvents {
        match self {
            Self::ScheduledPrices => PendingEvents::SCHEDULED_PRICES,
            Self::BillingPeriod => PendingEvents::BILLING_PERIOD,
            Self::BlockPeriod => PendingEvents::BLOCK_PERIOD,
            Self::CalorificValue => PendingEvents::CALORIFIC_VALUE,
            Self::Co2Value => PendingEvents::CO2_VALUE,
            Self::ConversionFactor => PendingEvents::CONVERSION_FACTOR,
            Self::TariffInformation => PendingEvents::TARIFF_INFORMATION,
            Self::PriceMatrix => PendingEvents::PRICE_MATRIX,
            Self::BlockThresholds => PendingEvents::BLOCK_THRESHOLDS,
        }
    }
}

/// Dispatch priority. Pagination outranks table maintenance.
const KIND_ORDER: [EventKind; 9] = [
    EventKind::ScheduledPrices,
    EventKind::BillingPeriod,
    EventKind::BlockPeriod,
    EventKind::CalorificValue,
    EventKind::Co2Value,
    EventKind::ConversionFactor,
    EventKind::TariffInformation,
    EventKind::PriceMatrix,
    EventKind::BlockThresholds,
];

/// Re-arm delay after a pass that left work immediately due, so other
/// cooperative activity gets a chance to run in between.
pub const TICK_GRACE: Duration = Duration::from_millis(250);

impl<const EPS: usize> PriceServer<'_, EPS> {
    /// Flags the given kinds as having outstanding work on the endpoint, then
    /// runs one tick pass right away.
    pub fn schedule_tick_event(&mut self, endpoint: EndpointId, kinds: PendingEvents) {
        let Some(ep) = self.endpoint_index(endpoint) else {
            return;
        };

        self.endpoints[ep].pending |= kinds;
        self.tick(endpoint);
    }

    /// One pass of the server scheduler. The timer owner must call this when
    /// the [`crate::hooks::TickTimer`] for the endpoint fires.
    pub fn tick(&mut self, endpoint: EndpointId) {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return;
        };

        let mut min_delay = NO_PENDING_EVENTS;

        for kind in KIND_ORDER {
            let bit = kind.pending_bit();
            if !self.endpoints[ep].pending.contains(bit) {
                continue;
            }

            let mut due = self.due_in(ep, kind, now);
            if due == 0 {
                self.run_refresh(ep, kind, now);
                due = self.due_in(ep, kind, now);
            }

            if due == NO_PENDING_EVENTS {
                self.endpoints[ep].pending.remove(bit);
            } else {
                min_delay = min_delay.min(due);
            }
        }

        if min_delay == NO_PENDING_EVENTS {
            self.timer.deactivate(endpoint);
        } else if min_delay == 0 {
            self.timer.schedule(endpoint, TICK_GRACE);
        } else {
            self.timer.schedule(endpoint, Duration::from_secs(min_delay as u64));
        }
    }

    /// Seconds until the kind next needs attention on the endpoint, or
    /// [`NO_PENDING_EVENTS`] when it is idle.
    fn due_in(&self, ep: usize, kind: EventKind, now: u32) -> u32 {
        let endpoint = &self.endpoints[ep];

        match kind {
            EventKind::ScheduledPrices => self.scheduled_prices_due(ep),
            EventKind::BillingPeriod => endpoint.billing_periods.next_action_due(now),
            EventKind::BlockPeriod => endpoint.block_periods.next_action_due(now),
            EventKind::CalorificValue => endpoint.calorific_values.next_action_due(now),
            EventKind::Co2Value => endpoint.co2_values.next_action_due(now),
            EventKind::ConversionFactor => endpoint.conversion_factors.next_action_due(now),
            EventKind::TariffInformation => endpoint.tariffs.next_action_due(now),
            EventKind::PriceMatrix => endpoint.price_matrices.next_action_due(now),
            EventKind::BlockThresholds => endpoint.block_thresholds.next_action_due(now),
        }
    }

    fn run_refresh(&mut self, ep: usize, kind: EventKind, now: u32) {
        match kind {
            EventKind::ScheduledPrices => self.send_next_scheduled_price(ep),
            EventKind::BillingPeriod => self.refresh_billing_periods(ep, now),
            EventKind::BlockPeriod => self.refresh_block_periods(ep, now),
            EventKind::CalorificValue => self.refresh_calorific_values(ep, now),
            EventKind::Co2Value => self.refresh_co2_values(ep, now),
            EventKind::ConversionFactor => self.refresh_conversion_factors(ep, now),
            EventKind::TariffInformation => self.refresh_tariffs(ep, now),
            EventKind::PriceMatrix => self.refresh_price_matrices(ep, now),
            EventKind::BlockThresholds => self.refresh_block_threshold_tables(ep, now),
        }
    }
}
