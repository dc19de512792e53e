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

//! The generic per-kind table managers.
//!
//! Each kind is a thin wrapper around [`EventTable`]: a payload struct, a
//! publish operation (validate, insert, schedule a tick), a GetXxx responder
//! built on the find-valid-entries scan, and the tick-driven refresh that
//! fires the kind's notification hook. The billing-period and
//! consolidated-bill specializations live in [`super::bills`].

use crate::common::EventInfo;
use crate::error::Error;
use crate::hooks::CommandSink;
use crate::proto::{
    BlockPeriodControl, GetScheduledEvents, Label, PriceMatrixSubPayload, PublishBlockPeriod,
    PublishBlockThresholds, PublishCalorificValue, PublishCo2Value, PublishConversionFactor,
    PublishCreditPayment, PublishCurrencyConversion, PublishPriceMatrix, PublishTariffInformation,
    PublishTierLabels, Response, Status, TierLabel, BLOCK_THRESHOLD_LEN,
    PRICE_MATRIX_SUB_PAYLOAD_LEN, TIER_LABELS_LEN,
};
use crate::table::EventTable;
use crate::tick::PendingEvents;
use crate::time::{adjusted_start_time, duration_to_seconds, DurationType, DURATION_FOREVER};
use crate::EndpointId;

use super::{PriceServer, CREDIT_PAYMENT_TABLE_SIZE};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BlockPeriod {
    /// Raw duration in duration-type units, kept for re-publishing and for
    /// auto-repeat synthesis.
    pub raw_duration: u32,
    pub duration_type: DurationType,
    pub control: BlockPeriodControl,
    pub tariff_type: u8,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalorificValue {
    pub value: u32,
    pub unit: u8,
    pub trailing_digit: u8,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Co2Value {
    pub tariff_type: u8,
    pub value: u32,
    pub unit: u8,
    pub trailing_digit: u8,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConversionFactor {
    pub factor: u32,
    pub trailing_digit: u8,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TariffInformation {
    pub issuer_tariff_id: u32,
    pub tariff_type_charging_scheme: u8,
    pub label: Label,
    pub number_of_price_tiers_in_use: u8,
    pub number_of_block_thresholds_in_use: u8,
    pub unit_of_measure: u8,
    pub currency: u16,
    pub price_trailing_digit: u8,
    pub standing_charge: u32,
    pub tier_block_mode: u8,
    pub block_threshold_multiplier: u32,
    pub block_threshold_divisor: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PriceMatrix {
    pub issuer_tariff_id: u32,
    pub sub_payload_control: u8,
    pub entries: heapless::Vec<PriceMatrixSubPayload, PRICE_MATRIX_SUB_PAYLOAD_LEN>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BlockThresholds {
    pub issuer_tariff_id: u32,
    pub sub_payload_control: u8,
    pub thresholds: heapless::Vec<u64, BLOCK_THRESHOLD_LEN>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CreditPayment {
    pub due_date: u32,
    pub overdue_amount: u32,
    pub status: u8,
    pub payment: u32,
    pub payment_date: u32,
    pub payment_ref: heapless::String<20>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CurrencyConversion {
    pub old_currency: u16,
    pub new_currency: u16,
    pub conversion_factor: u32,
    pub trailing_digit: u8,
    pub change_control: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TierLabels {
    pub issuer_tariff_id: u32,
    pub labels: heapless::Vec<TierLabel, TIER_LABELS_LEN>,
}

/// Adjusts the raw start/duration of an incoming event and inserts it,
/// flagging the entry's actions as pending so the next tick pass pushes the
/// change out.
pub(crate) fn insert_scheduled<P: Default, const N: usize>(
    table: &mut EventTable<P, N>,
    provider_id: Option<u32>,
    event_id: u32,
    raw_start: u32,
    raw_duration: u32,
    duration_type: DurationType,
    now: u32,
    payload: P,
) -> Result<usize, Error> {
    let start_time = adjusted_start_time(raw_start, duration_type, now);
    let duration_sec = duration_to_seconds(start_time, raw_duration, duration_type);

    let info = EventInfo {
        valid: true,
        issuer_event_id: event_id,
        provider_id: provider_id.unwrap_or(0),
        start_time,
        duration_sec,
        actions_pending: true,
    };

    table.insert(provider_id, info, payload)
}

/// Sends one PublishXxx per entry matching a GetXxx request, or a NotFound
/// default response when nothing matches.
pub(crate) fn send_matching<P: Default, const N: usize>(
    sink: &dyn CommandSink,
    endpoint: EndpointId,
    table: &EventTable<P, N>,
    req: &GetScheduledEvents,
    now: u32,
    mut build: impl FnMut(&EventInfo, &P) -> Response,
) -> Status {
    let earliest = if req.earliest_start_time == 0 {
        now
    } else {
        req.earliest_start_time
    };

    let mut out = [0u8; N];
    let found = table.find_valid(&mut out, earliest, req.min_issuer_event_id, req.number_of_commands);
    if found == 0 {
        sink.send(endpoint, &Response::Default(Status::NotFound));
        return Status::NotFound;
    }

    for &index in &out[..found as usize] {
        if let Some((info, payload)) = table.entry(index as usize) {
            sink.send(endpoint, &build(info, payload));
        }
    }

    Status::Success
}

/// Synthesizes the successor of the active entry when the table has no future
/// entry left: same payload, incremented event id, starting where the active
/// one ends. `raw` yields the raw repeat duration, or `None` when the payload
/// is not repeating.
pub(crate) fn synthesize_repeat<P: Default + Clone, const N: usize>(
    table: &mut EventTable<P, N>,
    now: u32,
    raw: impl Fn(&P) -> Option<(u32, DurationType)>,
) {
    if table.future(now).is_some() {
        return;
    }
    let Some(active) = table.active(now) else {
        return;
    };
    let Some((info, payload)) = table.entry(active) else {
        return;
    };
    if info.duration_sec == DURATION_FOREVER {
        return;
    }
    let Some((raw_duration, duration_type)) = raw(payload) else {
        return;
    };

    let info = *info;
    let payload = payload.clone();
    let Some(start_time) = info.start_time.checked_add(info.duration_sec) else {
        return;
    };

    let successor = EventInfo {
        valid: true,
        issuer_event_id: info.issuer_event_id.wrapping_add(1),
        provider_id: info.provider_id,
        start_time,
        duration_sec: duration_to_seconds(start_time, raw_duration, duration_type),
        actions_pending: true,
    };

    if table.insert(Some(info.provider_id), successor, payload).is_err() {
        warn!(
            "Could not synthesize repeat of event {}: no table slot",
            info.issuer_event_id
        );
    }
}

impl<const EPS: usize> PriceServer<'_, EPS> {
    fn accept(&self, endpoint: EndpointId) -> Status {
        self.sink.send(endpoint, &Response::Default(Status::Success));

        Status::Success
    }

    // --- Block period ---

    pub fn publish_block_period(&mut self, endpoint: EndpointId, cmd: &PublishBlockPeriod) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        let payload = BlockPeriod {
            raw_duration: cmd.duration,
            duration_type: cmd.duration_type,
            control: cmd.block_period_control,
            tariff_type: cmd.tariff_type,
        };

        match insert_scheduled(
            &mut self.endpoints[ep].block_periods,
            Some(cmd.provider_id),
            cmd.issuer_event_id,
            cmd.start_time,
            cmd.duration,
            cmd.duration_type,
            now,
            payload,
        ) {
            Ok(_) => {
                self.schedule_tick_event(endpoint, PendingEvents::BLOCK_PERIOD);
                self.accept(endpoint)
            }
            Err(err) => self.reject(endpoint, (&err).into()),
        }
    }

    pub fn get_block_period(&mut self, endpoint: EndpointId, req: &GetScheduledEvents) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        send_matching(
            self.sink,
            endpoint,
            &self.endpoints[ep].block_periods,
            req,
            now,
            |info, p| {
                Response::PublishBlockPeriod(PublishBlockPeriod {
                    provider_id: info.provider_id,
                    issuer_event_id: info.issuer_event_id,
                    start_time: info.start_time,
                    duration: p.raw_duration,
                    duration_type: p.duration_type,
                    block_period_control: p.control,
                    tariff_type: p.tariff_type,
                })
            },
        )
    }

    pub fn block_period_by_event_id(
        &self,
        endpoint: EndpointId,
        event_id: u32,
    ) -> Option<(&EventInfo, &BlockPeriod)> {
        let ep = self.endpoint_index(endpoint)?;

        self.endpoints[ep].block_periods.entry_by_event_id(event_id)
    }

    pub(crate) fn refresh_block_periods(&mut self, ep: usize, now: u32) {
        let hooks = self.hooks;
        let endpoint = self.endpoints[ep].id;

        if let Some(index) = self.endpoints[ep].block_periods.refresh(now) {
            if let Some((info, payload)) = self.endpoints[ep].block_periods.entry(index) {
                hooks.block_period_started(endpoint, info, payload);
            }
        }

        synthesize_repeat(&mut self.endpoints[ep].block_periods, now, |p| {
            p.control
                .contains(BlockPeriodControl::REPEATING)
                .then_some((p.raw_duration, p.duration_type))
        });
    }

    // --- Calorific value ---

    pub fn publish_calorific_value(
        &mut self,
        endpoint: EndpointId,
        cmd: &PublishCalorificValue,
    ) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        let payload = CalorificValue {
            value: cmd.calorific_value,
            unit: cmd.calorific_value_unit,
            trailing_digit: cmd.calorific_value_trailing_digit,
        };

        match insert_scheduled(
            &mut self.endpoints[ep].calorific_values,
            None,
            cmd.issuer_event_id,
            cmd.start_time,
            DURATION_FOREVER,
            DurationType::MINUTES,
            now,
            payload,
        ) {
            Ok(_) => {
                self.schedule_tick_event(endpoint, PendingEvents::CALORIFIC_VALUE);
                self.accept(endpoint)
            }
            Err(err) => self.reject(endpoint, (&err).into()),
        }
    }

    pub fn get_calorific_value(&mut self, endpoint: EndpointId, req: &GetScheduledEvents) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        send_matching(
            self.sink,
            endpoint,
            &self.endpoints[ep].calorific_values,
            req,
            now,
            |info, p| {
                Response::PublishCalorificValue(PublishCalorificValue {
                    issuer_event_id: info.issuer_event_id,
                    start_time: info.start_time,
                    calorific_value: p.value,
                    calorific_value_unit: p.unit,
                    calorific_value_trailing_digit: p.trailing_digit,
                })
            },
        )
    }

    pub fn calorific_value_by_event_id(
        &self,
        endpoint: EndpointId,
        event_id: u32,
    ) -> Option<(&EventInfo, &CalorificValue)> {
        let ep = self.endpoint_index(endpoint)?;

        self.endpoints[ep].calorific_values.entry_by_event_id(event_id)
    }

    pub(crate) fn refresh_calorific_values(&mut self, ep: usize, now: u32) {
        let hooks = self.hooks;
        let endpoint = self.endpoints[ep].id;

        if let Some(index) = self.endpoints[ep].calorific_values.refresh(now) {
            if let Some((info, payload)) = self.endpoints[ep].calorific_values.entry(index) {
                hooks.calorific_value_changed(endpoint, info, payload);
            }
        }
    }

    // --- CO2 value ---

    pub fn publish_co2_value(&mut self, endpoint: EndpointId, cmd: &PublishCo2Value) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        let payload = Co2Value {
            tariff_type: cmd.tariff_type,
            value: cmd.co2_value,
            unit: cmd.co2_value_unit,
            trailing_digit: cmd.co2_value_trailing_digit,
        };

        match insert_scheduled(
            &mut self.endpoints[ep].co2_values,
            Some(cmd.provider_id),
            cmd.issuer_event_id,
            cmd.start_time,
            DURATION_FOREVER,
            DurationType::MINUTES,
            now,
            payload,
        ) {
            Ok(_) => {
                self.schedule_tick_event(endpoint, PendingEvents::CO2_VALUE);
                self.accept(endpoint)
            }
            Err(err) => self.reject(endpoint, (&err).into()),
        }
    }

    pub fn get_co2_value(&mut self, endpoint: EndpointId, req: &GetScheduledEvents) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        send_matching(
            self.sink,
            endpoint,
            &self.endpoints[ep].co2_values,
            req,
            now,
            |info, p| {
                Response::PublishCo2Value(PublishCo2Value {
                    provider_id: info.provider_id,
                    issuer_event_id: info.issuer_event_id,
                    start_time: info.start_time,
                    tariff_type: p.tariff_type,
                    co2_value: p.value,
                    co2_value_unit: p.unit,
                    co2_value_trailing_digit: p.trailing_digit,
                })
            },
        )
    }

    pub fn co2_value_by_event_id(
        &self,
        endpoint: EndpointId,
        event_id: u32,
    ) -> Option<(&EventInfo, &Co2Value)> {
        let ep = self.endpoint_index(endpoint)?;

        self.endpoints[ep].co2_values.entry_by_event_id(event_id)
    }

    pub(crate) fn refresh_co2_values(&mut self, ep: usize, now: u32) {
        let hooks = self.hooks;
        let endpoint = self.endpoints[ep].id;

        if let Some(index) = self.endpoints[ep].co2_values.refresh(now) {
            if let Some((info, payload)) = self.endpoints[ep].co2_values.entry(index) {
                hooks.co2_value_changed(endpoint, info, payload);
            }
        }
    }

    // --- Conversion factor ---

    pub fn publish_conversion_factor(
        &mut self,
        endpoint: EndpointId,
        cmd: &PublishConversionFactor,
    ) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        let payload = ConversionFactor {
            factor: cmd.conversion_factor,
            trailing_digit: cmd.conversion_factor_trailing_digit,
        };

        match insert_scheduled(
            &mut self.endpoints[ep].conversion_factors,
            None,
            cmd.issuer_event_id,
            cmd.start_time,
            DURATION_FOREVER,
            DurationType::MINUTES,
            now,
            payload,
        ) {
            Ok(_) => {
                self.schedule_tick_event(endpoint, PendingEvents::CONVERSION_FACTOR);
                self.accept(endpoint)
            }
            Err(err) => self.reject(endpoint, (&err).into()),
        }
    }

    pub fn get_conversion_factor(&mut self, endpoint: EndpointId, req: &GetScheduledEvents) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        send_matching(
            self.sink,
            endpoint,
            &self.endpoints[ep].conversion_factors,
            req,
            now,
            |info, p| {
                Response::PublishConversionFactor(PublishConversionFactor {
                    issuer_event_id: info.issuer_event_id,
                    start_time: info.start_time,
                    conversion_factor: p.factor,
                    conversion_factor_trailing_digit: p.trailing_digit,
                })
            },
        )
    }

    pub fn conversion_factor_by_event_id(
        &self,
        endpoint: EndpointId,
        event_id: u32,
    ) -> Option<(&EventInfo, &ConversionFactor)> {
        let ep = self.endpoint_index(endpoint)?;

        self.endpoints[ep].conversion_factors.entry_by_event_id(event_id)
    }

    pub(crate) fn refresh_conversion_factors(&mut self, ep: usize, now: u32) {
        let hooks = self.hooks;
        let endpoint = self.endpoints[ep].id;

        if let Some(index) = self.endpoints[ep].conversion_factors.refresh(now) {
            if let Some((info, payload)) = self.endpoints[ep].conversion_factors.entry(index) {
                hooks.conversion_factor_changed(endpoint, info, payload);
            }
        }
    }

    // --- Tariff information ---

    pub fn publish_tariff_information(
        &mut self,
        endpoint: EndpointId,
        cmd: &PublishTariffInformation,
    ) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        let payload = TariffInformation {
            issuer_tariff_id: cmd.issuer_tariff_id,
            tariff_type_charging_scheme: cmd.tariff_type_charging_scheme,
            label: cmd.tariff_label.clone(),
            number_of_price_tiers_in_use: cmd.number_of_price_tiers_in_use,
            number_of_block_thresholds_in_use: cmd.number_of_block_thresholds_in_use,
            unit_of_measure: cmd.unit_of_measure,
            currency: cmd.currency,
            price_trailing_digit: cmd.price_trailing_digit,
            standing_charge: cmd.standing_charge,
            tier_block_mode: cmd.tier_block_mode,
            block_threshold_multiplier: cmd.block_threshold_multiplier,
            block_threshold_divisor: cmd.block_threshold_divisor,
        };

        match insert_scheduled(
            &mut self.endpoints[ep].tariffs,
            Some(cmd.provider_id),
            cmd.issuer_event_id,
            cmd.start_time,
            DURATION_FOREVER,
            DurationType::MINUTES,
            now,
            payload,
        ) {
            Ok(_) => {
                self.schedule_tick_event(endpoint, PendingEvents::TARIFF_INFORMATION);
                self.accept(endpoint)
            }
            Err(err) => self.reject(endpoint, (&err).into()),
        }
    }

    pub fn get_tariff_information(&mut self, endpoint: EndpointId, req: &GetScheduledEvents) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        send_matching(
            self.sink,
            endpoint,
            &self.endpoints[ep].tariffs,
            req,
            now,
            |info, p| {
                Response::PublishTariffInformation(PublishTariffInformation {
                    provider_id: info.provider_id,
                    issuer_event_id: info.issuer_event_id,
                    issuer_tariff_id: p.issuer_tariff_id,
                    start_time: info.start_time,
                    tariff_type_charging_scheme: p.tariff_type_charging_scheme,
                    tariff_label: p.label.clone(),
                    number_of_price_tiers_in_use: p.number_of_price_tiers_in_use,
                    number_of_block_thresholds_in_use: p.number_of_block_thresholds_in_use,
                    unit_of_measure: p.unit_of_measure,
                    currency: p.currency,
                    price_trailing_digit: p.price_trailing_digit,
                    standing_charge: p.standing_charge,
                    tier_block_mode: p.tier_block_mode,
                    block_threshold_multiplier: p.block_threshold_multiplier,
                    block_threshold_divisor: p.block_threshold_divisor,
                })
            },
        )
    }

    pub fn tariff_by_event_id(
        &self,
        endpoint: EndpointId,
        event_id: u32,
    ) -> Option<(&EventInfo, &TariffInformation)> {
        let ep = self.endpoint_index(endpoint)?;

        self.endpoints[ep].tariffs.entry_by_event_id(event_id)
    }

    pub(crate) fn refresh_tariffs(&mut self, ep: usize, now: u32) {
        let hooks = self.hooks;
        let endpoint = self.endpoints[ep].id;

        if let Some(index) = self.endpoints[ep].tariffs.refresh(now) {
            if let Some((info, payload)) = self.endpoints[ep].tariffs.entry(index) {
                hooks.tariff_activated(endpoint, info, payload);
            }
        }
    }

    // --- Price matrix ---

    pub fn publish_price_matrix(&mut self, endpoint: EndpointId, cmd: &PublishPriceMatrix) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        let payload = PriceMatrix {
            issuer_tariff_id: cmd.issuer_tariff_id,
            sub_payload_control: cmd.sub_payload_control,
            entries: cmd.entries.clone(),
        };

        match insert_scheduled(
            &mut self.endpoints[ep].price_matrices,
            Some(cmd.provider_id),
            cmd.issuer_event_id,
            cmd.start_time,
            DURATION_FOREVER,
            DurationType::MINUTES,
            now,
            payload,
        ) {
            Ok(_) => {
                self.schedule_tick_event(endpoint, PendingEvents::PRICE_MATRIX);
                self.accept(endpoint)
            }
            Err(err) => self.reject(endpoint, (&err).into()),
        }
    }

    /// Answers a GetPriceMatrix request: the matrix published for the given
    /// tariff, or NotFound.
    pub fn get_price_matrix(&mut self, endpoint: EndpointId, issuer_tariff_id: u32) -> Status {
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        let table = &self.endpoints[ep].price_matrices;
        let found = (0..table.capacity())
            .filter_map(|i| table.entry(i))
            .find(|(_, p)| p.issuer_tariff_id == issuer_tariff_id);

        match found {
            Some((info, p)) => {
                let response = Response::PublishPriceMatrix(PublishPriceMatrix {
                    provider_id: info.provider_id,
                    issuer_event_id: info.issuer_event_id,
                    start_time: info.start_time,
                    issuer_tariff_id: p.issuer_tariff_id,
                    sub_payload_control: p.sub_payload_control,
                    entries: p.entries.clone(),
                });
                self.sink.send(endpoint, &response);
                Status::Success
            }
            None => self.reject(endpoint, Status::NotFound),
        }
    }

    pub(crate) fn refresh_price_matrices(&mut self, ep: usize, now: u32) {
        let hooks = self.hooks;
        let endpoint = self.endpoints[ep].id;

        if let Some(index) = self.endpoints[ep].price_matrices.refresh(now) {
            if let Some((info, payload)) = self.endpoints[ep].price_matrices.entry(index) {
                hooks.price_matrix_activated(endpoint, info, payload);
            }
        }
    }

    // --- Block thresholds ---

    pub fn publish_block_thresholds(
        &mut self,
        endpoint: EndpointId,
        cmd: &PublishBlockThresholds,
    ) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        let payload = BlockThresholds {
            issuer_tariff_id: cmd.issuer_tariff_id,
            sub_payload_control: cmd.sub_payload_control,
            thresholds: cmd.thresholds.clone(),
        };

        match insert_scheduled(
            &mut self.endpoints[ep].block_thresholds,
            Some(cmd.provider_id),
            cmd.issuer_event_id,
            cmd.start_time,
            DURATION_FOREVER,
            DurationType::MINUTES,
            now,
            payload,
        ) {
            Ok(_) => {
                self.schedule_tick_event(endpoint, PendingEvents::BLOCK_THRESHOLDS);
                self.accept(endpoint)
            }
            Err(err) => self.reject(endpoint, (&err).into()),
        }
    }

    /// Answers a GetBlockThresholds request for the given tariff.
    pub fn get_block_thresholds(&mut self, endpoint: EndpointId, issuer_tariff_id: u32) -> Status {
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        let table = &self.endpoints[ep].block_thresholds;
        let found = (0..table.capacity())
            .filter_map(|i| table.entry(i))
            .find(|(_, p)| p.issuer_tariff_id == issuer_tariff_id);

        match found {
            Some((info, p)) => {
                let response = Response::PublishBlockThresholds(PublishBlockThresholds {
                    provider_id: info.provider_id,
                    issuer_event_id: info.issuer_event_id,
                    start_time: info.start_time,
                    issuer_tariff_id: p.issuer_tariff_id,
                    sub_payload_control: p.sub_payload_control,
                    thresholds: p.thresholds.clone(),
                });
                self.sink.send(endpoint, &response);
                Status::Success
            }
            None => self.reject(endpoint, Status::NotFound),
        }
    }

    pub(crate) fn refresh_block_threshold_tables(&mut self, ep: usize, now: u32) {
        let hooks = self.hooks;
        let endpoint = self.endpoints[ep].id;

        if let Some(index) = self.endpoints[ep].block_thresholds.refresh(now) {
            if let Some((info, payload)) = self.endpoints[ep].block_thresholds.entry(index) {
                hooks.block_thresholds_activated(endpoint, info, payload);
            }
        }
    }

    // --- Credit payment ---

    pub fn publish_credit_payment(
        &mut self,
        endpoint: EndpointId,
        cmd: &PublishCreditPayment,
    ) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        let payload = CreditPayment {
            due_date: cmd.credit_payment_due_date,
            overdue_amount: cmd.credit_payment_overdue_amount,
            status: cmd.credit_payment_status,
            payment: cmd.credit_payment,
            payment_date: cmd.credit_payment_date,
            payment_ref: cmd.credit_payment_ref.clone(),
        };

        match insert_scheduled(
            &mut self.endpoints[ep].credit_payments,
            Some(cmd.provider_id),
            cmd.issuer_event_id,
            cmd.credit_payment_date,
            DURATION_FOREVER,
            DurationType::MINUTES,
            now,
            payload,
        ) {
            Ok(_) => self.accept(endpoint),
            Err(err) => self.reject(endpoint, (&err).into()),
        }
    }

    /// Answers a GetCreditPayment request: up to `number_of_records` payments
    /// with a payment date at or before `latest_end_time` (0 = now), most
    /// recent first. A zero record count returns only the most recent one.
    pub fn get_credit_payment(
        &mut self,
        endpoint: EndpointId,
        latest_end_time: u32,
        number_of_records: u8,
    ) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        let latest = if latest_end_time == 0 { now } else { latest_end_time };
        let wanted = if number_of_records == 0 { 1 } else { number_of_records as usize };

        let table = &self.endpoints[ep].credit_payments;
        let mut taken = [false; CREDIT_PAYMENT_TABLE_SIZE];
        let mut sent = 0;

        while sent < wanted {
            let mut best: Option<usize> = None;
            for i in 0..table.capacity() {
                if taken[i] {
                    continue;
                }
                let Some((_, payload)) = table.entry(i) else {
                    continue;
                };
                if payload.payment_date > latest {
                    continue;
                }
                if best.is_none_or(|b| {
                    table.entry(b).map(|(_, p)| p.payment_date) < Some(payload.payment_date)
                }) {
                    best = Some(i);
                }
            }

            let Some(best) = best else {
                break;
            };
            taken[best] = true;

            if let Some((info, p)) = table.entry(best) {
                let response = Response::PublishCreditPayment(PublishCreditPayment {
                    provider_id: info.provider_id,
                    issuer_event_id: info.issuer_event_id,
                    credit_payment_due_date: p.due_date,
                    credit_payment_overdue_amount: p.overdue_amount,
                    credit_payment_status: p.status,
                    credit_payment: p.payment,
                    credit_payment_date: p.payment_date,
                    credit_payment_ref: p.payment_ref.clone(),
                });
                self.sink.send(endpoint, &response);
                sent += 1;
            }
        }

        if sent == 0 {
            self.reject(endpoint, Status::NotFound)
        } else {
            Status::Success
        }
    }

    // --- Currency conversion ---

    pub fn publish_currency_conversion(
        &mut self,
        endpoint: EndpointId,
        cmd: &PublishCurrencyConversion,
    ) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        let payload = CurrencyConversion {
            old_currency: cmd.old_currency,
            new_currency: cmd.new_currency,
            conversion_factor: cmd.conversion_factor,
            trailing_digit: cmd.conversion_factor_trailing_digit,
            change_control: cmd.currency_change_control,
        };

        match insert_scheduled(
            &mut self.endpoints[ep].currency_conversions,
            Some(cmd.provider_id),
            cmd.issuer_event_id,
            cmd.start_time,
            DURATION_FOREVER,
            DurationType::MINUTES,
            now,
            payload,
        ) {
            Ok(_) => self.accept(endpoint),
            Err(err) => self.reject(endpoint, (&err).into()),
        }
    }

    /// Answers a GetCurrencyConversion request with the conversion in effect.
    pub fn get_currency_conversion(&mut self, endpoint: EndpointId) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        let table = &self.endpoints[ep].currency_conversions;
        match table.active(now).and_then(|i| table.entry(i)) {
            Some((info, p)) => {
                let response = Response::PublishCurrencyConversion(PublishCurrencyConversion {
                    provider_id: info.provider_id,
                    issuer_event_id: info.issuer_event_id,
                    start_time: info.start_time,
                    old_currency: p.old_currency,
                    new_currency: p.new_currency,
                    conversion_factor: p.conversion_factor,
                    conversion_factor_trailing_digit: p.trailing_digit,
                    currency_change_control: p.change_control,
                });
                self.sink.send(endpoint, &response);
                Status::Success
            }
            None => self.reject(endpoint, Status::NotFound),
        }
    }

    // --- Tier labels ---

    pub fn publish_tier_labels(&mut self, endpoint: EndpointId, cmd: &PublishTierLabels) -> Status {
        let now = self.now();
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        let payload = TierLabels {
            issuer_tariff_id: cmd.issuer_tariff_id,
            labels: cmd.labels.clone(),
        };

        match insert_scheduled(
            &mut self.endpoints[ep].tier_labels,
            Some(cmd.provider_id),
            cmd.issuer_event_id,
            0,
            DURATION_FOREVER,
            DurationType::MINUTES,
            now,
            payload,
        ) {
            Ok(_) => self.accept(endpoint),
            Err(err) => self.reject(endpoint, (&err).into()),
        }
    }

    /// Answers a GetTierLabels request for the given tariff.
    pub fn get_tier_labels(&mut self, endpoint: EndpointId, issuer_tariff_id: u32) -> Status {
        let Some(ep) = self.endpoint_index(endpoint) else {
            return self.reject(endpoint, Status::Failure);
        };

        let table = &self.endpoints[ep].tier_labels;
        let found = (0..table.capacity())
            .filter_map(|i| table.entry(i))
            .find(|(_, p)| p.issuer_tariff_id == issuer_tariff_id);

        match found {
            Some((info, p)) => {
                let response = Response::PublishTierLabels(PublishTierLabels {
                    provider_id: info.provider_id,
                    issuer_event_id: info.issuer_event_id,
                    issuer_tariff_id: p.issuer_tariff_id,
                    labels: p.labels.clone(),
                });
                self.sink.send(endpoint, &response);
                Status::Success
            }
            None => self.reject(endpoint, Status::NotFound),
        }
    }
}
