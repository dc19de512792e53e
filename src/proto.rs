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

//! Typed command payloads and the protocol status taxonomy.
//!
//! The wire codec is out of scope for this crate: incoming commands arrive as
//! the structs below (fully decoded) and outgoing commands leave as
//! [`Response`] values through the [`crate::hooks::CommandSink`] seam.

use num_derive::FromPrimitive;

use crate::error::{Error, ErrorCode};
use crate::flags::bitflags;
use crate::time::DurationType;

/// Maximum length of the human-readable label strings carried by prices,
/// tariffs and tier labels.
pub const LABEL_LEN: usize = 12;

pub type Label = heapless::String<LABEL_LEN>;

/// The closed status taxonomy surfaced at the protocol boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    Success,
    DuplicateExists,
    InsufficientSpace,
    InvalidField,
    NotFound,
    Failure,
}

impl From<ErrorCode> for Status {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Duplicate => Self::DuplicateExists,
            ErrorCode::NoSpace => Self::InsufficientSpace,
            ErrorCode::NotFound => Self::NotFound,
            ErrorCode::Invalid | ErrorCode::InvalidData => Self::InvalidField,
            _ => Self::Failure,
        }
    }
}

impl From<&Error> for Status {
    fn from(err: &Error) -> Self {
        err.code().into()
    }
}

bitflags! {
    /// The price control field of `PublishPrice` / `PriceAcknowledgement`.
    #[repr(transparent)]
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct PriceControl: u8 {
        const ACK_REQUIRED = 0x01;
        const TOTAL_TIERS_GT_15 = 0x02;
        /// Internal marker: the price was received with a zero ("start now")
        /// start time. Reserved on the wire.
        const STARTED_NOW = 0x80;
    }
}

bitflags! {
    /// The block period control field of `PublishBlockPeriod`.
    #[repr(transparent)]
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct BlockPeriodControl: u8 {
        const PRICE_ACK_REQUIRED = 0x01;
        const REPEATING = 0x02;
    }
}

/// Critical Peak Pricing authorization state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CppAuth {
    #[default]
    Pending = 0,
    Accepted = 1,
    Rejected = 2,
    Forced = 3,
}

/// "Until changed" sentinel for the minute-granularity price duration.
pub const PRICE_DURATION_UNTIL_CHANGED: u16 = 0xFFFF;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PublishPrice {
    pub provider_id: u32,
    pub rate_label: Label,
    pub issuer_event_id: u32,
    /// Sender's clock at transmit time, informational.
    pub current_time: u32,
    pub unit_of_measure: u8,
    pub currency: u16,
    pub price_trailing_digit_and_tier: u8,
    pub number_of_price_tiers_and_register_tier: u8,
    /// Raw start time; 0 means "now".
    pub start_time: u32,
    /// [`PRICE_DURATION_UNTIL_CHANGED`] means the price runs until changed.
    pub duration_in_minutes: u16,
    pub price: u32,
    pub price_ratio: u8,
    pub generation_price: u32,
    pub generation_price_ratio: u8,
    pub alternate_cost_delivered: u32,
    pub alternate_cost_unit: u8,
    pub alternate_cost_trailing_digit: u8,
    pub number_of_block_thresholds: u8,
    pub price_control: PriceControl,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PriceAcknowledgement {
    pub provider_id: u32,
    pub issuer_event_id: u32,
    pub price_ack_time: u32,
    pub control: PriceControl,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GetCurrentPrice {
    pub command_options: u8,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GetScheduledPrices {
    /// 0 means "now".
    pub start_time: u32,
    /// 0 means "all".
    pub number_of_events: u8,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PublishBlockPeriod {
    pub provider_id: u32,
    pub issuer_event_id: u32,
    /// Raw start time; 0 means "now".
    pub start_time: u32,
    /// Raw duration in duration-type units.
    pub duration: u32,
    pub duration_type: DurationType,
    pub block_period_control: BlockPeriodControl,
    pub tariff_type: u8,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PublishBillingPeriod {
    pub provider_id: u32,
    pub issuer_event_id: u32,
    /// Raw start time; 0 means "now" and makes the period repeating.
    pub start_time: u32,
    /// Raw duration in duration-type units.
    pub duration: u32,
    pub duration_type: DurationType,
    pub tariff_type: u8,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PublishConversionFactor {
    pub issuer_event_id: u32,
    /// Raw start time; 0 means "now".
    pub start_time: u32,
    pub conversion_factor: u32,
    pub conversion_factor_trailing_digit: u8,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PublishCalorificValue {
    pub issuer_event_id: u32,
    /// Raw start time; 0 means "now".
    pub start_time: u32,
    pub calorific_value: u32,
    pub calorific_value_unit: u8,
    pub calorific_value_trailing_digit: u8,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PublishCo2Value {
    pub provider_id: u32,
    pub issuer_event_id: u32,
    /// Raw start time; 0 means "now".
    pub start_time: u32,
    pub tariff_type: u8,
    pub co2_value: u32,
    pub co2_value_unit: u8,
    pub co2_value_trailing_digit: u8,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PublishTariffInformation {
    pub provider_id: u32,
    pub issuer_event_id: u32,
    pub issuer_tariff_id: u32,
    /// Raw start time; 0 means "now".
    pub start_time: u32,
    pub tariff_type_charging_scheme: u8,
    pub tariff_label: Label,
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

pub const PRICE_MATRIX_SUB_PAYLOAD_LEN: usize = 16;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PriceMatrixSubPayload {
    pub tier_block_id: u8,
    pub price: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PublishPriceMatrix {
    pub provider_id: u32,
    pub issuer_event_id: u32,
    /// Raw start time; 0 means "now".
    pub start_time: u32,
    pub issuer_tariff_id: u32,
    pub sub_payload_control: u8,
    pub entries: heapless::Vec<PriceMatrixSubPayload, PRICE_MATRIX_SUB_PAYLOAD_LEN>,
}

pub const BLOCK_THRESHOLD_LEN: usize = 15;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PublishBlockThresholds {
    pub provider_id: u32,
    pub issuer_event_id: u32,
    /// Raw start time; 0 means "now".
    pub start_time: u32,
    pub issuer_tariff_id: u32,
    pub sub_payload_control: u8,
    /// 48-bit quantities on the wire.
    pub thresholds: heapless::Vec<u64, BLOCK_THRESHOLD_LEN>,
}

pub const BILL_TRAILING_DIGIT_SHIFT: u8 = 4;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PublishConsolidatedBill {
    pub provider_id: u32,
    pub issuer_event_id: u32,
    /// Raw start time; 0 means "now".
    pub start_time: u32,
    /// Raw duration in duration-type units.
    pub duration: u32,
    pub duration_type: DurationType,
    pub consolidated_bill: u32,
    pub currency: u16,
    pub bill_trailing_digit: u8,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PublishCreditPayment {
    pub provider_id: u32,
    pub issuer_event_id: u32,
    pub credit_payment_due_date: u32,
    pub credit_payment_overdue_amount: u32,
    pub credit_payment_status: u8,
    pub credit_payment: u32,
    pub credit_payment_date: u32,
    pub credit_payment_ref: heapless::String<20>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PublishCurrencyConversion {
    pub provider_id: u32,
    pub issuer_event_id: u32,
    /// Raw start time; 0 means "now".
    pub start_time: u32,
    pub old_currency: u16,
    pub new_currency: u16,
    pub conversion_factor: u32,
    pub conversion_factor_trailing_digit: u8,
    pub currency_change_control: u32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PublishCppEvent {
    pub provider_id: u32,
    pub issuer_event_id: u32,
    /// Raw start time; 0 means "now".
    pub start_time: u32,
    pub duration_in_minutes: u16,
    pub tariff_type: u8,
    pub cpp_price_tier: u8,
    pub cpp_auth: CppAuth,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CppEventResponse {
    pub issuer_event_id: u32,
    pub cpp_auth: CppAuth,
}

pub const TIER_LABELS_LEN: usize = 8;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TierLabel {
    pub tier_id: u8,
    pub label: Label,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PublishTierLabels {
    pub provider_id: u32,
    pub issuer_event_id: u32,
    pub issuer_tariff_id: u32,
    pub labels: heapless::Vec<TierLabel, TIER_LABELS_LEN>,
}

/// Parameters shared by most of the GetXxx requests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GetScheduledEvents {
    /// 0 means "now".
    pub earliest_start_time: u32,
    /// 0 means "any".
    pub min_issuer_event_id: u32,
    /// 0 means "all".
    pub number_of_commands: u8,
}

/// An outgoing cluster command, fully populated by the core and handed to the
/// [`crate::hooks::CommandSink`] for transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Response {
    PublishPrice(PublishPrice),
    PriceAcknowledgement(PriceAcknowledgement),
    PublishBlockPeriod(PublishBlockPeriod),
    PublishBillingPeriod(PublishBillingPeriod),
    PublishConversionFactor(PublishConversionFactor),
    PublishCalorificValue(PublishCalorificValue),
    PublishCo2Value(PublishCo2Value),
    PublishTariffInformation(PublishTariffInformation),
    PublishPriceMatrix(PublishPriceMatrix),
    PublishBlockThresholds(PublishBlockThresholds),
    PublishConsolidatedBill(PublishConsolidatedBill),
    PublishCreditPayment(PublishCreditPayment),
    PublishCurrencyConversion(PublishCurrencyConversion),
    PublishCppEvent(PublishCppEvent),
    CppEventResponse(CppEventResponse),
    PublishTierLabels(PublishTierLabels),
    /// A generic default response carrying one of the [`Status`] codes.
    Default(Status),
}
