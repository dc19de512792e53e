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

//! Smart Energy Price cluster scheduled-event engine.
//!
//! This crate implements the in-memory, time-indexed event tables behind the
//! Price cluster: one fixed-capacity table per data kind (prices, billing
//! periods, block periods, tariffs, CO2 values, conversion factors, calorific
//! values, consolidated bills, credit payments, currency conversions, CPP
//! events, tier labels), a set of common algorithms operating uniformly over
//! any such table, and a cooperative tick scheduler that activates and expires
//! entries and fires the corresponding notifications.
//!
//! The crate is transport-agnostic: commands arrive and leave as typed structs
//! (see [`proto`]), the clock is an injected [`epoch::Epoch`] function, and all
//! waiting is delegated to an external one-shot timer via the
//! [`hooks::TickTimer`] seam. Everything is single-threaded and
//! callback-driven; the contexts ([`client::PriceClient`],
//! [`server::PriceServer`]) must be confined to one execution context.

#![cfg_attr(not(feature = "std"), no_std)]
#![allow(clippy::uninlined_format_args)]

#[cfg(all(feature = "log", feature = "defmt"))]
compile_error!("Only one of the `log` and `defmt` features can be enabled at a time");

#[macro_use]
mod fmt;

pub mod client;
pub mod common;
pub mod epoch;
pub mod error;
pub mod flags;
pub mod hooks;
pub mod proto;
pub mod server;
pub mod table;
pub mod tick;
pub mod time;

/// A Zigbee application endpoint identifier.
pub type EndpointId = u8;
