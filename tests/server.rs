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

//! Server behavior: price pagination, current-price lookup, per-kind table
//! managers, billing auto-repeat and the tick scheduler.

#[macro_use]
mod common;

use core::time::Duration;

use rs_price::proto::{
    CppAuth, CppEventResponse, GetCurrentPrice, GetScheduledEvents, GetScheduledPrices,
    PriceMatrixSubPayload, PublishBillingPeriod, PublishConsolidatedBill, PublishConversionFactor,
    PublishCppEvent, PublishPriceMatrix, PublishTariffInformation, PublishTierLabels, Response,
    Status, TierLabel,
};
use rs_price::server::PriceServer;
use rs_price::tick::TICK_GRACE;
use rs_price::time::DurationType;

use common::{init_env_logger, price, RecordingSink, RecordingTimer, ServerRecorder};

const EP: u8 = 1;

fn get_all() -> GetScheduledEvents {
    GetScheduledEvents {
        earliest_start_time: 0,
        min_issuer_event_id: 0,
        number_of_commands: 0,
    }
}

#[test]
fn scheduled_prices_paginate_one_per_pass() {
    init_env_logger();
    let (epoch, set) = test_clock!();
    set(1000);

    let timer = RecordingTimer::new();
    let sink = RecordingSink::new();
    let hooks = ServerRecorder::new();
    let mut server: PriceServer = PriceServer::new([EP], epoch, &timer, &sink, &hooks);

    server.set_price_table_entry(EP, 0, Some(&price(1, 1100, 10))).unwrap();
    server.set_price_table_entry(EP, 1, Some(&price(2, 2000, 10))).unwrap();
    server.set_price_table_entry(EP, 2, Some(&price(3, 3000, 10))).unwrap();

    let req = GetScheduledPrices {
        start_time: 0,
        number_of_events: 0,
    };
    assert_eq!(server.get_scheduled_prices(EP, &req), Status::Success);

    // The request itself runs one pass; the grace re-arm drives the rest.
    assert_eq!(sink.published_price_ids(), vec![1]);
    assert_eq!(timer.armed_for(EP), Some(TICK_GRACE));

    server.tick(EP);
    server.tick(EP);
    assert_eq!(sink.published_price_ids(), vec![1, 2, 3]);

    // The cleanup pass finds the cursor exhausted and goes idle.
    server.tick(EP);
    assert_eq!(sink.published_price_ids(), vec![1, 2, 3]);
    assert_eq!(timer.armed_for(EP), None);
}

#[test]
fn scheduled_prices_honor_the_requested_count() {
    init_env_logger();
    let (epoch, set) = test_clock!();
    set(1000);

    let timer = RecordingTimer::new();
    let sink = RecordingSink::new();
    let hooks = ServerRecorder::new();
    let mut server: PriceServer = PriceServer::new([EP], epoch, &timer, &sink, &hooks);

    server.set_price_table_entry(EP, 0, Some(&price(1, 1100, 10))).unwrap();
    server.set_price_table_entry(EP, 1, Some(&price(2, 2000, 10))).unwrap();
    server.set_price_table_entry(EP, 2, Some(&price(3, 3000, 10))).unwrap();

    let req = GetScheduledPrices {
        start_time: 0,
        number_of_events: 2,
    };
    assert_eq!(server.get_scheduled_prices(EP, &req), Status::Success);
    server.tick(EP);

    assert_eq!(sink.published_price_ids(), vec![1, 2]);
    assert_eq!(timer.armed_for(EP), None);
}

#[test]
fn second_scheduled_prices_transaction_is_rejected() {
    init_env_logger();
    let (epoch, set) = test_clock!();
    set(1000);

    let timer = RecordingTimer::new();
    let sink = RecordingSink::new();
    let hooks = ServerRecorder::new();
    let mut server: PriceServer = PriceServer::new([EP], epoch, &timer, &sink, &hooks);

    server.set_price_table_entry(EP, 0, Some(&price(1, 1100, 10))).unwrap();
    server.set_price_table_entry(EP, 1, Some(&price(2, 2000, 10))).unwrap();

    let req = GetScheduledPrices {
        start_time: 0,
        number_of_events: 0,
    };
    assert_eq!(server.get_scheduled_prices(EP, &req), Status::Success);

    assert_eq!(server.get_scheduled_prices(EP, &req), Status::Failure);
    assert_eq!(sink.last(), Some(Response::Default(Status::Failure)));
}

#[test]
fn current_price_is_the_active_entry() {
    init_env_logger();
    let (epoch, set) = test_clock!();
    set(1000);

    let timer = RecordingTimer::new();
    let sink = RecordingSink::new();
    let hooks = ServerRecorder::new();
    let mut server: PriceServer = PriceServer::new([EP], epoch, &timer, &sink, &hooks);

    server.set_price_table_entry(EP, 0, Some(&price(1, 1100, 10))).unwrap();

    // Nothing has started yet.
    assert_eq!(server.get_current_price(EP, &GetCurrentPrice::default()), Status::NotFound);
    assert_eq!(sink.last(), Some(Response::Default(Status::NotFound)));

    set(1500);
    assert_eq!(server.get_current_price(EP, &GetCurrentPrice::default()), Status::Success);
    match sink.last() {
        Some(Response::PublishPrice(p)) => {
            assert_eq!(p.issuer_event_id, 1);
            assert_eq!(p.start_time, 1100);
        }
        other => panic!("expected a published price, got {:?}", other),
    }
}

#[test]
fn repeating_billing_period_regenerates_itself() {
    init_env_logger();
    let (epoch, set) = test_clock!();
    set(1000);

    let timer = RecordingTimer::new();
    let sink = RecordingSink::new();
    let hooks = ServerRecorder::new();
    let mut server: PriceServer = PriceServer::new([EP], epoch, &timer, &sink, &hooks);

    let cmd = PublishBillingPeriod {
        provider_id: 1,
        issuer_event_id: 10,
        start_time: 0,
        duration: 2,
        duration_type: DurationType::MINUTES,
        tariff_type: 0,
    };
    assert_eq!(server.publish_billing_period(EP, &cmd), Status::Success);

    // The period started immediately and its successor was synthesized.
    assert_eq!(*hooks.billing_periods.borrow(), vec![10]);
    let (info, _) = server.billing_period_by_event_id(EP, 11).unwrap();
    assert_eq!(info.start_time, 1120);
    assert_eq!(timer.armed_for(EP), Some(Duration::from_secs(120)));

    set(1120);
    server.tick(EP);

    assert_eq!(*hooks.billing_periods.borrow(), vec![10, 11]);
    assert!(server.billing_period_by_event_id(EP, 10).is_none());
    assert!(server.billing_period_by_event_id(EP, 12).is_some());
    assert_eq!(timer.armed_for(EP), Some(Duration::from_secs(120)));
}

#[test]
fn conversion_factor_change_fires_once_and_goes_idle() {
    init_env_logger();
    let (epoch, set) = test_clock!();
    set(1000);

    let timer = RecordingTimer::new();
    let sink = RecordingSink::new();
    let hooks = ServerRecorder::new();
    let mut server: PriceServer = PriceServer::new([EP], epoch, &timer, &sink, &hooks);

    let cmd = PublishConversionFactor {
        issuer_event_id: 5,
        start_time: 0,
        conversion_factor: 100,
        conversion_factor_trailing_digit: 1,
    };
    assert_eq!(server.publish_conversion_factor(EP, &cmd), Status::Success);

    assert_eq!(*hooks.conversion_factors.borrow(), vec![5]);
    assert_eq!(timer.armed_for(EP), None);
    assert_eq!(sink.last(), Some(Response::Default(Status::Success)));

    sink.clear();
    assert_eq!(server.get_conversion_factor(EP, &get_all()), Status::Success);
    match sink.last() {
        Some(Response::PublishConversionFactor(f)) => {
            assert_eq!(f.issuer_event_id, 5);
            assert_eq!(f.start_time, 1000);
        }
        other => panic!("expected a published factor, got {:?}", other),
    }
}

#[test]
fn consolidated_bill_cancels_overlapping_older_bills() {
    init_env_logger();
    let (epoch, set) = test_clock!();
    set(1000);

    let timer = RecordingTimer::new();
    let sink = RecordingSink::new();
    let hooks = ServerRecorder::new();
    let mut server: PriceServer = PriceServer::new([EP], epoch, &timer, &sink, &hooks);

    let bill = |id: u32, start_time: u32| PublishConsolidatedBill {
        provider_id: 1,
        issuer_event_id: id,
        start_time,
        duration: 60,
        duration_type: DurationType::MINUTES,
        consolidated_bill: 12345,
        currency: 978,
        bill_trailing_digit: 2,
    };

    // The first bill is already in effect and fires right away.
    assert_eq!(server.publish_consolidated_bill(EP, &bill(1, 1000)), Status::Success);
    assert_eq!(*hooks.bills.borrow(), vec![1]);

    // The newer overlapping bill cancels it.
    assert_eq!(server.publish_consolidated_bill(EP, &bill(2, 2000)), Status::Success);
    assert!(server.consolidated_bill_by_event_id(EP, 1).is_none());
    assert!(server.consolidated_bill_by_event_id(EP, 2).is_some());
    assert_eq!(*hooks.bills.borrow(), vec![1]);

    sink.clear();
    assert_eq!(server.get_consolidated_bill(EP, &get_all()), Status::Success);
    match sink.last() {
        Some(Response::PublishConsolidatedBill(b)) => {
            assert_eq!(b.issuer_event_id, 2);
            assert_eq!(b.start_time, 2000);
            assert_eq!(b.consolidated_bill, 12345);
        }
        other => panic!("expected a published bill, got {:?}", other),
    }
}

#[test]
fn empty_tables_answer_not_found() {
    init_env_logger();
    let (epoch, set) = test_clock!();
    set(1000);

    let timer = RecordingTimer::new();
    let sink = RecordingSink::new();
    let hooks = ServerRecorder::new();
    let mut server: PriceServer = PriceServer::new([EP], epoch, &timer, &sink, &hooks);

    assert_eq!(server.get_billing_period(EP, &get_all()), Status::NotFound);
    assert_eq!(sink.last(), Some(Response::Default(Status::NotFound)));

    assert_eq!(server.get_block_period(EP, &get_all()), Status::NotFound);
    assert_eq!(server.get_price_matrix(EP, 1), Status::NotFound);
    assert_eq!(server.get_tier_labels(EP, 1), Status::NotFound);
    assert_eq!(server.get_currency_conversion(EP), Status::NotFound);
}

#[test]
fn tariff_matrix_and_tier_labels_are_linked_by_tariff_id() {
    init_env_logger();
    let (epoch, set) = test_clock!();
    set(1000);

    let timer = RecordingTimer::new();
    let sink = RecordingSink::new();
    let hooks = ServerRecorder::new();
    let mut server: PriceServer = PriceServer::new([EP], epoch, &timer, &sink, &hooks);

    let tariff = PublishTariffInformation {
        provider_id: 1,
        issuer_event_id: 20,
        issuer_tariff_id: 77,
        start_time: 0,
        tariff_label: "STANDARD".try_into().unwrap(),
        number_of_price_tiers_in_use: 2,
        ..Default::default()
    };
    assert_eq!(server.publish_tariff_information(EP, &tariff), Status::Success);
    assert_eq!(*hooks.tariffs.borrow(), vec![20]);

    let mut entries = heapless::Vec::new();
    entries
        .push(PriceMatrixSubPayload {
            tier_block_id: 1,
            price: 990,
        })
        .unwrap();
    let matrix = PublishPriceMatrix {
        provider_id: 1,
        issuer_event_id: 21,
        start_time: 0,
        issuer_tariff_id: 77,
        sub_payload_control: 0,
        entries,
    };
    assert_eq!(server.publish_price_matrix(EP, &matrix), Status::Success);

    let mut labels = heapless::Vec::new();
    labels
        .push(TierLabel {
            tier_id: 1,
            label: "PEAK".try_into().unwrap(),
        })
        .unwrap();
    let tier_labels = PublishTierLabels {
        provider_id: 1,
        issuer_event_id: 22,
        issuer_tariff_id: 77,
        labels,
    };
    assert_eq!(server.publish_tier_labels(EP, &tier_labels), Status::Success);

    sink.clear();
    assert_eq!(server.get_price_matrix(EP, 77), Status::Success);
    match sink.last() {
        Some(Response::PublishPriceMatrix(m)) => {
            assert_eq!(m.issuer_tariff_id, 77);
            assert_eq!(m.entries.len(), 1);
        }
        other => panic!("expected a published matrix, got {:?}", other),
    }

    assert_eq!(server.get_tier_labels(EP, 77), Status::Success);
    assert_eq!(server.get_tier_labels(EP, 99), Status::NotFound);
}

#[test]
fn cpp_event_roundtrip_records_the_client_answer() {
    init_env_logger();
    let (epoch, set) = test_clock!();
    set(1000);

    let timer = RecordingTimer::new();
    let sink = RecordingSink::new();
    let hooks = ServerRecorder::new();
    let mut server: PriceServer = PriceServer::new([EP], epoch, &timer, &sink, &hooks);

    let cmd = PublishCppEvent {
        provider_id: 1,
        issuer_event_id: 42,
        start_time: 0,
        duration_in_minutes: 30,
        tariff_type: 0,
        cpp_price_tier: 1,
        cpp_auth: CppAuth::Pending,
    };
    assert_eq!(server.publish_cpp_event(EP, &cmd), Status::Success);
    assert!(matches!(sink.last(), Some(Response::PublishCppEvent(_))));

    let resp = CppEventResponse {
        issuer_event_id: 42,
        cpp_auth: CppAuth::Accepted,
    };
    assert_eq!(server.cpp_event_response(EP, &resp), Status::Success);

    let (event, auth) = server.cpp_event(EP).unwrap();
    assert_eq!(event.start_time, 1000);
    assert_eq!(*auth, CppAuth::Accepted);
}

#[test]
fn init_resets_every_table() {
    init_env_logger();
    let (epoch, set) = test_clock!();
    set(1000);

    let timer = RecordingTimer::new();
    let sink = RecordingSink::new();
    let hooks = ServerRecorder::new();
    let mut server: PriceServer = PriceServer::new([EP], epoch, &timer, &sink, &hooks);

    server.set_price_table_entry(EP, 0, Some(&price(1, 1100, 10))).unwrap();
    let cmd = PublishBillingPeriod {
        provider_id: 1,
        issuer_event_id: 10,
        start_time: 2000,
        duration: 2,
        duration_type: DurationType::MINUTES,
        tariff_type: 0,
    };
    server.publish_billing_period(EP, &cmd);

    server.init(EP);
    assert!(server.price_table_entry(EP, 0).is_none());
    assert!(server.billing_period_by_event_id(EP, 10).is_none());

    server.init(EP);
    assert!(server.price_by_event_id(EP, 1).is_none());
}
