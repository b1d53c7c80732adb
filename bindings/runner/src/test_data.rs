//! Payloads for one iteration of the booking flow.
//!
//! Identity strings embed the virtual user id and iteration so that records created by the load
//! test are easy to find and never collide between virtual users.

use booking_client_instrumented::prelude::{
    ClaimEntryRequest, ClaimItem, ClaimLockRequest, Gender, IdType, PaymentCallbackRequest,
    TicketData,
};
use rand::Rng;

use crate::settings::BookingSettings;

const ID_NUMBER_MIN: u64 = 1_000_000_000_000_000;
const ID_NUMBER_MAX: u64 = 9_999_999_999_999_999;

/// A 16 digit national identity number.
pub fn id_number<R: Rng>(rng: &mut R) -> String {
    rng.gen_range(ID_NUMBER_MIN..=ID_NUMBER_MAX).to_string()
}

/// `08` followed by 9 digits.
pub fn phone_number<R: Rng>(rng: &mut R) -> String {
    format!("08{:09}", rng.gen_range(0..1_000_000_000u32))
}

pub fn claim_lock_request(schedule_id: u32, settings: &BookingSettings) -> ClaimLockRequest {
    ClaimLockRequest {
        schedule_id,
        items: vec![ClaimItem {
            class_id: settings.class_id,
            quantity: settings.passengers as u32,
        }],
    }
}

pub fn passenger<R: Rng>(rng: &mut R, vu_id: u64, iteration: u64, n: usize, class_id: u32) -> TicketData {
    TicketData {
        class_id,
        passenger_name: format!("Pass{vu_id}-{iteration}-{n}"),
        passenger_age: rng.gen_range(18..=67),
        passenger_gender: if rng.gen_bool(0.5) {
            Gender::Male
        } else {
            Gender::Female
        },
        id_type: IdType::Ktp,
        id_number: id_number(rng),
        address: format!("Addr {vu_id} {iteration}"),
    }
}

pub fn claim_entry_request<R: Rng>(
    rng: &mut R,
    vu_id: u64,
    iteration: u64,
    settings: &BookingSettings,
) -> ClaimEntryRequest {
    ClaimEntryRequest {
        customer_name: format!("LoadTest{vu_id}-{iteration}"),
        id_type: IdType::Ktp,
        id_number: id_number(rng),
        phone_number: phone_number(rng),
        email: format!("lt{vu_id}-{iteration}@test.com"),
        payment_method: settings.payment_method.clone(),
        ticket_data: (1..=settings.passengers)
            .map(|n| passenger(rng, vu_id, iteration, n, settings.class_id))
            .collect(),
    }
}

/// `epoch_ms` is the wall clock time in milliseconds when the callback is built.
pub fn payment_callback_request(
    vu_id: u64,
    iteration: u64,
    order_id: &str,
    epoch_ms: i64,
    settings: &BookingSettings,
) -> PaymentCallbackRequest {
    PaymentCallbackRequest {
        reference: format!("LT_{epoch_ms}_{vu_id}_{iteration}"),
        merchant_ref: order_id.to_string(),
        status: "PAID".to_string(),
        amount: settings.amount,
        payment_method: settings.payment_method.clone(),
        signature: format!("SIGN_{epoch_ms}_{vu_id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn id_numbers_are_always_16_digits() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..10_000 {
            let id = id_number(&mut rng);
            assert_eq!(16, id.len(), "{id}");
            assert!(id.chars().all(|c| c.is_ascii_digit()));
            assert!(!id.starts_with('0'));
        }
    }

    #[test]
    fn phone_numbers_are_08_and_9_digits() {
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..10_000 {
            let phone = phone_number(&mut rng);
            assert_eq!(11, phone.len(), "{phone}");
            assert!(phone.starts_with("08"));
            assert!(phone.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn passengers_are_adults_of_working_age() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut genders = HashSet::new();
        for n in 0..2_000 {
            let passenger = passenger(&mut rng, 1, 0, n, 1);
            assert!((18..=67).contains(&passenger.passenger_age));
            genders.insert(passenger.passenger_gender);
        }
        assert_eq!(2, genders.len());
    }

    #[test]
    fn claim_entry_identity_is_unique_per_vu_and_iteration() {
        let mut rng = StdRng::seed_from_u64(4);
        let settings = BookingSettings {
            passengers: 2,
            ..Default::default()
        };

        let a = claim_entry_request(&mut rng, 1, 12, &settings);
        let b = claim_entry_request(&mut rng, 11, 2, &settings);

        assert_eq!("LoadTest1-12", a.customer_name);
        assert_eq!("lt1-12@test.com", a.email);
        assert_ne!(a.customer_name, b.customer_name);
        assert_ne!(a.email, b.email);

        assert_eq!(2, a.ticket_data.len());
        assert_eq!("Pass1-12-1", a.ticket_data[0].passenger_name);
        assert_eq!("Pass1-12-2", a.ticket_data[1].passenger_name);
        assert_eq!("Addr 1 12", a.ticket_data[0].address);
        assert_eq!("BRIVA", a.payment_method);
    }

    #[test]
    fn claim_lock_asks_for_one_seat_per_passenger() {
        let settings = BookingSettings {
            class_id: 3,
            passengers: 2,
            ..Default::default()
        };
        let request = claim_lock_request(4, &settings);

        assert_eq!(4, request.schedule_id);
        assert_eq!(
            vec![ClaimItem {
                class_id: 3,
                quantity: 2
            }],
            request.items
        );
    }

    #[test]
    fn payment_callback_references_the_order() {
        let request =
            payment_callback_request(7, 3, "ORD-9", 1_700_000_000_000, &BookingSettings::default());

        assert_eq!(
            PaymentCallbackRequest {
                reference: "LT_1700000000000_7_3".to_string(),
                merchant_ref: "ORD-9".to_string(),
                status: "PAID".to_string(),
                amount: 100_000,
                payment_method: "BRIVA".to_string(),
                signature: "SIGN_1700000000000_7".to_string(),
            },
            request
        );
    }
}
