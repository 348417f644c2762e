//! Per-field change tracking applied when an item is observed again.

use crate::models::{ItemObservation, ItemRecord};

/// Which tracked fields changed while applying one observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldChanges {
    pub price: bool,
    pub availability: bool,
}

/// Replace `value` with `fetched` when it carries something new, keeping the
/// old value in `previous`. Returns whether a change happened.
pub fn track_change<T: PartialEq>(value: &mut Option<T>, previous: &mut Option<T>, fetched: Option<T>) -> bool {
    match fetched {
        Some(fetched) if value.as_ref() != Some(&fetched) => {
            *previous = value.take();
            *value = Some(fetched);
            true
        }
        _ => false,
    }
}

/// Apply price, availability and stock count from an observation to a
/// stored record, setting the per-tick change flags.
pub fn apply_tracked_fields(record: &mut ItemRecord, obs: &ItemObservation) -> FieldChanges {
    let price = track_change(&mut record.price, &mut record.prev_price, obs.price.clone());

    let message = track_change(
        &mut record.availability_message,
        &mut record.prev_availability_message,
        obs.availability_message.clone(),
    );
    let flag = track_change(&mut record.available, &mut record.prev_available, obs.available);

    if obs.in_stock_allocation.is_some() {
        record.in_stock_allocation = obs.in_stock_allocation;
    }

    record.price_changed = price;
    record.availability_changed = message || flag;

    FieldChanges {
        price,
        availability: message || flag,
    }
}
