/// Fill the null slots of `series` in place.
///
/// Walks from the right. A null slot takes the floor average of the nearest
/// present value on its left and the slot to its right (which may itself have
/// been filled), or whichever of the two exists. A series with no values is
/// left untouched.
pub fn interpolate_gaps(series: &mut [Option<i64>]) {
    let mut nearest_left = Vec::with_capacity(series.len());
    let mut last_seen = None;
    for slot in series.iter() {
        nearest_left.push(last_seen);
        if slot.is_some() {
            last_seen = *slot;
        }
    }

    let mut right = None;
    for (slot, left) in series.iter_mut().zip(nearest_left).rev() {
        if slot.is_none() {
            *slot = match (left, right) {
                (Some(l), Some(r)) => Some(floor_average(l, r)),
                (Some(v), None) | (None, Some(v)) => Some(v),
                (None, None) => None,
            };
        }
        right = *slot;
    }
}

fn floor_average(a: i64, b: i64) -> i64 {
    ((i128::from(a) + i128::from(b)).div_euclid(2)) as i64
}
