//! Partitioner
//!
//! Splits an ordered unit list into fixed-size batches. Pure: no logging,
//! no side effects.

use labctl_core::{CoreError, CoreResult};

use crate::models::{Batch, Unit};

/// Split `units` into batches of at most `batch_size`, preserving order.
///
/// The last batch may be smaller. An empty input yields no batches.
pub fn partition(units: Vec<Unit>, batch_size: usize) -> CoreResult<Vec<Batch>> {
    if batch_size == 0 {
        return Err(CoreError::invalid_configuration(
            "batch_size must be greater than 0",
        ));
    }

    let mut batches = Vec::with_capacity(units.len().div_ceil(batch_size));
    let mut iter = units.into_iter().peekable();
    while iter.peek().is_some() {
        let chunk: Vec<Unit> = iter.by_ref().take(batch_size).collect();
        batches.push(Batch {
            index: batches.len(),
            units: chunk,
        });
    }

    Ok(batches)
}
