//! Combination engine: change detection, sum, clamp, publish.

use crate::channels::DeviceChannelSet;
use mdm_common::consts::{DM_COMMAND_MAX, DM_COMMAND_MIN, DM_VIRTUAL_ACTUATORS};
use mdm_shm::ShmResult;

/// Clamp one combined cell into the command range. NaN maps to the minimum.
#[inline]
pub fn clamp(value: f64) -> f64 {
    if value.is_nan() {
        DM_COMMAND_MIN
    } else {
        value.clamp(DM_COMMAND_MIN, DM_COMMAND_MAX)
    }
}

#[inline]
fn accumulate(sum: &mut [f64], frame: &[f64]) {
    for (cell, value) in sum.iter_mut().zip(frame) {
        *cell += *value;
    }
}

#[inline]
fn clamp_all(cells: &mut [f64]) {
    for cell in cells {
        *cell = clamp(*cell);
    }
}

/// Sum `channels` cell by cell into `out`, then clamp every cell.
pub fn combine_into<'a>(channels: impl IntoIterator<Item = &'a [f64]>, out: &mut [f64]) {
    out.fill(0.0);
    for channel in channels {
        accumulate(out, channel);
    }
    clamp_all(out);
}

/// Per-device combination state.
///
/// Holds the counters of the last published combination plus the scratch
/// buffers the hot path reuses, one frame per writable channel.
pub struct Combiner {
    observed: Vec<u64>,
    pending: Vec<u64>,
    frames: Vec<Vec<f64>>,
    sum: Vec<f64>,
}

impl Combiner {
    /// Take the current channel counters of `set` as baseline.
    pub fn baseline(set: &DeviceChannelSet) -> Self {
        let observed = set.channel_counters();
        Self {
            pending: observed.clone(),
            observed,
            frames: vec![vec![0.0; DM_VIRTUAL_ACTUATORS]; set.channel_count()],
            sum: vec![0.0; DM_VIRTUAL_ACTUATORS],
        }
    }

    /// Counters of the last published combination, one per writable channel.
    pub fn observed(&self) -> &[u64] {
        &self.observed
    }

    /// Recombine `set` if any channel counter moved since the last
    /// published combination.
    ///
    /// Returns the clamped grid that was published to the combined buffer,
    /// or `None` when no channel changed. Channel reads do not wait for
    /// writers. On error the counters are left alone, so the next call
    /// tries the same update again.
    pub fn poll_and_combine(&mut self, set: &DeviceChannelSet) -> ShmResult<Option<&[f64]>> {
        let mut changed = false;
        let counters = self.pending.iter_mut().zip(&self.observed);
        for ((pending, observed), channel) in counters.zip(set.channels()) {
            *pending = channel.counter();
            changed |= *pending > *observed;
        }
        if !changed {
            return Ok(None);
        }

        for (frame, channel) in self.frames.iter_mut().zip(set.channels()) {
            channel.read_into(frame)?;
        }
        combine_into(self.frames.iter().map(Vec::as_slice), &mut self.sum);

        set.combined().publish(&self.sum)?;
        self.observed.copy_from_slice(&self.pending);
        Ok(Some(&self.sum))
    }
}
