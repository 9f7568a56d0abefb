// crates/core/src/projector.rs
//! Pure projection of a history snapshot into a chart-ready series.
//!
//! Deterministic given the snapshot: no clocks, no I/O. The pipeline
//! recomputes this on every feed emission.

use crate::types::{ChartSeries, HistoryEntry};

/// Fraction of the value range added as padding on each side of the axis.
const RANGE_PADDING: f64 = 0.2;

/// Round to two decimal places (half away from zero, like `toFixed(2)`).
fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Project a chronological snapshot into labels, percentage values, and
/// dynamic axis bounds.
///
/// The snapshot must already be in ascending order (oldest first) -- the
/// feed delivers it that way. Each point is labeled
/// `"{top label} {1-based position}"`, where position is the entry's
/// place in the ascending feed order, not the reversed display list.
///
/// Axis bounds: with all values equal the axis is forced to a
/// non-degenerate `[min - 1, max + 1]`; otherwise each side gets 20% of
/// the value range as padding. An empty series gets a fixed `[0, 1]`
/// axis so downstream chart options never divide by a zero height.
///
/// Entries with an empty result list contribute nothing to the series;
/// they are logged and skipped rather than poisoning the values with NaN.
pub fn project(snapshot: &[HistoryEntry]) -> ChartSeries {
    let mut labels = Vec::with_capacity(snapshot.len());
    let mut values = Vec::with_capacity(snapshot.len());

    for (index, entry) in snapshot.iter().enumerate() {
        let Some(top) = entry.top_result() else {
            tracing::warn!(entry_id = %entry.id, "history entry has no classification result, skipping");
            continue;
        };
        labels.push(format!("{} {}", top.label, index + 1));
        values.push(round2(top.score * 100.0));
    }

    let (suggested_min, suggested_max) = axis_bounds(&values);

    ChartSeries {
        labels,
        values,
        suggested_min,
        suggested_max,
    }
}

/// Compute padded axis bounds from the rounded percentage values.
fn axis_bounds(values: &[f64]) -> (f64, f64) {
    let Some(first) = values.first() else {
        return (0.0, 1.0);
    };

    let mut min = *first;
    let mut max = *first;
    for v in &values[1..] {
        min = min.min(*v);
        max = max.max(*v);
    }

    let range = max - min;
    if range == 0.0 {
        (min - 1.0, max + 1.0)
    } else {
        let buffer = range * RANGE_PADDING;
        (min - buffer, max + buffer)
    }
}
