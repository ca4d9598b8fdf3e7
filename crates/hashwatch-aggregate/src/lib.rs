//! Time-bin aggregation of raw metric samples into chart series.
//!
//! Farm-wide charts downsample raw rows into fixed-width bins: hashrate
//! and power are summed per bin (the samples are per-miner shares of a
//! farm total), temperature and fan speed are averaged over the samples
//! that actually reported a reading.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use hashwatch_types::{
    metrics::MetricSample,
    series::{FarmSeries, SeriesPoint},
};
use tracing::debug;

#[derive(Default)]
struct BinAccum {
    hashrate_ths: f64,
    power_w: f64,
    temp_sum: f64,
    temp_count: u32,
    fan_sum: f64,
    fan_count: u32,
}

/// Aggregate samples into `bin_minutes`-wide bins keyed by the floor of
/// the sample time. Rows with unparsable timestamps are dropped; output
/// is sorted by ascending bin start with one point per bin.
pub fn bin_series(samples: &[MetricSample], bin_minutes: u32) -> FarmSeries {
    if bin_minutes == 0 {
        return FarmSeries::empty(0);
    }
    let width_ms = i64::from(bin_minutes) * 60_000;

    let mut bins: BTreeMap<i64, BinAccum> = BTreeMap::new();
    let mut dropped = 0usize;
    for sample in samples {
        let Some(at) = parse_timestamp(&sample.timestamp) else {
            dropped += 1;
            continue;
        };
        let key = at.timestamp_millis().div_euclid(width_ms) * width_ms;
        let accum = bins.entry(key).or_default();
        accum.hashrate_ths += finite_or_zero(sample.hashrate_ths);
        accum.power_w += finite_or_zero(sample.power_w);
        if sample.avg_temp_c.is_finite() && sample.avg_temp_c > 0.0 {
            accum.temp_sum += sample.avg_temp_c;
            accum.temp_count += 1;
        }
        if sample.avg_fan_rpm.is_finite() && sample.avg_fan_rpm > 0.0 {
            accum.fan_sum += sample.avg_fan_rpm;
            accum.fan_count += 1;
        }
    }
    if dropped > 0 {
        debug!("dropped {dropped} samples with unparsable timestamps");
    }

    let points = bins
        .into_iter()
        .filter_map(|(key, accum)| {
            Some(SeriesPoint {
                bucket: Utc.timestamp_millis_opt(key).single()?,
                hashrate_ths: accum.hashrate_ths,
                power_w: accum.power_w,
                avg_temp_c: mean(accum.temp_sum, accum.temp_count),
                avg_fan_rpm: mean(accum.fan_sum, accum.fan_count),
            })
        })
        .collect();

    FarmSeries {
        bin_minutes,
        points,
    }
}

/// Per-sample series for single-miner charts: no binning, same lenient
/// timestamp handling, sorted by sample time.
pub fn raw_series(samples: &[MetricSample]) -> FarmSeries {
    let mut points: Vec<SeriesPoint> = samples
        .iter()
        .filter_map(|sample| {
            Some(SeriesPoint {
                bucket: parse_timestamp(&sample.timestamp)?,
                hashrate_ths: finite_or_zero(sample.hashrate_ths),
                power_w: finite_or_zero(sample.power_w),
                avg_temp_c: finite_or_zero(sample.avg_temp_c),
                avg_fan_rpm: finite_or_zero(sample.avg_fan_rpm),
            })
        })
        .collect();
    points.sort_by_key(|p| p.bucket);
    FarmSeries {
        bin_minutes: 0,
        points,
    }
}

/// ISO-8601, with or without an offset; servers in the field emit both.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn mean(sum: f64, count: u32) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / f64::from(count)
    }
}
