//! Evenly spaced parameter steps and the per-FX cache of discovered step counts.

use std::collections::HashMap;

use csurf_types::TrackId;

use crate::daw::Daw;

/// Value of step `index` out of `count`, rounded to two decimals.
pub fn enum_stepped_value(count: usize, index: usize) -> f64 {
    if count < 2 {
        return 0.0;
    }
    ((index as f64 / (count - 1) as f64) * 100.0 + 0.5).floor() * 0.01
}

pub fn param_steps_values(count: usize) -> Vec<f64> {
    (0..count).map(|i| enum_stepped_value(count, i)).collect()
}

/// Formats a number the way stepped values are written into zone files: at most two decimals,
/// trailing zeros removed.
pub fn format_step(value: f64) -> String {
    let s = format!("{:.2}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// `0  0.5  1  ` for a count of three.
pub fn param_steps_string(count: usize) -> String {
    param_steps_values(count)
        .into_iter()
        .map(|v| format!("{}  ", format_step(v)))
        .collect()
}

/// Discovered stepped-value counts per FX name and parameter.
#[derive(Debug, Default)]
pub struct SteppedValueCache {
    counts: HashMap<String, HashMap<i32, usize>>,
}

impl SteppedValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_been_calculated(&self, fx_name: &str) -> bool {
        self.counts.contains_key(fx_name)
    }

    /// Records that discovery ran for `fx_name`, even if nothing was found.
    pub fn mark_calculated(&mut self, fx_name: &str) {
        self.counts.entry(fx_name.to_string()).or_default();
    }

    pub fn set(&mut self, fx_name: &str, param: i32, count: usize) {
        self.counts
            .entry(fx_name.to_string())
            .or_default()
            .insert(param, count);
    }

    /// Step count, 0 when unknown.
    pub fn get(&self, fx_name: &str, param: i32) -> usize {
        self.counts
            .get(fx_name)
            .and_then(|m| m.get(&param))
            .copied()
            .unwrap_or(0)
    }
}

// ─── Discovery ─────────────────────────────────────────────────────

/// Only these vendors publish stepped parameters as plain 0..1 values.
pub fn supports_step_discovery(fx_name: &str) -> bool {
    fx_name.contains("UAD") || fx_name.contains("Plugin Alliance")
}

/// Counts distinct values reported while sweeping `param` from 0 to 1 in 0.01 steps.
fn sweep(daw: &mut dyn Daw, track: TrackId, fx: usize, param: i32) -> usize {
    let mut count = 1;
    let mut last = 0.0;
    for i in 0..=100 {
        daw.set_fx_param(track, fx, param, i as f64 * 0.01);
        let v = daw.fx_param(track, fx, param);
        if v != last {
            last = v;
            count += 1;
        }
    }
    count
}

/// Runs `f` with the track muted, restoring the previous mute state.
fn with_track_muted<R>(daw: &mut dyn Daw, track: TrackId, f: impl FnOnce(&mut dyn Daw) -> R) -> R {
    let was_muted = daw.track_mute(track);
    if !was_muted {
        daw.set_track_mute(track, true);
    }
    let result = f(&mut *daw);
    if !was_muted {
        daw.set_track_mute(track, false);
    }
    result
}

/// Discovers the step count of one parameter and caches it when it falls in `[min, max]`.
pub fn discover_param_steps(
    cache: &mut SteppedValueCache,
    daw: &mut dyn Daw,
    fx_name: &str,
    track: TrackId,
    fx: usize,
    param: i32,
    bounds: (usize, usize),
) {
    if !supports_step_discovery(fx_name) {
        return;
    }
    let count = with_track_muted(daw, track, |daw| {
        let current = daw.fx_param(track, fx, param);
        let count = sweep(daw, track, fx, param);
        daw.set_fx_param(track, fx, param, current);
        count
    });
    if count >= bounds.0 && count <= bounds.1 {
        cache.set(fx_name, param, count);
    }
}

/// Discovers step counts for parameters `0..=param_limit` of an FX.
///
/// The FX is marked as calculated even when it is not eligible.
pub fn discover_fx_steps(
    cache: &mut SteppedValueCache,
    daw: &mut dyn Daw,
    fx_name: &str,
    track: TrackId,
    fx: usize,
    param_limit: usize,
    bounds: (usize, usize),
) {
    cache.mark_calculated(fx_name);
    if !supports_step_discovery(fx_name) {
        return;
    }
    let param_count = daw.fx_param_count(track, fx).min(param_limit + 1);
    log::debug!(target: "zone", "discovering stepped values for {} ({} params)", fx_name, param_count);

    let counts = with_track_muted(daw, track, |daw| {
        let current: Vec<f64> = (0..param_count).map(|i| daw.fx_param(track, fx, i as i32)).collect();
        let counts: Vec<usize> = (0..param_count).map(|i| sweep(daw, track, fx, i as i32)).collect();
        for (i, v) in current.into_iter().enumerate() {
            daw.set_fx_param(track, fx, i as i32, v);
        }
        counts
    });

    for (i, count) in counts.into_iter().enumerate() {
        if count >= bounds.0 && count <= bounds.1 {
            cache.set(fx_name, i as i32, count);
        }
    }
}
