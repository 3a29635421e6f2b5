//! Grammar of the `[ … ]` value block and `{ … }` colour block in binding parameters.

use std::sync::LazyLock;

use csurf_types::Rgba;
use regex::Regex;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern")
}

static STEP_VALUE: LazyLock<Regex> = LazyLock::new(|| re(r"^-?[0-9]+([.][0-9]+)?$"));
static DELTA: LazyLock<Regex> = LazyLock::new(|| re(r"^[(]-?[0-9]+[.][0-9]+[)]$"));
static TICK: LazyLock<Regex> = LazyLock::new(|| re(r"^[(]-?[0-9]+[)]$"));
static ACCEL_DELTAS: LazyLock<Regex> =
    LazyLock::new(|| re(r"^[(](-?[0-9]+[.][0-9]+,)+-?[0-9]+[.][0-9]+[)]$"));
static ACCEL_TICKS: LazyLock<Regex> = LazyLock::new(|| re(r"^[(](-?[0-9]+,)+-?[0-9]+[)]$"));
static FLOAT_RANGE: LazyLock<Regex> =
    LazyLock::new(|| re(r"^(-?[0-9]+[.][0-9]+)>(-?[0-9]+[.][0-9]+)$"));
static INT_RANGE: LazyLock<Regex> = LazyLock::new(|| re(r"^([0-9]+)-([0-9]+)$"));
static COLOR_COMPONENT: LazyLock<Regex> = LazyLock::new(|| re(r"^[0-9]+$"));

/// Everything the `[ … ]` block of a binding can specify, after fallbacks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueSpec {
    pub stepped_values: Vec<f64>,
    pub delta: f64,
    pub accelerated_deltas: Vec<f64>,
    pub accelerated_ticks: Vec<u32>,
    /// Explicit `[min, max]`, already ordered.
    pub range: Option<(f64, f64)>,
}

/// Per-widget defaults the value block falls back on.
#[derive(Debug, Clone, Copy)]
pub struct WidgetDefaults<'a> {
    pub step_size: f64,
    pub acceleration_values: &'a [f64],
}

/// Tokens strictly between the first `open` and the next `close`.
fn delimited<'a>(params: &'a [String], open: &str, close: &str) -> Option<&'a [String]> {
    let start = params.iter().position(|p| p == open)?;
    let len = params[start + 1..].iter().position(|p| p == close)?;
    Some(&params[start + 1..start + 1 + len])
}

fn inner(token: &str) -> &str {
    &token[1..token.len() - 1]
}

impl ValueSpec {
    /// Parses the value block. `base_tick_count` maps a step count to its encoder
    /// tick budget and is only consulted when ticks must be synthesised.
    pub fn parse(
        params: &[String],
        defaults: WidgetDefaults<'_>,
        base_tick_count: impl Fn(usize) -> u32,
    ) -> Self {
        let mut spec = ValueSpec::default();

        if let Some(tokens) = delimited(params, "[", "]") {
            for token in tokens {
                let t = token.as_str();
                if STEP_VALUE.is_match(t) {
                    if let Ok(v) = t.parse() {
                        spec.stepped_values.push(v);
                    }
                } else if DELTA.is_match(t) {
                    spec.delta = inner(t).parse().unwrap_or(0.0);
                } else if TICK.is_match(t) {
                    if let Ok(v) = inner(t).parse::<i64>() {
                        spec.accelerated_ticks.push(v.max(0) as u32);
                    }
                } else if ACCEL_DELTAS.is_match(t) {
                    spec.accelerated_deltas
                        .extend(inner(t).split(',').filter_map(|v| v.parse::<f64>().ok()));
                } else if ACCEL_TICKS.is_match(t) {
                    spec.accelerated_ticks.extend(
                        inner(t)
                            .split(',')
                            .filter_map(|v| v.parse::<i64>().ok())
                            .map(|v| v.max(0) as u32),
                    );
                } else if let Some(caps) = FLOAT_RANGE.captures(t).or_else(|| INT_RANGE.captures(t)) {
                    let first: f64 = caps[1].parse().unwrap_or(0.0);
                    let last: f64 = caps[2].parse().unwrap_or(1.0);
                    spec.range = Some(if last > first { (first, last) } else { (last, first) });
                }
            }
        }

        if spec.delta == 0.0 && defaults.step_size != 0.0 {
            spec.delta = defaults.step_size;
        }

        if spec.accelerated_deltas.is_empty() && !defaults.acceleration_values.is_empty() {
            spec.accelerated_deltas = defaults.acceleration_values.to_vec();
        }

        if !spec.stepped_values.is_empty() && spec.accelerated_ticks.is_empty() && spec.delta != 0.0 {
            let base = base_tick_count(spec.stepped_values.len()) as f64;
            let ticks = (base / (spec.delta * 10000.0) + 0.5) as i64;
            spec.accelerated_ticks.push(ticks.max(0) as u32);
        }

        spec
    }
}

/// Result of the `{ … }` colour block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorSpec {
    pub colors: Vec<Rgba>,
    pub supports_color: bool,
    pub follows_track_color: bool,
}

impl ColorSpec {
    pub fn parse(params: &[String]) -> Self {
        let mut spec = ColorSpec::default();
        let Some(tokens) = delimited(params, "{", "}") else {
            return spec;
        };

        let mut hex_colors = Vec::new();
        let mut raw = Vec::new();

        for token in tokens {
            if token.starts_with('#') {
                hex_colors.push(token.as_str());
            } else if token == "Track" {
                spec.follows_track_color = true;
                break;
            } else if COLOR_COMPONENT.is_match(token) {
                let v = token.parse::<u64>().unwrap_or(255).min(255) as u8;
                raw.push(v);
            }
        }

        if !hex_colors.is_empty() {
            spec.supports_color = true;
            spec.colors = hex_colors.into_iter().filter_map(Rgba::from_hex).collect();
        } else if raw.len() >= 3 && raw.len() % 3 == 0 {
            spec.supports_color = true;
            spec.colors = raw.chunks(3).map(|c| Rgba::rgb(c[0], c[1], c[2])).collect();
        }

        spec
    }
}
