use serde::{Deserialize, Serialize};

use crate::{Error, HealthCheck, Metric};

/// Fraction of the larger-magnitude endpoint added on both sides of a range.
pub const PADDING: f64 = 0.1;

/// Padded display ranges for the three always-plotted metrics.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct YLimits {
    pub supply_current: (f64, f64),
    pub stator_current: (f64, f64),
    pub speed: (f64, f64),
}

/// Optional threshold lines drawn across a panel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitLines {
    pub low: Option<f64>,
    pub high: Option<f64>,
}

impl LimitLines {
    /// Accepts either nothing (no lines) or exactly a `(low, high)` pair.
    pub fn from_slice(metric: Metric, values: &[Option<f64>]) -> Result<Self, Error> {
        match values {
            [] => Ok(LimitLines::default()),
            [low, high] => Ok(LimitLines {
                low: *low,
                high: *high,
            }),
            _ => Err(Error::MalformedLimit {
                metric,
                len: values.len(),
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.low.is_none() && self.high.is_none()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> {
        self.low.into_iter().chain(self.high)
    }
}

/// Threshold lines for one case.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseLimits {
    pub supply_current: LimitLines,
    pub stator_current: LimitLines,
    pub speed: LimitLines,
}

impl CaseLimits {
    pub fn for_metric(&self, metric: Metric) -> LimitLines {
        match metric {
            Metric::SupplyCurrent => self.supply_current,
            Metric::StatorCurrent => self.stator_current,
            Metric::Speed => self.speed,
            Metric::Voltage | Metric::Position => LimitLines::default(),
        }
    }
}

/// `(min - pad, max + pad)` with `pad = max(|min|, |max|) * PADDING`.
pub fn pad_range(min: f64, max: f64) -> (f64, f64) {
    let pad = min.abs().max(max.abs()) * PADDING;
    (min - pad, max + pad)
}

impl HealthCheck {
    /// Padded supply current, stator current and speed ranges over every sample
    /// whose `(controller, case)` lies in `controllers × cases`.
    pub fn plot_y_limits(&self, cases: &[i64], controllers: &[i64]) -> Result<YLimits, Error> {
        Ok(YLimits {
            supply_current: self.metric_limits(Metric::SupplyCurrent, cases, controllers)?,
            stator_current: self.metric_limits(Metric::StatorCurrent, cases, controllers)?,
            speed: self.metric_limits(Metric::Speed, cases, controllers)?,
        })
    }

    /// Padded range of one metric over the selection.
    pub fn metric_limits(
        &self,
        metric: Metric,
        cases: &[i64],
        controllers: &[i64],
    ) -> Result<(f64, f64), Error> {
        let table = self.table();
        let values = table.metric(metric);
        let mut bounds: Option<(f64, f64)> = None;
        for &controller in controllers {
            for &case in cases {
                let Some(rows) = table.index().get(controller, case) else {
                    continue;
                };
                for row in rows {
                    let value = values.value(row);
                    bounds = Some(match bounds {
                        Some((min, max)) => (min.min(value), max.max(value)),
                        None => (value, value),
                    });
                }
            }
        }
        let (min, max) = bounds.ok_or(Error::EmptySelection("no samples for selection"))?;
        Ok(pad_range(min, max))
    }

    /// Records threshold lines for `case`. Each range is either empty (no lines)
    /// or a `(low, high)` pair where either end may be `None`.
    pub fn set_case_limits(
        &mut self,
        case: i64,
        supply_current: &[Option<f64>],
        stator_current: &[Option<f64>],
        speed: &[Option<f64>],
    ) -> Result<(), Error> {
        let limits = CaseLimits {
            supply_current: LimitLines::from_slice(Metric::SupplyCurrent, supply_current)?,
            stator_current: LimitLines::from_slice(Metric::StatorCurrent, stator_current)?,
            speed: LimitLines::from_slice(Metric::Speed, speed)?,
        };
        self.limits.insert(case, limits);
        Ok(())
    }

    /// Threshold lines for `case`; no lines when none were set.
    pub fn case_limits(&self, case: i64) -> CaseLimits {
        self.limits.get(&case).copied().unwrap_or_default()
    }
}
