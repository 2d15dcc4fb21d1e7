//! Layout of a health-check chart: one row of panels per case, one line per
//! controller. Y ranges are shared per metric across every row so cases can be
//! compared at a glance.

use std::collections::BTreeMap;

use crate::limits::LimitLines;
use crate::query::CaseSummary;
use crate::{Error, HealthCheck, Metric};

/// Optional panels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChartOptions {
    pub voltage: bool,
    pub stator_current: bool,
}

impl ChartOptions {
    pub fn metrics(&self) -> Vec<Metric> {
        let mut metrics = vec![Metric::SupplyCurrent];
        if self.stator_current {
            metrics.push(Metric::StatorCurrent);
        }
        metrics.push(Metric::Speed);
        if self.voltage {
            metrics.push(Metric::Voltage);
        }
        metrics
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Series {
    pub controller: i64,
    /// `(seconds elapsed, value)`
    pub points: Vec<(f64, f64)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Panel {
    pub metric: Metric,
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
    pub series: Vec<Series>,
    pub limits: LimitLines,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PanelRow {
    pub case: i64,
    pub title: String,
    pub panels: Vec<Panel>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChartPlan {
    pub rows: Vec<PanelRow>,
}

impl ChartPlan {
    pub fn columns(&self) -> usize {
        self.rows.first().map_or(0, |row| row.panels.len())
    }
}

impl HealthCheck {
    pub fn chart_plan(
        &self,
        cases: &[i64],
        controllers: &[i64],
        options: ChartOptions,
    ) -> Result<ChartPlan, Error> {
        if cases.is_empty() {
            return Err(Error::EmptySelection("at least one case is required"));
        }
        if controllers.is_empty() {
            return Err(Error::EmptySelection("at least one controller is required"));
        }

        let metrics = options.metrics();
        let mut y_ranges = BTreeMap::new();
        for &metric in &metrics {
            y_ranges.insert(metric, self.metric_limits(metric, cases, controllers)?);
        }
        let summaries: BTreeMap<i64, CaseSummary> =
            self.cases().into_iter().map(|c| (c.case, c)).collect();

        let table = self.table();
        let elapsed = table.msec_elapsed();
        let mut rows = Vec::with_capacity(cases.len());
        for &case in cases {
            let groups: Vec<(i64, std::ops::Range<usize>)> = controllers
                .iter()
                .filter_map(|&controller| {
                    table
                        .index()
                        .get(controller, case)
                        .map(|rows| (controller, rows))
                })
                .collect();

            let x_range = groups
                .iter()
                .flat_map(|(_, rows)| rows.clone())
                .map(|row| elapsed.value(row) as f64 / 1000.0)
                .fold(None, |range: Option<(f64, f64)>, x| match range {
                    Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
                    None => Some((x, x)),
                })
                .map_or((0.0, 1.0), |(lo, hi)| {
                    let lo = lo.min(0.0);
                    if hi > lo { (lo, hi) } else { (lo, lo + 1.0) }
                });

            let case_limits = self.case_limits(case);
            let panels = metrics
                .iter()
                .map(|&metric| {
                    let values = table.metric(metric);
                    let series = groups
                        .iter()
                        .map(|(controller, rows)| Series {
                            controller: *controller,
                            points: rows
                                .clone()
                                .map(|row| (elapsed.value(row) as f64 / 1000.0, values.value(row)))
                                .collect(),
                        })
                        .collect();
                    let limits = case_limits.for_metric(metric);
                    // keep threshold lines on screen
                    let (lo, hi) = y_ranges[&metric];
                    let y_range = match limits
                        .values()
                        .fold((lo, hi), |(lo, hi), v| (lo.min(v), hi.max(v)))
                    {
                        (lo, hi) if hi > lo => (lo, hi),
                        (lo, hi) => (lo - 1.0, hi + 1.0),
                    };
                    Panel {
                        metric,
                        x_range,
                        y_range,
                        series,
                        limits,
                    }
                })
                .collect();

            let title = match summaries.get(&case) {
                Some(summary) => format!(
                    "Case {case}: {} ({}, output {})",
                    summary.name, summary.test_type, summary.output
                ),
                None => format!("Case {case}"),
            };
            rows.push(PanelRow {
                case,
                title,
                panels,
            });
        }
        Ok(ChartPlan { rows })
    }
}
