use std::path::Path;

use plotters::coord::Shift;
use plotters::prelude::*;
use tracing::info;

use crate::Error;
use crate::chart::ChartPlan;

pub const DEFAULT_PANEL_SIZE: (u32, u32) = (480, 320);

/// Charts are written as SVG. Raster output is refused: without a font backend
/// the bitmap path cannot draw captions or tick labels.
fn check_output(path: &Path) -> Result<(), Error> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("svg") => Ok(()),
        None => Ok(()),
        Some(ext) => Err(Error::Render(format!(
            "cannot write .{ext} output, write an .svg file instead"
        ))),
    }
}

impl ChartPlan {
    /// Image size for the whole grid at `DEFAULT_PANEL_SIZE` per panel.
    pub fn image_size(&self) -> (u32, u32) {
        let (width, height) = DEFAULT_PANEL_SIZE;
        (
            width * self.columns().max(1) as u32,
            height * self.rows.len().max(1) as u32,
        )
    }

    pub fn render(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        check_output(path)?;
        draw(&SVGBackend::new(path, self.image_size()).into_drawing_area(), self)?;
        info!(path = %path.display(), rows = self.rows.len(), "rendered chart");
        Ok(())
    }
}

fn render_err(err: impl std::fmt::Display) -> Error {
    Error::Render(err.to_string())
}

fn draw<DB: DrawingBackend>(root: &DrawingArea<DB, Shift>, plan: &ChartPlan) -> Result<(), Error> {
    root.fill(&WHITE).map_err(render_err)?;
    let columns = plan.columns().max(1);
    let areas = root.split_evenly((plan.rows.len(), columns));
    for (row, areas) in plan.rows.iter().zip(areas.chunks(columns)) {
        for (panel, area) in row.panels.iter().zip(areas) {
            let (x0, x1) = panel.x_range;
            let (y0, y1) = panel.y_range;
            let mut chart = ChartBuilder::on(area)
                .caption(
                    format!("{} {}", row.title, panel.metric.label()),
                    ("sans-serif", 14),
                )
                .margin(8)
                .x_label_area_size(28)
                .y_label_area_size(48)
                .build_cartesian_2d(x0..x1, y0..y1)
                .map_err(render_err)?;
            chart
                .configure_mesh()
                .x_desc("Time (s)")
                .y_desc(panel.metric.label())
                .draw()
                .map_err(render_err)?;

            for (i, series) in panel.series.iter().enumerate() {
                let color = Palette99::pick(i).to_rgba();
                chart
                    .draw_series(LineSeries::new(series.points.iter().copied(), &color))
                    .map_err(render_err)?
                    .label(format!("controller {}", series.controller))
                    .legend(move |(x, y)| {
                        PathElement::new(vec![(x, y), (x + 16, y)], color.stroke_width(2))
                    });
            }
            for value in panel.limits.values() {
                chart
                    .draw_series(LineSeries::new(
                        [(x0, value), (x1, value)],
                        RED.stroke_width(1),
                    ))
                    .map_err(render_err)?;
            }
            if !panel.series.is_empty() {
                chart
                    .configure_series_labels()
                    .background_style(&WHITE.mix(0.8))
                    .border_style(&BLACK)
                    .draw()
                    .map_err(render_err)?;
            }
        }
    }
    root.present().map_err(render_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::ChartOptions;
    use crate::payload::Payload;
    use crate::table::tests::{created, run_case, sample};
    use crate::HealthCheck;
    use tempfile::TempDir;

    fn plan() -> ChartPlan {
        let hc = HealthCheck::from_payload_at(
            Payload::from_records(
                vec![run_case(0, "DriveSubsystem", 1)],
                vec![sample(0, 1, 0, 0.0), sample(0, 1, 1000, 2.0)],
            ),
            created(),
        )
        .unwrap();
        hc.chart_plan(&[0], &[1], ChartOptions::default()).unwrap()
    }

    #[test]
    fn test_check_output() {
        assert!(check_output(Path::new("a.svg")).is_ok());
        assert!(check_output(Path::new("a.SVG")).is_ok());
        assert!(check_output(Path::new("a")).is_ok());
        assert!(matches!(
            check_output(Path::new("a.png")),
            Err(Error::Render(_))
        ));
    }

    #[test]
    fn test_render_svg() {
        let temp = TempDir::new().unwrap();
        let plan = plan();
        assert_eq!(plan.image_size(), (960, 320));
        let path = temp.path().join("chart.svg");
        plan.render(&path).unwrap();
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("controller 1"));
    }

    #[test]
    fn test_render_png_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("chart.png");
        let err = plan().render(&path).unwrap_err();
        assert!(matches!(&err, Error::Render(msg) if msg.contains(".png")), "{err}");
        assert!(!path.exists());
    }
}
