//! Residual convergence plots.

use std::path::Path;

use plotters::prelude::*;

use crate::logs::SolverLog;
use crate::{PostError, PostResult};

/// Render the initial-residual history of every field to an SVG file, one
/// curve per field on a log-scale residual axis.
pub fn render_residual_plot(log: &SolverLog, output: &Path) -> PostResult<()> {
    let fields = log.fields().to_vec();
    if fields.is_empty() {
        return Err(PostError::Plot("no residual fields to plot".to_string()));
    }

    let mut series = Vec::new();
    let mut t_max = f64::MIN;
    let mut r_min = f64::MAX;
    let mut r_max = f64::MIN;
    for field in &fields {
        let samples = log.residuals(field)?;
        for sample in &samples {
            t_max = t_max.max(sample.time);
            if sample.initial > 0.0 {
                r_min = r_min.min(sample.initial);
                r_max = r_max.max(sample.initial);
            }
        }
        series.push((field.clone(), samples));
    }
    if t_max <= 0.0 || r_min > r_max {
        return Err(PostError::Plot("no plottable residual samples".to_string()));
    }

    let root = SVGBackend::new(output, (900, 600)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|err| PostError::Plot(err.to_string()))?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Residual convergence", ("sans-serif", 22))
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..t_max * 1.05, (r_min / 2.0..r_max * 2.0).log_scale())
        .map_err(|err| PostError::Plot(err.to_string()))?;
    chart
        .configure_mesh()
        .x_desc("Time")
        .y_desc("Initial residual")
        .draw()
        .map_err(|err| PostError::Plot(err.to_string()))?;

    for (idx, (field, samples)) in series.iter().enumerate() {
        let color = Palette99::pick(idx).to_rgba();
        chart
            .draw_series(LineSeries::new(
                samples
                    .iter()
                    .filter(|s| s.initial > 0.0)
                    .map(|s| (s.time, s.initial)),
                color,
            ))
            .map_err(|err| PostError::Plot(err.to_string()))?
            .label(field)
            .legend(move |(x, y)| PathElement::new(vec![(x - 12, y), (x, y)], color));
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(|err| PostError::Plot(err.to_string()))?;
    root.present()
        .map_err(|err| PostError::Plot(err.to_string()))?;
    tracing::info!(plot = %output.display(), "wrote residual plot");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::LogProcessor;
    use std::fs;

    #[test]
    fn renders_svg_for_processed_case() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("solver.log"),
            "Time = 1\nGAMG:  Solving for p, Initial residual = 0.5, Final residual = 0.01, No Iterations 8\n\
             Time = 2\nGAMG:  Solving for p, Initial residual = 0.05, Final residual = 0.001, No Iterations 4\nEnd\n",
        )
        .unwrap();
        LogProcessor::new(tmp.path(), "solver.log")
            .unwrap()
            .process()
            .unwrap();

        let log = SolverLog::load(tmp.path()).unwrap();
        let out = tmp.path().join("residuals.svg");
        render_residual_plot(&log, &out).unwrap();
        let svg = fs::read_to_string(&out).unwrap();
        assert!(svg.contains("<svg"));
    }

    #[test]
    fn empty_logs_cannot_be_plotted() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("solver.log"), "End\n").unwrap();
        LogProcessor::new(tmp.path(), "solver.log")
            .unwrap()
            .process()
            .unwrap();
        let log = SolverLog::load(tmp.path()).unwrap();
        let out = tmp.path().join("residuals.svg");
        assert!(matches!(
            render_residual_plot(&log, &out),
            Err(PostError::Plot(_))
        ));
    }
}
