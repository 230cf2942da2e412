use std::{
    fmt::Display,
    fs,
    path::{Path, PathBuf},
};

use ndarray::Array2;
use plotters::{
    coord::Shift,
    prelude::*,
    style::text_anchor::{HPos, Pos, VPos},
};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    classes::ClassIndex,
    error::{Error, Result},
    evaluation::Evaluation,
    training::{history::TrainingHistory, phase::TrainingPhase},
};

const MATRIX_SIZE: (u32, u32) = (720, 640);
const ROC_SIZE: (u32, u32) = (720, 600);
const CURVES_SIZE: (u32, u32) = (1200, 480);
const FONT: &str = "sans-serif";

fn render_error<E: Display>(path: &Path) -> impl Fn(E) -> Error + '_ {
    move |err| Error::Render {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Writes the JSON summaries, then every chart, into `report_dir` and returns
/// the paths written.
pub fn write_reports(
    report_dir: &Path,
    classes: &ClassIndex,
    history: &TrainingHistory,
    evaluation: &Evaluation,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(report_dir)?;
    let mut written = Vec::new();

    // serialised results go first so a rendering failure cannot lose them
    let path = report_dir.join("history.json");
    write_json(&path, history)?;
    written.push(path);

    let path = report_dir.join("evaluation.json");
    write_json(&path, &evaluation.summary(classes))?;
    written.push(path);

    let path = report_dir.join("confusion_matrix.png");
    render_confusion_matrix(
        &path,
        evaluation.confusion.counts(),
        classes.names(),
        classes.names(),
        "Confusion matrix",
    )?;
    written.push(path);

    for (class, collapsed) in evaluation.one_vs_rest.iter().enumerate() {
        let name = classes.name(class).unwrap_or_default();
        let path = report_dir.join(format!("confusion_{}.png", file_stem(name)));
        let labels = [name.to_owned(), "other".to_owned()];
        render_confusion_matrix(
            &path,
            &collapsed.to_matrix(),
            &labels,
            &labels,
            &format!("{name} vs rest"),
        )?;
        written.push(path);
    }

    let path = report_dir.join("roc_curves.png");
    render_roc_curves(&path, classes, evaluation)?;
    written.push(path);

    if history.is_empty() {
        warn!("no epochs were recorded, skipping training curves");
    } else {
        let path = report_dir.join("training_curves.png");
        render_training_curves(&path, history)?;
        written.push(path);
    }

    info!(directory = %report_dir.display(), files = written.len(), "reports written");
    Ok(written)
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// Prints test accuracy, the classification report and per-class accuracy.
pub fn print_summary(classes: &ClassIndex, evaluation: &Evaluation) {
    println!("Test accuracy: {:.2}%", evaluation.accuracy * 100.0);
    println!();
    println!("{}", evaluation.report);
    println!("Per-class accuracy:");
    for (class, accuracy) in evaluation.per_class_accuracy.iter().enumerate() {
        println!(
            "  {:<16} {:>6.2}%",
            classes.name(class).unwrap_or_default(),
            accuracy * 100.0
        );
    }
}

/// Square count matrix as an annotated heatmap, true classes down the rows.
pub fn render_confusion_matrix(
    path: &Path,
    counts: &Array2<usize>,
    row_labels: &[String],
    column_labels: &[String],
    title: &str,
) -> Result<()> {
    let size = counts.nrows() as i32;
    let max = counts.iter().copied().max().unwrap_or(0).max(1) as f64;

    let root = BitMapBackend::new(path, MATRIX_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(render_error(path))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption(title, (FONT, 26))
        .x_label_area_size(50)
        .y_label_area_size(110)
        .build_cartesian_2d(0..size, size..0)
        .map_err(render_error(path))?;

    let (width, height) = chart.plotting_area().dim_in_pixel();
    let cell = (width as i32 / size.max(1), height as i32 / size.max(1));
    let label = |labels: &[String], index: &i32| {
        usize::try_from(*index)
            .ok()
            .and_then(|index| labels.get(index))
            .cloned()
            .unwrap_or_default()
    };

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_labels(size as usize + 1)
        .y_labels(size as usize + 1)
        .x_label_offset(cell.0 / 2)
        .y_label_offset(cell.1 / 2)
        .x_label_formatter(&|index| label(column_labels, index))
        .y_label_formatter(&|index| label(row_labels, index))
        .x_desc("Predicted")
        .y_desc("True")
        .label_style((FONT, 16))
        .draw()
        .map_err(render_error(path))?;

    let cells: Vec<(i32, i32, usize)> = counts
        .indexed_iter()
        .map(|((row, column), &count)| (column as i32, row as i32, count))
        .collect();

    chart
        .draw_series(cells.iter().map(|&(x, y, count)| {
            Rectangle::new([(x, y), (x + 1, y + 1)], heat(count as f64 / max).filled())
        }))
        .map_err(render_error(path))?;

    chart
        .draw_series(cells.iter().map(|&(x, y, count)| {
            let ink = if count as f64 / max > 0.5 { WHITE } else { BLACK };
            let style = (FONT, 20)
                .into_font()
                .color(&ink)
                .pos(Pos::new(HPos::Center, VPos::Center));
            EmptyElement::at((x, y)) + Text::new(count.to_string(), (cell.0 / 2, cell.1 / 2), style)
        }))
        .map_err(render_error(path))?;

    root.present().map_err(render_error(path))?;
    Ok(())
}

/// One ROC curve per class plus the chance diagonal.
pub fn render_roc_curves(path: &Path, classes: &ClassIndex, evaluation: &Evaluation) -> Result<()> {
    let root = BitMapBackend::new(path, ROC_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(render_error(path))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption("ROC curves (one vs rest)", (FONT, 26))
        .x_label_area_size(45)
        .y_label_area_size(55)
        .build_cartesian_2d(0.0..1.0, 0.0..1.05)
        .map_err(render_error(path))?;

    chart
        .configure_mesh()
        .x_desc("False positive rate")
        .y_desc("True positive rate")
        .draw()
        .map_err(render_error(path))?;

    chart
        .draw_series(LineSeries::new(
            [(0.0, 0.0), (1.0, 1.0)],
            BLACK.mix(0.4).stroke_width(1),
        ))
        .map_err(render_error(path))?;

    for (class, curve) in evaluation.roc.iter().enumerate() {
        let Some(curve) = curve else {
            continue;
        };
        let color = Palette99::pick(class).mix(0.9);

        chart
            .draw_series(LineSeries::new(curve.points(), color.stroke_width(2)))
            .map_err(render_error(path))?
            .label(format!(
                "{} (AUC = {:.2})",
                classes.name(class).unwrap_or_default(),
                curve.auc
            ))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(render_error(path))?;

    root.present().map_err(render_error(path))?;
    Ok(())
}

/// Accuracy and loss over the combined epoch axis of both phases.
pub fn render_training_curves(path: &Path, history: &TrainingHistory) -> Result<()> {
    let root = BitMapBackend::new(path, CURVES_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(render_error(path))?;

    let panels = root.split_evenly((1, 2));
    let boundary = history.phase_len(TrainingPhase::Frozen);

    draw_metric_panel(
        path,
        &panels[0],
        "Accuracy",
        boundary,
        [("train", history.accuracy()), ("validation", history.val_accuracy())],
    )?;
    draw_metric_panel(
        path,
        &panels[1],
        "Loss",
        boundary,
        [("train", history.loss()), ("validation", history.val_loss())],
    )?;

    root.present().map_err(render_error(path))?;
    Ok(())
}

fn draw_metric_panel(
    path: &Path,
    area: &DrawingArea<BitMapBackend<'_>, Shift>,
    metric: &str,
    phase_boundary: usize,
    series: [(&str, Vec<f64>); 2],
) -> Result<()> {
    let epochs = series[0].1.len().max(1) as f64;
    let top = series
        .iter()
        .flat_map(|(_, values)| values.iter().copied())
        .filter(|value| value.is_finite())
        .fold(0.0_f64, f64::max)
        .max(1.0)
        * 1.05;

    let mut chart = ChartBuilder::on(area)
        .margin(15)
        .caption(metric, (FONT, 24))
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(1.0..epochs.max(2.0), 0.0..top)
        .map_err(render_error(path))?;

    chart
        .configure_mesh()
        .x_desc("Epoch")
        .y_desc(metric)
        .draw()
        .map_err(render_error(path))?;

    for (index, (name, values)) in series.iter().enumerate() {
        let color = Palette99::pick(index).to_rgba();
        chart
            .draw_series(LineSeries::new(
                values
                    .iter()
                    .enumerate()
                    .map(|(epoch, &value)| (epoch as f64 + 1.0, value)),
                color.stroke_width(2),
            ))
            .map_err(render_error(path))?
            .label(*name)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    // fine-tuning starts after the last frozen epoch
    if phase_boundary > 0 && (phase_boundary as f64) < epochs {
        let x = phase_boundary as f64 + 0.5;
        chart
            .draw_series(LineSeries::new([(x, 0.0), (x, top)], BLACK.mix(0.3).stroke_width(1)))
            .map_err(render_error(path))?;
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(render_error(path))?;

    Ok(())
}

/// White to dark blue.
fn heat(intensity: f64) -> RGBColor {
    let intensity = intensity.clamp(0.0, 1.0);
    let fade = |full: f64, low: f64| (full - (full - low) * intensity).round() as u8;
    RGBColor(fade(247.0, 8.0), fade(251.0, 48.0), fade(255.0, 107.0))
}

fn file_stem(class: &str) -> String {
    class
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
