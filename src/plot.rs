// src/plot.rs
// PNG 导出：光谱曲线 + 参考谱叠加 + 峰标记
use std::io::Cursor;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::*;

use crate::error::PlotError;
use crate::processing::Peak;
use crate::spectrum::Spectrum;

#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub palette: Vec<RGBColor>,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 900,
            height: 400,
            background: RGBColor(10, 10, 10),
            palette: vec![CYAN, RED, YELLOW, GREEN, MAGENTA, WHITE],
        }
    }
}

/// A second curve drawn on top of the measured spectrum.
pub struct Overlay<'a> {
    pub label: &'a str,
    pub spectrum: &'a Spectrum,
}

fn bounds<'a>(values: impl Iterator<Item = &'a f64>) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    if lo > hi {
        return None;
    }
    if (hi - lo).abs() < f64::EPSILON {
        return Some((lo - 1.0, hi + 1.0));
    }
    Some((lo, hi))
}

/// Renders `spectrum` (plus an optional overlay and peak markers) as PNG bytes.
pub fn render_spectrum_png(
    spectrum: &Spectrum,
    overlay: Option<Overlay<'_>>,
    peaks: &[Peak],
    style: &PlotStyle,
) -> Result<Vec<u8>, PlotError> {
    if spectrum.is_empty() {
        return Err(PlotError::Empty("spectrum has no samples".into()));
    }
    let x_values = spectrum
        .axis()
        .iter()
        .chain(overlay.iter().flat_map(|o| o.spectrum.axis().iter()));
    let x_range = bounds(x_values).ok_or_else(|| PlotError::Empty("spectrum axis is empty".into()))?;
    let y_values = spectrum
        .intensity()
        .iter()
        .chain(overlay.iter().flat_map(|o| o.spectrum.intensity().iter()));
    let (y_min, y_max) =
        bounds(y_values).ok_or_else(|| PlotError::Empty("no finite intensities".into()))?;
    let pad = (y_max - y_min) * 0.05;

    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption("Spectrum", ("sans-serif", 20).into_font().color(&WHITE))
            .set_label_area_size(LabelAreaPosition::Left, 55)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d(x_range.0..x_range.1, (y_min - pad)..(y_max + pad))?;
        chart
            .configure_mesh()
            .x_desc(spectrum.unit().label())
            .y_desc("Intensity")
            .axis_desc_style(("sans-serif", 14).into_font().color(&WHITE))
            .label_style(("sans-serif", 12).into_font().color(&WHITE))
            .light_line_style(&WHITE.mix(0.1))
            .draw()?;

        let color = style.palette[0];
        let series = spectrum.axis().iter().copied().zip(spectrum.intensity().iter().copied());
        chart
            .draw_series(LineSeries::new(series, &color))?
            .label("measured")
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));

        if let Some(overlay) = &overlay {
            let color = style.palette[1 % style.palette.len()];
            let series = overlay
                .spectrum
                .axis()
                .iter()
                .copied()
                .zip(overlay.spectrum.intensity().iter().copied());
            chart
                .draw_series(LineSeries::new(series, &color))?
                .label(overlay.label)
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
        }

        if !peaks.is_empty() {
            let color = style.palette[2 % style.palette.len()];
            chart.draw_series(
                peaks
                    .iter()
                    .map(|p| Circle::new((p.position, p.intensity), 4, color.filled())),
            )?;
        }

        chart
            .configure_series_labels()
            .label_font(("sans-serif", 12).into_font().color(&WHITE))
            .border_style(&WHITE.mix(0.2))
            .background_style(&style.background)
            .draw()?;
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}

fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, PlotError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| PlotError::Render("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    DynamicImage::ImageRgb8(image).write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::AxisUnit;

    #[test]
    fn flat_data_gets_a_visible_range() {
        assert_eq!(bounds([3.0, 3.0].iter()), Some((2.0, 4.0)));
        assert_eq!(bounds([f64::NAN].iter()), None);
        assert_eq!(bounds([1.0, -2.0, f64::INFINITY].iter()), Some((-2.0, 1.0)));
    }

    #[test]
    fn empty_spectrum_is_rejected() {
        let empty = Spectrum::new(vec![], vec![], AxisUnit::Pixel).unwrap();
        let err = render_spectrum_png(&empty, None, &[], &PlotStyle::default()).unwrap_err();
        assert!(matches!(err, PlotError::Empty(_)));
    }
}
