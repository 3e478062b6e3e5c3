use std::io::Write;

use anyhow::Result;

/// Block characters used for the vertical resolution within one chart row.
const BLOCKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const CHART_WIDTH: usize = 80;
const CHART_HEIGHT: usize = 12;

/// Receives the loss trace once training has finished.
pub trait LossPlot {
    /// `trace` holds `(batch index, loss)` pairs in batch order.
    fn show(&mut self, trace: &[(usize, f64)]) -> Result<()>;
}

/// Draws the "Loss by Batch" chart to a writer, stdout by default.
pub struct TerminalPlot<W: Write> {
    out: W,
    width: usize,
    height: usize,
}

impl TerminalPlot<std::io::Stdout> {
    pub fn stdout() -> Self {
        TerminalPlot::new(std::io::stdout(), CHART_WIDTH, CHART_HEIGHT)
    }
}

impl<W: Write> TerminalPlot<W> {
    pub fn new(out: W, width: usize, height: usize) -> Self {
        TerminalPlot { out, width, height }
    }
}

impl<W: Write> LossPlot for TerminalPlot<W> {
    fn show(&mut self, trace: &[(usize, f64)]) -> Result<()> {
        let losses: Vec<f64> = trace.iter().map(|(_, loss)| *loss).collect();
        writeln!(self.out, "Loss by Batch")?;
        for line in render_chart(&losses, self.width, self.height) {
            writeln!(self.out, "{}", line)?;
        }
        if let (Some((first, _)), Some((last, _))) = (trace.first(), trace.last()) {
            writeln!(self.out, "Batch Number {}..={}", first, last)?;
        }
        self.out.flush()?;
        Ok(())
    }
}

/// Down-samples `values` to at most `width` columns by taking evenly spaced samples.
fn resample(values: &[f64], width: usize) -> Vec<f64> {
    if values.len() <= width {
        return values.to_vec();
    }
    let step = values.len() as f64 / width as f64;
    (0..width)
        .map(|i| values[((i as f64 * step) as usize).min(values.len() - 1)])
        .collect()
}

/// Renders a column chart, `height` rows tall, each row prefixed by its loss level.
/// Non-finite values are drawn as empty columns.
pub fn render_chart(values: &[f64], width: usize, height: usize) -> Vec<String> {
    if values.is_empty() || width == 0 || height == 0 {
        return Vec::new();
    }
    let values = resample(values, width);
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let min = finite.clone().fold(f64::INFINITY, f64::min);
    let max = finite.fold(f64::NEG_INFINITY, f64::max);
    let range = if max > min { max - min } else { 1.0 };

    // Column height in eighths of a row.
    let levels: Vec<usize> = values
        .iter()
        .map(|v| {
            if !v.is_finite() {
                0
            } else if max > min {
                1 + ((v - min) / range * (height * 8 - 1) as f64).round() as usize
            } else {
                height * 4
            }
        })
        .collect();

    (0..height)
        .rev()
        .map(|row| {
            let label = min + range * (row + 1) as f64 / height as f64;
            let bars: String = levels
                .iter()
                .map(|&level| {
                    let filled = level.saturating_sub(row * 8).min(8);
                    if filled == 0 { ' ' } else { BLOCKS[filled - 1] }
                })
                .collect();
            format!("{:>12.3} │{}", label, bars)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(lines: &[String], index: usize) -> String {
        lines
            .iter()
            .map(|line| line.split('│').nth(1).unwrap().chars().nth(index).unwrap())
            .collect()
    }

    #[test]
    fn test_chart_dimensions() {
        let values: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let lines = render_chart(&values, 80, 5);
        assert_eq!(lines.len(), 5);
        for line in &lines {
            assert_eq!(line.split('│').nth(1).unwrap().chars().count(), 10);
        }
    }

    #[test]
    fn test_chart_resamples_to_width() {
        let values: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        let lines = render_chart(&values, 40, 4);
        assert_eq!(lines[0].split('│').nth(1).unwrap().chars().count(), 40);
    }

    #[test]
    fn test_max_fills_and_min_is_lowest() {
        let lines = render_chart(&[5.0, 1.0], 10, 3);
        assert_eq!(column(&lines, 0), "███");
        assert_eq!(column(&lines, 1), "  ▁");
    }

    #[test]
    fn test_empty_chart() {
        assert!(render_chart(&[], 10, 3).is_empty());
    }

    #[test]
    fn test_terminal_plot_writes_title() -> Result<()> {
        let mut out = Vec::new();
        TerminalPlot::new(&mut out, 20, 3).show(&[(0, 3.0), (1, 2.0), (2, 1.0)])?;
        let text = String::from_utf8(out)?;
        assert!(text.starts_with("Loss by Batch\n"));
        assert!(text.contains("Batch Number 0..=2"));
        Ok(())
    }
}
