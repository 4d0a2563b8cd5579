//! Terminal line plots.

/// One plotted curve.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    /// Legend label.
    pub label: String,
    /// Character drawn at each point.
    pub marker: char,
    /// `(x, y)` points.
    pub points: Vec<(f64, f64)>,
}

/// A character-grid plot with an optional fixed viewport.
#[derive(Debug, Clone)]
pub struct AsciiPlot {
    title: String,
    width: usize,
    height: usize,
    x_bounds: Option<(f64, f64)>,
    y_bounds: Option<(f64, f64)>,
    series: Vec<Series>,
}

impl AsciiPlot {
    /// Create an empty plot.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            width: 60,
            height: 12,
            x_bounds: None,
            y_bounds: None,
            series: Vec::new(),
        }
    }

    /// Set the plot area size in characters.
    #[must_use]
    pub fn with_size(mut self, width: usize, height: usize) -> Self {
        self.width = width.max(10);
        self.height = height.max(3);
        self
    }

    /// Fix the x range instead of fitting it to the data.
    #[must_use]
    pub fn with_x_bounds(mut self, min: f64, max: f64) -> Self {
        self.x_bounds = Some((min, max));
        self
    }

    /// Fix the y range instead of fitting it to the data.
    #[must_use]
    pub fn with_y_bounds(mut self, min: f64, max: f64) -> Self {
        self.y_bounds = Some((min, max));
        self
    }

    /// Add a curve.
    #[must_use]
    pub fn with_series(mut self, label: impl Into<String>, marker: char, points: Vec<(f64, f64)>) -> Self {
        self.series.push(Series {
            label: label.into(),
            marker,
            points,
        });
        self
    }

    /// Plotted curves.
    pub fn series(&self) -> &[Series] {
        &self.series
    }

    fn fitted_bounds(&self, axis: impl Fn(&(f64, f64)) -> f64) -> (f64, f64) {
        let values = self
            .series
            .iter()
            .flat_map(|s| s.points.iter().map(&axis))
            .filter(|v| v.is_finite());
        let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        if lo > hi {
            (0.0, 1.0)
        } else {
            (lo, hi)
        }
    }

    fn cell(value: f64, (lo, hi): (f64, f64), cells: usize) -> Option<usize> {
        if !value.is_finite() || value < lo || value > hi {
            return None;
        }
        let range = (hi - lo).max(1e-12);
        let pos = ((value - lo) / range * (cells - 1) as f64).round() as usize;
        Some(pos.min(cells - 1))
    }

    /// Render to a string.
    pub fn render(&self) -> String {
        let x_bounds = self.x_bounds.unwrap_or_else(|| self.fitted_bounds(|p| p.0));
        let y_bounds = self.y_bounds.unwrap_or_else(|| self.fitted_bounds(|p| p.1));

        let mut grid = vec![vec![' '; self.width]; self.height];
        for series in &self.series {
            for &(x, y) in &series.points {
                let (Some(col), Some(row)) = (
                    Self::cell(x, x_bounds, self.width),
                    Self::cell(y, y_bounds, self.height),
                ) else {
                    continue;
                };
                grid[self.height - 1 - row][col] = series.marker;
            }
        }

        let mut output = String::new();
        output.push_str(&format!("┌─ {} ", self.title));
        let used = self.title.chars().count() + 4;
        output.push_str(&"─".repeat((self.width + 10).saturating_sub(used)));
        output.push_str("┐\n");

        for (i, row) in grid.iter().enumerate() {
            if i == 0 {
                output.push_str(&format!("│{:>8.3} ", y_bounds.1));
            } else if i == self.height - 1 {
                output.push_str(&format!("│{:>8.3} ", y_bounds.0));
            } else {
                output.push_str("│         ");
            }
            output.extend(row.iter());
            output.push_str("│\n");
        }

        output.push_str("└─────────");
        output.push_str(&"─".repeat(self.width));
        output.push_str("┘\n");
        output.push_str(&format!(
            "          {:<w$}{:>8.1}\n",
            format!("{:.1}", x_bounds.0),
            x_bounds.1,
            w = self.width.saturating_sub(8)
        ));

        let legend: Vec<String> = self
            .series
            .iter()
            .map(|s| format!("{} {}", s.marker, s.label))
            .collect();
        if !legend.is_empty() {
            output.push_str(&format!("          {}\n", legend.join("   ")));
        }
        output
    }

    /// Print to stdout.
    pub fn show(&self) {
        print!("{}", self.render());
    }
}
