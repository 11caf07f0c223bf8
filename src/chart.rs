use iced::mouse;
use iced::widget::canvas::{self, Cache, Event, Frame, Geometry, Path, Stroke, Text};
use iced::{Color, Font, Point, Rectangle, Renderer, Size, Theme};

use crate::sample::SampleBuffer;
use crate::window::{LabelFormat, WindowPolicy};

const PAD_LEFT: f32 = 48.0;
const PAD_RIGHT: f32 = 10.0;
const PAD_TOP: f32 = 22.0;
const PAD_BOTTOM: f32 = 20.0;
/// Maximum number of x-axis labels on the line chart.
const MAX_X_LABELS: usize = 6;

/// Something that can display a sample buffer under a window policy.
pub trait ChartAdapter {
    /// Full redraw: drop the current dataset, rebuild it from `buffer`,
    /// pick the axis formatter from `policy`, and request a redraw.
    fn render(&mut self, buffer: &SampleBuffer, policy: &WindowPolicy);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Line,
    Bars,
}

/// Render target holding what the canvas draws. Rebuilt wholesale on every render.
pub struct ChartModel {
    kind: ChartKind,
    values: Vec<f32>,
    labels: Vec<String>,
    format: Option<LabelFormat>,
    y_min: f32,
    y_max: f32,
    /// Multiplier applied to buffer values (cost mode on the usage bars).
    value_scale: f64,
    /// Highlight the newest bar (today's usage).
    highlight_last: bool,
    redraws: u64,
    cache: Cache,
}

impl std::fmt::Debug for ChartModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChartModel")
            .field("kind", &self.kind)
            .field("points", &self.values.len())
            .field("format", &self.format)
            .field("redraws", &self.redraws)
            .finish()
    }
}

impl ChartModel {
    pub fn new(kind: ChartKind) -> Self {
        Self {
            kind,
            values: Vec::new(),
            labels: Vec::new(),
            format: None,
            y_min: 0.0,
            y_max: 1.0,
            value_scale: 1.0,
            highlight_last: kind == ChartKind::Bars,
            redraws: 0,
            cache: Cache::new(),
        }
    }

    pub fn kind(&self) -> ChartKind {
        self.kind
    }

    pub fn point_count(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn axis_labels(&self) -> &[String] {
        &self.labels
    }

    /// Formatter chosen by the last render, `None` before the first one.
    pub fn format(&self) -> Option<LabelFormat> {
        self.format
    }

    pub fn redraw_count(&self) -> u64 {
        self.redraws
    }

    pub fn set_value_scale(&mut self, scale: f64) {
        self.value_scale = scale;
    }

    /// Force the cached geometry to be rebuilt (palette change).
    pub fn invalidate(&self) {
        self.cache.clear();
    }

    fn y_range(&self) -> (f32, f32) {
        let max = self.values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let min = self.values.iter().copied().fold(f32::INFINITY, f32::min);
        if !max.is_finite() || !min.is_finite() {
            return (0.0, 1.0);
        }
        let lo = min.min(0.0);
        let hi = if max > lo { max * 1.1 } else { lo + 1.0 };
        (lo, hi)
    }
}

impl ChartAdapter for ChartModel {
    fn render(&mut self, buffer: &SampleBuffer, policy: &WindowPolicy) {
        self.values.clear();
        self.labels.clear();
        for sample in buffer.iter() {
            self.values.push((sample.value * self.value_scale) as f32);
            self.labels.push(policy.format.format(&sample.label));
        }
        self.format = Some(policy.format);
        (self.y_min, self.y_max) = self.y_range();
        self.redraws += 1;
        self.cache.clear();
    }
}

/// Hover state: the snapped data-point index.
#[derive(Debug, Clone, Default)]
pub struct ChartState {
    pub hover_idx: Option<usize>,
}

/// Colors the chart needs from the active palette.
#[derive(Debug, Clone, Copy)]
pub struct ChartColors {
    pub bg: Color,
    pub border: Color,
    pub grid: Color,
    pub label: Color,
    pub text: Color,
    pub series: Color,
    pub highlight: Color,
}

/// Canvas program drawing a [`ChartModel`] as a filled line or as bars.
pub struct ChartView<'a> {
    pub model: &'a ChartModel,
    pub title: String,
    /// Unit suffix for the tooltip (e.g. " W", " kWh").
    pub unit: String,
    pub colors: ChartColors,
}

impl ChartView<'_> {
    fn slot_x(&self, idx: usize, n: usize, chart_w: f32) -> f32 {
        match self.model.kind {
            ChartKind::Line => {
                if n < 2 {
                    PAD_LEFT + chart_w / 2.0
                } else {
                    PAD_LEFT + (idx as f32 / (n - 1) as f32) * chart_w
                }
            }
            ChartKind::Bars => {
                let slot = chart_w / n.max(1) as f32;
                PAD_LEFT + slot * (idx as f32 + 0.5)
            }
        }
    }

    fn value_y(&self, val: f32, chart_h: f32) -> f32 {
        let range = self.model.y_max - self.model.y_min;
        let normalized = if range > 0.0 { (val - self.model.y_min) / range } else { 0.5 };
        PAD_TOP + chart_h * (1.0 - normalized)
    }

    fn draw_static(&self, frame: &mut Frame, bounds: Size) {
        let c = &self.colors;
        let chart_w = bounds.width - PAD_LEFT - PAD_RIGHT;
        let chart_h = bounds.height - PAD_TOP - PAD_BOTTOM;

        frame.fill(&Path::rectangle(Point::ORIGIN, bounds), c.bg);
        let border = Path::rectangle(Point::new(0.5, 0.5), Size::new(bounds.width - 1.0, bounds.height - 1.0));
        frame.stroke(&border, Stroke::default().with_color(c.border).with_width(0.5));

        let mut title = Text::from(self.title.clone());
        title.position = Point::new(PAD_LEFT, 3.0);
        title.color = c.text;
        title.size = 12.0.into();
        frame.fill_text(title);

        if chart_w <= 0.0 || chart_h <= 0.0 {
            return;
        }

        // Y-axis ticks
        let y_range = self.model.y_max - self.model.y_min;
        if y_range > 0.0 {
            let step = nice_tick_step(y_range, 5);
            let mut val = (self.model.y_min / step).ceil() * step;
            while val <= self.model.y_max + step * 0.001 {
                let y = self.value_y(val, chart_h);
                let grid = Path::line(Point::new(PAD_LEFT, y), Point::new(PAD_LEFT + chart_w, y));
                frame.stroke(&grid, Stroke::default().with_color(c.grid).with_width(1.0));

                let mut label = Text::from(if step >= 1.0 { format!("{val:.0}") } else { format!("{val:.1}") });
                label.position = Point::new(4.0, y - 6.0);
                label.color = c.label;
                label.size = 10.0.into();
                label.font = Font::MONOSPACE;
                frame.fill_text(label);
                val += step;
            }
        }

        let n = self.model.values.len();
        if n == 0 {
            return;
        }

        match self.model.kind {
            ChartKind::Line => self.draw_line(frame, chart_w, chart_h),
            ChartKind::Bars => self.draw_bars(frame, chart_w, chart_h),
        }

        // X-axis labels, thinned to what fits
        let max_labels = match self.model.kind {
            ChartKind::Line => MAX_X_LABELS,
            ChartKind::Bars => ((chart_w / 32.0) as usize).max(1),
        };
        let every = n.div_ceil(max_labels).max(1);
        for (idx, label) in self.model.labels.iter().enumerate() {
            if idx % every != 0 || label.is_empty() {
                continue;
            }
            let mut t = Text::from(label.clone());
            t.position = Point::new(self.slot_x(idx, n, chart_w), PAD_TOP + chart_h + 4.0);
            t.color = c.label;
            t.size = 10.0.into();
            t.font = Font::MONOSPACE;
            t.horizontal_alignment = iced::alignment::Horizontal::Center;
            frame.fill_text(t);
        }
    }

    fn draw_line(&self, frame: &mut Frame, chart_w: f32, chart_h: f32) {
        let data = &self.model.values;
        let n = data.len();
        let color = self.colors.series;
        if n == 1 {
            let p = Point::new(self.slot_x(0, n, chart_w), self.value_y(data[0], chart_h));
            frame.fill(&Path::circle(p, 3.0), color);
            return;
        }

        let base_y = self.value_y(self.model.y_min, chart_h);
        let mut fill = canvas::path::Builder::new();
        fill.move_to(Point::new(PAD_LEFT, base_y));
        let mut line = canvas::path::Builder::new();
        for (i, &val) in data.iter().enumerate() {
            let p = Point::new(self.slot_x(i, n, chart_w), self.value_y(val, chart_h));
            fill.line_to(p);
            if i == 0 {
                line.move_to(p);
            } else {
                line.line_to(p);
            }
        }
        fill.line_to(Point::new(PAD_LEFT + chart_w, base_y));
        fill.close();
        frame.fill(&fill.build(), Color::from_rgba(color.r, color.g, color.b, 0.2));
        frame.stroke(&line.build(), Stroke::default().with_color(color).with_width(1.6));
    }

    fn draw_bars(&self, frame: &mut Frame, chart_w: f32, chart_h: f32) {
        let data = &self.model.values;
        let n = data.len();
        let slot = chart_w / n as f32;
        let bar_w = (slot * 0.7).max(1.0);
        let base_y = self.value_y(self.model.y_min.max(0.0), chart_h);
        for (i, &val) in data.iter().enumerate() {
            let top = self.value_y(val, chart_h);
            let x = self.slot_x(i, n, chart_w) - bar_w / 2.0;
            let color = if self.model.highlight_last && i == n - 1 {
                self.colors.highlight
            } else {
                self.colors.series
            };
            let (y, h) = if top <= base_y { (top, base_y - top) } else { (base_y, top - base_y) };
            frame.fill(&Path::rectangle(Point::new(x, y), Size::new(bar_w, h.max(1.0))), color);

            if bar_w >= 28.0 {
                let mut t = Text::from(format!("{val:.1}"));
                t.position = Point::new(x + bar_w / 2.0, y - 12.0);
                t.color = self.colors.label;
                t.size = 9.0.into();
                t.font = Font::MONOSPACE;
                t.horizontal_alignment = iced::alignment::Horizontal::Center;
                frame.fill_text(t);
            }
        }
    }
}

impl<Message: 'static> canvas::Program<Message> for ChartView<'_> {
    type State = ChartState;

    fn update(
        &self,
        state: &mut Self::State,
        event: Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> (canvas::event::Status, Option<Message>) {
        let chart_w = bounds.width - PAD_LEFT - PAD_RIGHT;
        let n = self.model.values.len();

        let new_idx = match &event {
            Event::Mouse(mouse::Event::CursorMoved { .. }) => cursor.position_in(bounds).and_then(|pos| {
                if n == 0 || chart_w <= 0.0 || pos.x < PAD_LEFT || pos.x > PAD_LEFT + chart_w {
                    return None;
                }
                let frac = (pos.x - PAD_LEFT) / chart_w;
                let idx = match self.model.kind {
                    ChartKind::Line if n >= 2 => (frac * (n - 1) as f32).round() as usize,
                    ChartKind::Line => 0,
                    ChartKind::Bars => (frac * n as f32) as usize,
                };
                Some(idx.min(n - 1))
            }),
            Event::Mouse(mouse::Event::CursorLeft) => None,
            _ => return (canvas::event::Status::Ignored, None),
        };

        if new_idx != state.hover_idx {
            state.hover_idx = new_idx;
        }
        (canvas::event::Status::Ignored, None)
    }

    fn mouse_interaction(
        &self,
        _state: &Self::State,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> mouse::Interaction {
        if cursor.is_over(bounds) {
            mouse::Interaction::Crosshair
        } else {
            mouse::Interaction::default()
        }
    }

    fn draw(
        &self,
        state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let base = self
            .model
            .cache
            .draw(renderer, bounds.size(), |frame| self.draw_static(frame, bounds.size()));

        let n = self.model.values.len();
        let chart_w = bounds.width - PAD_LEFT - PAD_RIGHT;
        let chart_h = bounds.height - PAD_TOP - PAD_BOTTOM;
        let Some(idx) = state.hover_idx.filter(|&i| i < n) else {
            return vec![base];
        };
        if chart_w <= 0.0 || chart_h <= 0.0 {
            return vec![base];
        }

        let mut frame = Frame::new(renderer, bounds.size());
        let c = &self.colors;
        let x = self.slot_x(idx, n, chart_w);
        let val = self.model.values[idx];
        let y = self.value_y(val, chart_h);

        let crosshair = Path::line(Point::new(x, PAD_TOP), Point::new(x, PAD_TOP + chart_h));
        frame.stroke(
            &crosshair,
            Stroke::default()
                .with_color(Color::from_rgba(c.text.r, c.text.g, c.text.b, 0.35))
                .with_width(1.0),
        );
        frame.fill(&Path::circle(Point::new(x, y), 4.0), c.series);

        let label = self.model.labels.get(idx).map(String::as_str).unwrap_or("");
        let tooltip = if label.is_empty() {
            format!("{val:.1}{}", self.unit)
        } else {
            format!("{label}  {val:.1}{}", self.unit)
        };
        let text_w = tooltip.chars().count() as f32 * 6.6 + 16.0;
        let tx = (x + 12.0).min(PAD_LEFT + chart_w - text_w).max(PAD_LEFT);
        let ty = PAD_TOP + 4.0;
        let box_path = Path::rectangle(Point::new(tx - 4.0, ty - 2.0), Size::new(text_w, 18.0));
        frame.fill(&box_path, Color::from_rgba(c.bg.r, c.bg.g, c.bg.b, 0.95));
        frame.stroke(
            &box_path,
            Stroke::default()
                .with_color(Color::from_rgba(c.series.r, c.series.g, c.series.b, 0.4))
                .with_width(0.8),
        );
        let mut tt = Text::from(tooltip);
        tt.position = Point::new(tx, ty);
        tt.color = c.text;
        tt.size = 11.0.into();
        tt.font = Font::MONOSPACE;
        frame.fill_text(tt);

        vec![base, frame.into_geometry()]
    }
}

/// Pick a "nice" tick step (1, 2, 5, 10, 20, 50, …) so that the range
/// is divided into at most `max_ticks` intervals.
fn nice_tick_step(range: f32, max_ticks: usize) -> f32 {
    let rough = range / max_ticks as f32;
    let mag = 10f32.powf(rough.log10().floor());
    let norm = rough / mag;
    let nice = if norm <= 1.0 { 1.0 } else if norm <= 2.0 { 2.0 } else if norm <= 5.0 { 5.0 } else { 10.0 };
    (nice * mag).max(f32::EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use crate::sample::Sample;
    use crate::window::WindowSelection;

    fn power_buffer() -> SampleBuffer {
        SampleBuffer::from_samples([
            Sample::new("09:00", 100.0),
            Sample::new("09:05", 150.0),
            Sample::new("09:10", 120.0),
        ])
    }

    #[test]
    fn test_render_rebuilds_from_buffer() {
        let mut model = ChartModel::new(ChartKind::Line);
        let policy = WindowPolicy::evaluate(WindowSelection::ThreeHours, None);
        model.render(&power_buffer(), &policy);
        assert_eq!(model.point_count(), 3);
        assert_eq!(model.values(), &[100.0f32, 150.0, 120.0]);
        assert_eq!(model.axis_labels(), &["09:00", "09:05", "09:10"]);
        assert_eq!(model.format(), Some(LabelFormat::HourMinute));
    }

    #[test]
    fn test_render_twice_is_stable() {
        let mut model = ChartModel::new(ChartKind::Line);
        let policy = WindowPolicy::evaluate(WindowSelection::SixHours, None);
        let buf = power_buffer();
        model.render(&buf, &policy);
        let (count, format) = (model.point_count(), model.format());
        model.render(&buf, &policy);
        assert_eq!(model.point_count(), count);
        assert_eq!(model.format(), format);
        assert_eq!(model.redraw_count(), 2);
    }

    #[test]
    fn test_render_empty_buffer() {
        let mut model = ChartModel::new(ChartKind::Bars);
        model.render(&power_buffer(), &WindowPolicy::daily_bars(7));
        model.render(&SampleBuffer::unbounded(), &WindowPolicy::daily_bars(7));
        assert_eq!(model.point_count(), 0);
        assert_eq!(model.y_range(), (0.0, 1.0));
    }

    #[test]
    fn test_value_scale_applies_on_render() {
        let mut model = ChartModel::new(ChartKind::Bars);
        model.set_value_scale(0.5);
        model.render(&power_buffer(), &WindowPolicy::daily_bars(7));
        assert_eq!(model.values(), &[50.0f32, 75.0, 60.0]);
    }

    #[test]
    fn test_week_uses_day_names() {
        let mut model = ChartModel::new(ChartKind::Line);
        let noon = Local.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap();
        let buf = SampleBuffer::from_samples([Sample::new(noon.timestamp_millis().to_string(), 3.0)]);
        model.render(&buf, &WindowPolicy::evaluate(WindowSelection::Week, None));
        assert_eq!(model.format(), Some(LabelFormat::DayOfWeek));
        assert_eq!(model.axis_labels(), &["Wed"]);
    }

    #[test]
    fn test_nice_tick_step() {
        assert!((nice_tick_step(100.0, 5) - 20.0).abs() < 1e-4);
        assert!((nice_tick_step(7.0, 5) - 2.0).abs() < 1e-4);
    }
}
