//! Forecast series to SVG meteogram.
//!
//! Three bands share one time axis: temperature on top, precipitation bars in the
//! middle, wind and gusts at the bottom. Every colour and stroke comes from the theme.

use crate::config::Theme;
use crate::domain::model::{ForecastPoint, ForecastSeries};
use chrono::Timelike;

pub const WIDTH: f64 = 960.0;
pub const HEIGHT: f64 = 540.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margin {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

pub const MARGIN: Margin = Margin {
    top: 64.0,
    right: 36.0,
    bottom: 80.0,
    left: 72.0,
};

const TEMPERATURE_SHARE: f64 = 0.55;
const PRECIPITATION_SHARE: f64 = 0.25;
const WIND_SHARE: f64 = 0.20;
const LABEL_EVERY: usize = 3;

/// Vertical extent of one band, in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub top: f64,
    pub height: f64,
}

impl Band {
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Scales and band geometry derived from one series.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartLayout {
    pub x_step: f64,
    pub temperature: Band,
    pub precipitation: Band,
    pub wind: Band,
    pub temp_min: f64,
    pub temp_max: f64,
    pub temp_range: f64,
    pub wind_max: f64,
    pub precip_max: f64,
}

impl ChartLayout {
    pub fn new(points: &[ForecastPoint]) -> Self {
        let inner_width = WIDTH - MARGIN.left - MARGIN.right;
        let plot_height = HEIGHT - MARGIN.top - MARGIN.bottom;

        let x_step = if points.len() > 1 {
            inner_width / (points.len() - 1) as f64
        } else {
            0.0
        };

        let temperature = Band {
            top: MARGIN.top,
            height: plot_height * TEMPERATURE_SHARE,
        };
        let precipitation = Band {
            top: temperature.bottom(),
            height: plot_height * PRECIPITATION_SHARE,
        };
        let wind = Band {
            top: precipitation.bottom(),
            height: plot_height * WIND_SHARE,
        };

        let temp_max = points.iter().map(|p| p.temperature).fold(5.0, f64::max);
        let temp_min = points.iter().map(|p| p.temperature).fold(-5.0, f64::min);
        let temp_range = (temp_max - temp_min).max(5.0);

        let wind_max = points
            .iter()
            .flat_map(|p| std::iter::once(p.wind_speed).chain(p.wind_gust))
            .fold(5.0, f64::max);

        let precip_max = points
            .iter()
            .filter_map(|p| p.precipitation)
            .fold(1.0, f64::max);

        Self {
            x_step,
            temperature,
            precipitation,
            wind,
            temp_min,
            temp_max,
            temp_range,
            wind_max,
            precip_max,
        }
    }

    pub fn x(&self, index: usize) -> f64 {
        MARGIN.left + index as f64 * self.x_step
    }

    pub fn temp_y(&self, temperature: f64) -> f64 {
        let ratio = (temperature - self.temp_min) / self.temp_range;
        self.temperature.bottom() - ratio * self.temperature.height
    }

    pub fn wind_y(&self, speed: f64) -> f64 {
        self.wind.bottom() - (speed / self.wind_max) * self.wind.height
    }

    /// `(x, y, width, height)` of the bar for one precipitation value, if any is drawn.
    pub fn precip_bar(&self, index: usize, amount: f64) -> Option<(f64, f64, f64, f64)> {
        if amount <= 0.0 || !amount.is_finite() {
            return None;
        }
        let height = (amount / self.precip_max * self.precipitation.height).max(2.0);
        let width = (0.7 * self.x_step).max(4.0);
        let x = self.x(index) - width / 2.0;
        let y = self.precipitation.bottom() - height;
        Some((x, y, width, height))
    }

    pub fn temperature_ticks(&self) -> Vec<f64> {
        let step = if self.temp_range <= 10.0 {
            1.0
        } else if self.temp_range <= 20.0 {
            2.0
        } else {
            5.0
        };
        let start = (self.temp_min / step).ceil() * step;
        ticks(start, self.temp_max, step)
    }

    pub fn wind_ticks(&self) -> Vec<f64> {
        let step = if self.wind_max <= 10.0 {
            2.0
        } else if self.wind_max <= 20.0 {
            5.0
        } else {
            10.0
        };
        ticks(0.0, self.wind_max, step)
    }
}

fn ticks(start: f64, end: f64, step: f64) -> Vec<f64> {
    (0..)
        .map(|k| start + k as f64 * step)
        .take_while(|t| *t <= end + 1e-9)
        .collect()
}

/// Polyline through `values` in index order, `M` then `L` segments.
fn line_path(values: impl Iterator<Item = (f64, f64)>) -> String {
    values
        .enumerate()
        .map(|(i, (x, y))| {
            let cmd = if i == 0 { 'M' } else { 'L' };
            format!("{}{:.2},{:.2}", cmd, x, y)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn render(series: &ForecastSeries, theme: &Theme) -> String {
    let points = &series.points;
    let layout = ChartLayout::new(points);
    let grid = format!(
        r#"stroke="{}" stroke-width="{}" stroke-opacity="{}""#,
        theme.grid_color, theme.grid_width, theme.grid_opacity
    );
    let right_edge = WIDTH - MARGIN.right;

    let mut svg = String::with_capacity(16 * 1024);
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {w} {h}" width="{w}" height="{h}" role="img" aria-labelledby="meteogram-title meteogram-desc" font-family="sans-serif">"#,
        w = WIDTH,
        h = HEIGHT
    ));
    svg.push_str(r#"<title id="meteogram-title">Meteogram</title>"#);
    svg.push_str(&format!(
        r#"<desc id="meteogram-desc">Temperature, precipitation and wind forecast for the next {} hours, updated {}.</desc>"#,
        points.len(),
        series.updated_at.format("%Y-%m-%d %H:%M UTC")
    ));

    // Header: legend and freshness.
    let legend = [
        ("Temperature °C", theme.temperature_color.as_str(), false),
        ("Precipitation mm", theme.precipitation_color.as_str(), false),
        ("Wind m/s", theme.wind_color.as_str(), false),
        ("Gust m/s", theme.gust_color.as_str(), true),
    ];
    svg.push_str(r#"<g class="legend" font-size="13">"#);
    for (i, (label, color, dashed)) in legend.iter().enumerate() {
        let x = MARGIN.left + i as f64 * 150.0;
        let dash = if *dashed { r#" stroke-dasharray="6 4""# } else { "" };
        svg.push_str(&format!(
            r#"<line x1="{:.2}" y1="24" x2="{:.2}" y2="24" stroke="{}" stroke-width="{}"{}/>"#,
            x,
            x + 20.0,
            color,
            theme.line_width,
            dash
        ));
        svg.push_str(&format!(
            r#"<text x="{:.2}" y="28" fill="{}">{}</text>"#,
            x + 26.0,
            theme.text_color,
            label
        ));
    }
    svg.push_str("</g>");
    svg.push_str(&format!(
        r#"<text class="updated" x="{:.2}" y="28" text-anchor="end" font-size="12" fill="{}">Updated {}</text>"#,
        right_edge,
        theme.secondary_text_color,
        series.updated_at.format("%H:%M UTC")
    ));

    // Temperature band.
    svg.push_str(r#"<g class="temperature-axis" font-size="12">"#);
    for tick in layout.temperature_ticks() {
        let y = layout.temp_y(tick);
        svg.push_str(&format!(
            r#"<line x1="{:.2}" y1="{y:.2}" x2="{:.2}" y2="{y:.2}" {grid}/>"#,
            MARGIN.left, right_edge
        ));
        svg.push_str(&format!(
            r#"<text x="{:.2}" y="{:.2}" text-anchor="end" fill="{}">{}°</text>"#,
            MARGIN.left - 8.0,
            y + 4.0,
            theme.text_color,
            tick.round() as i64
        ));
    }
    if layout.temp_min < 0.0 && layout.temp_max > 0.0 {
        let y = layout.temp_y(0.0);
        svg.push_str(&format!(
            r#"<line class="freezing" x1="{:.2}" y1="{y:.2}" x2="{:.2}" y2="{y:.2}" stroke="{}" stroke-width="{}" stroke-dasharray="2 3"/>"#,
            MARGIN.left, right_edge, theme.accent_color, theme.grid_width
        ));
    }
    svg.push_str("</g>");

    // Precipitation band.
    svg.push_str(&format!(
        r#"<line class="precipitation-baseline" x1="{:.2}" y1="{y:.2}" x2="{:.2}" y2="{y:.2}" {grid}/>"#,
        MARGIN.left,
        right_edge,
        y = layout.precipitation.bottom()
    ));
    svg.push_str(&format!(
        r#"<text x="{:.2}" y="{:.2}" text-anchor="end" font-size="12" fill="{}">{:.1} mm</text>"#,
        MARGIN.left - 8.0,
        layout.precipitation.top + 12.0,
        theme.secondary_text_color,
        layout.precip_max
    ));
    svg.push_str(&format!(
        r#"<g class="precipitation" fill="{}" fill-opacity="{}">"#,
        theme.precipitation_color, theme.precipitation_opacity
    ));
    for (i, point) in points.iter().enumerate() {
        if let Some((x, y, w, h)) = point
            .precipitation
            .and_then(|amount| layout.precip_bar(i, amount))
        {
            svg.push_str(&format!(
                r#"<rect class="precipitation-bar" x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}"/>"#,
                x, y, w, h
            ));
        }
    }
    svg.push_str("</g>");

    // Wind band.
    svg.push_str(r#"<g class="wind-axis" font-size="12">"#);
    for tick in layout.wind_ticks() {
        let y = layout.wind_y(tick);
        svg.push_str(&format!(
            r#"<line x1="{:.2}" y1="{y:.2}" x2="{:.2}" y2="{y:.2}" {grid}/>"#,
            MARGIN.left, right_edge
        ));
        svg.push_str(&format!(
            r#"<text x="{:.2}" y="{:.2}" fill="{}">{} m/s</text>"#,
            right_edge + 4.0,
            y + 4.0,
            theme.secondary_text_color,
            tick.round() as i64
        ));
    }
    svg.push_str("</g>");

    // Series lines.
    let temperature = line_path(
        points
            .iter()
            .enumerate()
            .map(|(i, p)| (layout.x(i), layout.temp_y(p.temperature))),
    );
    let wind = line_path(
        points
            .iter()
            .enumerate()
            .map(|(i, p)| (layout.x(i), layout.wind_y(p.wind_speed))),
    );
    let gust = line_path(
        points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.wind_gust.map(|g| (layout.x(i), layout.wind_y(g)))),
    );

    if !gust.is_empty() {
        svg.push_str(&format!(
            r#"<path class="gust-line" d="{}" fill="none" stroke="{}" stroke-width="{}" stroke-dasharray="6 4"/>"#,
            gust, theme.gust_color, theme.line_width
        ));
    }
    svg.push_str(&format!(
        r#"<path class="wind-line" d="{}" fill="none" stroke="{}" stroke-width="{}"/>"#,
        wind, theme.wind_color, theme.line_width
    ));
    svg.push_str(&format!(
        r#"<path class="temperature-line" d="{}" fill="none" stroke="{}" stroke-width="{}" stroke-linejoin="round"/>"#,
        temperature, theme.temperature_color, theme.line_width
    ));

    // Time axis.
    let label_y = HEIGHT - MARGIN.bottom + 18.0;
    svg.push_str(&format!(
        r#"<g class="time-axis" font-size="12" text-anchor="middle" fill="{}">"#,
        theme.text_color
    ));
    for (i, point) in points.iter().enumerate().step_by(LABEL_EVERY) {
        let x = layout.x(i);
        svg.push_str(&format!(
            r#"<text class="hour-label" x="{:.2}" y="{:.2}">{}</text>"#,
            x,
            label_y,
            point.time.format("%H")
        ));
        if point.time.hour() == 0 {
            svg.push_str(&format!(
                r#"<line class="day-boundary" x1="{x:.2}" y1="{:.2}" x2="{x:.2}" y2="{:.2}" {grid}/>"#,
                MARGIN.top,
                HEIGHT - MARGIN.bottom
            ));
            svg.push_str(&format!(
                r#"<text class="day-label" x="{:.2}" y="{:.2}" fill="{}">{}</text>"#,
                x,
                label_y + 18.0,
                theme.secondary_text_color,
                point.time.format("%a %b %-d")
            ));
        }
    }
    svg.push_str("</g>");

    svg.push_str("</svg>");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap()
    }

    fn series(temps: &[f64]) -> ForecastSeries {
        ForecastSeries {
            updated_at: start(),
            points: temps
                .iter()
                .enumerate()
                .map(|(i, t)| ForecastPoint {
                    time: start() + Duration::hours(i as i64),
                    temperature: *t,
                    wind_speed: 2.0 + i as f64 * 0.5,
                    wind_gust: None,
                    precipitation: None,
                })
                .collect(),
        }
    }

    fn path_d<'a>(svg: &'a str, class: &str) -> Option<&'a str> {
        let marker = format!(r#"class="{}" d=""#, class);
        let start = svg.find(&marker)? + marker.len();
        let end = svg[start..].find('"')? + start;
        Some(&svg[start..end])
    }

    #[test]
    fn render_is_deterministic() {
        let s = series(&[1.0, 3.5, -2.0, 7.0]);
        assert_eq!(render(&s, &Theme::default()), render(&s, &Theme::default()));
    }

    #[test]
    fn temperatures_stay_inside_their_band() {
        let s = series(&[-31.0, -12.5, 0.0, 4.0, 18.0, 36.2]);
        let layout = ChartLayout::new(&s.points);
        for p in &s.points {
            let y = layout.temp_y(p.temperature);
            assert!(y >= MARGIN.top - 1e-9, "{y}");
            assert!(y <= MARGIN.top + layout.temperature.height + 1e-9, "{y}");
        }
    }

    #[test]
    fn bands_split_plot_height() {
        let layout = ChartLayout::new(&series(&[1.0, 2.0]).points);
        let plot = HEIGHT - MARGIN.top - MARGIN.bottom;
        assert!((layout.temperature.height - plot * 0.55).abs() < 1e-9);
        assert!((layout.precipitation.top - layout.temperature.bottom()).abs() < 1e-9);
        assert!((layout.wind.bottom() - (HEIGHT - MARGIN.bottom)).abs() < 1e-9);
    }

    #[test]
    fn temperature_domain_is_floored() {
        let layout = ChartLayout::new(&series(&[2.0, 2.0, 2.0]).points);
        assert_eq!(layout.temp_max, 5.0);
        assert_eq!(layout.temp_min, -5.0);
        assert_eq!(layout.temp_range, 10.0);
        assert_eq!(layout.temperature_ticks().len(), 11);
        assert_eq!(layout.temperature_ticks()[0], -5.0);
    }

    #[test]
    fn temperature_tick_steps() {
        let layout = ChartLayout::new(&series(&[-5.0, 12.0]).points);
        assert_eq!(layout.temp_range, 17.0);
        assert_eq!(
            layout.temperature_ticks(),
            vec![-4.0, -2.0, 0.0, 2.0, 4.0, 6.0, 8.0, 10.0, 12.0]
        );

        let layout = ChartLayout::new(&series(&[-13.0, 20.0]).points);
        assert_eq!(
            layout.temperature_ticks(),
            vec![-10.0, -5.0, 0.0, 5.0, 10.0, 15.0, 20.0]
        );
    }

    #[test]
    fn wind_ticks_cover_zero_to_max() {
        let mut s = series(&[1.0, 2.0]);
        let layout = ChartLayout::new(&s.points);
        assert_eq!(layout.wind_max, 5.0);
        assert_eq!(layout.wind_ticks(), vec![0.0, 2.0, 4.0]);

        s.points[0].wind_gust = Some(17.0);
        let layout = ChartLayout::new(&s.points);
        assert_eq!(layout.wind_max, 17.0);
        assert_eq!(layout.wind_ticks(), vec![0.0, 5.0, 10.0, 15.0]);

        s.points[0].wind_gust = Some(30.0);
        let layout = ChartLayout::new(&s.points);
        assert_eq!(layout.wind_ticks(), vec![0.0, 10.0, 20.0, 30.0]);
    }

    #[test]
    fn single_point_renders_without_nan() {
        let s = series(&[4.0]);
        let svg = render(&s, &Theme::default());
        assert!(!svg.contains("NaN"));
        // 4 °C sits 90% up a [-5, 5] domain.
        assert_eq!(path_d(&svg, "temperature-line"), Some("M72.00,85.78"));
        assert_eq!(path_d(&svg, "wind-line"), Some("M72.00,428.32"));
    }

    #[test]
    fn precipitation_bars_only_for_positive_amounts() {
        let mut s = series(&[1.0, 2.0, 3.0, 4.0]);
        s.points[1].precipitation = Some(0.0);
        s.points[2].precipitation = Some(0.01);
        s.points[3].precipitation = Some(4.0);

        let layout = ChartLayout::new(&s.points);
        let (_, _, w, h) = layout.precip_bar(2, 0.01).unwrap();
        assert_eq!(h, 2.0);
        assert!((w - 0.7 * layout.x_step).abs() < 1e-9);
        let (_, y, _, h) = layout.precip_bar(3, 4.0).unwrap();
        assert!((h - layout.precipitation.height).abs() < 1e-9);
        assert!((y + h - layout.precipitation.bottom()).abs() < 1e-9);
        assert!(layout.precip_bar(1, 0.0).is_none());

        let svg = render(&s, &Theme::default());
        assert_eq!(svg.matches("precipitation-bar").count(), 2);
    }

    #[test]
    fn gust_line_is_dashed_and_optional() {
        let mut s = series(&[1.0, 2.0, 3.0]);
        let svg = render(&s, &Theme::default());
        assert!(path_d(&svg, "gust-line").is_none());

        s.points[0].wind_gust = Some(6.0);
        s.points[2].wind_gust = Some(8.0);
        let svg = render(&s, &Theme::default());
        let d = path_d(&svg, "gust-line").unwrap();
        assert_eq!(d.matches('M').count() + d.matches('L').count(), 2);
        assert!(svg.contains(r#"class="gust-line""#));
        assert!(svg.contains(r#"stroke-dasharray="6 4"/>"#));
    }

    #[test]
    fn hour_and_day_labels() {
        // 18:00 start: index 6 is 00:00 on the next day and falls on a label slot.
        let s = series(&[1.0; 10]);
        let svg = render(&s, &Theme::default());

        assert_eq!(svg.matches("hour-label").count(), 4);
        assert_eq!(svg.matches(r#"class="day-label""#).count(), 1);
        assert!(svg.contains(">Tue Jan 16</text>"), "{svg}");
    }

    #[test]
    fn theme_only_changes_colours() {
        let s = series(&[1.0, 5.0, 3.0]);
        let dark = Theme {
            temperature_color: "#ff8800".to_string(),
            text_color: "#eeeeee".to_string(),
            ..Theme::default()
        };

        let light_svg = render(&s, &Theme::default());
        let dark_svg = render(&s, &dark);

        assert_ne!(light_svg, dark_svg);
        assert!(dark_svg.contains("#ff8800"));
        assert_eq!(
            path_d(&light_svg, "temperature-line"),
            path_d(&dark_svg, "temperature-line")
        );
        assert_eq!(light_svg.matches('<').count(), dark_svg.matches('<').count());
    }

    #[test]
    fn document_is_self_contained() {
        let svg = render(&series(&[1.0, 2.0]), &Theme::default());
        assert!(svg.starts_with("<svg xmlns=\"http://www.w3.org/2000/svg\""));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains("<title id=\"meteogram-title\">Meteogram</title>"));
        assert!(svg.contains("updated 2024-01-15 18:00 UTC"));
        assert!(!svg.contains("<style"));
        assert!(!svg.contains("href"));
    }
}
