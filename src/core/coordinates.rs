use crate::domain::model::Coordinates;
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

fn pair_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([+-]?\d+(?:\.\d+)?),([+-]?\d+(?:\.\d+)?)$").expect("valid coordinate pattern")
    })
}

/// Finds the first path segment of `url` of the form `<lat>,<lon>`.
///
/// Malformed URLs and out-of-range pairs are treated as "no coordinates".
pub fn extract_coordinates(url: &str) -> Option<Coordinates> {
    let parsed = Url::parse(url.trim()).ok()?;
    let segments = parsed.path_segments()?;

    segments
        .map(|segment| segment.replace("%2C", ",").replace("%2c", ","))
        .find_map(|segment| parse_pair(&segment))
}

fn parse_pair(segment: &str) -> Option<Coordinates> {
    let caps = pair_regex().captures(segment)?;
    let lat: f64 = caps[1].parse().ok()?;
    let lon: f64 = caps[2].parse().ok()?;

    if !lat.is_finite() || !lon.is_finite() {
        return None;
    }
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }

    Some(Coordinates { lat, lon })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_pair_in_middle_segment() {
        let coords = extract_coordinates("https://x/y/60.10,10.75/z").unwrap();
        assert_eq!(coords, Coordinates { lat: 60.10, lon: 10.75 });
    }

    #[test]
    fn accepts_signs_and_encoded_comma() {
        let coords = extract_coordinates("https://example.com/-33.86%2C151.21").unwrap();
        assert_eq!(coords, Coordinates { lat: -33.86, lon: 151.21 });

        let coords = extract_coordinates("https://example.com/a/63.4,-10.4?x=1").unwrap();
        assert_eq!(coords, Coordinates { lat: 63.4, lon: -10.4 });
    }

    #[test]
    fn returns_first_matching_segment() {
        let coords = extract_coordinates("https://example.com/1.5,2.5/3.5,4.5").unwrap();
        assert_eq!(coords, Coordinates { lat: 1.5, lon: 2.5 });
    }

    #[test]
    fn no_pair_is_not_found() {
        assert_eq!(extract_coordinates("https://example.com/chart.svg"), None);
        assert_eq!(extract_coordinates("https://example.com/60.1;10.7/"), None);
        assert_eq!(extract_coordinates("https://example.com/?q=60.1,10.7"), None);
    }

    #[test]
    fn malformed_url_is_not_found() {
        assert_eq!(extract_coordinates("not a url"), None);
        assert_eq!(extract_coordinates(""), None);
        assert_eq!(extract_coordinates("60.1,10.7"), None);
    }

    #[test]
    fn out_of_range_pair_is_skipped() {
        assert_eq!(extract_coordinates("https://example.com/95.0,10.0"), None);
        let coords = extract_coordinates("https://example.com/95.0,10.0/45.0,10.0").unwrap();
        assert_eq!(coords, Coordinates { lat: 45.0, lon: 10.0 });
    }
}
