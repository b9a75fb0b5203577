use chrono::{DateTime, NaiveDateTime, Utc};
use itertools::Itertools;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;

use crate::errors::RouteError;
use crate::geo_utils::TrackPoint;
use crate::polyline;

/// The input formats the sniffing chain can route to, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteFormat {
    Gpx,
    EncodedPolyline,
    MapsUrl,
    JsonArray,
    Csv,
    Whitespace,
}

/// Output of a successful parse: the point sequence plus whatever
/// metadata the format could supply.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRoute {
    pub points: Vec<TrackPoint>,
    pub default_name: &'static str,
    pub captured_at: Option<DateTime<Utc>>,
    pub activity_type: Option<String>,
}

impl ParsedRoute {
    fn polyline_track(points: Vec<TrackPoint>) -> Self {
        ParsedRoute {
            points,
            default_name: "Polyline Track",
            captured_at: None,
            activity_type: None,
        }
    }
}

/// Content-based format detection. First match wins; the chain never
/// falls through to a later rule once a rule has claimed the text.
pub fn detect_route_format(text: &str) -> RouteFormat {
    if text.contains("<gpx") || text.contains("<trkpt") {
        RouteFormat::Gpx
    } else if is_encoded_polyline(text) {
        RouteFormat::EncodedPolyline
    } else if text.contains("google.com/maps") || text.contains("maps.google.com") {
        RouteFormat::MapsUrl
    } else if text.starts_with('[') && text.ends_with(']') {
        RouteFormat::JsonArray
    } else if text.contains(',') {
        RouteFormat::Csv
    } else {
        RouteFormat::Whitespace
    }
}

/// Sniffs the format of `text` and runs the matching parser. Fails fast:
/// an error from the matched parser propagates as-is instead of retrying
/// other formats. Any branch that ends up with fewer than two valid
/// points is `InsufficientPoints`.
pub fn parse_route_data(text: &str) -> Result<ParsedRoute, RouteError> {
    let text = text.trim();
    let format = detect_route_format(text);
    debug!("detected route format: {format:?}");
    let parsed = match format {
        RouteFormat::Gpx => parse_gpx(text)?,
        RouteFormat::EncodedPolyline => ParsedRoute::polyline_track(polyline::decode(text)?),
        RouteFormat::MapsUrl => ParsedRoute::polyline_track(extract_polyline_from_url(text)?),
        RouteFormat::JsonArray => ParsedRoute::polyline_track(parse_json_points(text)?),
        RouteFormat::Csv => ParsedRoute::polyline_track(parse_csv_points(text)),
        RouteFormat::Whitespace => ParsedRoute::polyline_track(parse_whitespace_points(text)),
    };
    if parsed.points.len() < 2 {
        return Err(RouteError::InsufficientPoints);
    }
    Ok(parsed)
}

fn is_encoded_polyline(text: &str) -> bool {
    text.len() > 10
        && text
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || br"_-~`@?\{}|[]".contains(&b))
}

fn parse_finite(field: &str) -> Option<f64> {
    let value: f64 = field.trim().parse().ok()?;
    value.is_finite().then_some(value)
}

fn parse_gpx(text: &str) -> Result<ParsedRoute, RouteError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    // Mismatched closing tags must surface as a parse failure.
    reader.config_mut().check_end_names = true;

    let mut points = Vec::new();
    let mut trkpt_count: usize = 0;
    let mut dropped: usize = 0;

    // <time> candidates, picked by priority once the document is read.
    let mut metadata_time: Option<String> = None;
    let mut track_time: Option<String> = None;
    let mut point_time: Option<String> = None;
    let mut segment_time: Option<String> = None;

    let mut track_type: Option<String> = None;
    let mut metadata_type: Option<String> = None;

    let mut in_metadata = false;
    let mut in_trk = false;
    let mut in_trkseg = false;
    let mut in_trkpt = false;

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"metadata" => in_metadata = true,
                b"trk" => in_trk = true,
                b"trkseg" => in_trkseg = true,
                b"trkpt" => {
                    in_trkpt = true;
                    trkpt_count += 1;
                    match track_point_from_attributes(&e) {
                        Some(point) => points.push(point),
                        None => dropped += 1,
                    }
                }
                b"time" => {
                    let raw = read_element_text(&mut reader, &e)?;
                    if in_trkpt {
                        point_time.get_or_insert(raw);
                    } else if in_trkseg {
                        segment_time.get_or_insert(raw);
                    } else if in_trk {
                        track_time.get_or_insert(raw);
                    } else if in_metadata {
                        metadata_time.get_or_insert(raw);
                    }
                }
                b"type" => {
                    let raw = read_element_text(&mut reader, &e)?;
                    if in_trk && !in_trkseg && !in_trkpt {
                        track_type.get_or_insert(raw);
                    } else if in_metadata {
                        metadata_type.get_or_insert(raw);
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"trkpt" {
                    trkpt_count += 1;
                    match track_point_from_attributes(&e) {
                        Some(point) => points.push(point),
                        None => dropped += 1,
                    }
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"metadata" => in_metadata = false,
                b"trk" => in_trk = false,
                b"trkseg" => in_trkseg = false,
                b"trkpt" => in_trkpt = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(RouteError::MalformedGpx(e.to_string())),
        }
        buf.clear();
    }

    if trkpt_count == 0 {
        return Err(RouteError::MalformedGpx("no track points found".to_owned()));
    }
    if dropped > 0 {
        debug!("dropped {dropped} track points with unparsable coordinates");
    }

    let captured_at = [metadata_time, track_time, point_time, segment_time]
        .into_iter()
        .flatten()
        .find_map(|raw| parse_gpx_time(&raw));
    let activity_type = track_type
        .or(metadata_type)
        .and_then(|raw| normalize_activity_type(&raw));

    Ok(ParsedRoute {
        points,
        default_name: "GPX Track",
        captured_at,
        activity_type,
    })
}

fn read_element_text(reader: &mut Reader<&[u8]>, e: &BytesStart) -> Result<String, RouteError> {
    let text = reader
        .read_text(e.name())
        .map_err(|err| RouteError::MalformedGpx(err.to_string()))?;
    Ok(text.trim().to_owned())
}

fn track_point_from_attributes(e: &BytesStart) -> Option<TrackPoint> {
    Some(TrackPoint {
        latitude: finite_attribute(e, b"lat")?,
        longitude: finite_attribute(e, b"lon")?,
    })
}

fn finite_attribute(e: &BytesStart, name: &[u8]) -> Option<f64> {
    let attribute = e.try_get_attribute(name).ok().flatten()?;
    let value = attribute.unescape_value().ok()?;
    parse_finite(&value)
}

fn parse_gpx_time(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    // Timestamps without an offset are taken as UTC.
    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
    ];
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }
    None
}

fn normalize_activity_type(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let mut chars = raw.chars();
    let first = chars.next()?;
    Some(
        first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
    )
}

fn extract_polyline_from_url(url: &str) -> Result<Vec<TrackPoint>, RouteError> {
    // Shape one: an explicit encoded polyline in the query string.
    if let Some((_, rest)) = url.split_once("path=enc:") {
        let encoded = rest.split('&').next().unwrap_or(rest);
        return polyline::decode(encoded);
    }

    // Shape two: `!1d<..>!2d<lon>!3d<lat>` triples in the directions path.
    let tokens: Vec<&str> = url.split('!').collect();
    let mut points = Vec::new();
    let mut matched = false;
    for window in tokens.windows(3) {
        if !(window[0].starts_with("1d")
            && window[1].starts_with("2d")
            && window[2].starts_with("3d"))
        {
            continue;
        }
        matched = true;
        if let (Some(longitude), Some(latitude)) =
            (parse_finite(&window[1][2..]), parse_finite(&window[2][2..]))
        {
            points.push(TrackPoint {
                latitude,
                longitude,
            });
        }
    }
    if !matched {
        return Err(RouteError::NoPolylineFound);
    }
    Ok(points)
}

/// The point shapes a JSON array element may take. Extra array elements
/// beyond the first two are ignored.
#[derive(Deserialize)]
#[serde(untagged)]
enum JsonPoint {
    Pair(Vec<serde_json::Value>),
    LatLon { lat: f64, lon: f64 },
    LatitudeLongitude { latitude: f64, longitude: f64 },
}

impl JsonPoint {
    fn into_track_point(self) -> Option<TrackPoint> {
        match self {
            JsonPoint::Pair(values) => Some(TrackPoint {
                latitude: values.first()?.as_f64()?,
                longitude: values.get(1)?.as_f64()?,
            }),
            JsonPoint::LatLon { lat, lon } => Some(TrackPoint {
                latitude: lat,
                longitude: lon,
            }),
            JsonPoint::LatitudeLongitude {
                latitude,
                longitude,
            } => Some(TrackPoint {
                latitude,
                longitude,
            }),
        }
    }
}

fn parse_json_points(text: &str) -> Result<Vec<TrackPoint>, RouteError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| RouteError::InvalidJson(e.to_string()))?;
    let elements = match value {
        serde_json::Value::Array(elements) => elements,
        _ => {
            return Err(RouteError::InvalidJson(
                "top-level value is not an array".to_owned(),
            ))
        }
    };
    // Unlike the line-based formats, a single bad element here is fatal.
    elements
        .into_iter()
        .map(|element| {
            serde_json::from_value::<JsonPoint>(element)
                .ok()
                .and_then(JsonPoint::into_track_point)
                .ok_or(RouteError::InvalidPointFormat)
        })
        .collect()
}

fn parse_csv_points(text: &str) -> Vec<TrackPoint> {
    let mut points = Vec::new();
    let mut dropped: usize = 0;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // Header heuristic.
        let lower = line.to_lowercase();
        if lower.contains("lat") && lower.contains("lon") {
            continue;
        }
        let mut fields = line.split(',');
        let latitude = fields.next().and_then(parse_finite);
        let longitude = fields.next().and_then(parse_finite);
        match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => points.push(TrackPoint {
                latitude,
                longitude,
            }),
            _ => dropped += 1,
        }
    }
    if dropped > 0 {
        debug!("dropped {dropped} unparsable csv lines");
    }
    points
}

fn parse_whitespace_points(text: &str) -> Vec<TrackPoint> {
    // Tokens are consumed in fixed pairs; a trailing unpaired token is
    // ignored and a pair with an unparsable half is dropped whole.
    text.split_whitespace()
        .tuples()
        .filter_map(|(lat, lon)| {
            Some(TrackPoint {
                latitude: parse_finite(lat)?,
                longitude: parse_finite(lon)?,
            })
        })
        .collect()
}
