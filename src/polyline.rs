use crate::errors::RouteError;
use crate::geo_utils::TrackPoint;

// Coordinates carry five decimal places through the codec.
const COORDINATE_SCALE: f64 = 1e5;

/// Encodes a point sequence into the compact delta-coded string form.
///
/// Deltas are taken against the accumulated integer values rather than
/// the raw previous coordinates, so rounding error cannot drift across a
/// long track.
pub fn encode(points: &[TrackPoint]) -> String {
    let mut encoded = String::new();
    let mut prev_lat: i64 = 0;
    let mut prev_lon: i64 = 0;
    for point in points {
        let lat = (point.latitude * COORDINATE_SCALE).round() as i64;
        let lon = (point.longitude * COORDINATE_SCALE).round() as i64;
        encode_value(lat - prev_lat, &mut encoded);
        encode_value(lon - prev_lon, &mut encoded);
        prev_lat = lat;
        prev_lon = lon;
    }
    encoded
}

fn encode_value(value: i64, encoded: &mut String) {
    // Zig-zag, then 5-bit groups least-significant first. Every group but
    // the last carries the 0x20 continuation bit; all groups are offset
    // by 63 into printable ASCII.
    let mut value = (if value < 0 { !(value << 1) } else { value << 1 }) as u64;
    while value >= 0x20 {
        encoded.push((((value & 0x1f) | 0x20) as u8 + 63) as char);
        value >>= 5;
    }
    encoded.push((value as u8 + 63) as char);
}

/// Decodes an encoded polyline back into a point sequence.
///
/// A string that ends in the middle of a 5-bit group is a hard failure;
/// no partial sequence is ever returned.
pub fn decode(encoded: &str) -> Result<Vec<TrackPoint>, RouteError> {
    let bytes = encoded.as_bytes();
    let mut points = Vec::new();
    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lon: i64 = 0;
    while index < bytes.len() {
        lat += decode_value(bytes, &mut index)?;
        lon += decode_value(bytes, &mut index)?;
        points.push(TrackPoint {
            latitude: lat as f64 / COORDINATE_SCALE,
            longitude: lon as f64 / COORDINATE_SCALE,
        });
    }
    Ok(points)
}

fn decode_value(bytes: &[u8], index: &mut usize) -> Result<i64, RouteError> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let byte = match bytes.get(*index) {
            Some(byte) => byte.wrapping_sub(63),
            None => return Err(RouteError::MalformedCodec { offset: *index }),
        };
        *index += 1;
        if shift >= u64::BITS {
            // A continuation chain that overran the accumulator.
            return Err(RouteError::MalformedCodec { offset: *index });
        }
        result |= u64::from(byte & 0x1f) << shift;
        shift += 5;
        if byte & 0x20 == 0 {
            break;
        }
    }
    Ok(if result & 1 == 1 {
        !(result >> 1) as i64
    } else {
        (result >> 1) as i64
    })
}

#[cfg(test)]
mod tests {
    use assert_float_eq::*;

    use super::*;

    fn point(latitude: f64, longitude: f64) -> TrackPoint {
        TrackPoint {
            latitude,
            longitude,
        }
    }

    #[test]
    fn encode_reference_vector() {
        let points = [point(38.5, -120.2), point(40.7, -120.95)];
        assert_eq!(encode(&points), "_p~iF~ps|U_ulLnnqC");
    }

    #[test]
    fn decode_reference_vector() {
        let points = decode("_p~iF~ps|U_ulLnnqC").unwrap();
        assert_eq!(points.len(), 2);
        assert_float_absolute_eq!(points[0].latitude, 38.5, 1e-5);
        assert_float_absolute_eq!(points[0].longitude, -120.2, 1e-5);
        assert_float_absolute_eq!(points[1].latitude, 40.7, 1e-5);
        assert_float_absolute_eq!(points[1].longitude, -120.95, 1e-5);
    }

    #[test]
    fn round_trip_within_codec_precision() {
        let tracks = [
            vec![point(45.0, -122.0), point(45.1, -122.1), point(45.2, -122.2)],
            vec![point(-33.793291, 151.143537), point(-33.943600, 151.278369)],
            // Crossing the equator and the antimeridian neighborhood.
            vec![point(-0.00003, 179.99997), point(0.00004, -179.99998)],
            vec![point(0.0, 0.0), point(0.0, 0.0)],
        ];
        for track in &tracks {
            let decoded = decode(&encode(track)).unwrap();
            assert_eq!(decoded.len(), track.len());
            for (original, decoded) in track.iter().zip(&decoded) {
                assert_float_absolute_eq!(original.latitude, decoded.latitude, 1e-5);
                assert_float_absolute_eq!(original.longitude, decoded.longitude, 1e-5);
            }
        }
    }

    #[test]
    fn empty_input_round_trips() {
        assert_eq!(encode(&[]), "");
        assert_eq!(decode("").unwrap(), vec![]);
    }

    #[test]
    fn truncated_group_is_malformed() {
        // Dropping the final byte leaves the last longitude group open.
        let err = decode("_p~iF~ps|U_ulLnnq").unwrap_err();
        assert!(matches!(err, RouteError::MalformedCodec { .. }));
    }

    #[test]
    fn missing_longitude_is_malformed() {
        // A single complete latitude group with no longitude after it.
        let err = decode("_p~iF").unwrap_err();
        assert!(matches!(err, RouteError::MalformedCodec { .. }));
    }

    #[test]
    fn endless_continuation_is_malformed() {
        // Every byte keeps the continuation bit set.
        let err = decode("~~~~~~~~~~~~~~~~").unwrap_err();
        assert!(matches!(err, RouteError::MalformedCodec { .. }));
    }
}
