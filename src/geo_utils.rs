pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Great-circle distance between two points, in meters. NaN inputs
/// propagate as NaN.
pub fn haversine_distance(p1: &TrackPoint, p2: &TrackPoint) -> f64 {
    let d_lat = (p2.latitude - p1.latitude).to_radians();
    let d_lon = (p2.longitude - p1.longitude).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + p1.latitude.to_radians().cos()
            * p2.latitude.to_radians().cos()
            * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_METERS * c
}

/// Cumulative distance over consecutive points. 0 for fewer than two
/// points.
pub fn total_distance(points: &[TrackPoint]) -> f64 {
    points
        .windows(2)
        .map(|pair| haversine_distance(&pair[0], &pair[1]))
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn lon_span(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// A zero-span box cannot be used for scaling, callers dividing by a
    /// span must check this first.
    pub fn is_degenerate(&self) -> bool {
        self.lat_span() == 0.0 || self.lon_span() == 0.0
    }

    fn include(&mut self, point: &TrackPoint) {
        self.min_lat = self.min_lat.min(point.latitude);
        self.max_lat = self.max_lat.max(point.latitude);
        self.min_lon = self.min_lon.min(point.longitude);
        self.max_lon = self.max_lon.max(point.longitude);
    }
}

/// Min/max fold over all points of all given sequences. `None` when there
/// are no points at all.
pub fn bounding_box<'a>(
    sequences: impl IntoIterator<Item = &'a [TrackPoint]>,
) -> Option<BoundingBox> {
    let mut bounds: Option<BoundingBox> = None;
    for point in sequences.into_iter().flatten() {
        match &mut bounds {
            None => {
                bounds = Some(BoundingBox {
                    min_lat: point.latitude,
                    max_lat: point.latitude,
                    min_lon: point.longitude,
                    max_lon: point.longitude,
                })
            }
            Some(bounds) => bounds.include(point),
        }
    }
    bounds
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
    fn haversine_known_distance() {
        // Ho Chi Minh City to Hanoi, roughly 1140 km.
        let hcmc = point(10.762622, 106.660172);
        let hanoi = point(21.028511, 105.804817);
        let distance = haversine_distance(&hcmc, &hanoi);
        assert!(distance > 1_100_000.0 && distance < 1_200_000.0);
    }

    #[test]
    fn haversine_is_symmetric() {
        let a = point(45.5231, -122.6765);
        let b = point(47.6062, -122.3321);
        assert_float_absolute_eq!(
            haversine_distance(&a, &b),
            haversine_distance(&b, &a),
            1e-9
        );
    }

    #[test]
    fn haversine_propagates_nan() {
        let a = point(f64::NAN, 0.0);
        let b = point(0.0, 0.0);
        assert!(haversine_distance(&a, &b).is_nan());
    }

    #[test]
    fn total_distance_degenerate_sequences() {
        let p = point(45.0, -122.0);
        assert_eq!(total_distance(&[]), 0.0);
        assert_eq!(total_distance(&[p]), 0.0);
        assert_float_absolute_eq!(total_distance(&[p, p]), 0.0, 1e-9);
    }

    #[test]
    fn total_distance_accumulates() {
        let points = [point(45.0, -122.0), point(45.1, -122.0), point(45.2, -122.0)];
        let whole = total_distance(&points);
        let halves = total_distance(&points[..2]) + total_distance(&points[1..]);
        assert!(whole > 0.0);
        assert_float_absolute_eq!(whole, halves, 1e-6);
    }

    #[test]
    fn bounding_box_folds_across_sequences() {
        let first = [point(45.0, -122.0), point(45.5, -121.0)];
        let second = [point(44.0, -123.0)];
        let bounds = bounding_box([&first[..], &second[..]]).unwrap();
        assert_eq!(bounds.min_lat, 44.0);
        assert_eq!(bounds.max_lat, 45.5);
        assert_eq!(bounds.min_lon, -123.0);
        assert_eq!(bounds.max_lon, -121.0);
        assert!(!bounds.is_degenerate());
        assert_float_absolute_eq!(bounds.lat_span(), 1.5, 1e-9);
        assert_float_absolute_eq!(bounds.lon_span(), 2.0, 1e-9);
    }

    #[test]
    fn bounding_box_of_nothing_is_none() {
        let no_sequences: [&[TrackPoint]; 0] = [];
        assert_eq!(bounding_box(no_sequences), None);
        let empty_sequence: [&[TrackPoint]; 1] = [&[]];
        assert_eq!(bounding_box(empty_sequence), None);
    }

    #[test]
    fn bounding_box_single_point_is_degenerate() {
        let track = [point(45.0, -122.0)];
        let bounds = bounding_box([&track[..]]).unwrap();
        assert!(bounds.is_degenerate());
        assert_eq!(bounds.lat_span(), 0.0);
    }
}
