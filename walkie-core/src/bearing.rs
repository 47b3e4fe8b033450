//! Compass math between two positions.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Latest known position of one side. No history is kept.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub lat: f64,
    pub lon: f64,
}

impl LocationSample {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Finite and within geographic bounds.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Initial great-circle bearing from `from` to `to`, degrees in `[0, 360)`, 0 = north.
/// Identical points give 0.
pub fn bearing(from: LocationSample, to: LocationSample) -> f64 {
    let phi1 = from.lat.to_radians();
    let phi2 = to.lat.to_radians();
    let dlambda = (to.lon - from.lon).to_radians();
    let y = dlambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlambda.cos();
    normalize(y.atan2(x).to_degrees())
}

/// Haversine distance in meters.
pub fn distance_m(from: LocationSample, to: LocationSample) -> f64 {
    let phi1 = from.lat.to_radians();
    let phi2 = to.lat.to_radians();
    let dphi = phi2 - phi1;
    let dlambda = (to.lon - from.lon).to_radians();
    let h = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Arrow angle on a device facing `heading` degrees so the arrow points along `bearing`.
pub fn relative_bearing(bearing: f64, heading: f64) -> f64 {
    normalize(bearing - heading)
}

fn normalize(deg: f64) -> f64 {
    // Strictly below 360 even for tiny negative inputs.
    let d = (deg % 360.0 + 360.0) % 360.0;
    if d >= 360.0 {
        0.0
    } else {
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn due_east_and_north() {
        let origin = LocationSample::new(0.0, 0.0);
        assert!((bearing(origin, LocationSample::new(0.0, 90.0)) - 90.0).abs() < EPS);
        assert!(bearing(origin, LocationSample::new(90.0, 0.0)).abs() < EPS);
    }

    #[test]
    fn west_and_south() {
        let origin = LocationSample::new(0.0, 0.0);
        assert!((bearing(origin, LocationSample::new(0.0, -90.0)) - 270.0).abs() < EPS);
        assert!((bearing(origin, LocationSample::new(-10.0, 0.0)) - 180.0).abs() < EPS);
    }

    #[test]
    fn identical_points_are_finite() {
        let p = LocationSample::new(52.52, 13.405);
        let b = bearing(p, p);
        assert!(b.is_finite());
        assert!((0.0..360.0).contains(&b));
        assert_eq!(distance_m(p, p), 0.0);
    }

    #[test]
    fn berlin_to_paris() {
        let berlin = LocationSample::new(52.52, 13.405);
        let paris = LocationSample::new(48.8566, 2.3522);
        assert!((bearing(berlin, paris) - 246.743_423).abs() < 1e-4);
        assert!((bearing(paris, berlin) - 58.176_742).abs() < 1e-4);
        assert!((distance_m(berlin, paris) - 877_463.3).abs() < 1.0);
    }

    #[test]
    fn arrow_relative_to_heading() {
        assert_eq!(relative_bearing(90.0, 0.0), 90.0);
        assert_eq!(relative_bearing(10.0, 350.0), 20.0);
        assert_eq!(relative_bearing(350.0, 10.0), 340.0);
        assert_eq!(relative_bearing(45.0, 45.0), 0.0);
    }

    #[test]
    fn always_in_range() {
        for deg in [-720.0, -360.0, -1e-15, 0.0, 359.999_999, 360.0, 725.0] {
            let n = normalize(deg);
            assert!((0.0..360.0).contains(&n), "{deg} -> {n}");
        }
    }

    #[test]
    fn validity() {
        assert!(LocationSample::new(-90.0, 180.0).is_valid());
        assert!(!LocationSample::new(91.0, 0.0).is_valid());
        assert!(!LocationSample::new(0.0, f64::NAN).is_valid());
        assert!(!LocationSample::new(f64::INFINITY, 0.0).is_valid());
    }
}
