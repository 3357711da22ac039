//! Geofence math for attendance scans.

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two WGS84 coordinates.
pub fn haversine_distance_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

pub struct GeofenceCheck {
    pub distance_m: f64,
    pub allowed_m: f64,
    pub within: bool,
}

/// A reported position passes when its distance from the registered site
/// coordinates is at most radius + tolerance.
pub fn check_geofence(
    reported_lat: f64,
    reported_lng: f64,
    site_lat: f64,
    site_lng: f64,
    radius_m: f64,
    tolerance_m: f64,
) -> GeofenceCheck {
    let distance_m = haversine_distance_m(reported_lat, reported_lng, site_lat, site_lng);
    let allowed_m = radius_m + tolerance_m;
    GeofenceCheck {
        distance_m,
        allowed_m,
        within: distance_m <= allowed_m,
    }
}

pub fn validate_coordinates(lat: f64, lng: f64) -> bool {
    lat.is_finite() && lng.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}
