//! NMEA GPGGA sentence parsing
//!
//! Extracts latitude and longitude in decimal degrees from `$GPGGA` fix
//! sentences as emitted by the GPS module. A sentence without a fix parses
//! to (0.0, 0.0) so downstream consumers still see a fresh record.

/// Parse a `$GPGGA` sentence into (latitude, longitude) decimal degrees.
/// Returns `None` for non-GPGGA or malformed sentences.
pub fn parse_gpgga(sentence: &str) -> Option<(f64, f64)> {
    let fields: Vec<&str> = sentence.trim().split(',').collect();
    if fields.first() != Some(&"$GPGGA") || fields.len() < 7 {
        return None;
    }

    let lat_raw = fields[2];
    let lat_dir = fields[3];
    let lon_raw = fields[4];
    let lon_dir = fields[5];
    let fix = fields[6];

    // Valid sentence without a fix
    if fix == "0" || lat_raw.is_empty() || lon_raw.is_empty() {
        return Some((0.0, 0.0));
    }

    let mut lat = parse_coordinate(lat_raw, 2)?;
    let mut lon = parse_coordinate(lon_raw, 3)?;
    if lat_dir == "S" {
        lat = -lat;
    }
    if lon_dir == "W" {
        lon = -lon;
    }
    Some((lat, lon))
}

/// Convert a ddmm.mmmm / dddmm.mmmm field into decimal degrees
fn parse_coordinate(raw: &str, degree_digits: usize) -> Option<f64> {
    if raw.len() <= degree_digits || !raw.is_char_boundary(degree_digits) {
        return None;
    }
    let degrees: f64 = raw[..degree_digits].parse().ok()?;
    let minutes: f64 = raw[degree_digits..].parse().ok()?;
    Some(degrees + minutes / 60.0)
}
