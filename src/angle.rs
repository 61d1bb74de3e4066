//! # Fixed-Point Angle Solver
//!
//! Integer-only atan2 in binary radians ("brads"), matching the flight
//! controller's angle convention so ground-side recomputation is bit-exact
//! with the device.
//!
//! The convention uses `BRAD_PI = 1 << 14` for a half turn, so a full circle
//! is 32768 units. The solver runs a fixed 11 iterations of a CORDIC
//! rotation against a precomputed `atan(2^-i)` table held in a 16-bit base,
//! then rescales the accumulated correction into the output base.

/// Half turn in brad units
pub const BRAD_PI: u16 = 1 << 14;

/// Quarter turn in brad units
pub const BRAD_HPI: u16 = BRAD_PI / 2;

/// Full turn in brad units
pub const BRAD_2PI: u32 = (BRAD_PI as u32) * 2;

/// Operands smaller than this are prescaled to preserve precision
const PRESCALE_LIMIT: i32 = 0x10000;

/// Prescale multiplier for small operands
const PRESCALE: i32 = 0x1000;

/// atan(2^-i) terms using PI = 0x10000 for accuracy
const ATAN_TABLE: [i32; 16] = [
    0x4000, 0x25C8, 0x13F6, 0x0A22, 0x0516, 0x028C, 0x0146, 0x00A3,
    0x0051, 0x0029, 0x0014, 0x000A, 0x0005, 0x0003, 0x0001, 0x0001,
];

/// Reduce a coordinate pair into the first octant, returning the transformed
/// pair and the octant index (0..7).
fn octantify(mut x: i32, mut y: i32) -> (i32, i32, i32) {
    let mut octant = 0;
    if y < 0 {
        x = -x;
        y = -y;
        octant += 4;
    }
    if x <= 0 {
        let t = x;
        x = y;
        y = -t;
        octant += 2;
    }
    if x <= y {
        let t = y - x;
        x += y;
        y = t;
        octant += 1;
    }
    (x, y, octant)
}

/// Fixed-point atan2 in brad units.
///
/// Returns the angle of the vector `(x, y)` where a full turn is 32768.
/// `y == 0` returns `0` for `x >= 0` and [`BRAD_PI`] otherwise.
///
/// Pure integer function, deterministic across platforms. Inputs must be
/// bounded to roughly ±2^18 so the precision prescale cannot overflow.
///
/// # Examples
///
/// ```
/// use fc_link::angle::{atan2_brad, BRAD_PI};
///
/// assert_eq!(atan2_brad(1000, 0), 0);
/// assert_eq!(atan2_brad(-1000, 0), BRAD_PI);
/// ```
#[must_use]
pub fn atan2_brad(x: i32, y: i32) -> u16 {
    if y == 0 {
        return if x >= 0 { 0 } else { BRAD_PI };
    }

    let (mut x, mut y, octant) = octantify(x, y);
    let phi = octant * (BRAD_PI as i32 / 4);

    // Scale up a bit for greater accuracy
    if x < PRESCALE_LIMIT {
        x *= PRESCALE;
        y *= PRESCALE;
    }

    let mut dphi: i32 = 0;
    for i in 1..12 {
        if y >= 0 {
            let t = x + (y >> i);
            y -= x >> i;
            x = t;
            dphi += ATAN_TABLE[i];
        } else {
            let t = x - (y >> i);
            y += x >> i;
            x = t;
            dphi -= ATAN_TABLE[i];
        }
    }

    // The table is in a 16-bit base; shift back down to the brad base
    (phi + (dphi >> 2)) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Convert a float angle in radians to brad units in [0, 32768)
    fn to_brads(radians: f64) -> f64 {
        let turns = radians / (2.0 * std::f64::consts::PI);
        let brads = turns * BRAD_2PI as f64;
        brads.rem_euclid(BRAD_2PI as f64)
    }

    /// Distance between two brad angles accounting for wraparound
    fn brad_error(a: u16, b: f64) -> f64 {
        let diff = (a as f64 - b).abs();
        diff.min(BRAD_2PI as f64 - diff)
    }

    #[test]
    fn test_y_zero_special_cases() {
        assert_eq!(atan2_brad(1, 0), 0);
        assert_eq!(atan2_brad(100_000, 0), 0);
        assert_eq!(atan2_brad(0, 0), 0);
        assert_eq!(atan2_brad(-1, 0), BRAD_PI);
        assert_eq!(atan2_brad(-100_000, 0), BRAD_PI);
    }

    #[test]
    fn test_cardinal_directions() {
        assert!(brad_error(atan2_brad(4096, 4096), BRAD_HPI as f64 / 2.0) <= 4.0);
        assert!(brad_error(atan2_brad(0, 4096), BRAD_HPI as f64) <= 4.0);
        assert!(brad_error(atan2_brad(0, -4096), 3.0 * BRAD_PI as f64 / 2.0) <= 4.0);
    }

    #[test]
    fn test_matches_float_atan2_around_circle() {
        // Sweep the full circle with unit vectors at 4096 scale
        for a in (0..BRAD_2PI).step_by(7) {
            let ang = a as f64 / BRAD_2PI as f64 * 2.0 * std::f64::consts::PI;
            let x = (ang.cos() * 4096.0) as i32;
            let y = (ang.sin() * 4096.0) as i32;
            if y == 0 {
                continue; // special-cased, covered above
            }

            let got = atan2_brad(x, y);
            let want = to_brads((y as f64).atan2(x as f64));
            assert!(
                brad_error(got, want) <= 6.0,
                "a={} x={} y={} got={} want={}",
                a,
                x,
                y,
                got,
                want
            );
        }
    }

    #[test]
    fn test_large_operands_skip_prescale() {
        // Magnitudes past the prescale limit take the unscaled path
        let got = atan2_brad(200_000, 200_000);
        let want = to_brads(std::f64::consts::FRAC_PI_4);
        assert!(brad_error(got, want) <= 8.0);
    }

    #[test]
    fn test_octant_reduction_covers_all_octants() {
        let vectors = [
            (100, 10),
            (10, 100),
            (-10, 100),
            (-100, 90),
            (-100, -10),
            (-10, -100),
            (10, -100),
            (100, -90),
        ];
        let mut seen = [false; 8];
        for (x, y) in vectors {
            let (_, _, o) = octantify(x, y);
            assert!((0..8).contains(&o));
            seen[o as usize] = true;
        }
        assert!(seen.iter().all(|&s| s), "octants hit: {:?}", seen);
    }

    #[test]
    fn test_determinism() {
        for _ in 0..3 {
            assert_eq!(atan2_brad(12345, -6789), atan2_brad(12345, -6789));
        }
    }
}
