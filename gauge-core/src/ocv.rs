//! Open-circuit-voltage model.
//!
//! The battery profile carries an ordered list of voltage breakpoints that
//! split the usable charge into `n - 1` equal-weight segments. Lookups return a
//! `0..=1000` fraction which is then scaled to capacity or percent through
//! [`ab_div_c`](crate::fixed::ab_div_c).

use heapless::Vec;

use crate::fixed::{FRACTION_SCALE, PERCENT_SCALE, ab_div_c};

/// Largest OCV table accepted from the board description.
pub const MAX_OCV_POINTS: usize = 32;

/// Smallest usable OCV table.
pub const MIN_OCV_POINTS: usize = 2;

/// Reasons an OCV table is rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OcvTableError {
    /// Fewer than [`MIN_OCV_POINTS`] breakpoints were supplied.
    TooShort,
    /// More than [`MAX_OCV_POINTS`] breakpoints were supplied.
    TooLong,
    /// Breakpoint at `index` is not strictly above its predecessor.
    NotIncreasing { index: usize },
}

/// Validated, strictly increasing OCV breakpoint table in millivolts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OcvTable {
    points: Vec<u16, MAX_OCV_POINTS>,
}

impl OcvTable {
    /// Builds a table after checking length and ordering.
    pub fn new(points: &[u16]) -> Result<Self, OcvTableError> {
        if points.len() < MIN_OCV_POINTS {
            return Err(OcvTableError::TooShort);
        }

        if let Some(index) = points
            .windows(2)
            .position(|pair| pair[1] <= pair[0])
        {
            return Err(OcvTableError::NotIncreasing { index: index + 1 });
        }

        let points = Vec::from_slice(points).map_err(|_| OcvTableError::TooLong)?;
        Ok(Self { points })
    }

    /// Returns the breakpoints in ascending order.
    pub fn points(&self) -> &[u16] {
        &self.points
    }

    /// Number of breakpoints.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always `false`; construction rejects short tables.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Maps a voltage onto the `0..=1000` charge fraction.
    ///
    /// Voltages inside the table interpolate linearly within their segment.
    /// Voltages below the first breakpoint return `0`; voltages at or above the
    /// last breakpoint return `1000`.
    #[must_use]
    pub fn interpolate(&self, millivolts: i32) -> i32 {
        let size = self.points.len() as i32;
        let index = self
            .points
            .iter()
            .position(|&point| millivolts < i32::from(point))
            .unwrap_or(self.points.len());

        let fraction = if index > 0 && index < self.points.len() {
            let low = i32::from(self.points[index - 1]);
            let high = i32::from(self.points[index]);
            let segment = FRACTION_SCALE / (size - 1);
            (millivolts - low) * segment / (high - low) + (index as i32 - 1) * segment
        } else {
            index as i32 * ((FRACTION_SCALE + size / 2) / size)
        };

        fraction.min(FRACTION_SCALE)
    }

    /// Capacity in mAh held at `millivolts` for a pack of `fcc` mAh.
    #[must_use]
    pub fn capacity_at(&self, millivolts: i32, fcc: i32) -> i32 {
        ab_div_c(self.interpolate(millivolts), fcc, FRACTION_SCALE)
    }

    /// SOC percentage at `millivolts`.
    #[must_use]
    pub fn soc_at(&self, millivolts: i32) -> i32 {
        ab_div_c(self.interpolate(millivolts), PERCENT_SCALE, FRACTION_SCALE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: [u16; 7] = [3600, 3700, 3800, 3900, 4000, 4100, 4200];

    fn table() -> OcvTable {
        OcvTable::new(&TABLE).unwrap()
    }

    #[test]
    fn rejects_malformed_tables() {
        assert_eq!(OcvTable::new(&[3600]), Err(OcvTableError::TooShort));
        assert_eq!(
            OcvTable::new(&[3600, 3700, 3700]),
            Err(OcvTableError::NotIncreasing { index: 2 })
        );
        assert_eq!(
            OcvTable::new(&[3600, 3500]),
            Err(OcvTableError::NotIncreasing { index: 1 })
        );

        let mut long = [0u16; MAX_OCV_POINTS + 1];
        for (index, point) in long.iter_mut().enumerate() {
            *point = 3000 + index as u16 * 10;
        }
        assert_eq!(OcvTable::new(&long), Err(OcvTableError::TooLong));
    }

    #[test]
    fn interior_voltage_interpolates_within_segment() {
        let table = table();
        assert_eq!(table.interpolate(3900), 498);
        assert_eq!(table.interpolate(3850), 415);
        assert_eq!(table.soc_at(3900), 50);
        assert_eq!(table.capacity_at(3900, 4000), 1992);
    }

    #[test]
    fn ends_clamp_instead_of_extrapolating() {
        let table = table();
        assert_eq!(table.interpolate(3000), 0);
        assert_eq!(table.interpolate(3599), 0);
        assert_eq!(table.interpolate(4200), 1000);
        assert_eq!(table.interpolate(4500), 1000);
        assert_eq!(table.soc_at(4500), 100);
    }

    #[test]
    fn interpolation_is_monotone_and_bounded() {
        let table = table();
        let mut previous = table.interpolate(3500);
        for millivolts in 3500..=4300 {
            let fraction = table.interpolate(millivolts);
            assert!((0..=1000).contains(&fraction));
            assert!(fraction >= previous, "dropped at {millivolts} mV");
            previous = fraction;
        }
    }
}
