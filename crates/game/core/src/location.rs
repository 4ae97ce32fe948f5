use serde::{Deserialize, Serialize};

/// Largest coordinate value on either axis. Boards live in
/// `[0, COORDINATE_MAX]²` regardless of how much of that square is seeded.
pub const COORDINATE_MAX: u32 = 1023;

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum LocationError {
    #[error("location ({r}, {c}) is out of bounds")]
    OutOfBounds { r: u32, c: u32 },
}

/// A board coordinate as a (row, column) pair.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct Location {
    pub r: u32,
    pub c: u32,
}

impl Location {
    /// Creates a location without a bounds check. Callers that accept
    /// coordinates from the outside world should use [`Location::try_new`].
    pub const fn new(r: u32, c: u32) -> Self {
        Self { r, c }
    }

    /// Creates a location, rejecting coordinates beyond [`COORDINATE_MAX`].
    pub fn try_new(r: u32, c: u32) -> Result<Self, LocationError> {
        if r > COORDINATE_MAX || c > COORDINATE_MAX {
            return Err(LocationError::OutOfBounds { r, c });
        }
        Ok(Self { r, c })
    }

    pub fn in_bounds(&self) -> bool {
        self.r <= COORDINATE_MAX && self.c <= COORDINATE_MAX
    }

    /// The in-bounds cells of the 3×3 block centered here, self included.
    /// Up to nine results; fewer on a board edge.
    pub fn nearby(&self) -> Vec<Location> {
        let mut cells = Vec::with_capacity(9);
        for dr in -1i64..=1 {
            for dc in -1i64..=1 {
                let nr = self.r as i64 + dr;
                let nc = self.c as i64 + dc;
                if (0..=COORDINATE_MAX as i64).contains(&nr)
                    && (0..=COORDINATE_MAX as i64).contains(&nc)
                {
                    cells.push(Location::new(nr as u32, nc as u32));
                }
            }
        }
        cells
    }
}

impl core::fmt::Display for Location {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.r, self.c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearby_is_nine_cells_in_the_interior() {
        let cells = Location::new(5, 5).nearby();
        assert_eq!(cells.len(), 9);
        assert!(cells.contains(&Location::new(4, 4)));
        assert!(cells.contains(&Location::new(5, 5)));
        assert!(cells.contains(&Location::new(6, 6)));
    }

    #[test]
    fn nearby_clips_at_the_origin_corner() {
        let cells = Location::new(0, 0).nearby();
        assert_eq!(cells.len(), 4);
        assert!(cells.iter().all(|l| l.r <= 1 && l.c <= 1));
    }

    #[test]
    fn nearby_clips_at_the_far_corner() {
        let cells = Location::new(COORDINATE_MAX, COORDINATE_MAX).nearby();
        assert_eq!(cells.len(), 4);
    }

    #[test]
    fn try_new_rejects_out_of_bounds() {
        assert!(Location::try_new(COORDINATE_MAX, 0).is_ok());
        assert!(Location::try_new(COORDINATE_MAX + 1, 0).is_err());
    }
}
