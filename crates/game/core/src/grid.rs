//! Orbital gridworld: the board of the game.
//!
//! The board is a complete binary-tree tessellation of concentric rings.
//! Ring `r` contains `2^r` sectors, numbered sequentially from ring 0
//! outward, so sector number and `(ring, azimuth)` coordinates are a total
//! bijection: `sector = 2^ring + azimuth - 1`.

use std::collections::BTreeSet;

/// A single cell of the orbital grid, addressed by its sector number.
pub type SectorId = u32;

/// Errors surfaced by orbit grid lookups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("invalid sector number {sector}: must be in [0, {num_sectors})")]
    InvalidSector { sector: SectorId, num_sectors: u32 },

    #[error("invalid sector coordinate (ring {ring}, azimuth {azimuth})")]
    InvalidCoord { ring: u32, azimuth: u32 },
}

/// Orbital gridworld with `n_rings` rings beyond the central ring 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrbitGrid {
    n_rings: u32,
    n_sectors: u32,
}

impl OrbitGrid {
    /// Creates a grid with rings `0..=n_rings`.
    pub fn new(n_rings: u32) -> Self {
        Self {
            n_rings,
            n_sectors: (1u32 << (n_rings + 1)) - 1,
        }
    }

    pub fn num_rings(&self) -> u32 {
        self.n_rings
    }

    pub fn num_sectors(&self) -> u32 {
        self.n_sectors
    }

    fn check_sector(&self, sector: SectorId) -> Result<(), GridError> {
        if sector < self.n_sectors {
            Ok(())
        } else {
            Err(GridError::InvalidSector {
                sector,
                num_sectors: self.n_sectors,
            })
        }
    }

    /// Ring number the sector lies within.
    pub fn ring_of(&self, sector: SectorId) -> Result<u32, GridError> {
        self.check_sector(sector)?;
        Ok((sector + 1).ilog2())
    }

    /// `(ring, azimuth)` coordinates of a sector.
    pub fn coord_of(&self, sector: SectorId) -> Result<(u32, u32), GridError> {
        let ring = self.ring_of(sector)?;
        Ok((ring, sector + 1 - (1 << ring)))
    }

    /// Sector number at `(ring, azimuth)` coordinates.
    pub fn sector_at(&self, ring: u32, azimuth: u32) -> Result<SectorId, GridError> {
        if ring > self.n_rings || azimuth >= (1 << ring) {
            return Err(GridError::InvalidCoord { ring, azimuth });
        }
        Ok((1 << ring) + azimuth - 1)
    }

    /// Number of sectors in a ring.
    pub fn ring_len(&self, ring: u32) -> Result<u32, GridError> {
        if ring > self.n_rings {
            return Err(GridError::InvalidCoord { ring, azimuth: 0 });
        }
        Ok(1 << ring)
    }

    /// Sector in the same ring at a relative azimuth, wrapping around.
    pub fn relative_azimuth(&self, sector: SectorId, offset: i32) -> Result<SectorId, GridError> {
        let (ring, azimuth) = self.coord_of(sector)?;
        let len = i64::from(1u32 << ring);
        let wrapped = (i64::from(azimuth) + i64::from(offset)).rem_euclid(len) as u32;
        self.sector_at(ring, wrapped)
    }

    /// Next sector in the direction of orbital motion (azimuth + 1).
    pub fn prograde(&self, sector: SectorId) -> Result<SectorId, GridError> {
        self.relative_azimuth(sector, 1)
    }

    /// Next sector against the direction of orbital motion (azimuth - 1).
    pub fn retrograde(&self, sector: SectorId) -> Result<SectorId, GridError> {
        self.relative_azimuth(sector, -1)
    }

    /// Radially inward sector, or `None` on the central ring.
    ///
    /// The parent's azimuth drops the last bit of the child's azimuth
    /// bit-string.
    pub fn radial_in(&self, sector: SectorId) -> Result<Option<SectorId>, GridError> {
        let (ring, azimuth) = self.coord_of(sector)?;
        if ring == 0 {
            return Ok(None);
        }
        Ok(Some(self.sector_at(ring - 1, azimuth >> 1)?))
    }

    /// Radially outward sector, or `None` on the outermost ring.
    ///
    /// Of the two children in the outer ring, always the lower-numbered one:
    /// the child whose azimuth bit-string appends a `0`.
    pub fn radial_out(&self, sector: SectorId) -> Result<Option<SectorId>, GridError> {
        let (ring, azimuth) = self.coord_of(sector)?;
        if ring >= self.n_rings {
            return Ok(None);
        }
        Ok(Some(self.sector_at(ring + 1, azimuth << 1)?))
    }

    /// All sectors adjacent to the given sector.
    ///
    /// Adjacency covers prograde, retrograde, the radial-in parent, and both
    /// radial-out children (the radial-out sector and its prograde).
    pub fn adjacent_sectors(&self, sector: SectorId) -> Result<BTreeSet<SectorId>, GridError> {
        let mut adjacent = BTreeSet::new();
        adjacent.insert(self.prograde(sector)?);
        adjacent.insert(self.retrograde(sector)?);
        if let Some(inner) = self.radial_in(sector)? {
            adjacent.insert(inner);
        }
        if let Some(outer) = self.radial_out(sector)? {
            adjacent.insert(outer);
            adjacent.insert(self.prograde(outer)?);
        }
        Ok(adjacent)
    }
}
