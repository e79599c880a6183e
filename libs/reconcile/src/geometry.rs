//! Deployment placement geometry.
//!
//! Formations are laid out on concentric rings around the battlefield
//! center. Each alliance owns one angular sector; inside its sector, ring
//! `level` holds `count` slots spread symmetrically around the sector start.

use std::f64::consts::{FRAC_PI_2, TAU};

use serde::{Deserialize, Serialize};
use warstage_model::Vec2;

/// Position of a unit inside a formation template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormationSlot {
    /// Ring, counted outward from 0.
    pub level: u32,
    /// Index within the ring.
    pub index: u32,
    /// Number of slots in the ring.
    pub count: u32,
}

impl FormationSlot {
    pub const fn new(level: u32, index: u32, count: u32) -> Self {
        Self {
            level,
            index,
            count,
        }
    }

    /// Signed distance from the ring's middle, in slot widths.
    pub fn offset(&self) -> f64 {
        if self.count > 1 {
            f64::from(self.index) - 0.5 * f64::from(self.count - 1)
        } else {
            0.0
        }
    }
}

/// Battlefield layout parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub center: Vec2,
    pub base_radius: f64,
    pub ring_spacing: f64,
    /// Arc length between neighbouring slots on a ring.
    pub angular_spread: f64,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            center: Vec2::new(512.0, 512.0),
            base_radius: 512.0,
            ring_spacing: 30.0,
            angular_spread: 40.0,
        }
    }
}

impl Geometry {
    /// Radius of ring `level`.
    pub fn radius(&self, level: u32) -> f64 {
        self.base_radius + self.ring_spacing * (f64::from(level) + 1.0)
    }

    /// Start angle of the sector owned by the alliance of 1-based `rank`.
    ///
    /// The circle is split into `alliance_count` equal sectors with a fixed
    /// quarter-turn bias. A count of zero is treated as one.
    pub fn sector_start(rank: u32, alliance_count: u32) -> f64 {
        let sectors = f64::from(alliance_count.max(1));
        FRAC_PI_2 + TAU * f64::from(rank.saturating_sub(1)) / sectors
    }

    /// Angle of a formation slot for the given alliance.
    pub fn angle(&self, slot: FormationSlot, rank: u32, alliance_count: u32) -> f64 {
        let radius = self.radius(slot.level);
        self.angular_spread * slot.offset() / radius + Self::sector_start(rank, alliance_count)
    }

    /// Battlefield position of a formation slot for the given alliance.
    pub fn placement(&self, slot: FormationSlot, rank: u32, alliance_count: u32) -> Vec2 {
        let radius = self.radius(slot.level);
        self.center
            .polar_offset(radius, self.angle(slot, rank, alliance_count))
    }
}
