use serde::{Deserialize, Serialize};

/// Address of one quadrant of the recursive subdivision.
///
/// Level 0 is the coarsest level; each level doubles the tile count along
/// both axes. `x` grows eastward and `y` grows southward from the tiling
/// scheme's north-west corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub level: u32,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, level: u32) -> Self {
        Self { x, y, level }
    }

    /// The covering tile one level coarser, or `None` at level 0.
    pub fn parent(&self) -> Option<TileCoord> {
        if self.level == 0 {
            return None;
        }
        Some(TileCoord::new(self.x >> 1, self.y >> 1, self.level - 1))
    }

    /// The covering tile at `level`, which must not be finer than `self`.
    pub fn ancestor_at(&self, level: u32) -> TileCoord {
        debug_assert!(level <= self.level);
        let shift = self.level - level;
        TileCoord::new(self.x >> shift, self.y >> shift, level)
    }

    /// The four children in north-west, north-east, south-west, south-east order.
    pub fn children(&self) -> [TileCoord; 4] {
        let (x, y, level) = (self.x * 2, self.y * 2, self.level + 1);
        [
            TileCoord::new(x, y, level),
            TileCoord::new(x + 1, y, level),
            TileCoord::new(x, y + 1, level),
            TileCoord::new(x + 1, y + 1, level),
        ]
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}/{}/{}", self.level, self.x, self.y)
    }
}

/// Identifier assigned to an asset provider when it joins a provider collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderId(pub u32);

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "provider#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_halves_coordinates() {
        let c = TileCoord::new(5, 3, 3);
        assert_eq!(c.parent(), Some(TileCoord::new(2, 1, 2)));
        assert_eq!(TileCoord::new(1, 0, 0).parent(), None);
    }

    #[test]
    fn ancestor_at_matches_repeated_parent() {
        let c = TileCoord::new(13, 6, 4);
        let via_parents = c.parent().and_then(|p| p.parent()).unwrap();
        assert_eq!(c.ancestor_at(2), via_parents);
        assert_eq!(c.ancestor_at(4), c);
    }

    #[test]
    fn children_round_trip_to_parent() {
        let c = TileCoord::new(1, 0, 0);
        for child in c.children() {
            assert_eq!(child.level, 1);
            assert_eq!(child.parent(), Some(c));
        }
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(TileCoord::new(2, 7, 4).to_string(), "L4/2/7");
        assert_eq!(ProviderId(3).to_string(), "provider#3");
    }
}
