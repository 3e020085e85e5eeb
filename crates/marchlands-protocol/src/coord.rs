use serde::{Deserialize, Serialize};

/// Square-grid tile coordinate. `y` grows downward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TilePos {
    pub x: i32,
    pub y: i32,
}

impl TilePos {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance, the metric used for movement, vision, and range.
    #[inline]
    pub fn distance(self, other: TilePos) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    /// 4-connected neighbours in fixed N, E, S, W order.
    #[inline]
    pub fn neighbors(self) -> [TilePos; 4] {
        [
            TilePos::new(self.x, self.y - 1),
            TilePos::new(self.x + 1, self.y),
            TilePos::new(self.x, self.y + 1),
            TilePos::new(self.x - 1, self.y),
        ]
    }

    #[inline]
    pub fn is_adjacent(self, other: TilePos) -> bool {
        self.distance(other) == 1
    }
}
