// src/geometry.rs

/// Size of the physical output in pixels. The scaling target for every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub const fn new(width: u32, height: u32) -> Self {
        Geometry { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Where a scaled raster sits on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Placement {
    /// Centers an image of `size` on `surface`. An image larger than the
    /// surface is anchored at the origin on that axis.
    pub fn centered((width, height): (u32, u32), surface: Geometry) -> Self {
        Placement {
            x: surface.width.saturating_sub(width) / 2,
            y: surface.height.saturating_sub(height) / 2,
            width,
            height,
        }
    }
}
