use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Side length of a tile in pixels.
pub const TILE_SIZE: u32 = 128;
pub const TILE_BYTES_PER_PIXEL: usize = 4;
pub const TILE_PIXEL_COUNT: usize = (TILE_SIZE as usize) * (TILE_SIZE as usize);
/// Length of one RGBA8 tile buffer in bytes.
pub const TILE_BYTES: usize = TILE_PIXEL_COUNT * TILE_BYTES_PER_PIXEL;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ZERO: Self = Self { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Point {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl SubAssign for Point {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Neg for Point {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "({}, {})", self.x, self.y)
    }
}

/// Half-open integer rectangle `[min_x, max_x) x [min_y, max_y)`.
///
/// Used both for tile ranges and for pixel regions. A rect whose max is not
/// greater than its min on either axis is empty.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl Rect {
    pub const EMPTY: Self = Self {
        min_x: 0,
        min_y: 0,
        max_x: 0,
        max_y: 0,
    };

    pub const fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn from_min_size(min: Point, width: i32, height: i32) -> Self {
        Self::new(min.x, min.y, min.x + width, min.y + height)
    }

    pub fn min(&self) -> Point {
        Point::new(self.min_x, self.min_y)
    }

    pub fn max(&self) -> Point {
        Point::new(self.max_x, self.max_y)
    }

    pub fn width(&self) -> i32 {
        (self.max_x - self.min_x).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.max_y - self.min_y).max(0)
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Integer center, rounded towards the min corner.
    pub fn center(&self) -> Point {
        Point::new(
            self.min_x + (self.max_x - self.min_x).div_euclid(2),
            self.min_y + (self.max_y - self.min_y).div_euclid(2),
        )
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.min_x && point.x < self.max_x && point.y >= self.min_y && point.y < self.max_y
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.is_empty()
            || (other.min_x >= self.min_x
                && other.max_x <= self.max_x
                && other.min_y >= self.min_y
                && other.max_y <= self.max_y)
    }

    /// Intersection of both rects; empty rects come back with zero extent.
    pub fn intersection(&self, other: &Rect) -> Rect {
        let min_x = self.min_x.max(other.min_x);
        let min_y = self.min_y.max(other.min_y);
        let max_x = self.max_x.min(other.max_x).max(min_x);
        let max_y = self.max_y.min(other.max_y).max(min_y);
        Rect::new(min_x, min_y, max_x, max_y)
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.intersection(other).is_empty()
    }

    pub fn translate(&self, delta: Point) -> Rect {
        Rect::new(
            self.min_x + delta.x,
            self.min_y + delta.y,
            self.max_x + delta.x,
            self.max_y + delta.y,
        )
    }

    pub fn scale(&self, factor: i32) -> Rect {
        Rect::new(
            self.min_x * factor,
            self.min_y * factor,
            self.max_x * factor,
            self.max_y * factor,
        )
    }

    /// Iterate all points of the rect in row-major order.
    pub fn points(self) -> impl Iterator<Item = Point> {
        let (min_x, max_x) = (self.min_x, self.max_x);
        (self.min_y..self.max_y).flat_map(move |y| (min_x..max_x).map(move |x| Point::new(x, y)))
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "[{}, {})x[{}, {})",
            self.min_x, self.max_x, self.min_y, self.max_y
        )
    }
}

/// Tile coordinate containing the given pixel coordinate (floor division).
pub fn tile_coordinate(pixel: i32) -> i32 {
    pixel.div_euclid(TILE_SIZE as i32)
}

pub fn tile_of_pixel(pixel: Point) -> Point {
    Point::new(tile_coordinate(pixel.x), tile_coordinate(pixel.y))
}

/// All tiles intersecting a pixel region. Empty regions yield an empty range.
pub fn tiles_of_region(region: Rect) -> Rect {
    if region.is_empty() {
        return Rect::EMPTY;
    }
    Rect::new(
        tile_coordinate(region.min_x),
        tile_coordinate(region.min_y),
        tile_coordinate(region.max_x - 1) + 1,
        tile_coordinate(region.max_y - 1) + 1,
    )
}

/// Pixel region covered by a single tile.
pub fn tile_pixel_region(tile: Point) -> Rect {
    Rect::new(tile.x, tile.y, tile.x + 1, tile.y + 1).scale(TILE_SIZE as i32)
}
