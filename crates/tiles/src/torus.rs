//! Wraparound addressing of an unbounded tile plane onto a fixed grid.
//!
//! The mapping never moves pixel data. `reset` pins an anchor (the logical
//! tile stored in physical `(0, 0)`) and places the window on it; `shift`
//! only moves the window, so tiles that stay inside keep their slot and only
//! the newly exposed edge has to be refilled by the caller.

use model::{Point, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TorusMapping {
    width: u32,
    height: u32,
    anchor: Point,
    origin: Point,
}

impl TorusMapping {
    pub fn new(width: u32, height: u32) -> Self {
        assert!(width > 0, "torus mapping width must be at least 1");
        assert!(height > 0, "torus mapping height must be at least 1");
        assert!(
            width <= i32::MAX as u32 && height <= i32::MAX as u32,
            "torus mapping size exceeds coordinate range"
        );
        Self {
            width,
            height,
            anchor: Point::ZERO,
            origin: Point::ZERO,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn slot_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Min corner of the window of representable tiles.
    pub fn origin(&self) -> Point {
        self.origin
    }

    /// Logical coordinate stored in physical `(0, 0)` since the last reset.
    pub fn anchor(&self) -> Point {
        self.anchor
    }

    pub fn reset(&mut self, origin: Point) {
        self.anchor = origin;
        self.origin = origin;
    }

    pub fn shift(&mut self, delta: Point) {
        self.origin += delta;
    }

    pub fn map(&self, logical: Point) -> Point {
        let relative = logical - self.anchor;
        Point::new(
            relative.x.rem_euclid(self.width as i32),
            relative.y.rem_euclid(self.height as i32),
        )
    }

    /// Logical coordinate inside `region()` that occupies the given slot.
    pub fn unmap(&self, physical: Point) -> Point {
        debug_assert!(
            physical.x >= 0
                && physical.y >= 0
                && physical.x < self.width as i32
                && physical.y < self.height as i32,
            "physical slot {physical} outside {}x{} grid",
            self.width,
            self.height
        );
        let wrapped = self.anchor + physical - self.origin;
        self.origin
            + Point::new(
                wrapped.x.rem_euclid(self.width as i32),
                wrapped.y.rem_euclid(self.height as i32),
            )
    }

    pub fn region(&self) -> Rect {
        Rect::from_min_size(self.origin, self.width as i32, self.height as i32)
    }

    pub fn contains(&self, logical: Point) -> bool {
        self.region().contains(logical)
    }

    pub fn center(&self) -> Point {
        self.region().center()
    }

    pub fn intersect(&self, rect: Rect) -> Rect {
        self.region().intersection(&rect)
    }

    /// Row-major index of a physical slot.
    pub fn slot_index(&self, physical: Point) -> usize {
        physical.y as usize * self.width as usize + physical.x as usize
    }

    pub fn physical_of_index(&self, index: usize) -> Point {
        let width = self.width as usize;
        Point::new((index % width) as i32, (index / width) as i32)
    }

    /// Split a logical rect inside `region()` at the wraparound seams.
    ///
    /// Every returned part maps to one contiguous physical rectangle. Parts
    /// are ordered (low x, low y), (high x, low y), (low x, high y),
    /// (high x, high y); parts that do not exist have zero area.
    pub fn split(&self, rect: Rect) -> [Rect; 4] {
        let rect = self.intersect(rect);
        if rect.is_empty() {
            return [Rect::EMPTY; 4];
        }

        let physical_min = self.map(rect.min());
        let before_seam_x = rect.width().min(self.width as i32 - physical_min.x);
        let before_seam_y = rect.height().min(self.height as i32 - physical_min.y);
        let seam_x = rect.min_x + before_seam_x;
        let seam_y = rect.min_y + before_seam_y;

        [
            Rect::new(rect.min_x, rect.min_y, seam_x, seam_y),
            Rect::new(seam_x, rect.min_y, rect.max_x, seam_y),
            Rect::new(rect.min_x, seam_y, seam_x, rect.max_y),
            Rect::new(seam_x, seam_y, rect.max_x, rect.max_y),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::TorusMapping;
    use model::{Point, Rect};

    #[test]
    fn map_wraps_negative_offsets_into_range() {
        let mut mapping = TorusMapping::new(4, 3);
        mapping.reset(Point::new(-2, 5));
        assert_eq!(mapping.map(Point::new(-2, 5)), Point::new(0, 0));
        assert_eq!(mapping.map(Point::new(-3, 4)), Point::new(3, 2));
        assert_eq!(mapping.map(Point::new(2, 8)), Point::new(0, 0));
        assert_eq!(mapping.map(Point::new(-100, -100)), Point::new(2, 0));
    }

    #[test]
    fn region_follows_origin() {
        let mut mapping = TorusMapping::new(4, 4);
        assert_eq!(mapping.region(), Rect::new(0, 0, 4, 4));
        mapping.shift(Point::new(1, 0));
        assert_eq!(mapping.region(), Rect::new(1, 0, 5, 4));
        mapping.shift(Point::new(-3, 2));
        assert_eq!(mapping.region(), Rect::new(-2, 2, 2, 6));
        assert_eq!(mapping.center(), Point::new(0, 4));
    }

    #[test]
    fn intersect_clips_to_window() {
        let mut mapping = TorusMapping::new(4, 4);
        mapping.reset(Point::new(10, 10));
        assert_eq!(
            mapping.intersect(Rect::new(8, 12, 12, 20)),
            Rect::new(10, 12, 12, 14)
        );
        assert!(mapping.intersect(Rect::new(0, 0, 2, 2)).is_empty());
    }

    #[test]
    fn split_interior_rect_yields_single_part() {
        let mut mapping = TorusMapping::new(8, 8);
        mapping.reset(Point::new(0, 0));
        let rect = Rect::new(1, 2, 5, 7);
        let parts = mapping.split(rect);
        assert_eq!(parts[0], rect);
        assert!(parts[1..].iter().all(Rect::is_empty));
    }

    #[test]
    fn shift_keeps_slots_of_remaining_tiles() {
        let mut mapping = TorusMapping::new(4, 4);
        let before = mapping.map(Point::new(2, 3));
        mapping.shift(Point::new(1, 0));
        assert_eq!(mapping.map(Point::new(2, 3)), before);
        // the entering column reuses the slots of the column that left
        assert_eq!(mapping.map(Point::new(4, 0)), Point::new(0, 0));
        assert_eq!(mapping.unmap(Point::new(0, 0)), Point::new(4, 0));
        assert_eq!(mapping.unmap(Point::new(1, 0)), Point::new(1, 0));
    }

    #[test]
    fn split_after_shift_cuts_at_seam() {
        let mut mapping = TorusMapping::new(4, 4);
        mapping.shift(Point::new(1, 0));
        let parts = mapping.split(mapping.region());
        assert_eq!(parts[0], Rect::new(1, 0, 4, 4));
        assert_eq!(parts[1], Rect::new(4, 0, 5, 4));
        assert!(parts[2].is_empty());
        assert!(parts[3].is_empty());
    }

    #[test]
    fn split_on_both_seams_yields_four_parts() {
        let mut mapping = TorusMapping::new(4, 4);
        mapping.shift(Point::new(2, 3));
        let parts = mapping.split(Rect::new(3, 3, 6, 7));
        assert_eq!(parts[0], Rect::new(3, 3, 4, 4));
        assert_eq!(parts[1], Rect::new(4, 3, 6, 4));
        assert_eq!(parts[2], Rect::new(3, 4, 4, 7));
        assert_eq!(parts[3], Rect::new(4, 4, 6, 7));
        for part in parts {
            let physical_min = mapping.map(part.min());
            assert!(physical_min.x + part.width() <= 4);
            assert!(physical_min.y + part.height() <= 4);
        }
    }

    #[test]
    fn split_outside_window_is_empty() {
        let mapping = TorusMapping::new(4, 4);
        assert!(mapping.split(Rect::new(10, 10, 12, 12)).iter().all(Rect::is_empty));
    }
}
