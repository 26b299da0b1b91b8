//! Integer geometry in nanometers. All database coordinates are `i64` so
//! that a full reticle fits without rounding.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::ops::{Add, Sub};

/// A point (or displacement) in nm.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord64 {
    pub x: i64,
    pub y: i64,
}

impl Coord64 {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// L1 distance to `other`.
    pub fn manhattan_distance(&self, other: &Coord64) -> i64 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

impl Display for Coord64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl Add for Coord64 {
    type Output = Coord64;

    fn add(self, rhs: Coord64) -> Coord64 {
        Coord64::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Coord64 {
    type Output = Coord64;

    fn sub(self, rhs: Coord64) -> Coord64 {
        Coord64::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Extent of an object in nm.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size64 {
    pub w: i64,
    pub h: i64,
}

impl Size64 {
    pub const fn new(w: i64, h: i64) -> Self {
        Self { w, h }
    }

    pub fn is_null(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    pub fn area(&self) -> i64 {
        self.w * self.h
    }
}

/// Axis-aligned rectangle, lower-left inclusive / upper-right exclusive.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect64 {
    pub ll: Coord64,
    pub ur: Coord64,
}

impl Rect64 {
    pub const fn new(ll: Coord64, ur: Coord64) -> Self {
        Self { ll, ur }
    }

    pub fn from_size(ll: Coord64, size: Size64) -> Self {
        Self {
            ll,
            ur: Coord64::new(ll.x + size.w, ll.y + size.h),
        }
    }

    pub fn width(&self) -> i64 {
        self.ur.x - self.ll.x
    }

    pub fn height(&self) -> i64 {
        self.ur.y - self.ll.y
    }

    pub fn size(&self) -> Size64 {
        Size64::new(self.width(), self.height())
    }

    pub fn area(&self) -> i64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> Coord64 {
        Coord64::new(
            (self.ll.x + self.ur.x) / 2,
            (self.ll.y + self.ur.y) / 2,
        )
    }

    pub fn contains(&self, p: Coord64) -> bool {
        p.x >= self.ll.x && p.x < self.ur.x && p.y >= self.ll.y && p.y < self.ur.y
    }

    /// Shrink the rectangle by a margin on every side. Collapses to the
    /// center when the margin exceeds half the extent.
    pub fn shrunk(&self, left: i64, bottom: i64, right: i64, top: i64) -> Rect64 {
        let ll = Coord64::new(self.ll.x + left, self.ll.y + bottom);
        let ur = Coord64::new(
            (self.ur.x - right).max(ll.x),
            (self.ur.y - top).max(ll.y),
        );
        Rect64::new(ll, ur)
    }

    /// Area of the intersection with `other`, zero when disjoint.
    pub fn overlap_area(&self, other: &Rect64) -> i64 {
        let w = self.ur.x.min(other.ur.x) - self.ll.x.max(other.ll.x);
        let h = self.ur.y.min(other.ur.y) - self.ll.y.max(other.ll.y);
        if w <= 0 || h <= 0 {
            0
        } else {
            w * h
        }
    }
}

/// Placement orientation of an instance.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    R0,
    R90,
    R180,
    R270,
    MX,
    MY,
    MX90,
    MY90,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_area() {
        let a = Rect64::new(Coord64::new(0, 0), Coord64::new(10, 10));
        let b = Rect64::new(Coord64::new(5, 5), Coord64::new(15, 15));
        let c = Rect64::new(Coord64::new(20, 20), Coord64::new(30, 30));

        assert_eq!(a.overlap_area(&b), 25);
        assert_eq!(b.overlap_area(&a), 25);
        assert_eq!(a.overlap_area(&c), 0);
        assert_eq!(a.overlap_area(&a), 100);
    }

    #[test]
    fn shrunk_clamps_to_empty() {
        let r = Rect64::new(Coord64::new(0, 0), Coord64::new(10, 10));
        let s = r.shrunk(8, 8, 8, 8);
        assert_eq!(s.width(), 0);
        assert_eq!(s.height(), 0);
    }

    #[test]
    fn manhattan() {
        assert_eq!(
            Coord64::new(0, 0).manhattan_distance(&Coord64::new(3, -4)),
            7
        );
    }
}
