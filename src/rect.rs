use nalgebra::Matrix1x4;
use num::Float;
use std::fmt::Debug;

/* ------------------------------------------------------------------------------
 * Type aliases
 * ------------------------------------------------------------------------------ */
pub type Xyxy<T> = Matrix1x4<T>;

/* ------------------------------------------------------------------------------
 * Rect struct
 * ------------------------------------------------------------------------------ */

/// Axis-aligned pixel bounding box.
///
/// Stored as corners `[x1, y1, x2, y2]`, which is the layout the detector hands
/// over. A box whose `y2 <= y1` is kept as-is; callers that divide by the
/// height check `height() > 0` first.
#[derive(Debug, Clone, PartialEq)]
pub struct Rect<T>
where
    T: Debug + Float,
{
    xyxy: Xyxy<T>,
}

impl<T> Rect<T>
where
    T: Debug + Float + 'static,
{
    pub fn from_xyxy(x1: T, y1: T, x2: T, y2: T) -> Self {
        Self {
            xyxy: Matrix1x4::new(x1, y1, x2, y2),
        }
    }

    /// Create Rect from [x, y, width, height] format (top-left corner)
    pub fn from_tlwh(x: T, y: T, width: T, height: T) -> Self {
        Self::from_xyxy(x, y, x + width, y + height)
    }

    #[inline(always)]
    pub fn x1(&self) -> T {
        self.xyxy[(0, 0)]
    }

    #[inline(always)]
    pub fn y1(&self) -> T {
        self.xyxy[(0, 1)]
    }

    #[inline(always)]
    pub fn x2(&self) -> T {
        self.xyxy[(0, 2)]
    }

    #[inline(always)]
    pub fn y2(&self) -> T {
        self.xyxy[(0, 3)]
    }

    #[inline(always)]
    pub fn width(&self) -> T {
        self.x2() - self.x1()
    }

    #[inline(always)]
    pub fn height(&self) -> T {
        self.y2() - self.y1()
    }

    /// Get bounding box as [x1, y1, x2, y2] format
    pub fn get_xyxy(&self) -> [T; 4] {
        [self.x1(), self.y1(), self.x2(), self.y2()]
    }

    pub fn center(&self) -> (T, T) {
        let two = T::one() + T::one();
        ((self.x1() + self.x2()) / two, (self.y1() + self.y2()) / two)
    }

    /// Bottom-center of the box, where a standing person touches the floor.
    pub fn foot_point(&self) -> (T, T) {
        let two = T::one() + T::one();
        ((self.x1() + self.x2()) / two, self.y2())
    }

    /// Width over height, `None` for a box with no height.
    pub fn aspect_ratio(&self) -> Option<T> {
        let height = self.height();
        if height > T::zero() {
            Some(self.width() / height)
        } else {
            None
        }
    }
}
