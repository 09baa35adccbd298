use crate::glam::IVec3;

/// An axis-aligned box of lattice points, given by its minimum point and its shape.
///
/// An extent with any non-positive shape component contains no points.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Extent<V> {
    pub minimum: V,
    pub shape: V,
}

impl Extent<IVec3> {
    #[inline]
    pub fn from_min_and_shape(minimum: IVec3, shape: IVec3) -> Self {
        Self { minimum, shape }
    }

    /// The extent containing both `min` and `max` (inclusive).
    #[inline]
    pub fn from_min_and_max(minimum: IVec3, max: IVec3) -> Self {
        Self::from_min_and_shape(minimum, max - minimum + IVec3::ONE)
    }

    /// The first point past `max()` on every axis.
    #[inline]
    pub fn least_upper_bound(&self) -> IVec3 {
        self.minimum + self.shape
    }

    /// The greatest point contained in the extent.
    #[inline]
    pub fn max(&self) -> IVec3 {
        self.least_upper_bound() - IVec3::ONE
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shape.min_element() <= 0
    }

    /// The number of points. Any `i32` shape fits in `i128`.
    pub fn volume(&self) -> i128 {
        if self.is_empty() {
            return 0;
        }
        self.shape.x as i128 * self.shape.y as i128 * self.shape.z as i128
    }

    #[inline]
    pub fn contains(&self, p: IVec3) -> bool {
        p.cmpge(self.minimum).all() && p.cmplt(self.least_upper_bound()).all()
    }

    pub fn intersection(&self, other: &Self) -> Self {
        let minimum = self.minimum.max(other.minimum);
        let lub = self.least_upper_bound().min(other.least_upper_bound());
        Self::from_min_and_shape(minimum, (lub - minimum).max(IVec3::ZERO))
    }

    /// Iterates over every point in the extent, x fastest.
    pub fn iter3(&self) -> impl Iterator<Item = IVec3> {
        let min = self.minimum;
        let lub = self.least_upper_bound();
        let empty = self.is_empty();
        (min.z..lub.z)
            .flat_map(move |z| (min.y..lub.y).map(move |y| (y, z)))
            .flat_map(move |(y, z)| (min.x..lub.x).map(move |x| IVec3::new(x, y, z)))
            .filter(move |_| !empty)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
