//! Dimension types: concrete extents and build-time symbolic expressions

use smallvec::SmallVec;
use std::fmt;
use std::iter::FromIterator;
use std::ops::Deref;

/// Stack allocation threshold for dimensions
/// Instance normalization tensors have at most 5 dimensions
pub(crate) const STACK_DIMS: usize = 5;

/// Tensor extents, with [`Dims::DYNAMIC`] marking an extent unknown until runtime
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Dims(SmallVec<[i64; STACK_DIMS]>);

impl Dims {
    /// Marker for an extent that is not known yet
    pub const DYNAMIC: i64 = -1;

    /// Create an empty (rank 0) dims.
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    /// Build from fully known extents.
    pub fn from_usize(extents: &[usize]) -> Self {
        Self(extents.iter().map(|&d| d as i64).collect())
    }

    /// Number of dimensions.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    /// Extent at `index`, or `None` if dynamic or out of range.
    #[inline]
    pub fn get(&self, index: usize) -> Option<usize> {
        match self.0.get(index) {
            Some(&d) if d >= 0 => Some(d as usize),
            _ => None,
        }
    }

    /// Whether every extent is known.
    pub fn is_concrete(&self) -> bool {
        self.0.iter().all(|&d| d >= 0)
    }

    /// Concrete extents, or `None` if any extent is dynamic.
    pub fn to_usize(&self) -> Option<SmallVec<[usize; STACK_DIMS]>> {
        self.0
            .iter()
            .map(|&d| if d >= 0 { Some(d as usize) } else { None })
            .collect()
    }

    /// Product of the extents from `start` on, or `None` if any is dynamic.
    pub fn volume_from(&self, start: usize) -> Option<usize> {
        self.0
            .iter()
            .skip(start)
            .try_fold(1usize, |acc, &d| (d >= 0).then(|| acc * d as usize))
    }

    /// View dims as a slice.
    pub fn as_slice(&self) -> &[i64] {
        self.0.as_slice()
    }
}

impl Deref for Dims {
    type Target = [i64];

    fn deref(&self) -> &Self::Target {
        self.0.as_slice()
    }
}

impl fmt::Debug for Dims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&[i64]> for Dims {
    fn from(value: &[i64]) -> Self {
        Self(value.iter().copied().collect())
    }
}

impl<const N: usize> From<[i64; N]> for Dims {
    fn from(value: [i64; N]) -> Self {
        Self(value.into_iter().collect())
    }
}

impl From<Vec<i64>> for Dims {
    fn from(value: Vec<i64>) -> Self {
        Self(value.into_iter().collect())
    }
}

impl FromIterator<i64> for Dims {
    fn from_iter<T: IntoIterator<Item = i64>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ============================================================================
// Symbolic dimensions
// ============================================================================

/// One extent in a build-time shape expression
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DimExpr {
    /// Extent known while the plan is being built
    Constant(i64),
    /// Extent bound later, identified by name (e.g. `"batch"`)
    Symbol(String),
}

impl DimExpr {
    /// Create a symbolic extent
    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Symbol(name.into())
    }

    /// Constant value, if any
    pub fn as_constant(&self) -> Option<i64> {
        match self {
            Self::Constant(v) => Some(*v),
            Self::Symbol(_) => None,
        }
    }
}

impl fmt::Display for DimExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(v) => write!(f, "{v}"),
            Self::Symbol(s) => f.write_str(s),
        }
    }
}

/// Shape made of [`DimExpr`] extents
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct DimsExprs(SmallVec<[DimExpr; STACK_DIMS]>);

impl DimsExprs {
    /// Number of dimensions.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    /// Extent expression at `index`.
    pub fn get(&self, index: usize) -> Option<&DimExpr> {
        self.0.get(index)
    }
}

impl Deref for DimsExprs {
    type Target = [DimExpr];

    fn deref(&self) -> &Self::Target {
        self.0.as_slice()
    }
}

impl From<Vec<DimExpr>> for DimsExprs {
    fn from(value: Vec<DimExpr>) -> Self {
        Self(value.into_iter().collect())
    }
}

impl FromIterator<DimExpr> for DimsExprs {
    fn from_iter<T: IntoIterator<Item = DimExpr>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<&Dims> for DimsExprs {
    /// Dynamic extents become anonymous symbols named after their position.
    fn from(dims: &Dims) -> Self {
        dims.iter()
            .enumerate()
            .map(|(i, &d)| {
                if d >= 0 {
                    DimExpr::Constant(d)
                } else {
                    DimExpr::Symbol(format!("d{i}"))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dims_dynamic() {
        let d = Dims::from([-1, 3, 4, 4]);
        assert!(!d.is_concrete());
        assert_eq!(d.get(0), None);
        assert_eq!(d.get(1), Some(3));
        assert_eq!(d.volume_from(2), Some(16));
        assert_eq!(d.volume_from(0), None);
        assert!(d.to_usize().is_none());
    }

    #[test]
    fn test_dims_concrete() {
        let d = Dims::from_usize(&[2, 3, 5]);
        assert!(d.is_concrete());
        assert_eq!(d.to_usize().unwrap().as_slice(), &[2, 3, 5]);
        assert_eq!(d.volume_from(2), Some(5));
        assert_eq!(d.volume_from(3), Some(1));
    }

    #[test]
    fn test_exprs_from_dims() {
        let e = DimsExprs::from(&Dims::from([-1, 2, 8]));
        assert_eq!(e[0], DimExpr::symbol("d0"));
        assert_eq!(e[1].as_constant(), Some(2));
    }
}
