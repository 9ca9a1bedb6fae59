use core::fmt;

use thiserror::Error;

/// The balance parameter of a [`ScapegoatTree`](crate::ScapegoatTree).
///
/// A tree of `n` nodes is considered too deep once any node sits deeper than
/// `⌊log_{1/α}(n)⌋`. Values close to `0.5` keep the tree close to perfectly balanced at the cost of
/// more frequent rebuilds; values close to `1` tolerate more skew.
///
/// `α = 1` is accepted and disables the height ceiling entirely: insertions never rebuild, and
/// every removal rebuilds the whole tree.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct Alpha(f64);

/// The error returned when constructing an [`Alpha`] from an invalid value.
#[derive(Copy, Clone, Debug, PartialEq, Error)]
pub enum AlphaError {
    #[error("alpha must be a number, got NaN")]
    NaN,

    #[error("alpha must be in (0, 1], got {0}")]
    OutOfRange(f64),
}

impl Alpha {
    /// Validates `alpha`, which must lie in `(0, 1]`.
    pub fn new(alpha: f64) -> Result<Alpha, AlphaError> {
        if alpha.is_nan() {
            return Err(AlphaError::NaN);
        }

        if alpha <= 0.0 || alpha > 1.0 {
            return Err(AlphaError::OutOfRange(alpha));
        }

        Ok(Alpha(alpha))
    }

    /// Returns the raw value of α.
    #[inline]
    pub const fn get(self) -> f64 {
        self.0
    }

    /// Returns `⌊log_{1/α}(len)⌋`, the greatest depth a node may have in an α-balanced tree of `len`
    /// nodes.
    ///
    /// Trees of zero or one node have a bound of 0. With `α = 1` the bound is unlimited.
    pub fn height_bound(self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }

        if self.0 == 1.0 {
            return usize::MAX;
        }

        let bound = (len as f64).ln() / (1.0 / self.0).ln();
        bound.floor() as usize
    }

    /// Returns `true` if a tree of `len` nodes has shrunk far enough below its high-water mark
    /// `max_len` to warrant a full rebuild.
    #[inline]
    pub(crate) fn is_shrunk(self, len: usize, max_len: usize) -> bool {
        len as f64 <= self.0 * max_len as f64
    }
}

impl TryFrom<f64> for Alpha {
    type Error = AlphaError;

    fn try_from(alpha: f64) -> Result<Self, Self::Error> {
        Alpha::new(alpha)
    }
}

impl From<Alpha> for f64 {
    fn from(alpha: Alpha) -> f64 {
        alpha.0
    }
}

impl fmt::Display for Alpha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
