//! Index types for mesh elements.
//!
//! Vertices, half-edges, full edges and faces are addressed by type-safe
//! wrappers around a dense integer index. The contraction pipeline relies on
//! these indices being a permutation of `[0, count)`: they double as row and
//! column numbers of the linear system, so every topology change ends with a
//! compacting rebuild (see [`IndexRemap`]).

use std::fmt::{self, Debug};
use std::hash::Hash;

/// Trait for integer types that can back mesh indices.
///
/// Implemented for `u16`, `u32` and `u64`. The largest value of each type is
/// reserved as the invalid sentinel.
pub trait MeshIndex:
    Copy + Clone + Eq + PartialEq + Ord + PartialOrd + Hash + Debug + Send + Sync + 'static
{
    /// The maximum valid index value.
    const MAX: Self;

    /// A sentinel value representing an invalid/null index.
    const INVALID: Self;

    /// Convert from usize to this index type.
    ///
    /// # Panics
    /// Panics in debug builds if the value does not fit.
    fn from_usize(v: usize) -> Self;

    /// Convert to usize.
    fn to_usize(self) -> usize;

    /// Check if this is a valid (non-sentinel) index.
    fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

macro_rules! impl_mesh_index {
    ($($ty:ty),*) => {$(
        impl MeshIndex for $ty {
            const MAX: Self = <$ty>::MAX - 1;
            const INVALID: Self = <$ty>::MAX;

            #[inline]
            fn from_usize(v: usize) -> Self {
                debug_assert!(
                    v as u128 <= Self::MAX as u128,
                    "index {} too large for {}",
                    v,
                    stringify!($ty)
                );
                v as $ty
            }

            #[inline]
            fn to_usize(self) -> usize {
                self as usize
            }
        }
    )*};
}

impl_mesh_index!(u16, u32, u64);

/// A type-safe vertex index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct VertexId<I: MeshIndex = u32>(I);

/// A type-safe half-edge index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct HalfEdgeId<I: MeshIndex = u32>(I);

/// A type-safe face index.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct FaceId<I: MeshIndex = u32>(I);

/// A type-safe full-edge index (one per pair of twin half-edges).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct EdgeId<I: MeshIndex = u32>(I);

macro_rules! impl_index_type {
    ($name:ident, $display:literal) => {
        impl<I: MeshIndex> $name<I> {
            /// Create a new index from a raw value.
            #[inline]
            pub fn new(index: usize) -> Self {
                Self(I::from_usize(index))
            }

            /// Create an invalid/null index.
            #[inline]
            pub fn invalid() -> Self {
                Self(I::INVALID)
            }

            /// Get the raw index value.
            #[inline]
            pub fn index(self) -> usize {
                self.0.to_usize()
            }

            /// Check if this is a valid (non-null) index.
            #[inline]
            pub fn is_valid(self) -> bool {
                self.0.is_valid()
            }
        }

        impl<I: MeshIndex> Debug for $name<I> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, "{}({})", $display, self.index())
                } else {
                    write!(f, "{}(INVALID)", $display)
                }
            }
        }

        impl<I: MeshIndex> Default for $name<I> {
            fn default() -> Self {
                Self::invalid()
            }
        }

        impl<I: MeshIndex> From<usize> for $name<I> {
            fn from(v: usize) -> Self {
                Self::new(v)
            }
        }
    };
}

impl_index_type!(VertexId, "V");
impl_index_type!(HalfEdgeId, "HE");
impl_index_type!(FaceId, "F");
impl_index_type!(EdgeId, "E");

/// Old-to-new index table produced when dropping unused elements.
///
/// Built from a keep-mask; kept slots receive consecutive new indices in
/// their original order, so the result is again dense.
#[derive(Debug, Clone)]
pub struct IndexRemap {
    table: Vec<Option<usize>>,
    kept: usize,
}

impl IndexRemap {
    /// Build a remap table from a keep-mask.
    pub fn from_mask(keep: &[bool]) -> Self {
        let mut next = 0;
        let table = keep
            .iter()
            .map(|&k| {
                if k {
                    next += 1;
                    Some(next - 1)
                } else {
                    None
                }
            })
            .collect();
        Self { table, kept: next }
    }

    /// The new index of `old`, or `None` if it was dropped.
    #[inline]
    pub fn get(&self, old: usize) -> Option<usize> {
        self.table.get(old).copied().flatten()
    }

    /// Number of elements surviving the remap.
    #[inline]
    pub fn len(&self) -> usize {
        self.kept
    }

    /// True if nothing survives.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.kept == 0
    }

    /// True if the remap keeps every element in place.
    pub fn is_identity(&self) -> bool {
        self.kept == self.table.len()
    }
}
