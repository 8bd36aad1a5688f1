//! Estimates of the memory used by in-memory results, used to decide when to spill to disk.

use std::{
    collections::BTreeMap,
    ops::{Add, AddAssign},
};

use ordered_float::OrderedFloat;

use crate::{
    advocate::Advocate,
    aminoacid::AminoAcid,
    sequence::{AminoAcidPattern, AminoAcidSequence, ModificationMatch, Peptide, Tag, TagComponent},
    system::{Mass, MassOverCharge},
};

/// Estimate the memory footprint of a value
pub trait Space {
    /// The estimated space used by this value
    fn space(&self) -> UsedSpace;
}

/// The space used by a value, split in stack and heap parts
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct UsedSpace {
    /// Bytes on the stack
    pub stack: usize,
    /// Bytes of padding on the stack
    pub padding: usize,
    /// Bytes used on the heap
    pub heap_used: usize,
    /// Bytes of padding on the heap
    pub heap_padding: usize,
    /// Bytes allocated but not used on the heap
    pub heap_unused: usize,
}

impl std::fmt::Display for UsedSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (heap {}, unused {})",
            display_bytes(self.total()),
            display_bytes(self.heap_used + self.heap_padding),
            display_bytes(self.heap_unused)
        )
    }
}

/// Show a number of bytes in a human readable form
pub fn display_bytes(bytes: usize) -> String {
    const GB: usize = 1024 * 1024 * 1024;
    const MB: usize = 1024 * 1024;
    const KB: usize = 1024;
    if bytes < KB {
        format!("{bytes} B")
    } else if bytes > GB {
        format!("{} GiB", bytes / GB)
    } else if bytes > MB {
        format!("{} MiB", bytes / MB)
    } else {
        format!("{} KiB", bytes / KB)
    }
}

impl UsedSpace {
    /// Only stack space
    pub fn stack(stack: usize) -> Self {
        Self {
            stack,
            ..Default::default()
        }
    }

    /// Account for the padding needed to get to the full size of `Total`
    #[must_use]
    pub fn set_total<Total>(self) -> Self {
        Self {
            padding: size_of::<Total>().saturating_sub(self.stack),
            ..self
        }
    }

    /// Add a child that lives on the heap
    #[must_use]
    pub fn add_child(self, child: Self) -> Self {
        Self {
            stack: self.stack,
            padding: self.padding,
            heap_used: self.heap_used + child.heap_used + child.stack,
            heap_padding: self.heap_padding + child.heap_padding + child.padding,
            heap_unused: self.heap_unused + child.heap_unused,
        }
    }

    /// The total number of bytes
    pub const fn total(&self) -> usize {
        self.stack + self.padding + self.heap_used + self.heap_padding + self.heap_unused
    }
}

impl AddAssign for UsedSpace {
    fn add_assign(&mut self, rhs: Self) {
        self.stack += rhs.stack;
        self.padding += rhs.padding;
        self.heap_used += rhs.heap_used;
        self.heap_padding += rhs.heap_padding;
        self.heap_unused += rhs.heap_unused;
    }
}

impl Add for UsedSpace {
    type Output = Self;
    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

fn heap_collection(items: UsedSpace, stack: usize, unused: usize) -> UsedSpace {
    UsedSpace {
        stack,
        padding: 0,
        heap_used: items.stack + items.heap_used,
        heap_padding: items.padding + items.heap_padding,
        heap_unused: items.heap_unused + unused,
    }
}

impl<T: Space> Space for Vec<T> {
    fn space(&self) -> UsedSpace {
        let mut total = UsedSpace::default();
        for e in self {
            total += e.space();
        }
        heap_collection(
            total,
            size_of::<Self>(),
            (self.capacity() - self.len()) * size_of::<T>(),
        )
    }
}

/// The space of a vector holding these items, without unused capacity
fn slice_space<T: Space>(items: &[T]) -> UsedSpace {
    let mut total = UsedSpace::default();
    for e in items {
        total += e.space();
    }
    heap_collection(total, size_of::<Vec<T>>(), 0)
}

impl<K: Space, V: Space> Space for BTreeMap<K, V> {
    fn space(&self) -> UsedSpace {
        let mut total = UsedSpace::default();
        for (k, v) in self {
            total += k.space() + v.space();
        }
        heap_collection(total, size_of::<Self>(), 0)
    }
}

impl Space for String {
    fn space(&self) -> UsedSpace {
        UsedSpace {
            stack: size_of::<Self>(),
            padding: 0,
            heap_used: self.len(),
            heap_padding: 0,
            heap_unused: self.capacity() - self.len(),
        }
    }
}

impl<T: Space> Space for Option<T> {
    fn space(&self) -> UsedSpace {
        self.as_ref()
            .map_or_else(UsedSpace::default, Space::space)
            .set_total::<Self>()
    }
}

impl<A: Space, B: Space> Space for (A, B) {
    fn space(&self) -> UsedSpace {
        (self.0.space() + self.1.space()).set_total::<Self>()
    }
}

macro_rules! simple_space {
    ($($ty:ty),+) => {
        $(impl Space for $ty {
            fn space(&self) -> UsedSpace {
                UsedSpace::stack(size_of::<Self>())
            }
        })+
    };
}

simple_space!(
    bool,
    usize,
    u8,
    u32,
    f64,
    OrderedFloat<f64>,
    Mass,
    MassOverCharge,
    AminoAcid,
    Advocate
);

impl Space for ModificationMatch {
    fn space(&self) -> UsedSpace {
        (self.site.space()
            + self.modification_name.space()
            + self.is_variable.space()
            + self.is_confident.space())
        .set_total::<Self>()
    }
}

impl Space for Peptide {
    fn space(&self) -> UsedSpace {
        (slice_space(self.sequence())
            + slice_space(self.modifications())
            + slice_space(self.parent_proteins()))
        .set_total::<Self>()
    }
}

impl Space for AminoAcidPattern {
    fn space(&self) -> UsedSpace {
        (self.residues.space() + self.modifications.space()).set_total::<Self>()
    }
}

impl Space for AminoAcidSequence {
    fn space(&self) -> UsedSpace {
        (self.sequence.space() + self.modifications.space()).set_total::<Self>()
    }
}

impl Space for TagComponent {
    fn space(&self) -> UsedSpace {
        match self {
            Self::AminoAcidPattern(p) => p.space(),
            Self::AminoAcidSequence(s) => s.space(),
            Self::MassGap(m) => m.space(),
        }
        .set_total::<Self>()
    }
}

impl Space for Tag {
    fn space(&self) -> UsedSpace {
        slice_space(self.components()).set_total::<Self>()
    }
}
