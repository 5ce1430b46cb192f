//! # Child Ordering
//!
//! Total order over child artefacts so that batch progression, and with it
//! fan-out side effects, is deterministic regardless of insertion order.
//!
//! Tie-break chain:
//!
//! 1. absent sorts first;
//! 2. different parents: detached first, then by parent type name and id;
//! 3. the observation metadata file sorts before its siblings;
//! 4. by kind type name, then by filename.

use std::cmp::Ordering;

use crate::artefact::Artefact;
use crate::depositable::ChildDepositableArtefact;

/// Compare two (possibly absent) children.
pub fn compare_children<T>(a: Option<&T>, b: Option<&T>) -> Ordering
where
    T: ChildDepositableArtefact + ?Sized,
{
    let (a, b) = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Less,
        (Some(_), None) => return Ordering::Greater,
        (Some(a), Some(b)) => (a, b),
    };

    let by_parent = match (a.parent(), b.parent()) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(pa), Some(pb)) => pa.sort_key().cmp(&pb.sort_key()),
    };
    if by_parent != Ordering::Equal {
        return by_parent;
    }

    let (ka, kb) = (a.kind(), b.kind());
    match (ka.is_priority(), kb.is_priority()) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }

    ka.type_name()
        .cmp(kb.type_name())
        .then_with(|| a.filename().cmp(b.filename()))
}

/// Sort children in place.
pub fn sort_children<T: ChildDepositableArtefact>(children: &mut [&T]) {
    children.sort_by(|a, b| compare_children(Some(*a), Some(*b)));
}

/// Arena indices of the artefacts matching `include`, in child order.
pub(crate) fn ordered_indices(
    artefacts: &[Artefact],
    include: impl Fn(&Artefact) -> bool,
) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..artefacts.len())
        .filter(|&i| include(&artefacts[i]))
        .collect();
    indices.sort_by(|&i, &j| compare_children(Some(&artefacts[i]), Some(&artefacts[j])));
    indices
}
