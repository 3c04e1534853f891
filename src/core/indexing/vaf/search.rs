//! VAF query: per-signature distance bounds and the bounded top-k heap.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::core::common::types::TupleId;
use crate::core::vector::DistanceKind;

/// Lower/upper exact-distance bounds a signature implies for `query`.
#[must_use]
pub fn bounds_for(
    distance: DistanceKind,
    query: &[f32],
    marks: &[Vec<f32>],
    cells: &[u32],
) -> (f32, f32) {
    let mut lower_sum = 0f32;
    let mut upper_sum = 0f32;
    for (j, &cell) in cells.iter().enumerate() {
        let q = query[j];
        let lo_bound = marks[j][cell as usize];
        let hi_bound = marks[j][cell as usize + 1];
        let lower_term = (q - hi_bound).max(lo_bound - q).max(0.0);
        let upper_term = (q - lo_bound).max(hi_bound - q);
        match distance {
            DistanceKind::L1 => {
                lower_sum += lower_term;
                upper_sum += upper_term;
            }
            _ => {
                lower_sum += lower_term * lower_term;
                upper_sum += upper_term * upper_term;
            }
        }
    }
    if distance == DistanceKind::L2 {
        (lower_sum.sqrt(), upper_sum.sqrt())
    } else {
        (lower_sum, upper_sum)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub tuple_id: TupleId,
    pub distance: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance && self.tuple_id == other.tuple_id
    }
}
impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    /// Orders by distance, breaking ties so a larger `tupleId` sorts as
    /// "greater" — the max-heap then evicts it first, leaving the smaller
    /// `tupleId` in the final top-k as the tie-break rule requires.
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.tuple_id.cmp(&other.tuple_id))
    }
}

/// A bounded max-heap over exact distances, keeping the `k` smallest.
pub struct TopK {
    k: usize,
    heap: BinaryHeap<Candidate>,
}

impl TopK {
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self { k, heap: BinaryHeap::with_capacity(k + 1) }
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.k
    }

    /// The current k-th smallest distance, i.e. the pruning threshold.
    #[must_use]
    pub fn threshold(&self) -> Option<f32> {
        self.heap.peek().map(|c| c.distance)
    }

    pub fn offer(&mut self, candidate: Candidate) {
        if self.k == 0 {
            return;
        }
        self.heap.push(candidate);
        if self.heap.len() > self.k {
            self.heap.pop();
        }
    }

    /// Drains the heap into ascending-distance order.
    #[must_use]
    pub fn into_sorted(self) -> Vec<Candidate> {
        let mut items: Vec<_> = self.heap.into_vec();
        items.sort_by(|a, b| a.cmp(b));
        items
    }
}
