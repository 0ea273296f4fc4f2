//! Visit id assignment and preceding-visit linkage.

use chrono::NaiveDateTime;

/// A visit after linkage, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkedVisit {
    /// Index of the visit in the input slices.
    pub index: usize,
    pub id: i64,
    pub preceding_id: Option<i64>,
}

/// Orders visits by `(person_id, start)`, numbers them densely from 1 and
/// links each to the previous visit of the same person.
///
/// Must run after deduplication and date-range filtering so that ids stay
/// dense. Visits with equal person and start keep their input order.
pub fn link_visits(person_ids: &[i64], starts: &[NaiveDateTime]) -> Vec<LinkedVisit> {
    let mut order: Vec<usize> = (0..person_ids.len().min(starts.len())).collect();
    order.sort_by_key(|idx| (person_ids[*idx], starts[*idx]));

    let mut linked = Vec::with_capacity(order.len());
    let mut previous: Option<(i64, i64)> = None;
    for (position, index) in order.into_iter().enumerate() {
        let id = position as i64 + 1;
        let person = person_ids[index];
        let preceding_id = match previous {
            Some((prev_person, prev_id)) if prev_person == person => Some(prev_id),
            _ => None,
        };
        linked.push(LinkedVisit {
            index,
            id,
            preceding_id,
        });
        previous = Some((person, id));
    }
    linked
}
