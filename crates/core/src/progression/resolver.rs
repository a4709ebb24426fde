use std::collections::HashMap;
use std::hash::Hash;

use crate::model::{Exercise, Modality, Reactivo, ReactivoDetail, ReactivoListing, ResolvedMeta};

/// Streaming majority vote.
///
/// The leader only changes when a candidate's running count becomes strictly
/// greater than the leader's, so on a tie the value that reached the maximum
/// first keeps it.
struct MajorityVote<T> {
    counts: HashMap<T, u32>,
    leader: Option<(T, u32)>,
}

impl<T: Copy + Eq + Hash> MajorityVote<T> {
    fn new() -> Self {
        Self {
            counts: HashMap::new(),
            leader: None,
        }
    }

    fn push(&mut self, value: T) {
        let count = self.counts.entry(value).or_insert(0);
        *count += 1;
        let count = *count;
        if self.leader.is_none_or(|(_, best)| count > best) {
            self.leader = Some((value, count));
        }
    }

    fn winner(&self) -> Option<T> {
        self.leader.map(|(value, _)| value)
    }
}

/// Resolve one exercise's descriptor from its reactivo listing.
///
/// Degrades to unknown fields instead of failing, since listings can be
/// partial while a fetch is still in flight.
#[must_use]
pub fn resolve_meta(exercise: &Exercise, listing: &ReactivoListing) -> ResolvedMeta {
    let reported_total = listing
        .reported_total
        .filter(|t| t.is_finite() && *t >= 0.0)
        .map(total_from_f64);

    if listing.reactivos.is_empty() {
        return ResolvedMeta {
            modality: exercise.declared_modality(),
            total_reactivos: reported_total.filter(|t| *t == 0),
            ..ResolvedMeta::default()
        };
    }

    let mut sorted: Vec<&Reactivo> = listing.reactivos.iter().collect();
    sorted.sort_by_key(|r| (r.order, r.id));

    let mut modality_vote = MajorityVote::new();
    let mut subtype_vote = MajorityVote::new();
    let mut subtype_names = HashMap::new();

    for reactivo in &sorted {
        if let Some(modality) = reactivo.modality_tag.and_then(Modality::from_id) {
            modality_vote.push(modality);
        }
        if let Some(subtype) = reactivo.subtype_id {
            subtype_vote.push(subtype);
            if let Some(name) = reactivo
                .subtype_name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
            {
                subtype_names.entry(subtype).or_insert_with(|| name.to_owned());
            }
        }
    }

    let subtype_id = subtype_vote.winner();
    let subtype_name = subtype_id.and_then(|id| subtype_names.remove(&id));

    let details: Vec<ReactivoDetail> = sorted
        .iter()
        .map(|r| ReactivoDetail {
            id: r.id,
            subtype_id: r.subtype_id,
            subtype_name: r.subtype_name.clone(),
        })
        .collect();

    let count = u32::try_from(sorted.len()).unwrap_or(u32::MAX);

    ResolvedMeta {
        modality: modality_vote.winner(),
        subtype_id,
        subtype_name,
        total_reactivos: Some(reported_total.unwrap_or(count)),
        ordered_reactivo_ids: sorted.iter().map(|r| r.id).collect(),
        details,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn total_from_f64(total: f64) -> u32 {
    // Saturating cast; callers have already rejected negatives and NaN.
    total.trunc() as u32
}
