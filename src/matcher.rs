//! Greedy incremental matcher.
//!
//! Each new face is compared against every known reference encoding;
//! the nearest one within tolerance wins, otherwise a new identity is
//! minted. This is a single pass with no global re-clustering, so the
//! cost per face is linear in the number of known persons and already
//! assigned faces are never revisited. The accepted tradeoff: two
//! borderline faces seen before the threshold is crossed can mint
//! duplicate identities that only a manual merge would repair.

use crate::db::{euclidean_distance, PersonKey};

/// Decision for one face against the current working set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchOutcome {
    /// Nearest known person within tolerance.
    Matched {
        key: PersonKey,
        distance: f32,
        confidence: f32,
    },
    /// No known person is close enough; mint a new identity.
    NewPerson,
}

/// Match one face encoding against the working set of known persons.
///
/// A person is a candidate when its reference encoding lies within
/// `tolerance` (Euclidean). Among candidates the minimum distance
/// wins (not the first below threshold), with ties broken by lowest
/// person key for determinism. Confidence is `max(0, 1 - distance)`.
pub fn match_face(
    encoding: &[f32],
    known: &[(PersonKey, Vec<f32>)],
    tolerance: f32,
) -> MatchOutcome {
    let mut best: Option<(PersonKey, f32)> = None;

    for (key, reference) in known {
        let distance = euclidean_distance(encoding, reference);
        if distance > tolerance {
            continue;
        }
        let better = match best {
            None => true,
            Some((best_key, best_distance)) => {
                distance < best_distance || (distance == best_distance && *key < best_key)
            }
        };
        if better {
            best = Some((*key, distance));
        }
    }

    match best {
        Some((key, distance)) => MatchOutcome::Matched {
            key,
            distance,
            confidence: (1.0 - distance).max(0.0),
        },
        None => MatchOutcome::NewPerson,
    }
}
