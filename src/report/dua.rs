//! Offline DUA classification.
//!
//! Branch inference alone settles most associations: a DUA is covered when
//! some branch reaching its definition fired, some branch reaching its use
//! fired, and no branch that definitely kills the definition in between
//! fired. A kill branch that also reaches the use is not a kill (taking it
//! is how the use was reached at all). Order-dependent kills and uses with
//! several reaching definitions cannot be settled definitively from branch
//! bits, so inference alone grades them at best possibly-covered; the
//! directly recorded DUA array resolves them when available.

use super::duafile::{DuaFile, DuaIndex, DuaRecord};
use crate::{utils::BitSet, Result};

/// Classification of one DUA after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuaCoverage {
    /// Definition and use both executed, with no intervening kill.
    Covered,
    /// Definition and use both reached, but coverage cannot be confirmed
    /// from branch data alone.
    Possible,
    /// Definition or use never reached, or the definition was killed.
    NotCovered,
}

impl DuaCoverage {
    /// The matrix cell value: 2 covered, 1 possible, 0 not covered.
    #[must_use]
    pub const fn cell(self) -> u32 {
        match self {
            Self::Covered => 2,
            Self::Possible => 1,
            Self::NotCovered => 0,
        }
    }
}

fn satisfied(set: &[u32], fired: &BitSet) -> bool {
    set.is_empty() || set.iter().any(|&b| fired.contains(b as usize))
}

fn killed(kills: &[u32], reach_use: &[u32], fired: &BitSet) -> bool {
    kills
        .iter()
        .filter(|b| !reach_use.contains(b))
        .any(|&b| fired.contains(b as usize))
}

/// Classifies one DUA from branch bits alone.
#[must_use]
pub fn infer(record: &DuaRecord, fired: &BitSet) -> DuaCoverage {
    if !satisfied(&record.reach_def, fired) || !satisfied(&record.reach_use, fired) {
        return DuaCoverage::NotCovered;
    }
    if killed(&record.in_order_kill, &record.reach_use, fired) {
        return DuaCoverage::NotCovered;
    }
    if killed(&record.not_in_order_kill, &record.reach_use, fired) || !record.inferable {
        return DuaCoverage::Possible;
    }
    DuaCoverage::Covered
}

/// Classifies every DUA, merging inference with directly recorded results.
///
/// In hybrid mode, inferable DUAs use inference and the rest read their
/// recorded cell; in direct mode every DUA reads its cell. Each DUA is
/// settled by exactly one source, so the merge cannot double count. Without
/// runtime data (`direct` is `None`) everything falls back to inference.
///
/// # Errors
///
/// Returns [`crate::Error::Inconsistent`] if the index file does not list
/// one offset per DUA or an offset points past the recorded array.
pub fn classify_all(
    file: &DuaFile,
    fired: &BitSet,
    direct: Option<(&[u32], &DuaIndex)>,
) -> Result<Vec<DuaCoverage>> {
    if let Some((_, index)) = direct {
        if index.offsets.len() != file.duas.len() {
            return Err(inconsistent_error!(
                "DUA index lists {} offsets for {} DUAs",
                index.offsets.len(),
                file.duas.len()
            ));
        }
    }

    file.duas
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let use_direct = match direct {
                Some(_) if file.hybrid => !record.inferable,
                Some(_) => true,
                None => false,
            };
            match direct {
                Some((cells, index)) if use_direct => {
                    let slot = (index.offsets[i] / 4) as usize;
                    let cell = cells.get(slot).copied().ok_or_else(|| {
                        inconsistent_error!(
                            "DUA offset {} past array of {} cells",
                            index.offsets[i],
                            cells.len()
                        )
                    })?;
                    Ok(if cell > 0 {
                        DuaCoverage::Covered
                    } else {
                        DuaCoverage::NotCovered
                    })
                }
                _ => Ok(infer(record, fired)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(inferable: bool) -> DuaRecord {
        DuaRecord {
            inferable,
            name: "x@s0->s9".into(),
            reach_def: vec![0],
            reach_use: vec![1],
            in_order_kill: Vec::new(),
            not_in_order_kill: Vec::new(),
        }
    }

    fn fired(bits: &[usize]) -> BitSet {
        bits.iter().copied().collect()
    }

    #[test]
    fn test_inference_grades() {
        let r = record(true);
        assert_eq!(infer(&r, &fired(&[0, 1])), DuaCoverage::Covered);
        assert_eq!(infer(&r, &fired(&[0])), DuaCoverage::NotCovered);
        assert_eq!(infer(&r, &fired(&[1])), DuaCoverage::NotCovered);

        // Non-inferable DUAs are at best possible from branches alone.
        assert_eq!(infer(&record(false), &fired(&[0, 1])), DuaCoverage::Possible);
    }

    #[test]
    fn test_in_order_kill_defeats_coverage() {
        let mut r = record(true);
        r.in_order_kill = vec![2];
        assert_eq!(infer(&r, &fired(&[0, 1])), DuaCoverage::Covered);
        assert_eq!(infer(&r, &fired(&[0, 1, 2])), DuaCoverage::NotCovered);
    }

    #[test]
    fn test_self_overlapping_kill_is_excluded() {
        // The kill branch is the use's own reaching branch: not a kill.
        let mut r = record(true);
        r.in_order_kill = vec![1];
        assert_eq!(infer(&r, &fired(&[0, 1])), DuaCoverage::Covered);
    }

    #[test]
    fn test_unordered_kill_degrades_to_possible() {
        let mut r = record(true);
        r.not_in_order_kill = vec![2];
        assert_eq!(infer(&r, &fired(&[0, 1, 2])), DuaCoverage::Possible);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let file = DuaFile {
            hybrid: false,
            duas: vec![record(true), record(false)],
        };
        let bits = fired(&[0, 1]);
        let first = classify_all(&file, &bits, None).unwrap();
        let second = classify_all(&file, &bits, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_hybrid_merge_settles_each_dua_once() {
        let file = DuaFile {
            hybrid: true,
            duas: vec![record(true), record(false)],
        };
        let index = DuaIndex {
            hybrid: true,
            offsets: vec![0, 4],
        };
        // Cell 1 recorded: the non-inferable DUA was directly observed.
        let cells = vec![0u32, 1];
        let bits = fired(&[0, 1]);

        let result = classify_all(&file, &bits, Some((&cells, &index))).unwrap();
        // Inferable settled by inference, non-inferable by its cell; the
        // direct observation upgrades what inference alone called possible.
        assert_eq!(result, vec![DuaCoverage::Covered, DuaCoverage::Covered]);

        let inference_only = classify_all(&file, &bits, None).unwrap();
        assert_eq!(
            inference_only,
            vec![DuaCoverage::Covered, DuaCoverage::Possible]
        );
    }

    #[test]
    fn test_index_mismatch_is_fatal() {
        let file = DuaFile {
            hybrid: true,
            duas: vec![record(false)],
        };
        let index = DuaIndex {
            hybrid: true,
            offsets: Vec::new(),
        };
        let err = classify_all(&file, &fired(&[]), Some((&[], &index))).unwrap_err();
        assert!(matches!(err, crate::Error::Inconsistent { .. }));
    }
}
