//! Train/test partitions over panel record ids.

use pedal_core::{HoldoutWindows, PanelRecord, PedalError, PedalResult, RecordId};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;

/// A train/test partition. Ids are sorted ascending in both halves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub label: String,
    pub train: Vec<RecordId>,
    pub test: Vec<RecordId>,
}

impl Split {
    /// Fails with a split violation if any id is on both sides.
    pub fn validate(&self) -> PedalResult<()> {
        let train: HashSet<RecordId> = self.train.iter().copied().collect();
        if let Some(shared) = self.test.iter().find(|id| train.contains(id)) {
            return Err(PedalError::SplitViolation(format!(
                "split '{}': record {shared} is in both train and test",
                self.label
            )));
        }
        Ok(())
    }
}

/// Contiguous-week holdout: records whose ISO week (year included) falls in
/// the training range train, those in the later test range test, everything
/// else is unused.
pub fn holdout_split<'a>(
    records: impl IntoIterator<Item = &'a PanelRecord>,
    windows: &HoldoutWindows,
) -> PedalResult<Split> {
    windows.validate()?;
    let mut train = Vec::new();
    let mut test = Vec::new();
    for record in records {
        let week = record.interval.week();
        if windows.contains_train(week) {
            train.push(record.id);
        } else if windows.contains_test(week) {
            test.push(record.id);
        }
    }
    train.sort_unstable();
    test.sort_unstable();
    let split = Split {
        label: "holdout".to_string(),
        train,
        test,
    };
    split.validate()?;
    Ok(split)
}

/// Assign `ids` to `k` folds: sort, shuffle with a seeded RNG, then cut into
/// contiguous slices whose sizes differ by at most one.
pub fn assign_folds(ids: &[RecordId], k: usize, seed: u64) -> PedalResult<Vec<Vec<RecordId>>> {
    if k < 2 {
        return Err(PedalError::SplitViolation(format!(
            "k-fold needs at least 2 folds (got {k})"
        )));
    }
    if ids.len() < k {
        return Err(PedalError::SplitViolation(format!(
            "cannot split {} records into {k} non-empty folds",
            ids.len()
        )));
    }
    let mut shuffled = ids.to_vec();
    shuffled.sort_unstable();
    let before = shuffled.len();
    shuffled.dedup();
    if shuffled.len() != before {
        return Err(PedalError::SplitViolation(
            "k-fold universe contains duplicate record ids".into(),
        ));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    shuffled.shuffle(&mut rng);

    let n = shuffled.len();
    let base = n / k;
    let remainder = n % k;
    let mut folds = Vec::with_capacity(k);
    let mut cursor = 0;
    for fold in 0..k {
        let size = base + usize::from(fold < remainder);
        let mut members = shuffled[cursor..cursor + size].to_vec();
        members.sort_unstable();
        folds.push(members);
        cursor += size;
    }
    Ok(folds)
}

/// Every id of `universe` must appear in exactly one fold, and nothing else.
pub fn validate_folds(folds: &[Vec<RecordId>], universe: &[RecordId]) -> PedalResult<()> {
    let expected: HashSet<RecordId> = universe.iter().copied().collect();
    let mut seen = HashSet::with_capacity(expected.len());
    for (index, fold) in folds.iter().enumerate() {
        for id in fold {
            if !expected.contains(id) {
                return Err(PedalError::SplitViolation(format!(
                    "fold {index} contains record {id} outside the eligible panel"
                )));
            }
            if !seen.insert(*id) {
                return Err(PedalError::SplitViolation(format!(
                    "record {id} assigned to more than one fold"
                )));
            }
        }
    }
    if seen.len() != expected.len() {
        return Err(PedalError::SplitViolation(format!(
            "folds cover {} of {} eligible records",
            seen.len(),
            expected.len()
        )));
    }
    Ok(())
}

/// K train/test splits, fold `i` held out in split `i`.
pub fn kfold_splits(universe: &[RecordId], k: usize, seed: u64) -> PedalResult<Vec<Split>> {
    let folds = assign_folds(universe, k, seed)?;
    validate_folds(&folds, universe)?;
    let splits = (0..k)
        .map(|held_out| {
            let mut train: Vec<RecordId> = folds
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != held_out)
                .flat_map(|(_, fold)| fold.iter().copied())
                .collect();
            train.sort_unstable();
            Split {
                label: format!("fold-{}", held_out + 1),
                train,
                test: folds[held_out].clone(),
            }
        })
        .collect::<Vec<_>>();
    for split in &splits {
        split.validate()?;
    }
    Ok(splits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<RecordId> {
        (0..n).map(RecordId).collect()
    }

    #[test]
    fn five_folds_of_twenty() {
        let universe = ids(100);
        let folds = assign_folds(&universe, 5, 42).unwrap();
        assert_eq!(folds.len(), 5);
        assert!(folds.iter().all(|f| f.len() == 20));
        validate_folds(&folds, &universe).unwrap();
        let mut union: Vec<RecordId> = folds.concat();
        union.sort_unstable();
        assert_eq!(union, universe);
    }

    #[test]
    fn assignment_is_seed_deterministic() {
        let universe = ids(57);
        let a = assign_folds(&universe, 4, 7).unwrap();
        let b = assign_folds(&universe, 4, 7).unwrap();
        let c = assign_folds(&universe, 4, 8).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        // remainder spread over the first folds
        let sizes: Vec<usize> = a.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![15, 14, 14, 14]);
    }

    #[test]
    fn overlapping_folds_rejected() {
        let universe = ids(4);
        let folds = vec![vec![RecordId(0), RecordId(1)], vec![RecordId(1), RecordId(2), RecordId(3)]];
        assert!(matches!(
            validate_folds(&folds, &universe),
            Err(PedalError::SplitViolation(_))
        ));
        let partial = vec![vec![RecordId(0)], vec![RecordId(1)]];
        assert!(validate_folds(&partial, &universe).is_err());
    }

    #[test]
    fn kfold_splits_hold_out_each_fold_once() {
        let universe = ids(23);
        let splits = kfold_splits(&universe, 5, 1).unwrap();
        let mut held_out: Vec<RecordId> = splits.iter().flat_map(|s| s.test.clone()).collect();
        held_out.sort_unstable();
        assert_eq!(held_out, universe);
        for split in &splits {
            assert_eq!(split.train.len() + split.test.len(), 23);
        }
    }

    #[test]
    fn too_few_records_rejected() {
        assert!(kfold_splits(&ids(3), 5, 1).is_err());
        assert!(assign_folds(&ids(10), 1, 1).is_err());
    }
}
