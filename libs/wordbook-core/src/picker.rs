//! Policies for promoting not-yet-started entries into the review rotation.

use std::cmp::Ordering;
use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::types::{ReviewPolicy, WordBookEntry};

/// Choose up to `count` entries according to `policy`.
///
/// `frequencies` maps word ids to their frequency rank score; words without a
/// score count as frequency 0. Ties are broken by entry id so results are
/// reproducible.
pub fn pick<R: Rng + ?Sized>(
    policy: ReviewPolicy,
    mut entries: Vec<WordBookEntry>,
    count: usize,
    frequencies: &HashMap<String, i64>,
    rng: &mut R,
) -> Vec<WordBookEntry> {
    match policy {
        ReviewPolicy::None => Vec::new(),
        ReviewPolicy::Random => {
            if entries.len() <= count {
                return entries;
            }
            entries.sort_by(|a, b| a.id.cmp(&b.id));
            entries.choose_multiple(rng, count).cloned().collect()
        }
        ReviewPolicy::MostFrequent => {
            let frequency = |entry: &WordBookEntry| {
                frequencies.get(&entry.word_id).copied().unwrap_or(0)
            };
            entries.sort_by(|a, b| match frequency(b).cmp(&frequency(a)) {
                Ordering::Equal => a.id.cmp(&b.id),
                other => other,
            });
            entries.truncate(count);
            entries
        }
        ReviewPolicy::FirstCome => {
            entries.sort_by(|a, b| a.update_time.cmp(&b.update_time).then_with(|| a.id.cmp(&b.id)));
            entries.truncate(count);
            entries
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    fn entries() -> Vec<WordBookEntry> {
        vec![
            WordBookEntry::new("e3", "w3", 300),
            WordBookEntry::new("e1", "w1", 100),
            WordBookEntry::new("e2", "w2", 100),
            WordBookEntry::new("e4", "w4", 50),
        ]
    }

    fn ids(entries: &[WordBookEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn none_picks_nothing() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let picked = pick(ReviewPolicy::None, entries(), 3, &HashMap::new(), &mut rng);
        assert!(picked.is_empty());
    }

    #[test]
    fn random_returns_all_when_short() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let picked = pick(ReviewPolicy::Random, entries(), 10, &HashMap::new(), &mut rng);
        assert_eq!(picked.len(), 4);
    }

    #[test]
    fn random_samples_without_replacement() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let picked = pick(ReviewPolicy::Random, entries(), 3, &HashMap::new(), &mut rng);
        let unique: HashSet<_> = picked.iter().map(|e| e.id.clone()).collect();
        assert_eq!(picked.len(), 3);
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn random_is_reproducible_with_same_seed() {
        let a = pick(
            ReviewPolicy::Random,
            entries(),
            2,
            &HashMap::new(),
            &mut ChaCha8Rng::seed_from_u64(11),
        );
        let b = pick(
            ReviewPolicy::Random,
            entries(),
            2,
            &HashMap::new(),
            &mut ChaCha8Rng::seed_from_u64(11),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn most_frequent_sorts_missing_last() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let frequencies = HashMap::from([
            ("w1".to_string(), 10),
            ("w3".to_string(), 50),
            ("w4".to_string(), 10),
        ]);
        let picked = pick(ReviewPolicy::MostFrequent, entries(), 4, &frequencies, &mut rng);
        assert_eq!(ids(&picked), vec!["e3", "e1", "e4", "e2"]);
    }

    #[test]
    fn most_frequent_takes_count() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let frequencies = HashMap::from([("w2".to_string(), 3)]);
        let picked = pick(ReviewPolicy::MostFrequent, entries(), 2, &frequencies, &mut rng);
        assert_eq!(ids(&picked), vec!["e2", "e1"]);
    }

    #[test]
    fn first_come_is_oldest_first() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let picked = pick(ReviewPolicy::FirstCome, entries(), 3, &HashMap::new(), &mut rng);
        assert_eq!(ids(&picked), vec!["e4", "e1", "e2"]);
    }
}
