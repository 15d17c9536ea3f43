use super::candidate::Forest;

/// Folds every undersized leaf into its partner, or into the fuzz when it has none.
/// Emptied leaves are retired so partner chains skip them. Returns the number of
/// candidates folded.
pub fn consolidate(forest: &mut Forest, min_candidate_size: usize) -> usize {
    let mut folded = 0;
    for candidate in 0..forest.len() {
        let c = &forest.candidates[candidate];
        if candidate == forest.fuzz() || c.is_merge() || c.dissolved {
            continue;
        }
        if c.count == 0 {
            forest.candidates[candidate].dissolved = true;
        } else if c.count < min_candidate_size {
            forest.dissolve(candidate);
            folded += 1;
        }
    }
    log::debug!(
        "consolidation folded {} candidates, fuzz holds {}",
        folded,
        forest.fuzz_count()
    );
    folded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_candidates_fold_into_partner_or_fuzz() {
        let mut forest = Forest::new(12);
        let big = forest.create_leaf();
        let small = forest.create_leaf();
        let lonely = forest.create_leaf();
        for p in 0..8 {
            forest.add(big, p);
        }
        forest.add(small, 8);
        forest.add(small, 9);
        forest.add(lonely, 10);
        forest.add(lonely, 11);
        forest.close(small, big);
        let fuzz = forest.seal();

        assert_eq!(consolidate(&mut forest, 5), 2);
        assert_eq!(forest.candidates[big].count, 10);
        assert_eq!(forest.candidates[small].count, 0);
        assert_eq!(forest.candidates[fuzz].count, 2);
        assert_eq!(forest.owner[10], Some(fuzz));
        assert_eq!(forest.live_leaves().collect::<Vec<_>>(), vec![big]);
    }

    #[test]
    fn folding_cascades_through_small_partners() {
        let mut forest = Forest::new(6);
        let a = forest.create_leaf();
        let b = forest.create_leaf();
        for p in 0..3 {
            forest.add(a, p);
        }
        for p in 3..6 {
            forest.add(b, p);
        }
        forest.close(a, b);
        let fuzz = forest.seal();

        // `a` lifts `b` to six members, which then survives a threshold of five.
        consolidate(&mut forest, 5);
        assert_eq!(forest.candidates[b].count, 6);
        assert_eq!(forest.candidates[fuzz].count, 0);

        let mut forest = Forest::new(4);
        let a = forest.create_leaf();
        let b = forest.create_leaf();
        forest.add(a, 0);
        forest.add(b, 1);
        forest.add(b, 2);
        forest.add(b, 3);
        forest.close(b, a);
        let fuzz = forest.seal();

        // `a` leaves first for the fuzz; `b` then skips the dissolved `a`.
        consolidate(&mut forest, 5);
        assert_eq!(forest.candidates[fuzz].count, 4);
        assert!(forest.owner.iter().all(|&o| o == Some(fuzz)));
    }
}
