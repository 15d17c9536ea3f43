use super::candidate::Forest;

/// Final grouping of one halo, shaped like the friends-of-friends output: per-group counts
/// and list heads plus one particle-indexed link array shared by all groups.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubhaloTable {
    pub counts: Vec<usize>,
    pub heads: Vec<usize>,
    pub next: Vec<Option<usize>>,
    /// Forest candidate behind each subhalo.
    pub candidates: Vec<usize>,
    pub fuzz_count: usize,
    pub fuzz_head: Option<usize>,
}

impl SubhaloTable {
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn members(&self, subhalo: usize) -> impl Iterator<Item = usize> + '_ {
        self.chain(Some(self.heads[subhalo]))
    }

    pub fn fuzz_members(&self) -> impl Iterator<Item = usize> + '_ {
        self.chain(self.fuzz_head)
    }

    fn chain(&self, head: Option<usize>) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(head, move |&p| self.next[p])
    }

    /// Subhalo index of every particle, `None` for the fuzz.
    pub fn assignment(&self) -> Vec<Option<usize>> {
        let mut assignment = vec![None; self.next.len()];
        for subhalo in 0..self.len() {
            for p in self.members(subhalo) {
                assignment[p] = Some(subhalo);
            }
        }
        assignment
    }
}

/// Numbers the live leaves by descending size, largest first. Equal sizes keep the
/// order in which the candidates were created.
pub fn assemble(forest: &Forest) -> SubhaloTable {
    let mut chosen: Vec<(usize, usize)> = forest
        .live_leaves()
        .filter_map(|c| forest.candidates[c].first.map(|head| (c, head)))
        .collect();
    chosen.sort_by(|a, b| {
        forest.candidates[b.0]
            .count
            .cmp(&forest.candidates[a.0].count)
            .then(a.0.cmp(&b.0))
    });

    let fuzz = &forest.candidates[forest.fuzz()];
    SubhaloTable {
        counts: chosen.iter().map(|&(c, _)| forest.candidates[c].count).collect(),
        heads: chosen.iter().map(|&(_, head)| head).collect(),
        next: forest.next.clone(),
        candidates: chosen.iter().map(|&(c, _)| c).collect(),
        fuzz_count: fuzz.count,
        fuzz_head: fuzz.first,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subhalos_are_numbered_by_size() {
        let mut forest = Forest::new(10);
        let a = forest.create_leaf();
        let b = forest.create_leaf();
        let c = forest.create_leaf();
        forest.add(a, 0);
        for p in 1..5 {
            forest.add(b, p);
        }
        for p in 5..9 {
            forest.add(c, p);
        }
        let fuzz = forest.seal();
        forest.add(fuzz, 9);

        let table = assemble(&forest);
        assert_eq!(table.counts, vec![4, 4, 1]);
        assert_eq!(table.candidates, vec![b, c, a]);
        assert_eq!(table.fuzz_count, 1);
        assert_eq!(table.fuzz_members().collect::<Vec<_>>(), vec![9]);

        let mut second: Vec<usize> = table.members(1).collect();
        second.sort_unstable();
        assert_eq!(second, vec![5, 6, 7, 8]);

        let assignment = table.assignment();
        assert_eq!(assignment[0], Some(2));
        assert_eq!(assignment[9], None);

        assert_eq!(assemble(&forest), table);
    }
}
