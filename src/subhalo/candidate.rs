use crate::shared::{Float, lit};

/// A growing or closed group of particles. Leaves own particles; a merge candidate only
/// joins two branches and never holds particles itself.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    /// Head of the membership list threaded through [`Forest::next`].
    pub first: Option<usize>,
    /// Root of the merge tree this candidate belongs to.
    pub top: usize,
    /// Where new or expelled members go once this candidate is closed.
    pub partner: Option<usize>,
    pub cut: bool,
    /// Emptied by consolidation or unbinding; skipped when resolving partners.
    pub dissolved: bool,
    pub parent: Option<usize>,
    pub child1: Option<usize>,
    pub child2: Option<usize>,
    pub count: usize,
    pub total_count: usize,
}

impl Candidate {
    fn new(index: usize) -> Self {
        Self {
            first: None,
            top: index,
            partner: None,
            cut: false,
            dissolved: false,
            parent: None,
            child1: None,
            child2: None,
            count: 0,
            total_count: 0,
        }
    }

    pub fn is_merge(&self) -> bool {
        self.child1.is_some()
    }

    pub fn children(&self) -> impl Iterator<Item = usize> {
        self.child1.into_iter().chain(self.child2)
    }
}

/// The candidate forest of one halo together with the particle-indexed owner and
/// membership-link arrays.
#[derive(Clone, Debug)]
pub struct Forest {
    pub candidates: Vec<Candidate>,
    pub owner: Vec<Option<usize>>,
    pub next: Vec<Option<usize>>,
    pub(crate) fuzz: usize,
    pub stats: BuildStats,
}

/// Counters of the decisions taken while growing the forest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub created: usize,
    pub joined: usize,
    pub cuts: usize,
    pub merges: usize,
    pub absorbs: usize,
}

impl Forest {
    pub(crate) fn new(particle_count: usize) -> Self {
        Self {
            candidates: Vec::new(),
            owner: vec![None; particle_count],
            next: vec![None; particle_count],
            fuzz: usize::MAX,
            stats: BuildStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn fuzz(&self) -> usize {
        self.fuzz
    }

    pub fn fuzz_count(&self) -> usize {
        self.candidates.get(self.fuzz).map_or(0, |c| c.count)
    }

    pub(crate) fn create_leaf(&mut self) -> usize {
        let index = self.candidates.len();
        self.candidates.push(Candidate::new(index));
        index
    }

    /// Appends the catch-all candidate for unassigned particles. Called once, after the sweep.
    pub(crate) fn seal(&mut self) -> usize {
        self.fuzz = self.create_leaf();
        self.fuzz
    }

    /// Joins two merge-tree roots under a fresh parent, which becomes the top of both.
    pub(crate) fn create_merge(&mut self, top1: usize, top2: usize) -> usize {
        let index = self.candidates.len();
        let mut merged = Candidate::new(index);
        merged.child1 = Some(top1);
        merged.child2 = Some(top2);
        merged.total_count = self.candidates[top1].total_count + self.candidates[top2].total_count;
        self.candidates.push(merged);
        self.candidates[top1].parent = Some(index);
        self.candidates[top2].parent = Some(index);

        let mut stack = vec![top1, top2];
        while let Some(c) = stack.pop() {
            self.candidates[c].top = index;
            stack.extend(self.candidates[c].children());
        }
        index
    }

    pub fn members(&self, candidate: usize) -> Members<'_> {
        Members {
            next: &self.next,
            current: self.candidates[candidate].first,
        }
    }

    pub(crate) fn add(&mut self, candidate: usize, particle: usize) {
        let c = &mut self.candidates[candidate];
        self.next[particle] = c.first;
        c.first = Some(particle);
        c.count += 1;
        self.owner[particle] = Some(candidate);
        self.grow_totals(candidate, 1);
    }

    /// Moves every member of `from` to the front of `to`'s list.
    pub(crate) fn transfer(&mut self, from: usize, to: usize) -> usize {
        if from == to {
            return 0;
        }
        let Some(head) = self.candidates[from].first else {
            return 0;
        };
        let mut tail = head;
        let mut moved = 0;
        let mut current = Some(head);
        while let Some(p) = current {
            self.owner[p] = Some(to);
            tail = p;
            moved += 1;
            current = self.next[p];
        }
        self.next[tail] = self.candidates[to].first;
        self.candidates[to].first = Some(head);
        self.candidates[to].count += moved;
        self.candidates[from].first = None;
        self.candidates[from].count = 0;
        self.shrink_totals(from, moved);
        self.grow_totals(to, moved);
        moved
    }

    /// Rebuilds the membership list of `candidate` from `keep`. Dropped particles keep a
    /// stale owner until they are added elsewhere.
    pub(crate) fn replace_members(&mut self, candidate: usize, keep: &[usize]) {
        let mut head = None;
        for &p in keep.iter().rev() {
            self.next[p] = head;
            head = Some(p);
        }
        let old = self.candidates[candidate].count;
        self.candidates[candidate].first = head;
        self.candidates[candidate].count = keep.len();
        if old > keep.len() {
            self.shrink_totals(candidate, old - keep.len());
        } else {
            self.grow_totals(candidate, keep.len() - old);
        }
    }

    fn grow_totals(&mut self, candidate: usize, amount: usize) {
        let mut current = Some(candidate);
        while let Some(c) = current {
            self.candidates[c].total_count += amount;
            current = self.candidates[c].parent;
        }
    }

    fn shrink_totals(&mut self, candidate: usize, amount: usize) {
        let mut current = Some(candidate);
        while let Some(c) = current {
            let total = &mut self.candidates[c].total_count;
            *total = total.saturating_sub(amount);
            current = self.candidates[c].parent;
        }
    }

    /// Closes `candidate` and redirects it to the open end of `toward`'s partner chain.
    /// Refuses when that chain leads back to `candidate`.
    pub(crate) fn close(&mut self, candidate: usize, toward: usize) -> bool {
        let target = self.resolve_open(toward);
        if target == candidate {
            return false;
        }
        let c = &mut self.candidates[candidate];
        c.cut = true;
        c.partner = Some(target);
        self.stats.cuts += 1;
        true
    }

    /// Follows partners from `candidate` until one that still accepts members, compressing
    /// the walked chain onto it.
    pub(crate) fn resolve_open(&mut self, candidate: usize) -> usize {
        let mut root = candidate;
        while self.candidates[root].cut {
            match self.candidates[root].partner {
                Some(partner) => root = partner,
                None => break,
            }
        }

        let mut current = candidate;
        while current != root {
            let next = self.candidates[current].partner;
            self.candidates[current].partner = Some(root);
            match next {
                Some(next) => current = next,
                None => break,
            }
        }
        root
    }

    /// Live destination for members leaving `candidate`: its nearest partner that has not
    /// been dissolved, or the fuzz.
    pub(crate) fn fold_target(&self, candidate: usize) -> usize {
        let mut next = self.candidates[candidate].partner;
        // Partner chains are acyclic, so the walk never needs more steps than candidates.
        for _ in 0..self.candidates.len() {
            match next {
                Some(t) if t != candidate && !self.candidates[t].dissolved => return t,
                Some(t) => next = self.candidates[t].partner,
                None => break,
            }
        }
        self.fuzz
    }

    /// Hands every member of `candidate` to its fold target and retires it.
    pub(crate) fn dissolve(&mut self, candidate: usize) -> usize {
        let target = self.fold_target(candidate);
        let moved = self.transfer(candidate, target);
        self.candidates[candidate].dissolved = true;
        log::trace!(
            "candidate {} dissolved into {} ({} particles)",
            candidate,
            target,
            moved
        );
        moved
    }

    pub fn average_density<F: Float>(&self, candidate: usize, density: &[F]) -> F {
        let (sum, count) = self
            .members(candidate)
            .fold((F::zero(), 0usize), |(sum, count), p| (sum + density[p], count + 1));
        if count == 0 {
            F::zero()
        } else {
            sum / lit::<F>(count as f64)
        }
    }

    /// Leaf candidates still holding particles, fuzz excluded.
    pub fn live_leaves(&self) -> impl Iterator<Item = usize> + '_ {
        self.candidates
            .iter()
            .enumerate()
            .filter(move |&(i, c)| i != self.fuzz && !c.is_merge() && !c.dissolved && c.count > 0)
            .map(|(i, _)| i)
    }
}

pub struct Members<'f> {
    next: &'f [Option<usize>],
    current: Option<usize>,
}

impl Iterator for Members<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        let p = self.current?;
        self.current = self.next[p];
        Some(p)
    }
}
