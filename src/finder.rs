use crate::density::{DensityEstimator, DensityField};
use crate::error::{Result, SubhaloError};
use crate::settings::FinderSettings;
use crate::shared::{Bounds, Float, HaloParticles};
use crate::subhalo::{
    BuildStats, SubhaloTable, SubstructureBuilder, UnbindStats, Unbinder, assemble, consolidate,
};
use crate::tree::Octree;

/// What happened inside one run, for logging and summaries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FinderReport {
    pub particles: usize,
    pub tree_nodes: usize,
    pub build: BuildStats,
    pub consolidated: usize,
    pub unbind: UnbindStats,
}

#[derive(Clone, Debug)]
struct Outcome<F: Float> {
    table: SubhaloTable,
    field: DensityField<F>,
    report: FinderReport,
}

/// Finds the gravitationally bound substructure of one halo at a time.
///
/// The finder borrows the particle arrays given to [`SubhaloFinder::set_particles`] and
/// keeps the results of the last [`SubhaloFinder::find_subhalos`] call until new particles
/// are bound. Getters return empty results before the first successful run.
#[derive(Clone, Debug)]
pub struct SubhaloFinder<'a, F: Float> {
    settings: FinderSettings<F>,
    particles: Option<HaloParticles<'a, F>>,
    outcome: Option<Outcome<F>>,
}

impl<F: Float> Default for SubhaloFinder<'_, F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, F: Float> SubhaloFinder<'a, F> {
    pub fn new() -> Self {
        Self::with_settings(FinderSettings::default())
    }

    pub fn with_settings(settings: FinderSettings<F>) -> Self {
        Self {
            settings,
            particles: None,
            outcome: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn configure(
        &mut self,
        particle_mass: F,
        gravitational_constant: F,
        alpha_factor: F,
        beta_factor: F,
        min_candidate_size: usize,
        sph_neighbor_count: usize,
        close_neighbor_count: usize,
    ) {
        self.settings.configure(
            particle_mass,
            gravitational_constant,
            alpha_factor,
            beta_factor,
            min_candidate_size,
            sph_neighbor_count,
            close_neighbor_count,
        );
    }

    pub fn settings(&self) -> &FinderSettings<F> {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut FinderSettings<F> {
        &mut self.settings
    }

    /// Binds the next halo. Results of a previous run are discarded.
    pub fn set_particles(&mut self, particles: HaloParticles<'a, F>) {
        self.particles = Some(particles);
        self.outcome = None;
    }

    pub fn find_subhalos(&mut self) -> Result<&SubhaloTable> {
        self.settings.validate()?;
        let particles = self.particles.ok_or(SubhaloError::NoParticles)?;
        let bounds = Bounds::from_points(&particles).ok_or(SubhaloError::EmptyHalo)?;
        let settings = &self.settings;

        let tree = Octree::build(bounds.padded_cube(), particles, settings.particle_mass)?;
        tree.log_tree();

        let estimator = DensityEstimator::new(&tree, settings);
        let field = estimator.estimate_all(settings.sph_neighbor_count);
        let mut forest = SubstructureBuilder::new(&estimator, &field, settings).run();
        let consolidated = consolidate(&mut forest, settings.min_candidate_size);
        let unbind = Unbinder::new(&particles, settings).run(&mut forest);
        let table = assemble(&forest);

        let report = FinderReport {
            particles: particles.len(),
            tree_nodes: tree.node_count(),
            build: forest.stats,
            consolidated,
            unbind,
        };
        log::info!(
            "found {} subhalos in {} particles, {} in fuzz",
            table.len(),
            particles.len(),
            table.fuzz_count
        );

        let outcome = self.outcome.insert(Outcome {
            table,
            field,
            report,
        });
        Ok(&outcome.table)
    }

    pub fn particles(&self) -> Option<&HaloParticles<'a, F>> {
        self.particles.as_ref()
    }

    pub fn table(&self) -> Option<&SubhaloTable> {
        self.outcome.as_ref().map(|o| &o.table)
    }

    pub fn report(&self) -> Option<&FinderReport> {
        self.outcome.as_ref().map(|o| &o.report)
    }

    pub fn number_of_subhalos(&self) -> usize {
        self.table().map_or(0, SubhaloTable::len)
    }

    /// Member count of each subhalo, largest first.
    pub fn subhalo_count(&self) -> &[usize] {
        self.table().map_or(&[], |t| &t.counts)
    }

    /// First member of each subhalo's list.
    pub fn subhalos(&self) -> &[usize] {
        self.table().map_or(&[], |t| &t.heads)
    }

    /// Particle-indexed successor links shared by every subhalo list and the fuzz.
    pub fn subhalo_list(&self) -> &[Option<usize>] {
        self.table().map_or(&[], |t| &t.next)
    }

    pub fn fuzz_count(&self) -> usize {
        self.table().map_or(0, |t| t.fuzz_count)
    }

    pub fn density(&self) -> &[F] {
        self.outcome.as_ref().map_or(&[], |o| &o.field.density)
    }

    pub fn smoothing_length(&self) -> &[F] {
        self.outcome.as_ref().map_or(&[], |o| &o.field.smoothing_length)
    }
}
