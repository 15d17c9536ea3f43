use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use clap::Parser;
use nalgebra::Vector3;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use web_time::Instant;

use subhalo::dump::{debug_records, write_debug_records};
use subhalo::synthetic::SyntheticHalo;
use subhalo::{FinderReport, FinderSettings, Result, SubhaloError, SubhaloFinder};

#[derive(Parser, Debug)]
#[command(name = "subhalo")]
#[command(about = "Finds gravitationally bound substructure inside halos")]
struct Args {
    /// Particle CSV with header `halo,x,y,z,vx,vy,vz,mass,id`. Synthetic halos are generated
    /// when omitted.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Number of synthetic halos.
    #[arg(long, default_value_t = 4)]
    halos: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value_t = 1.0)]
    particle_mass: f64,

    #[arg(long, default_value_t = 1.0)]
    gravitational_constant: f64,

    #[arg(long, default_value_t = 1.0)]
    alpha: f64,

    #[arg(long, default_value_t = 0.0)]
    beta: f64,

    #[arg(long, default_value_t = 20)]
    min_size: usize,

    #[arg(long, default_value_t = 64)]
    sph_neighbors: usize,

    #[arg(long, default_value_t = 20)]
    close_neighbors: usize,

    /// Directory receiving one binary debug dump per halo.
    #[arg(long)]
    dump: Option<PathBuf>,
}

struct HaloSummary {
    label: i64,
    counts: Vec<usize>,
    fuzz: usize,
    report: FinderReport,
    seconds: f64,
}

/// Groups the rows of a particle CSV by halo label.
///
/// Assumes a header line followed by one particle per line.
fn load_halos(path: &Path) -> Result<BTreeMap<i64, SyntheticHalo<f64>>> {
    let reader = BufReader::new(File::open(path)?);
    let mut halos: BTreeMap<i64, SyntheticHalo<f64>> = BTreeMap::new();

    for (line_idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line_idx == 0 || line.trim().is_empty() {
            continue;
        }
        let parse_error = |message: String| SubhaloError::Parse {
            line: line_idx + 1,
            message,
        };
        let parts: Vec<&str> = line.trim().split(',').map(str::trim).collect();
        if parts.len() < 9 {
            return Err(parse_error(format!("expected 9 columns, found {}", parts.len())));
        }
        let halo: i64 = parts[0]
            .parse()
            .map_err(|e| parse_error(format!("halo label: {}", e)))?;
        let mut values = [0.0f64; 7];
        for (value, part) in values.iter_mut().zip(&parts[1..8]) {
            *value = part
                .parse()
                .map_err(|e| parse_error(format!("`{}`: {}", part, e)))?;
        }
        let id: i64 = parts[8]
            .parse()
            .map_err(|e| parse_error(format!("particle id: {}", e)))?;

        let target = halos.entry(halo).or_default();
        let index = target.add_particle(
            Vector3::new(values[0], values[1], values[2]),
            Vector3::new(values[3], values[4], values[5]),
            values[6],
        );
        target.id[index] = id;
    }
    Ok(halos)
}

/// A host clump with two satellites on their own orbits and a few fast interlopers.
fn generate_halos(count: usize, seed: u64, particle_mass: f64) -> BTreeMap<i64, SyntheticHalo<f64>> {
    (0..count)
        .map(|label| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(label as u64));
            let mut halo = SyntheticHalo::new();
            let zero = Vector3::zeros();
            halo.add_clump(&mut rng, zero, zero, 400, 10.0, 0.5, particle_mass);
            halo.add_clump(
                &mut rng,
                Vector3::new(6.0, 1.0, 0.0),
                Vector3::new(0.0, 1.5, 0.0),
                120,
                1.0,
                0.1,
                particle_mass,
            );
            halo.add_clump(
                &mut rng,
                Vector3::new(-3.0, -5.0, 2.0),
                Vector3::new(-1.0, 0.0, 0.5),
                80,
                0.8,
                0.1,
                particle_mass,
            );
            halo.add_clump(&mut rng, zero, zero, 10, 12.0, 40.0, particle_mass);
            (label as i64, halo)
        })
        .collect()
}

fn run_halo(
    label: i64,
    halo: &SyntheticHalo<f64>,
    settings: &FinderSettings<f64>,
    dump: Option<&Path>,
) -> Result<HaloSummary> {
    let start = Instant::now();
    let particles = halo.particles()?;
    let mut finder = SubhaloFinder::with_settings(settings.clone());
    finder.set_particles(particles);
    let table = finder.find_subhalos()?.clone();

    if let Some(dir) = dump {
        let path = dir.join(format!("halo_{}.bin", label));
        let mut writer = BufWriter::new(File::create(&path)?);
        write_debug_records(&mut writer, &debug_records(&particles, &table)?)?;
        log::debug!("wrote {}", path.display());
    }

    Ok(HaloSummary {
        label,
        counts: table.counts,
        fuzz: table.fuzz_count,
        report: finder.report().copied().unwrap_or_default(),
        seconds: start.elapsed().as_secs_f64(),
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut settings = FinderSettings::default();
    settings.configure(
        args.particle_mass,
        args.gravitational_constant,
        args.alpha,
        args.beta,
        args.min_size,
        args.sph_neighbors,
        args.close_neighbors,
    );
    settings.validate()?;

    let halos = match &args.input {
        Some(path) => load_halos(path)?,
        None => generate_halos(args.halos, args.seed, args.particle_mass),
    };
    if let Some(dir) = &args.dump {
        std::fs::create_dir_all(dir)?;
    }
    log::info!("processing {} halos", halos.len());

    let start = Instant::now();
    let results: Vec<Result<HaloSummary>> = halos
        .par_iter()
        .map(|(&label, halo)| run_halo(label, halo, &settings, args.dump.as_deref()))
        .collect();

    let mut failed = 0;
    for result in results {
        match result {
            Ok(summary) => {
                println!(
                    "halo {}: {} particles, {} subhalos {:?}, fuzz {}, {} merges, {} escaped ({:.3}s)",
                    summary.label,
                    summary.report.particles,
                    summary.counts.len(),
                    summary.counts,
                    summary.fuzz,
                    summary.report.build.merges,
                    summary.report.unbind.escaped,
                    summary.seconds
                );
            }
            Err(e) => {
                failed += 1;
                log::error!("{}", e);
            }
        }
    }
    println!(
        "{} halos in {:.3}s, {} failed",
        halos.len(),
        start.elapsed().as_secs_f64(),
        failed
    );
    Ok(())
}
