//! Synthetic relaxation phantoms.
//!
//! A phantom is an `nx × ny × nslc` grid with a central disc of "tissue"
//! whose parameters vary smoothly with position. Each tissue voxel gets one
//! noisy reading per acquisition value, generated with the same model
//! functions the fitter uses, so a phantom is a ground-truth fixture for the
//! whole pipeline.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{Datatype, GroupKey, Measurement};
use crate::error::AppError;
use crate::models::{t1, t2};

pub const T1_RANGE: (f64, f64) = (600.0, 1400.0);
pub const T2_RANGE: (f64, f64) = (30.0, 120.0);
pub const SI_RANGE: (f64, f64) = (800.0, 1200.0);
pub const PHANTOM_DELTA: f64 = 0.95;

/// Background readings are `|N(0, noise · BACKGROUND_NOISE_SCALE)|`.
const BACKGROUND_NOISE_SCALE: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct PhantomConfig {
    pub datatype: Datatype,
    pub nx: u32,
    pub ny: u32,
    pub nslc: u32,
    /// TI (T1) or TE (T2) values; ignored for maps.
    pub values: Vec<f64>,
    /// Repetition time, T1 only.
    pub tr: Option<f64>,
    /// Gaussian noise sigma added to every reading.
    pub noise: f64,
    pub seed: u64,
    /// Fraction of each slice left as background.
    pub background: f64,
}

impl PhantomConfig {
    pub fn new(datatype: Datatype) -> Self {
        Self {
            datatype,
            nx: 16,
            ny: 16,
            nslc: 2,
            values: default_values(datatype),
            tr: None,
            noise: 5.0,
            seed: 42,
            background: 0.25,
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.nx == 0 || self.ny == 0 || self.nslc == 0 {
            return Err(AppError::config("Phantom dimensions must be > 0."));
        }
        if !self.datatype.is_map() {
            if self.values.len() < 3 {
                return Err(AppError::config("Phantom needs at least 3 acquisition values."));
            }
            if self.values.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(AppError::config("Acquisition values must be finite and >= 0."));
            }
        }
        if self.tr.is_some_and(|tr| !tr.is_finite() || tr <= 0.0) {
            return Err(AppError::config("Repetition time must be finite and > 0."));
        }
        if !(self.noise.is_finite() && self.noise >= 0.0) {
            return Err(AppError::config("Noise sigma must be finite and >= 0."));
        }
        if !(self.background.is_finite() && (0.0..1.0).contains(&self.background)) {
            return Err(AppError::config("Background fraction must be in [0, 1)."));
        }
        Ok(())
    }
}

/// Acquisition values used when none are given.
pub fn default_values(datatype: Datatype) -> Vec<f64> {
    match datatype {
        Datatype::T1 => vec![50.0, 100.0, 200.0, 400.0, 800.0, 1600.0, 3200.0],
        Datatype::T2 => vec![10.0, 20.0, 40.0, 60.0, 80.0, 120.0, 160.0],
        Datatype::T1Map | Datatype::T2Map => Vec::new(),
    }
}

/// True tissue parameters of one voxel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tissue {
    pub t1: f64,
    pub t2: f64,
    pub si: f64,
    pub delta: f64,
}

#[derive(Debug, Clone)]
pub struct Phantom {
    /// Measurement tables by slice index.
    pub slices: BTreeMap<u32, Vec<Measurement>>,
    /// Ground truth for every tissue voxel.
    pub truth: BTreeMap<GroupKey, Tissue>,
}

impl Phantom {
    pub fn n_records(&self) -> usize {
        self.slices.values().map(Vec::len).sum()
    }
}

pub fn generate_phantom(config: &PhantomConfig) -> Result<Phantom, AppError> {
    config.validate()?;

    let mut rng = StdRng::seed_from_u64(phantom_seed(config));
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| AppError::numerical(format!("Noise distribution error: {e}")))?;

    let cx = (config.nx as f64 - 1.0) / 2.0;
    let cy = (config.ny as f64 - 1.0) / 2.0;
    let radius = ((1.0 - config.background) * (config.nx * config.ny) as f64 / std::f64::consts::PI).sqrt();

    let mut slices = BTreeMap::new();
    let mut truth = BTreeMap::new();

    for slc in 0..config.nslc {
        let mut records = Vec::new();
        for x in 0..config.nx {
            for y in 0..config.ny {
                let r = ((x as f64 - cx).powi(2) + (y as f64 - cy).powi(2)).sqrt();
                let tissue = (r <= radius).then(|| tissue_at(x, r / radius.max(1.0), config.nx));

                let base = Measurement::new(x, y, slc, 0.0).with_dims(config.nx, config.ny, config.nslc);
                if let Some(t) = tissue {
                    truth.insert(base.voxel_key(), t);
                }

                let mut noise = || normal.sample(&mut rng) * config.noise;
                match config.datatype {
                    Datatype::T1 => {
                        for &ti in &config.values {
                            let clean = tissue.map_or(0.0, |t| t1::signal(ti, t.t1, t.si, t.delta, config.tr));
                            let mut m = base.clone().with_ti(ti);
                            m.tr = config.tr;
                            m.data = reading(clean, tissue.is_some(), noise());
                            records.push(m);
                        }
                    }
                    Datatype::T2 => {
                        for &te in &config.values {
                            let clean = tissue.map_or(0.0, |t| t2::signal(te, t.t2, t.si));
                            let mut m = base.clone().with_te(te);
                            m.data = reading(clean, tissue.is_some(), noise());
                            records.push(m);
                        }
                    }
                    Datatype::T1Map | Datatype::T2Map => {
                        let mut m = base.clone();
                        m.data = match tissue {
                            Some(t) if config.datatype == Datatype::T1Map => t.t1 + noise(),
                            Some(t) => t.t2 + noise(),
                            None => 0.0,
                        };
                        records.push(m);
                    }
                }
            }
        }
        slices.insert(slc, records);
    }

    Ok(Phantom { slices, truth })
}

/// Magnitude reading; background carries half-strength noise only.
fn reading(clean: f64, tissue: bool, noise: f64) -> f64 {
    if tissue {
        (clean + noise).abs()
    } else {
        (noise * BACKGROUND_NOISE_SCALE).abs()
    }
}

/// Parameters rise from the disc centre (`u = 0`) to its rim (`u = 1`);
/// `Si` rises across x.
fn tissue_at(x: u32, u: f64, nx: u32) -> Tissue {
    let u = u.clamp(0.0, 1.0);
    let ux = if nx > 1 { x as f64 / (nx - 1) as f64 } else { 0.5 };
    Tissue {
        t1: lerp(T1_RANGE, u),
        t2: lerp(T2_RANGE, u),
        si: lerp(SI_RANGE, ux),
        delta: PHANTOM_DELTA,
    }
}

fn lerp((lo, hi): (f64, f64), u: f64) -> f64 {
    lo + (hi - lo) * u
}

fn phantom_seed(config: &PhantomConfig) -> u64 {
    let mut hasher = DefaultHasher::new();
    config.seed.hash(&mut hasher);
    config.datatype.name().hash(&mut hasher);
    hasher.finish()
}
