//! Per-group fit strategies.
//!
//! A `FitStrategy` is resolved once from the datatype. Every strategy turns the
//! records of one group into a `GroupEstimate`:
//!
//! - `T1` / `T2`: average replicates per acquisition value to seed the model,
//!   then run Levenberg–Marquardt against *all* replicate readings
//! - `Map`: average the valid readings

use log::debug;

use crate::domain::{Datatype, FitParam, GroupEstimate, Measurement, ParamName, ParamSet};
use crate::error::AppError;
use crate::fit::grouping::distinct_values;
use crate::fit::map::map_estimate;
use crate::math::{Bound, LmOptions, LmReport, levenberg_marquardt};
use crate::models::{t1, t2};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStrategy {
    T1,
    T2,
    Map(ParamName),
}

impl FitStrategy {
    pub fn for_datatype(datatype: Datatype) -> Self {
        match datatype {
            Datatype::T1 => FitStrategy::T1,
            Datatype::T2 => FitStrategy::T2,
            Datatype::T1Map | Datatype::T2Map => FitStrategy::Map(datatype.primary_param()),
        }
    }

    pub fn fit_group(&self, records: &[&Measurement]) -> Result<GroupEstimate, AppError> {
        self.fit_group_with(records, &LmOptions::default())
    }

    /// `fit_group` with explicit solver settings.
    pub fn fit_group_with(&self, records: &[&Measurement], opts: &LmOptions) -> Result<GroupEstimate, AppError> {
        match self {
            FitStrategy::T1 => fit_t1(records, opts).map(GroupEstimate::Fitted),
            FitStrategy::T2 => fit_t2(records, opts).map(GroupEstimate::Fitted),
            FitStrategy::Map(name) => Ok(map_estimate(records, *name)),
        }
    }
}

/// Mean signal per distinct x-value, ascending in x.
pub fn mean_curve(x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let xs = distinct_values(x.iter().copied());
    let means = xs
        .iter()
        .map(|&xv| {
            let (sum, n) = x
                .iter()
                .zip(y)
                .filter(|(xi, _)| **xi == xv)
                .fold((0.0, 0usize), |(s, n), (_, yi)| (s + yi, n + 1));
            sum / n as f64
        })
        .collect();
    (xs, means)
}

/// `(x, signal)` pairs with a finite signal and a known x.
fn curve_points(records: &[&Measurement], x_of: impl Fn(&Measurement) -> Option<f64>) -> (Vec<f64>, Vec<f64>) {
    records
        .iter()
        .filter(|r| !r.data.is_nan())
        .filter_map(|r| x_of(r).map(|x| (x, r.data)))
        .unzip()
}

/// Shortest finite repetition time in the group, if any.
fn group_tr(records: &[&Measurement]) -> Option<f64> {
    records
        .iter()
        .filter_map(|r| r.tr)
        .filter(|v| v.is_finite())
        .reduce(f64::min)
}

fn fit_t1(records: &[&Measurement], opts: &LmOptions) -> Result<ParamSet, AppError> {
    let (ti, data) = curve_points(records, |r| r.ti);
    let tr = group_tr(records);

    let (mean_ti, mean_data) = mean_curve(&ti, &data);
    let seed = t1::initial_guess(&mean_ti, &mean_data, tr)?;
    debug!("T1 seed: T1={:.3} Si={:.3} delta={:.3} tr={tr:?}", seed.t1, seed.si, seed.delta);

    let report = levenberg_marquardt(
        |p| {
            ti.iter()
                .zip(&data)
                .map(|(&t, &d)| t1::signal(t, p[0], p[1], p[2], tr) - d)
                .collect()
        },
        &[seed.t1, seed.si, seed.delta],
        &[Bound::NON_NEGATIVE, Bound::NON_NEGATIVE, Bound::UNIT],
        opts,
    )?;
    debug!("T1 solver: {:?} after {} iterations", report.status, report.iterations);

    Ok(param_set(
        &report,
        &[
            (ParamName::T1, seed.t1),
            (ParamName::Si, seed.si),
            (ParamName::Delta, seed.delta),
        ],
    ))
}

fn fit_t2(records: &[&Measurement], opts: &LmOptions) -> Result<ParamSet, AppError> {
    let (te, data) = curve_points(records, |r| r.te);

    let (mean_te, mean_data) = mean_curve(&te, &data);
    let seed = t2::initial_guess(&mean_te, &mean_data)?;
    debug!("T2 seed: T2={:.3} Si={:.3}", seed.t2, seed.si);

    let report = levenberg_marquardt(
        |p| {
            te.iter()
                .zip(&data)
                .map(|(&t, &d)| t2::signal(t, p[0], p[1]) - d)
                .collect()
        },
        &[seed.t2, seed.si],
        &[Bound::NON_NEGATIVE, Bound::NON_NEGATIVE],
        opts,
    )?;
    debug!("T2 solver: {:?} after {} iterations", report.status, report.iterations);

    Ok(param_set(&report, &[(ParamName::T2, seed.t2), (ParamName::Si, seed.si)]))
}

/// Package a solver report; `seeds` lists parameters in solver order.
fn param_set(report: &LmReport, seeds: &[(ParamName, f64)]) -> ParamSet {
    let params: Vec<(ParamName, FitParam)> = seeds
        .iter()
        .enumerate()
        .map(|(i, &(name, init))| {
            (
                name,
                FitParam {
                    value: report.params[i],
                    stderr: report.stderr[i],
                    init,
                },
            )
        })
        .collect();

    let si = params
        .iter()
        .find(|(n, _)| *n == ParamName::Si)
        .map_or(f64::NAN, |(_, p)| p.value);

    ParamSet {
        params,
        norm_redchi: report.redchi / (si * si),
        chisqr: report.chisqr,
        redchi: report.redchi,
        converged: report.converged(),
        iterations: report.iterations,
    }
}
