//! Weight formulas
//!
//! Pure functions of a request, the cycle index, the row's scalar value and
//! its atom count.

use fit_core::{Cycle, Result, WeightMethod, WeightRequest};

/// Weight of one row under `request`.
///
/// Composite requests multiply the weights of their terms. Any malformed
/// request fails before a single term is evaluated.
pub fn compute_weight(request: &WeightRequest, cycle: Cycle, value: f64, natoms: u32) -> Result<f64> {
    let terms = request.terms()?;
    Ok(product(&terms, cycle, value, natoms))
}

/// Product of already-validated terms
pub(crate) fn product(terms: &[(WeightMethod, Vec<f64>)], cycle: Cycle, value: f64, natoms: u32) -> f64 {
    terms
        .iter()
        .map(|(method, params)| evaluate(*method, params, cycle, value, natoms))
        .product()
}

/// Evaluate a single method.
///
/// `params` must already hold `method.param_count()` values.
fn evaluate(method: WeightMethod, params: &[f64], cycle: Cycle, value: f64, natoms: u32) -> f64 {
    let p = params;
    match method {
        WeightMethod::A => p[0],
        WeightMethod::B => {
            // Cycle 0 counts as cycle 1
            let effective = cycle.max(1) as f64;
            p[0] * effective.powf(p[1])
        }
        WeightMethod::C => p[0] * (p[1] * value.abs() / p[2]).exp(),
        WeightMethod::D => p[0] * (p[1] * (value.abs() - p[2]) / p[3]).exp(),
        WeightMethod::E => {
            // The exponent lives in slot 1 of the legacy parameter layout even
            // though the method takes one parameter; a single-parameter request
            // supplies it in slot 0.
            let exponent = *p.get(1).unwrap_or(&p[0]);
            (natoms as f64).powf(exponent)
        }
    }
}
