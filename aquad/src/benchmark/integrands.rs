//! Standard parametric integrands on `[0, 1]` with closed-form integrals.
use crate::integrand::Integrand;
use crate::params::ParamMap;

/// Numeric parameter with a fallback.
fn param(params: &ParamMap, name: &str, default: f64) -> f64 {
    params.get_f64(name).unwrap_or(default)
}

// Log over square root
/// `ln(t) / √t`. Singular at `t = 0` with exponent `1/2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOverSqrt;

impl LogOverSqrt {
    pub fn new() -> Self {
        Self
    }

    pub fn analytical_result(&self, _params: &ParamMap) -> f64 {
        -4.0
    }
}

impl Integrand for LogOverSqrt {
    fn eval(&self, _params: &ParamMap, t: f64) -> f64 {
        t.ln() / t.sqrt()
    }
}

// Power law
/// `z t^s` with parameters `s` (default 0) and `z` (default 1).
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerLaw;

impl PowerLaw {
    pub fn new() -> Self {
        Self
    }

    pub fn analytical_result(&self, params: &ParamMap) -> f64 {
        param(params, "z", 1.0) / (param(params, "s", 0.0) + 1.0)
    }
}

impl Integrand for PowerLaw {
    fn eval(&self, params: &ParamMap, t: f64) -> f64 {
        param(params, "z", 1.0) * t.powf(param(params, "s", 0.0))
    }
}

// Oscillatory
/// `cos(k t)` with parameter `k` (default 1).
#[derive(Debug, Clone, Copy, Default)]
pub struct Oscillatory;

impl Oscillatory {
    pub fn new() -> Self {
        Self
    }

    pub fn analytical_result(&self, params: &ParamMap) -> f64 {
        let k = param(params, "k", 1.0);
        if k == 0.0 {
            1.0
        } else {
            k.sin() / k
        }
    }
}

impl Integrand for Oscillatory {
    fn eval(&self, params: &ParamMap, t: f64) -> f64 {
        (param(params, "k", 1.0) * t).cos()
    }
}

// Exponential decay
/// `e^{-z t}` with parameter `z` (default 1).
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpDecay;

impl ExpDecay {
    pub fn new() -> Self {
        Self
    }

    pub fn analytical_result(&self, params: &ParamMap) -> f64 {
        let z = param(params, "z", 1.0);
        if z == 0.0 {
            1.0
        } else {
            -(-z).exp_m1() / z
        }
    }
}

impl Integrand for ExpDecay {
    fn eval(&self, params: &ParamMap, t: f64) -> f64 {
        (-param(params, "z", 1.0) * t).exp()
    }
}

// Endpoint singularity
/// `t^{-a}` with parameter `a` in `[0, 1)` (default 1/2).
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointSingularity;

impl EndpointSingularity {
    pub fn new() -> Self {
        Self
    }

    pub fn analytical_result(&self, params: &ParamMap) -> f64 {
        1.0 / (1.0 - param(params, "a", 0.5))
    }
}

impl Integrand for EndpointSingularity {
    fn eval(&self, params: &ParamMap, t: f64) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }
        t.powf(-param(params, "a", 0.5))
    }
}
