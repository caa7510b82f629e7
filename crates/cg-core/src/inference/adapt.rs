//! Warm-up adaptation: dual-averaging step size and a windowed diagonal
//! mass matrix.

/// Dual-averaging constants.
const GAMMA: f64 = 0.05;
const T0: f64 = 10.0;
const KAPPA: f64 = 0.75;

/// Window layout defaults for warm-up runs long enough to use them.
const INIT_BUFFER: usize = 75;
const TERM_BUFFER: usize = 50;
const BASE_WINDOW: usize = 25;
/// Shorter warm-ups adapt the step size only.
const MIN_WINDOWED_WARMUP: usize = 20;

/// Nesterov dual averaging of `log(step_size)` toward a target acceptance.
#[derive(Debug, Clone)]
pub struct DualAveraging {
    target: f64,
    mu: f64,
    log_eps: f64,
    log_eps_bar: f64,
    h_bar: f64,
    t: usize,
}

impl DualAveraging {
    pub fn new(initial_step: f64, target: f64) -> Self {
        let mut da = DualAveraging {
            target,
            mu: 0.0,
            log_eps: 0.0,
            log_eps_bar: 0.0,
            h_bar: 0.0,
            t: 0,
        };
        da.restart(initial_step);
        da
    }

    /// Forget the history and centre on a new step size.
    pub fn restart(&mut self, step: f64) {
        self.mu = (10.0 * step).ln();
        self.log_eps = step.ln();
        self.log_eps_bar = 0.0;
        self.h_bar = 0.0;
        self.t = 0;
    }

    pub fn update(&mut self, accept_prob: f64) {
        let accept = if accept_prob.is_finite() {
            accept_prob.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.t += 1;
        let t = self.t as f64;
        let eta = 1.0 / (t + T0);
        self.h_bar = (1.0 - eta) * self.h_bar + eta * (self.target - accept);
        self.log_eps = self.mu - t.sqrt() / GAMMA * self.h_bar;
        let w = t.powf(-KAPPA);
        self.log_eps_bar = w * self.log_eps + (1.0 - w) * self.log_eps_bar;
    }

    /// Step size to use for the next warm-up iteration.
    pub fn step_size(&self) -> f64 {
        self.log_eps.exp()
    }

    /// Averaged step size used after warm-up.
    pub fn adapted_step_size(&self) -> f64 {
        if self.t == 0 {
            self.step_size()
        } else {
            self.log_eps_bar.exp()
        }
    }
}

/// Running per-coordinate variance.
#[derive(Debug, Clone)]
pub struct Welford {
    n: usize,
    mean: Vec<f64>,
    m2: Vec<f64>,
}

impl Welford {
    pub fn new(dim: usize) -> Self {
        Welford {
            n: 0,
            mean: vec![0.0; dim],
            m2: vec![0.0; dim],
        }
    }

    pub fn add(&mut self, x: &[f64]) {
        self.n += 1;
        let n = self.n as f64;
        for ((m, s), v) in self.mean.iter_mut().zip(&mut self.m2).zip(x) {
            let delta = v - *m;
            *m += delta / n;
            *s += delta * (v - *m);
        }
    }

    pub fn count(&self) -> usize {
        self.n
    }

    /// Sample variance shrunk toward `1e-3`.
    pub fn regularized_variance(&self) -> Vec<f64> {
        let n = self.n as f64;
        self.m2
            .iter()
            .map(|s| {
                let var = if self.n > 1 { s / (n - 1.0) } else { 1.0 };
                (n / (n + 5.0)) * var + 1e-3 * (5.0 / (n + 5.0))
            })
            .collect()
    }

    pub fn reset(&mut self) {
        *self = Welford::new(self.mean.len());
    }
}

/// Iterations after which the mass matrix is re-estimated.
fn window_ends(n_warmup: usize) -> (usize, Vec<usize>) {
    if n_warmup < MIN_WINDOWED_WARMUP {
        return (n_warmup, Vec::new());
    }
    let (init, term, base) = if INIT_BUFFER + TERM_BUFFER + BASE_WINDOW > n_warmup {
        let init = (0.15 * n_warmup as f64) as usize;
        let term = (0.1 * n_warmup as f64) as usize;
        (init, term, n_warmup - init - term)
    } else {
        (INIT_BUFFER, TERM_BUFFER, BASE_WINDOW)
    };

    let last = n_warmup - term;
    let mut ends = Vec::new();
    let mut start = init;
    let mut size = base;
    while start < last {
        let mut end = start + size;
        if end + 2 * size > last {
            end = last;
        }
        ends.push(end);
        start = end;
        size *= 2;
    }
    (init, ends)
}

/// Step-size and mass-matrix adaptation over one warm-up phase.
#[derive(Debug, Clone)]
pub struct WindowedAdaptation {
    dual: DualAveraging,
    welford: Welford,
    inv_mass: Vec<f64>,
    window_start: usize,
    window_ends: Vec<usize>,
}

impl WindowedAdaptation {
    pub fn new(dim: usize, n_warmup: usize, target_accept: f64, initial_step: f64) -> Self {
        let (window_start, window_ends) = window_ends(n_warmup);
        WindowedAdaptation {
            dual: DualAveraging::new(initial_step, target_accept),
            welford: Welford::new(dim),
            inv_mass: vec![1.0; dim],
            window_start,
            window_ends,
        }
    }

    pub fn step_size(&self) -> f64 {
        self.dual.step_size()
    }

    pub fn adapted_step_size(&self) -> f64 {
        self.dual.adapted_step_size()
    }

    pub fn inv_mass(&self) -> &[f64] {
        &self.inv_mass
    }

    pub fn restart_step_size(&mut self, step: f64) {
        self.dual.restart(step);
    }

    /// Record warm-up iteration `iter`. Returns `true` when the mass matrix
    /// was just updated; the caller should then re-tune the step size.
    pub fn update(&mut self, iter: usize, q: &[f64], accept_prob: f64) -> bool {
        self.dual.update(accept_prob);
        let Some(&last) = self.window_ends.last() else {
            return false;
        };
        if iter < self.window_start || iter >= last {
            return false;
        }
        self.welford.add(q);
        if self.window_ends.contains(&(iter + 1)) && self.welford.count() > 1 {
            self.inv_mass = self.welford.regularized_variance();
            self.welford.reset();
            return true;
        }
        false
    }
}
