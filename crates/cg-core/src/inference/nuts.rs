//! Multinomial No-U-Turn sampler with a diagonal mass matrix.
//!
//! One chain at a time: [`run_chain`] initialises, warms up with
//! [`WindowedAdaptation`], and records the post-warm-up draws together with
//! per-transition statistics.

use cg_common::{Error, Result};
use cg_math::log_add_exp;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};

use super::adapt::WindowedAdaptation;
use super::engine::SamplerSettings;
use super::LogDensity;

/// Energy error beyond which a trajectory counts as divergent.
const DIVERGENCE_THRESHOLD: f64 = 1000.0;

/// Initial points tried before giving up.
pub const MAX_INIT_ATTEMPTS: usize = 100;

/// Half-width of the uniform initial jitter around zero.
const INIT_RADIUS: f64 = 1.0;

/// Position, momentum, potential `-log p(q)` and its gradient.
#[derive(Debug, Clone)]
struct State {
    q: Vec<f64>,
    p: Vec<f64>,
    potential: f64,
    grad: Vec<f64>,
}

/// Leapfrog integrator for one step size and mass matrix.
struct Integrator<'a> {
    model: &'a dyn LogDensity,
    inv_mass: &'a [f64],
    step_size: f64,
}

/// Potential and its gradient at `q`; infinite potential where undefined.
fn potential(model: &dyn LogDensity, q: &[f64]) -> (f64, Vec<f64>) {
    let mut grad = vec![0.0; q.len()];
    let lp = model.log_density_and_gradient(q, &mut grad);
    if !lp.is_finite() {
        return (f64::INFINITY, grad);
    }
    grad.iter_mut().for_each(|g| *g = -*g);
    (-lp, grad)
}

impl Integrator<'_> {
    fn kinetic(&self, p: &[f64]) -> f64 {
        0.5 * p
            .iter()
            .zip(self.inv_mass)
            .map(|(p, m)| p * p * m)
            .sum::<f64>()
    }

    fn hamiltonian(&self, s: &State) -> f64 {
        s.potential + self.kinetic(&s.p)
    }

    fn step(&self, s: &State, direction: f64) -> State {
        let eps = direction * self.step_size;
        let p_half: Vec<f64> = s
            .p
            .iter()
            .zip(&s.grad)
            .map(|(p, g)| p - 0.5 * eps * g)
            .collect();
        let q: Vec<f64> = s
            .q
            .iter()
            .zip(&p_half)
            .zip(self.inv_mass)
            .map(|((q, p), m)| q + eps * m * p)
            .collect();
        let (potential, grad) = potential(self.model, &q);
        let p = if potential.is_finite() {
            p_half
                .iter()
                .zip(&grad)
                .map(|(p, g)| p - 0.5 * eps * g)
                .collect()
        } else {
            p_half
        };
        State {
            q,
            p,
            potential,
            grad,
        }
    }
}

/// A subtree of the trajectory.
struct Tree {
    left: State,
    right: State,
    proposal: State,
    log_sum_weight: f64,
    n_leapfrog: usize,
    sum_accept_prob: f64,
    divergent: bool,
    turning: bool,
}

fn is_turning(left: &State, right: &State, inv_mass: &[f64]) -> bool {
    let mut dot_left = 0.0;
    let mut dot_right = 0.0;
    for i in 0..left.q.len() {
        let dq = right.q[i] - left.q[i];
        dot_left += dq * left.p[i] * inv_mass[i];
        dot_right += dq * right.p[i] * inv_mass[i];
    }
    dot_left < 0.0 || dot_right < 0.0
}

fn build_leaf(integrator: &Integrator<'_>, from: &State, direction: f64, h0: f64) -> Tree {
    let state = integrator.step(from, direction);
    let h = integrator.hamiltonian(&state);
    let energy_error = if h.is_nan() { f64::INFINITY } else { h - h0 };
    let divergent = energy_error.abs() > DIVERGENCE_THRESHOLD || !energy_error.is_finite();
    let log_weight = if divergent {
        f64::NEG_INFINITY
    } else {
        -energy_error
    };
    Tree {
        left: state.clone(),
        right: state.clone(),
        proposal: state,
        log_sum_weight: log_weight,
        n_leapfrog: 1,
        sum_accept_prob: (-energy_error).exp().min(1.0),
        divergent,
        turning: false,
    }
}

/// Merge `outer` (built further along `direction`) into `tree`.
fn merge<R: Rng>(tree: &mut Tree, outer: Tree, direction: f64, inv_mass: &[f64], rng: &mut R, biased: bool) {
    let combined = log_add_exp(tree.log_sum_weight, outer.log_sum_weight);
    // The top level prefers the new subtree; inner merges are uniform over
    // the combined weight.
    let accept = if biased {
        (outer.log_sum_weight - tree.log_sum_weight).exp().min(1.0)
    } else {
        (outer.log_sum_weight - combined).exp()
    };
    if rng.random::<f64>() < accept {
        tree.proposal = outer.proposal;
    }
    tree.log_sum_weight = combined;
    tree.n_leapfrog += outer.n_leapfrog;
    tree.sum_accept_prob += outer.sum_accept_prob;
    tree.divergent |= outer.divergent;
    tree.turning |= outer.turning;
    if direction > 0.0 {
        tree.right = outer.right;
    } else {
        tree.left = outer.left;
    }
    tree.turning |= is_turning(&tree.left, &tree.right, inv_mass);
}

fn build_tree<R: Rng>(
    integrator: &Integrator<'_>,
    from: &State,
    depth: usize,
    direction: f64,
    h0: f64,
    rng: &mut R,
) -> Tree {
    if depth == 0 {
        return build_leaf(integrator, from, direction, h0);
    }
    let mut inner = build_tree(integrator, from, depth - 1, direction, h0, rng);
    if inner.divergent || inner.turning {
        return inner;
    }
    let edge = if direction > 0.0 {
        inner.right.clone()
    } else {
        inner.left.clone()
    };
    let outer = build_tree(integrator, &edge, depth - 1, direction, h0, rng);
    merge(&mut inner, outer, direction, integrator.inv_mass, rng, false);
    inner
}

/// Statistics of one transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionStats {
    pub diverging: bool,
    pub acceptance_rate: f64,
    pub step_size: f64,
    pub tree_depth: usize,
    pub n_steps: usize,
    pub energy: f64,
    pub lp: f64,
}

struct Transition {
    state: State,
    stats: TransitionStats,
}

fn transition<R: Rng>(
    integrator: &Integrator<'_>,
    current: &State,
    max_treedepth: usize,
    rng: &mut R,
) -> Transition {
    let mut start = current.clone();
    for (p, m) in start.p.iter_mut().zip(integrator.inv_mass) {
        let z: f64 = StandardNormal.sample(rng);
        *p = z / m.sqrt();
    }
    let h0 = integrator.hamiltonian(&start);

    let mut tree = Tree {
        left: start.clone(),
        right: start.clone(),
        proposal: start,
        log_sum_weight: 0.0,
        n_leapfrog: 0,
        sum_accept_prob: 0.0,
        divergent: false,
        turning: false,
    };

    let mut depth = 0;
    while depth < max_treedepth {
        let direction = if rng.random::<bool>() { 1.0 } else { -1.0 };
        let edge = if direction > 0.0 {
            tree.right.clone()
        } else {
            tree.left.clone()
        };
        let subtree = build_tree(integrator, &edge, depth, direction, h0, rng);
        depth += 1;
        if subtree.divergent || subtree.turning {
            tree.n_leapfrog += subtree.n_leapfrog;
            tree.sum_accept_prob += subtree.sum_accept_prob;
            tree.divergent |= subtree.divergent;
            break;
        }
        merge(&mut tree, subtree, direction, integrator.inv_mass, rng, true);
        if tree.turning {
            break;
        }
    }

    let n_steps = tree.n_leapfrog.max(1);
    let stats = TransitionStats {
        diverging: tree.divergent,
        acceptance_rate: tree.sum_accept_prob / n_steps as f64,
        step_size: integrator.step_size,
        tree_depth: depth,
        n_steps,
        energy: integrator.hamiltonian(&tree.proposal),
        lp: -tree.proposal.potential,
    };
    Transition {
        state: tree.proposal,
        stats,
    }
}

/// Heuristic initial step size: double or halve until a single leapfrog
/// step's acceptance crosses one half.
pub fn find_reasonable_step_size<R: Rng>(
    model: &dyn LogDensity,
    q: &[f64],
    inv_mass: &[f64],
    rng: &mut R,
) -> f64 {
    let (pot, grad) = potential(model, q);
    let p: Vec<f64> = inv_mass
        .iter()
        .map(|m| {
            let z: f64 = StandardNormal.sample(rng);
            z / m.sqrt()
        })
        .collect();
    let start = State {
        q: q.to_vec(),
        p,
        potential: pot,
        grad,
    };
    let mut integrator = Integrator {
        model,
        inv_mass,
        step_size: 1.0,
    };
    let h0 = integrator.hamiltonian(&start);
    let log_accept = |integrator: &Integrator<'_>| {
        let h = integrator.hamiltonian(&integrator.step(&start, 1.0));
        if h.is_finite() {
            h0 - h
        } else {
            f64::NEG_INFINITY
        }
    };

    let direction = if log_accept(&integrator) > 0.5f64.ln() {
        1.0
    } else {
        -1.0
    };
    for _ in 0..100 {
        let la = log_accept(&integrator);
        if direction * la <= -direction * std::f64::consts::LN_2 {
            break;
        }
        integrator.step_size *= 2f64.powf(direction);
        if !(1e-10..=1e7).contains(&integrator.step_size) {
            break;
        }
    }
    integrator.step_size.clamp(1e-10, 1e7)
}

/// Post-warm-up output of one chain, in the unconstrained space.
#[derive(Debug, Clone)]
pub struct ChainDraws {
    pub chain: usize,
    pub draws: Vec<Vec<f64>>,
    pub stats: Vec<TransitionStats>,
    pub step_size: f64,
    pub inv_mass: Vec<f64>,
    pub init_attempts: usize,
}

impl ChainDraws {
    pub fn divergences(&self) -> usize {
        self.stats.iter().filter(|s| s.diverging).count()
    }
}

/// Seed of chain `chain` under the run seed.
pub fn chain_seed(seed: u64, chain: usize) -> u64 {
    seed ^ (chain as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Draw an initial point with finite density and gradient.
fn initial_state<R: Rng>(model: &dyn LogDensity, rng: &mut R) -> Result<(State, usize)> {
    let dim = model.dim();
    for attempt in 1..=MAX_INIT_ATTEMPTS {
        let q: Vec<f64> = (0..dim)
            .map(|_| rng.random_range(-INIT_RADIUS..INIT_RADIUS))
            .collect();
        let (pot, grad) = potential(model, &q);
        if pot.is_finite() && grad.iter().all(|g| g.is_finite()) {
            let state = State {
                q,
                p: vec![0.0; dim],
                potential: pot,
                grad,
            };
            return Ok((state, attempt));
        }
    }
    Err(Error::SamplerInit(format!(
        "no finite log density in {} random initial points",
        MAX_INIT_ATTEMPTS
    )))
}

/// Warm up and sample one chain.
pub fn run_chain(model: &dyn LogDensity, settings: &SamplerSettings, chain: usize) -> Result<ChainDraws> {
    let mut rng = StdRng::seed_from_u64(chain_seed(settings.seed, chain));
    let (mut state, init_attempts) = initial_state(model, &mut rng)?;
    let dim = model.dim();

    let eps0 = find_reasonable_step_size(model, &state.q, &vec![1.0; dim], &mut rng);
    let mut adaptation = WindowedAdaptation::new(dim, settings.tune, settings.target_accept, eps0);

    for iter in 0..settings.tune {
        let inv_mass = adaptation.inv_mass().to_vec();
        let integrator = Integrator {
            model,
            inv_mass: &inv_mass,
            step_size: adaptation.step_size(),
        };
        let t = transition(&integrator, &state, settings.max_treedepth, &mut rng);
        state = t.state;
        if adaptation.update(iter, &state.q, t.stats.acceptance_rate) {
            let eps = find_reasonable_step_size(model, &state.q, adaptation.inv_mass(), &mut rng);
            adaptation.restart_step_size(eps);
        }
    }

    let inv_mass = adaptation.inv_mass().to_vec();
    let integrator = Integrator {
        model,
        inv_mass: &inv_mass,
        step_size: adaptation.adapted_step_size(),
    };
    let mut draws = Vec::with_capacity(settings.draws);
    let mut stats = Vec::with_capacity(settings.draws);
    for _ in 0..settings.draws {
        let t = transition(&integrator, &state, settings.max_treedepth, &mut rng);
        state = t.state;
        draws.push(state.q.clone());
        stats.push(t.stats);
    }

    Ok(ChainDraws {
        chain,
        draws,
        stats,
        step_size: integrator.step_size,
        inv_mass,
        init_attempts,
    })
}
