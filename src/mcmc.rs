//! Metropolis-Hastings search over [`MCMCable`] hypotheses.
//!
//! A [`MCMCChain`] holds a current hypothesis and advances it one proposal
//! at a time, accepting with the tempered posterior ratio corrected by the
//! proposal's `forward - backward` term. [`Control`] bounds a run by steps
//! or wall-clock time and handles burn-in, thinning, and stagnation
//! restarts.

use rand::Rng;
use std::f64::NEG_INFINITY;
use std::fmt;
use std::time::Instant;

use crate::hypothesis::{Bayesable, MCMCable, Temperable};
use crate::proposal::ProposalError;
use crate::utils::{FHBool, FiniteHistory};

const ACCEPTANCE_HISTORY: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum SearchError {
    Proposal(ProposalError),
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SearchError::Proposal(err) => write!(f, "search stopped: {}", err),
        }
    }
}
impl std::error::Error for SearchError {}

impl From<ProposalError> for SearchError {
    fn from(err: ProposalError) -> Self {
        SearchError::Proposal(err)
    }
}

/// Bounds and bookkeeping for a search run.
///
/// A zero `steps` or `runtime_ms` means unbounded in that dimension; with
/// both zero the run never stops on its own.
#[derive(Debug, Clone)]
pub struct Control {
    /// Number of MCMC steps to take; 0 for unbounded.
    pub steps: usize,
    /// Wall-clock budget in milliseconds; 0 for unbounded.
    pub runtime_ms: u64,
    /// Steps to discard before yielding samples.
    pub burn: usize,
    /// Yield every `thin`th step after burn-in; 0 or 1 yields every step.
    pub thin: usize,
    /// Restart from the prior after this many steps without improving the
    /// best posterior seen; 0 disables restarts.
    pub restart: usize,
    started: Option<Instant>,
    done_steps: usize,
}

impl Control {
    pub fn new(steps: usize) -> Self {
        Control {
            steps,
            runtime_ms: 0,
            burn: 0,
            thin: 1,
            restart: 0,
            started: None,
            done_steps: 0,
        }
    }
    pub fn with_runtime(mut self, runtime_ms: u64) -> Self {
        self.runtime_ms = runtime_ms;
        self
    }
    pub fn with_burn(mut self, burn: usize) -> Self {
        self.burn = burn;
        self
    }
    pub fn with_thin(mut self, thin: usize) -> Self {
        self.thin = thin;
        self
    }
    pub fn with_restart(mut self, restart: usize) -> Self {
        self.restart = restart;
        self
    }
    fn start(&mut self) {
        self.started = Some(Instant::now());
        self.done_steps = 0;
    }
    fn running(&self) -> bool {
        if self.steps != 0 && self.done_steps >= self.steps {
            return false;
        }
        if self.runtime_ms != 0 {
            if let Some(started) = self.started {
                if started.elapsed().as_millis() as u64 >= self.runtime_ms {
                    return false;
                }
            }
        }
        true
    }
}

/// A single Metropolis-Hastings chain.
pub struct MCMCChain<'a, H: MCMCable> {
    current: H,
    best: H,
    data: &'a [H::Datum],
    /// Likelihood temperature; 1 samples the plain posterior.
    pub temperature: f64,
    samples: usize,
    proposals: usize,
    acceptances: usize,
    likelihood_failures: usize,
    steps_since_improvement: usize,
    history: FiniteHistory<FHBool>,
}

impl<'a, H: MCMCable> MCMCChain<'a, H> {
    pub fn new(mut h: H, data: &'a [H::Datum]) -> Self {
        if h.compute_posterior(data, None).is_err() {
            let score = h.bayes_score_mut();
            score.likelihood = NEG_INFINITY;
            score.posterior = NEG_INFINITY;
        }
        let best = h.clone();
        MCMCChain {
            current: h,
            best,
            data,
            temperature: 1.0,
            samples: 0,
            proposals: 0,
            acceptances: 0,
            likelihood_failures: 0,
            steps_since_improvement: 0,
            history: FiniteHistory::new(ACCEPTANCE_HISTORY),
        }
    }

    pub fn current(&self) -> &H {
        &self.current
    }
    /// The highest-posterior hypothesis seen so far, burn-in included.
    pub fn best(&self) -> &H {
        &self.best
    }
    pub fn data(&self) -> &'a [H::Datum] {
        self.data
    }
    pub fn samples(&self) -> usize {
        self.samples
    }
    pub fn proposals(&self) -> usize {
        self.proposals
    }
    pub fn acceptances(&self) -> usize {
        self.acceptances
    }
    /// Proposals whose likelihood could not be computed; each counts as a
    /// rejected step.
    pub fn likelihood_failures(&self) -> usize {
        self.likelihood_failures
    }
    /// Acceptance rate over the most recent steps.
    pub fn acceptance_ratio(&self) -> f64 {
        self.history.mean()
    }

    /// Take one MCMC step. `restart` is the stagnation bound from
    /// [`Control`]; pass 0 to disable restarts.
    pub fn advance<R: Rng>(&mut self, restart: usize, rng: &mut R) -> Result<(), SearchError> {
        if restart != 0 && self.steps_since_improvement >= restart {
            let mut fresh = self.current.restart(rng);
            if fresh.compute_posterior(self.data, None).is_err() {
                let score = fresh.bayes_score_mut();
                score.likelihood = NEG_INFINITY;
                score.posterior = NEG_INFINITY;
            }
            self.current = fresh;
            self.steps_since_improvement = 0;
            self.track_best();
        }
        self.proposals += 1;

        // a chain stuck at an impossible state can only restart
        let (mut proposal, fb) = if self.current.bayes_score().posterior == NEG_INFINITY {
            (self.current.restart(rng), 0.0)
        } else {
            self.current.propose(rng)?
        };

        if proposal == self.current {
            proposal.replicate(&self.current);
        } else if proposal.compute_posterior(self.data, None).is_err() {
            self.likelihood_failures += 1;
            self.history.add(FHBool(false));
            self.steps_since_improvement += 1;
            return Ok(());
        }

        let ratio = proposal.at_temperature(self.temperature)
            - self.current.at_temperature(self.temperature)
            - fb;
        let accept = !ratio.is_nan() && (ratio >= 0.0 || rng.gen::<f64>() < ratio.exp());
        #[cfg(feature = "verbose")]
        eprintln!(
            "mcmc step {}: {} (log ratio {:.4}) {}",
            self.proposals,
            if accept { "accept" } else { "reject" },
            ratio,
            proposal,
        );
        if accept {
            self.current = proposal;
            self.acceptances += 1;
        }
        self.history.add(FHBool(accept));
        self.track_best();
        Ok(())
    }

    fn track_best(&mut self) {
        let posterior = self.current.bayes_score().posterior;
        let best = self.best.bayes_score().posterior;
        if posterior > best || best.is_nan() {
            self.best = self.current.clone();
            self.steps_since_improvement = 0;
        } else {
            self.steps_since_improvement += 1;
        }
    }

    /// Run the chain under `ctl`, calling `callback` on each retained
    /// sample.
    pub fn run<R, F>(&mut self, mut ctl: Control, mut callback: F, rng: &mut R) -> Result<(), SearchError>
    where
        R: Rng,
        F: FnMut(&H),
    {
        ctl.start();
        while ctl.running() {
            self.advance(ctl.restart, rng)?;
            ctl.done_steps += 1;
            self.samples += 1;
            if self.samples > ctl.burn && (ctl.thin <= 1 || self.samples % ctl.thin == 0) {
                callback(&self.current);
            }
        }
        Ok(())
    }

    /// Run the chain lazily, yielding each retained sample.
    pub fn sample_iter<'c, R: Rng>(
        &'c mut self,
        mut ctl: Control,
        rng: &'c mut R,
    ) -> Box<dyn Iterator<Item = Result<H, SearchError>> + 'c> {
        ctl.start();
        Box::new(std::iter::from_fn(move || loop {
            if !ctl.running() {
                return None;
            }
            if let Err(e) = self.advance(ctl.restart, rng) {
                return Some(Err(e));
            }
            ctl.done_steps += 1;
            self.samples += 1;
            if self.samples > ctl.burn && (ctl.thin <= 1 || self.samples % ctl.thin == 0) {
                return Some(Ok(self.current.clone()));
            }
        }))
    }
}
