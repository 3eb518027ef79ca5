#![forbid(unsafe_code)]
//! Deterministic simulation harness for multi-agent treeclock behavior.
//!
//! Drives the fork / event / join / compare / serialize surface through
//! randomized but reproducible schedules with a changing population:
//! agents record events, gossip serialized stamps to peers, fork new
//! members in, and retire back out. Algebraic oracles run continuously;
//! any violation is a bug in the clock algebra.

pub mod oracle;
pub mod rng;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use treeclock_core::Stamp;

use crate::oracle::{Oracle, OracleReport};
use crate::rng::DeterministicRng;

/// Knobs for one simulation run. Percentages are per-round action
/// weights; whatever remains after sync/fork/retire is plain event
/// recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Starting population (forked from one seed).
    pub initial_agents: usize,
    /// Rounds to run.
    pub rounds: u64,
    /// RNG seed; equal seeds replay identical schedules.
    pub seed: u64,
    /// Chance an agent gossips its stamp to a peer.
    pub sync_percent: u8,
    /// Chance an agent forks a new member into the population.
    pub fork_percent: u8,
    /// Chance an agent retires, donating its interval to a peer.
    pub retire_percent: u8,
    /// Population ceiling; forks are skipped at the cap.
    pub max_agents: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            initial_agents: 8,
            rounds: 2_000,
            seed: 0x7EEC_10C4,
            sync_percent: 25,
            fork_percent: 5,
            retire_percent: 3,
            max_agents: 64,
        }
    }
}

/// Tallies and oracle outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimReport {
    /// Rounds executed.
    pub rounds: u64,
    /// Local events recorded.
    pub events: u64,
    /// Successful gossip exchanges.
    pub syncs: u64,
    /// Members forked in.
    pub forks: u64,
    /// Members retired out.
    pub retires: u64,
    /// Largest population observed.
    pub peak_agents: usize,
    /// Population at the end of the run.
    pub final_agents: usize,
    /// Oracle outcome.
    pub oracle: OracleReport,
}

/// Round-based multi-agent simulator.
pub struct Simulator {
    config: SimConfig,
    rng: DeterministicRng,
    agents: Vec<Stamp>,
    oracle: Oracle,
}

impl Simulator {
    /// Build the starting population by repeatedly forking one seed.
    ///
    /// # Errors
    ///
    /// When the configuration is degenerate (no agents, no rounds).
    pub fn new(config: SimConfig) -> Result<Self> {
        if config.initial_agents == 0 {
            bail!("simulation needs at least one agent");
        }
        if config.max_agents < config.initial_agents {
            bail!("max_agents below initial population");
        }
        if config.rounds == 0 {
            bail!("simulation needs at least one round");
        }

        let mut agents = vec![Stamp::seed()];
        while agents.len() < config.initial_agents {
            // Fork the widest stamp to keep the partition balanced.
            let (left, right) = agents.remove(0).fork();
            agents.push(left);
            agents.push(right);
        }

        Ok(Self {
            config,
            rng: DeterministicRng::new(config.seed),
            agents,
            oracle: Oracle::new(),
        })
    }

    /// Run the configured number of rounds and evaluate the oracles.
    ///
    /// # Errors
    ///
    /// Any clock-operation failure; a correct algebra never fails under
    /// the schedules this harness generates.
    pub fn run(mut self) -> Result<SimReport> {
        let mut events = 0u64;
        let mut syncs = 0u64;
        let mut forks = 0u64;
        let mut retires = 0u64;
        let mut peak = self.agents.len();

        for round in 0..self.config.rounds {
            let actor = self.rng.next_bounded(self.agents.len() as u64) as usize;

            if self.rng.hit_rate_percent(self.config.sync_percent) && self.agents.len() > 1 {
                self.sync(actor)?;
                syncs += 1;
            } else if self.rng.hit_rate_percent(self.config.fork_percent)
                && self.agents.len() < self.config.max_agents
            {
                self.fork(actor);
                forks += 1;
            } else if self.rng.hit_rate_percent(self.config.retire_percent)
                && self.agents.len() > 1
            {
                self.retire(actor)?;
                retires += 1;
            } else {
                self.record_event(actor)?;
                events += 1;
            }

            peak = peak.max(self.agents.len());
            if round % 500 == 0 {
                debug!(round, agents = self.agents.len(), "simulation progress");
            }
        }

        self.oracle.final_convergence(&self.agents);

        Ok(SimReport {
            rounds: self.config.rounds,
            events,
            syncs,
            forks,
            retires,
            peak_agents: peak,
            final_agents: self.agents.len(),
            oracle: self.oracle.into_report(),
        })
    }

    fn record_event(&mut self, actor: usize) -> Result<()> {
        let before = self.agents[actor].clone();
        self.agents[actor].event()?;
        self.oracle.event_advances(&before, &self.agents[actor]);
        Ok(())
    }

    /// Gossip: the actor ships its serialized stamp to a peer, who joins
    /// an anonymous observer of it.
    fn sync(&mut self, actor: usize) -> Result<()> {
        let peer = self.pick_other(actor);
        let wire = self.agents[actor].peek().to_bytes()?;
        let received = Stamp::deserialize(&wire)?;
        self.oracle.wire_roundtrip(&self.agents[actor]);

        let joined = self.agents[peer].join(&received)?;
        self.oracle
            .join_laws(&self.agents[peer], &received, &joined);
        self.agents[peer] = joined;
        Ok(())
    }

    fn fork(&mut self, actor: usize) {
        let parent = self.agents[actor].clone();
        let (keep, spawn) = parent.fork();
        self.oracle.fork_laws(&parent, &keep, &spawn);
        self.agents[actor] = keep;
        self.agents.push(spawn);
    }

    /// The actor leaves, donating its interval and history to a peer.
    fn retire(&mut self, actor: usize) -> Result<()> {
        let peer = self.pick_other(actor);
        let leaving = self.agents.swap_remove(actor);
        // swap_remove may have moved the peer.
        let peer = if peer == self.agents.len() { actor } else { peer };
        let joined = self.agents[peer].join(&leaving)?;
        self.oracle.join_laws(&self.agents[peer], &leaving, &joined);
        self.agents[peer] = joined;
        Ok(())
    }

    fn pick_other(&mut self, actor: usize) -> usize {
        let offset = 1 + self.rng.next_bounded(self.agents.len() as u64 - 1) as usize;
        (actor + offset) % self.agents.len()
    }
}
