//! Lifecycle supervisor and the per-cycle callback surface.
//!
//! The simulation kernel drives one [`Engine`] per run. Each cycle it calls
//! [`Engine::peek_request`], [`Engine::poke_response`],
//! [`Engine::commit_peek`] and [`Engine::refill_queue`], plus
//! [`Engine::timeout_check`]. These fail with
//! [`CosimError::NotInitialized`] until [`Engine::init`] has run. Every
//! callback checks the [`CancelToken`]; once the run has terminated or
//! faulted every callback is a no-op.

use log::{error, info, trace, warn};

use crate::{
    BusObservation, BusResponder, BusResponse, CancelToken, CommitMatcher, CommitOutcome,
    CommitSignal, CosimConfig, CosimError, CosimStats, Divergence, DivergenceClass, EventSource,
    ImageSegment, LookaheadQueue, ReferenceModel,
};

/// Why a run stopped without an error being returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Termination {
    /// The pass address retired.
    Passed {
        /// Retiring pc.
        pc: u64,
    },
    /// The cancel token was set.
    Interrupted,
    /// Kernel time passed the configured timeout.
    TimedOut {
        /// Kernel time at the check.
        time: u64,
    },
    /// An earlier callback returned a divergence.
    Faulted(DivergenceClass),
}

impl Termination {
    /// Whether the run ended successfully.
    #[must_use]
    pub const fn is_pass(self) -> bool {
        matches!(self, Self::Passed { .. })
    }
}

/// Instruction to the kernel after a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// Keep simulating.
    Continue,
    /// Finish the simulation.
    Stop(Termination),
}

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RunState {
    /// Created; `init` not called yet.
    #[default]
    Idle,
    /// Checking cycles.
    Running,
    /// Stopped by pass, interrupt or timeout.
    Terminated(Termination),
    /// A divergence was reported; nothing else is checked.
    FaultLatched(DivergenceClass),
}

impl RunState {
    /// Termination to report for a stopped engine.
    #[must_use]
    pub const fn stopped(self) -> Option<Termination> {
        match self {
            Self::Terminated(termination) => Some(termination),
            Self::FaultLatched(class) => Some(Termination::Faulted(class)),
            Self::Idle | Self::Running => None,
        }
    }
}

/// Co-simulation engine owning the reference model and all checking state.
#[derive(Debug)]
pub struct Engine<M> {
    config: CosimConfig,
    source: EventSource<M>,
    queue: LookaheadQueue,
    responder: BusResponder,
    matcher: CommitMatcher,
    stats: CosimStats,
    state: RunState,
}

impl<M: ReferenceModel> Engine<M> {
    /// Builds an engine around `model`.
    ///
    /// # Errors
    ///
    /// Returns [`CosimError::Config`] when `config` fails validation.
    pub fn new(config: CosimConfig, model: M) -> Result<Self, CosimError> {
        config.validate()?;
        Ok(Self {
            source: EventSource::new(model, config.trap_successor_pc),
            queue: LookaheadQueue::new(config.queue_capacity, config.refill_threshold),
            responder: BusResponder::new(&config),
            matcher: CommitMatcher::new(&config),
            stats: CosimStats::default(),
            state: RunState::Idle,
            config,
        })
    }

    /// Configuration the engine was built with.
    pub const fn config(&self) -> &CosimConfig {
        &self.config
    }

    /// Counters so far.
    pub const fn stats(&self) -> &CosimStats {
        &self.stats
    }

    /// Lifecycle state.
    pub const fn run_state(&self) -> RunState {
        self.state
    }

    /// Queued reference events.
    pub const fn queue(&self) -> &LookaheadQueue {
        &self.queue
    }

    /// Bus responder state.
    pub const fn responder(&self) -> &BusResponder {
        &self.responder
    }

    /// Commit matcher state.
    pub const fn matcher(&self) -> &CommitMatcher {
        &self.matcher
    }

    /// The reference model.
    pub const fn model(&self) -> &M {
        self.source.model()
    }

    /// Reads the configured images from disk, then behaves as
    /// [`Self::init_with_images`].
    ///
    /// # Errors
    ///
    /// Returns [`CosimError::Config`] when no program image is configured,
    /// [`CosimError::Image`] when an image cannot be read, and any error of
    /// [`Self::init_with_images`].
    pub fn init(&mut self, cancel: &CancelToken) -> Result<Control, CosimError> {
        let Some(bin) = self.config.bin.clone() else {
            return Err(crate::ConfigError::Missing("COSIM_bin").into());
        };
        let mut images = Vec::with_capacity(2);
        if let Some(entrance) = self.config.entrance_bin.clone() {
            images.push(ImageSegment::from_file(&entrance, self.config.entrance_vector)?);
        }
        images.push(ImageSegment::from_file(&bin, self.config.reset_vector)?);
        self.init_with_images(&images, cancel)
    }

    /// Resets the model at the boot pc, loads `images` and fills the queue.
    ///
    /// # Errors
    ///
    /// Returns [`CosimError::Divergence`] when the model traps fatally while
    /// the queue is first filled.
    pub fn init_with_images(
        &mut self,
        images: &[ImageSegment],
        cancel: &CancelToken,
    ) -> Result<Control, CosimError> {
        trace!("init");
        if let Some(control) = self.guard(cancel) {
            return Ok(control);
        }

        let boot_pc = self.config.boot_pc();
        let model = self.source.model_mut();
        model.reset(boot_pc);
        for image in images {
            model.load(image.base, &image.bytes);
            info!(
                "loaded {} bytes at {:#010x}",
                image.bytes.len(),
                image.base
            );
        }
        let snapshot = model.privileged_snapshot();
        info!(
            "simulation environment initialized: bin={:?} entrance_bin={:?} wave={:?}",
            self.config.bin, self.config.entrance_bin, self.config.wave
        );
        info!(
            "reset_vector={:#010x} boot_pc={boot_pc:#010x} pass_address={:#010x} timeout={} xlen={}",
            self.config.reset_vector,
            self.config.pass_address,
            self.config.timeout,
            self.config.xlen.bits()
        );
        info!("misa: {:#x}", snapshot.misa);
        info!("mstatus: {:#x}", snapshot.mstatus);

        self.state = RunState::Running;
        let filled = self.queue.refill(&mut self.source, &mut self.stats);
        self.latch(filled)?;
        Ok(Control::Continue)
    }

    /// Checks the A/C channel requests presented this cycle.
    ///
    /// # Errors
    ///
    /// Returns [`CosimError::Divergence`] when a request disagrees with the
    /// queued reference events, and [`CosimError::NotInitialized`] before
    /// [`Self::init`].
    pub fn peek_request(
        &mut self,
        obs: &BusObservation,
        cancel: &CancelToken,
    ) -> Result<Control, CosimError> {
        trace!("peek_request");
        self.ensure_started("peek_request")?;
        if let Some(control) = self.guard(cancel) {
            return Ok(control);
        }
        let checked = self.responder.observe(
            obs,
            &mut self.queue,
            self.source.model(),
            &mut self.stats,
        );
        self.latch(checked)?;
        Ok(Control::Continue)
    }

    /// Produces the D-channel values for this cycle.
    ///
    /// A stopped engine presents an idle channel.
    ///
    /// # Errors
    ///
    /// Returns [`CosimError::NotInitialized`] before [`Self::init`].
    pub fn poke_response(
        &mut self,
        d_ready: bool,
        cancel: &CancelToken,
    ) -> Result<BusResponse, CosimError> {
        trace!("poke_response");
        self.ensure_started("poke_response")?;
        if self.guard(cancel).is_some() {
            return Ok(BusResponse::idle());
        }
        Ok(self.responder.respond(d_ready, &mut self.stats))
    }

    /// Tops up the lookahead queue.
    ///
    /// # Errors
    ///
    /// Returns [`CosimError::Divergence`] when the model traps fatally, and
    /// [`CosimError::NotInitialized`] before [`Self::init`].
    pub fn refill_queue(&mut self, cancel: &CancelToken) -> Result<Control, CosimError> {
        trace!("refill_queue");
        self.ensure_started("refill_queue")?;
        if let Some(control) = self.guard(cancel) {
            return Ok(control);
        }
        let filled = self.queue.refill(&mut self.source, &mut self.stats);
        self.latch(filled)?;
        Ok(Control::Continue)
    }

    /// Matches this cycle's write-back against the queue.
    ///
    /// # Errors
    ///
    /// Returns [`CosimError::Divergence`] when the register write or the
    /// retiring pc disagrees with the reference, and
    /// [`CosimError::NotInitialized`] before [`Self::init`].
    pub fn commit_peek(
        &mut self,
        signal: &CommitSignal,
        cancel: &CancelToken,
    ) -> Result<Control, CosimError> {
        trace!("commit_peek");
        self.ensure_started("commit_peek")?;
        if let Some(control) = self.guard(cancel) {
            return Ok(control);
        }
        let outcome = self
            .matcher
            .commit(signal, &mut self.queue, &mut self.stats);
        match self.latch(outcome)? {
            CommitOutcome::Passed { pc } => Ok(self.terminate(Termination::Passed { pc })),
            CommitOutcome::Idle
            | CommitOutcome::SideChannel { .. }
            | CommitOutcome::Committed { .. }
            | CommitOutcome::Unmatched { .. } => Ok(Control::Continue),
        }
    }

    /// Stops the run once kernel time `now` exceeds the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`CosimError::NotInitialized`] before [`Self::init`].
    pub fn timeout_check(&mut self, now: u64, cancel: &CancelToken) -> Result<Control, CosimError> {
        trace!("timeout_check");
        self.ensure_started("timeout_check")?;
        if let Some(control) = self.guard(cancel) {
            return Ok(control);
        }
        if now > self.config.timeout {
            return Ok(self.terminate(Termination::TimedOut { time: now }));
        }
        Ok(Control::Continue)
    }

    fn ensure_started(&self, callback: &'static str) -> Result<(), CosimError> {
        if self.state == RunState::Idle {
            warn!("{callback} called before init");
            return Err(CosimError::NotInitialized { callback });
        }
        Ok(())
    }

    fn guard(&mut self, cancel: &CancelToken) -> Option<Control> {
        if let Some(termination) = self.state.stopped() {
            return Some(Control::Stop(termination));
        }
        if cancel.is_cancelled() {
            return Some(self.terminate(Termination::Interrupted));
        }
        None
    }

    fn terminate(&mut self, termination: Termination) -> Control {
        self.state = RunState::Terminated(termination);
        match termination {
            Termination::Passed { pc } => info!("simulation passed at pc={pc:#010x}"),
            Termination::Interrupted => warn!("simulation interrupted"),
            Termination::TimedOut { time } => error!(
                "simulation timed out at time {time} (timeout {})",
                self.config.timeout
            ),
            Termination::Faulted(class) => error!("simulation stopped after {class:?} divergence"),
        }
        info!("{}", self.stats);
        Control::Stop(termination)
    }

    fn latch<T>(&mut self, result: Result<T, Divergence>) -> Result<T, CosimError> {
        result.map_err(|divergence| {
            let class = divergence.class();
            error!("{divergence}");
            self.stats.record_divergence(class);
            self.state = RunState::FaultLatched(class);
            info!("{}", self.stats);
            CosimError::Divergence(divergence)
        })
    }
}
