//! Core simulation engine for the Myofiber workspace.
//!
//! A toroidal 2D grid of muscle-fiber agents advances in discrete daily
//! steps: hormone production, optional workouts, sleep recovery, spatial
//! hormone diffusion, regulation, and nutrient-limited growth, in that
//! fixed order. Seeded runs reproduce bit-identical aggregate histories.

use rand::{Rng, RngCore, SeedableRng, rngs::SmallRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Baseline growth ceiling shared by every fiber before stochastic increments.
const BASE_MAX_SIZE: f64 = 4.0;
/// Number of stochastic ceiling increments rolled at fiber creation.
const MAX_SIZE_INCREMENTS: u32 = 20;
/// Smallest size a fiber regulates back to after growth.
const FIBER_SIZE_FLOOR: f64 = 1.0;

const DAILY_CATABOLIC_GAIN: f64 = 2.0;
const DAILY_ANABOLIC_GAIN: f64 = 2.5;
const LIFT_CATABOLIC_GAIN: f64 = 44.0;
const LIFT_ANABOLIC_GAIN: f64 = 55.0;
const SLEEP_CATABOLIC_RECOVERY: f64 = 0.5;
const SLEEP_ANABOLIC_RECOVERY: f64 = 0.48;
/// Fraction of the balanced hormone signal converted into size change.
const GROWTH_RATE: f64 = 0.20;
/// Anabolic drive is capped at this multiple of the catabolic signal.
const ANABOLIC_CEILING_FACTOR: f64 = 1.05;
/// Nutrient debited per unit of positive size change.
const NUTRIENT_PER_UNIT_GROWTH: f64 = 5000.0;

const MOORE_NEIGHBOR_COUNT: f64 = 8.0;

/// Logarithm guard: hormone and size invariants keep every log input
/// strictly positive, so a non-positive value is a defect, not a
/// recoverable condition.
fn positive_log10(value: f64) -> f64 {
    assert!(
        value > 0.0,
        "invariant violation: log10 argument must be positive, got {value}"
    );
    value.log10()
}

/// Errors that can occur when constructing model state.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// When during a step the population aggregates are sampled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum AggregateTiming {
    /// Record state as it stood before any of the step's phases ran.
    #[default]
    PreStep,
    /// Record state after the growth phase completed.
    PostGrowth,
}

/// Static configuration for a muscle-fiber simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuscleConfig {
    /// Grid width in cells.
    pub width: u32,
    /// Grid height in cells.
    pub height: u32,
    /// Lower regulation bound for anabolic hormone.
    pub anabolic_hormone_min: f64,
    /// Upper regulation bound for anabolic hormone.
    pub anabolic_hormone_max: f64,
    /// Lower regulation bound for catabolic hormone.
    pub catabolic_hormone_min: f64,
    /// Upper regulation bound for catabolic hormone.
    pub catabolic_hormone_max: f64,
    /// Fraction of each fiber's hormone redistributed to its Moore
    /// neighbors every step; must lie within `[0, 1]`.
    pub hormone_diffuse_rate: f64,
    /// Nutrient storage ceiling per fiber.
    pub nutrient_max: f64,
    /// Nutrient delivered to each fiber per step, before clamping.
    pub nutrient_gain: f64,
    /// Whether the workout phase runs at all.
    pub lift_weights: bool,
    /// Workout intensity on a 0–100 scale.
    pub intensity: f64,
    /// Workouts fire on steps where `time % days_between_workouts == 0`.
    pub days_between_workouts: u32,
    /// Mean nightly sleep duration in hours.
    pub hours_of_sleep: f64,
    /// Standard deviation of the nightly sleep draw.
    pub sleep_variance: f64,
    /// Probability that a ceiling increment is skipped at fiber creation;
    /// higher fractions produce smaller, slow-twitch-dominated fibers.
    pub slow_twitch_fraction: f64,
    /// Whether aggregates sample pre-step or post-growth state.
    pub aggregate_timing: AggregateTiming,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
}

impl Default for MuscleConfig {
    fn default() -> Self {
        Self {
            width: 20,
            height: 20,
            anabolic_hormone_min: 50.0,
            anabolic_hormone_max: 200.0,
            catabolic_hormone_min: 52.0,
            catabolic_hormone_max: 250.0,
            hormone_diffuse_rate: 0.75,
            nutrient_max: 100.0,
            nutrient_gain: 100.0,
            lift_weights: true,
            intensity: 95.0,
            days_between_workouts: 5,
            hours_of_sleep: 8.0,
            sleep_variance: 1.0,
            slow_twitch_fraction: 0.5,
            aggregate_timing: AggregateTiming::default(),
            rng_seed: None,
        }
    }
}

impl MuscleConfig {
    /// Validates every field, failing before any simulation state exists.
    fn validate(&self) -> Result<(), ModelError> {
        if self.width == 0 || self.height == 0 {
            return Err(ModelError::InvalidConfig(
                "grid dimensions must be non-zero",
            ));
        }
        if !(0.0..=1.0).contains(&self.hormone_diffuse_rate) {
            return Err(ModelError::InvalidConfig(
                "hormone_diffuse_rate must be within [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.slow_twitch_fraction) {
            return Err(ModelError::InvalidConfig(
                "slow_twitch_fraction must be within [0, 1]",
            ));
        }
        if !(0.0..=100.0).contains(&self.intensity) {
            return Err(ModelError::InvalidConfig(
                "intensity must be within [0, 100]",
            ));
        }
        if self.days_between_workouts == 0 {
            return Err(ModelError::InvalidConfig(
                "days_between_workouts must be at least 1",
            ));
        }
        if self.anabolic_hormone_min <= 0.0 || self.catabolic_hormone_min <= 0.0 {
            return Err(ModelError::InvalidConfig(
                "hormone floors must be positive",
            ));
        }
        if self.anabolic_hormone_max < self.anabolic_hormone_min
            || self.catabolic_hormone_max < self.catabolic_hormone_min
        {
            return Err(ModelError::InvalidConfig(
                "hormone bounds must satisfy min <= max",
            ));
        }
        if self.nutrient_max <= 0.0 {
            return Err(ModelError::InvalidConfig("nutrient_max must be positive"));
        }
        if self.nutrient_gain < 0.0 {
            return Err(ModelError::InvalidConfig(
                "nutrient_gain must be non-negative",
            ));
        }
        if !self.hours_of_sleep.is_finite() || self.hours_of_sleep <= 0.0 {
            return Err(ModelError::InvalidConfig(
                "hours_of_sleep must be positive and finite",
            ));
        }
        if !self.sleep_variance.is_finite() || self.sleep_variance < 0.0 {
            return Err(ModelError::InvalidConfig(
                "sleep_variance must be non-negative and finite",
            ));
        }
        Ok(())
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }

    /// Number of grid cells (and therefore fibers) this configuration creates.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }
}

/// Per-cell biological state of a single muscle fiber.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MuscleFiber {
    /// Growth ceiling, fixed at creation.
    pub max_size: f64,
    /// Current size; regulated into `[1, max_size]` after every growth pass.
    pub fiber_size: f64,
    pub anabolic_hormone: f64,
    pub catabolic_hormone: f64,
    /// Stored nutrient available to fund growth.
    pub nutrient: f64,
}

impl MuscleFiber {
    /// Sample a new fiber: the ceiling rolls up to twenty stochastic
    /// increments and the initial size lands between 20% and 60% of it.
    /// Hormones start at the configured floors.
    #[must_use]
    pub fn spawn(config: &MuscleConfig, rng: &mut dyn RngCore) -> Self {
        let mut max_size = BASE_MAX_SIZE;
        for _ in 0..MAX_SIZE_INCREMENTS {
            if rng.random::<f64>() > config.slow_twitch_fraction {
                max_size += 1.0;
            }
        }
        let fiber_size = (0.2 + rng.random::<f64>() * 0.4) * max_size;
        Self {
            max_size,
            fiber_size,
            anabolic_hormone: config.anabolic_hormone_min,
            catabolic_hormone: config.catabolic_hormone_min,
            nutrient: 0.0,
        }
    }

    /// Baseline hormonal response to a day of ordinary activity.
    pub fn perform_daily_activity(&mut self) {
        let activity = positive_log10(self.fiber_size);
        self.catabolic_hormone += DAILY_CATABOLIC_GAIN * activity;
        self.anabolic_hormone += DAILY_ANABOLIC_GAIN * activity;
    }

    /// Workout response: with probability `(intensity / 100)^2` the fiber
    /// recruits and both hormones spike in proportion to its size.
    pub fn lift_weights(&mut self, rng: &mut dyn RngCore, intensity: f64) {
        let recruitment_chance = (intensity / 100.0).powi(2);
        if rng.random::<f64>() < recruitment_chance {
            let exertion = positive_log10(self.fiber_size);
            self.catabolic_hormone += exertion * LIFT_CATABOLIC_GAIN;
            self.anabolic_hormone += exertion * LIFT_ANABOLIC_GAIN;
        }
    }

    /// Overnight hormone decay, proportional to hours slept.
    pub fn sleep(&mut self, sleep_hours: f64) {
        self.catabolic_hormone -=
            positive_log10(self.catabolic_hormone) * SLEEP_CATABOLIC_RECOVERY * sleep_hours;
        self.anabolic_hormone -=
            positive_log10(self.anabolic_hormone) * SLEEP_ANABOLIC_RECOVERY * sleep_hours;
    }

    /// Clamp both hormones into their configured ranges. Idempotent.
    pub fn regulate_hormones(&mut self, config: &MuscleConfig) {
        self.anabolic_hormone = self
            .anabolic_hormone
            .clamp(config.anabolic_hormone_min, config.anabolic_hormone_max);
        self.catabolic_hormone = self
            .catabolic_hormone
            .clamp(config.catabolic_hormone_min, config.catabolic_hormone_max);
    }

    /// Absorb the daily nutrient delivery, bounded by storage capacity.
    pub fn get_nutrient(&mut self, nutrient_gain: f64, nutrient_max: f64) {
        self.nutrient = (self.nutrient + nutrient_gain).clamp(0.0, nutrient_max);
    }

    /// Net growth: anabolic drive capped relative to the catabolic signal,
    /// minus the catabolic cost, bounded by stored nutrient. Only growth
    /// consumes nutrient; shrinkage is free. The size is then regulated
    /// back into `[1, max_size]`.
    pub fn develop_muscle(&mut self) {
        let anabolic_signal = positive_log10(self.anabolic_hormone);
        let catabolic_signal = positive_log10(self.catabolic_hormone);
        let mut delta = GROWTH_RATE
            * anabolic_signal.min(ANABOLIC_CEILING_FACTOR * catabolic_signal)
            - GROWTH_RATE * catabolic_signal;
        delta = delta.min(self.nutrient / NUTRIENT_PER_UNIT_GROWTH);
        if delta > 0.0 {
            self.nutrient -= delta * NUTRIENT_PER_UNIT_GROWTH;
        }
        self.fiber_size = (self.fiber_size + delta).clamp(FIBER_SIZE_FLOOR, self.max_size);
    }
}

/// The eight toroidally wrapped Moore neighbors of `(x, y)`.
///
/// Pure function of the coordinates and grid extent; on degenerate grids
/// (1×1, 1×N) wrapped coordinates repeat, and that multiplicity is exactly
/// what the diffusion exchange expects.
#[must_use]
pub fn moore_neighbors(x: u32, y: u32, width: u32, height: u32) -> [(u32, u32); 8] {
    let left = if x == 0 { width - 1 } else { x - 1 };
    let right = if x + 1 == width { 0 } else { x + 1 };
    let up = if y == 0 { height - 1 } else { y - 1 };
    let down = if y + 1 == height { 0 } else { y + 1 };
    [
        (left, up),
        (x, up),
        (right, up),
        (left, y),
        (right, y),
        (left, down),
        (x, down),
        (right, down),
    ]
}

/// Toroidal lattice of muscle fibers with Moore-neighborhood hormone
/// diffusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiberGrid {
    width: u32,
    height: u32,
    fibers: Vec<MuscleFiber>,
    #[serde(skip)]
    anabolic_scratch: Vec<f64>,
    #[serde(skip)]
    catabolic_scratch: Vec<f64>,
}

impl FiberGrid {
    /// Construct a grid with one spawned fiber per cell.
    pub fn new(config: &MuscleConfig, rng: &mut dyn RngCore) -> Result<Self, ModelError> {
        if config.width == 0 || config.height == 0 {
            return Err(ModelError::InvalidConfig(
                "grid dimensions must be non-zero",
            ));
        }
        let cell_count = config.cell_count();
        let fibers = (0..cell_count)
            .map(|_| MuscleFiber::spawn(config, rng))
            .collect();
        Ok(Self {
            width: config.width,
            height: config.height,
            fibers,
            anabolic_scratch: vec![0.0; cell_count],
            catabolic_scratch: vec![0.0; cell_count],
        })
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Number of cells in the lattice.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.fibers.len()
    }

    #[must_use]
    pub fn fibers(&self) -> &[MuscleFiber] {
        &self.fibers
    }

    #[must_use]
    pub fn fibers_mut(&mut self) -> &mut [MuscleFiber] {
        &mut self.fibers
    }

    /// Returns the flat index for `(x, y)` without bounds checks.
    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + (x as usize)
    }

    /// Immutable access to a specific cell.
    pub fn get(&self, x: u32, y: u32) -> Option<&MuscleFiber> {
        if x < self.width && y < self.height {
            Some(&self.fibers[self.offset(x, y)])
        } else {
            None
        }
    }

    /// Mutable access to a specific cell.
    pub fn get_mut(&mut self, x: u32, y: u32) -> Option<&mut MuscleFiber> {
        if x < self.width && y < self.height {
            let idx = self.offset(x, y);
            Some(&mut self.fibers[idx])
        } else {
            None
        }
    }

    /// One diffusion pass over both hormone fields.
    ///
    /// Every cell keeps `1 - rate` of each hormone and receives `rate / 8`
    /// of every Moore neighbor's pre-pass level. Sources are read from a
    /// scratch snapshot so the result is independent of cell visit order,
    /// and the wrapped neighborhood is symmetric, so grid totals are
    /// preserved exactly up to float rounding.
    pub fn diffuse_hormones(&mut self, rate: f64) {
        let len = self.fibers.len();
        if self.anabolic_scratch.len() != len {
            self.anabolic_scratch.resize(len, 0.0);
            self.catabolic_scratch.resize(len, 0.0);
        }
        for (idx, fiber) in self.fibers.iter().enumerate() {
            self.anabolic_scratch[idx] = fiber.anabolic_hormone;
            self.catabolic_scratch[idx] = fiber.catabolic_hormone;
        }

        let kept = 1.0 - rate;
        let share = rate / MOORE_NEIGHBOR_COUNT;
        for y in 0..self.height {
            for x in 0..self.width {
                let idx = self.offset(x, y);
                let mut anabolic = self.anabolic_scratch[idx] * kept;
                let mut catabolic = self.catabolic_scratch[idx] * kept;
                for (nx, ny) in moore_neighbors(x, y, self.width, self.height) {
                    let neighbor = self.offset(nx, ny);
                    anabolic += self.anabolic_scratch[neighbor] * share;
                    catabolic += self.catabolic_scratch[neighbor] * share;
                }
                let fiber = &mut self.fibers[idx];
                fiber.anabolic_hormone = anabolic;
                fiber.catabolic_hormone = catabolic;
            }
        }
    }
}

/// One row of population-level summary statistics for a single simulated
/// day. `muscle_mass` is the sum of all fiber sizes across the grid; the
/// hormone fields are grid means.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AggregateRecord {
    pub time: u64,
    pub muscle_mass: f64,
    pub anabolic_mean: f64,
    pub catabolic_mean: f64,
}

/// Sink invoked for every aggregate record as it is appended.
pub trait RecordSink: Send {
    fn on_record(&mut self, record: &AggregateRecord);
}

/// No-op record sink.
#[derive(Debug, Default)]
pub struct NullSink;

impl RecordSink for NullSink {
    fn on_record(&mut self, _record: &AggregateRecord) {}
}

/// Owns the fiber grid and advances it through the fixed daily pipeline.
pub struct MuscleModel {
    config: MuscleConfig,
    time: u64,
    rng: SmallRng,
    grid: FiberGrid,
    sleep_pattern: Normal<f64>,
    sleep_scratch: Vec<f64>,
    history: Vec<AggregateRecord>,
    sink: Box<dyn RecordSink>,
}

impl fmt::Debug for MuscleModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MuscleModel")
            .field("config", &self.config)
            .field("time", &self.time)
            .field("cell_count", &self.grid.cell_count())
            .field("history_len", &self.history.len())
            .finish()
    }
}

impl MuscleModel {
    /// Instantiate a new model using the supplied configuration.
    pub fn new(config: MuscleConfig) -> Result<Self, ModelError> {
        Self::with_sink(config, Box::new(NullSink))
    }

    /// Instantiate a new model that forwards every appended record to `sink`.
    pub fn with_sink(
        config: MuscleConfig,
        sink: Box<dyn RecordSink>,
    ) -> Result<Self, ModelError> {
        config.validate()?;
        let sleep_pattern = Normal::new(config.hours_of_sleep, config.sleep_variance)
            .map_err(|_| ModelError::InvalidConfig("sleep parameters must be finite"))?;
        let mut rng = config.seeded_rng();
        let grid = FiberGrid::new(&config, &mut rng)?;
        Ok(Self {
            config,
            time: 0,
            rng,
            grid,
            sleep_pattern,
            sleep_scratch: Vec::new(),
            history: Vec::new(),
            sink,
        })
    }

    /// Advance one simulated day and return the aggregate record it appended.
    pub fn step(&mut self) -> AggregateRecord {
        let pre_step = match self.config.aggregate_timing {
            AggregateTiming::PreStep => Some(self.capture_aggregates()),
            AggregateTiming::PostGrowth => None,
        };

        self.stage_daily_activity();
        self.stage_workout();
        self.stage_sleep();
        self.grid.diffuse_hormones(self.config.hormone_diffuse_rate);
        self.stage_regulation();
        self.stage_growth();

        let record = match pre_step {
            Some(record) => record,
            None => self.capture_aggregates(),
        };
        self.time += 1;
        record
    }

    /// Convenience driver: step `days` times and return the records this
    /// call appended.
    pub fn run(&mut self, days: u64) -> &[AggregateRecord] {
        let start = self.history.len();
        for _ in 0..days {
            self.step();
        }
        &self.history[start..]
    }

    fn stage_daily_activity(&mut self) {
        self.grid
            .fibers_mut()
            .par_iter_mut()
            .for_each(MuscleFiber::perform_daily_activity);
    }

    fn stage_workout(&mut self) {
        if !self.config.lift_weights {
            return;
        }
        if !self
            .time
            .is_multiple_of(u64::from(self.config.days_between_workouts))
        {
            return;
        }
        // Recruitment rolls consume the model RNG, so this loop stays
        // sequential in row-major order.
        let intensity = self.config.intensity;
        let rng = &mut self.rng;
        for fiber in self.grid.fibers_mut() {
            fiber.lift_weights(rng, intensity);
        }
    }

    fn stage_sleep(&mut self) {
        let cell_count = self.grid.cell_count();
        let longest_night = self.config.hours_of_sleep * 2.0;
        self.sleep_scratch.clear();
        for _ in 0..cell_count {
            // Redraw implausible durations; the window always has positive
            // mass around the configured mean.
            let hours = loop {
                let drawn = self.sleep_pattern.sample(&mut self.rng);
                if (0.0..=longest_night).contains(&drawn) {
                    break drawn;
                }
            };
            self.sleep_scratch.push(hours);
        }
        let hours = &self.sleep_scratch;
        self.grid
            .fibers_mut()
            .par_iter_mut()
            .zip(hours.par_iter())
            .for_each(|(fiber, &slept)| fiber.sleep(slept));
    }

    fn stage_regulation(&mut self) {
        let config = &self.config;
        self.grid
            .fibers_mut()
            .par_iter_mut()
            .for_each(|fiber| fiber.regulate_hormones(config));
    }

    fn stage_growth(&mut self) {
        let nutrient_gain = self.config.nutrient_gain;
        let nutrient_max = self.config.nutrient_max;
        self.grid.fibers_mut().par_iter_mut().for_each(|fiber| {
            fiber.get_nutrient(nutrient_gain, nutrient_max);
            fiber.develop_muscle();
        });
    }

    /// Compute, append, and forward one aggregate record for the current
    /// state.
    fn capture_aggregates(&mut self) -> AggregateRecord {
        // Sums fold sequentially so seeded replays stay bit-identical.
        let mut muscle_mass = 0.0;
        let mut anabolic_total = 0.0;
        let mut catabolic_total = 0.0;
        for fiber in self.grid.fibers() {
            muscle_mass += fiber.fiber_size;
            anabolic_total += fiber.anabolic_hormone;
            catabolic_total += fiber.catabolic_hormone;
        }
        let cell_count = self.grid.cell_count() as f64;
        let record = AggregateRecord {
            time: self.time,
            muscle_mass,
            anabolic_mean: anabolic_total / cell_count,
            catabolic_mean: catabolic_total / cell_count,
        };
        self.history.push(record);
        self.sink.on_record(&record);
        record
    }

    /// Returns an immutable reference to configuration.
    #[must_use]
    pub fn config(&self) -> &MuscleConfig {
        &self.config
    }

    /// Days simulated so far.
    #[must_use]
    pub const fn time(&self) -> u64 {
        self.time
    }

    /// Read-only access to the fiber grid.
    #[must_use]
    pub fn grid(&self) -> &FiberGrid {
        &self.grid
    }

    /// Mutable access to the fiber grid (for pinning states in tests and
    /// tooling).
    #[must_use]
    pub fn grid_mut(&mut self) -> &mut FiberGrid {
        &mut self.grid
    }

    /// The append-only aggregate history, one record per executed step.
    #[must_use]
    pub fn history(&self) -> &[AggregateRecord] {
        &self.history
    }

    /// Replace the record sink.
    pub fn set_sink(&mut self, sink: Box<dyn RecordSink>) {
        self.sink = sink;
    }
}
