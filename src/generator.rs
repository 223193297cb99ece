//! Synthetic reading generation.
//!
//! A [`ReadingSource`] turns a sensor's [`SimulationState`] into a fresh
//! [`Reading`], advancing the tick counter as its only side effect. The
//! environmental source models a daily sine cycle around fixed baselines
//! with bounded uniform noise per channel.

use std::f64::consts::PI;

use rand::Rng;

use crate::models::{Reading, GAS_LEVEL, HUMIDITY, TEMPERATURE};

// ---

/// Ticks per simulated day (one tick per minute).
pub const DEFAULT_DAY_PERIOD_TICKS: u64 = 24 * 60;

pub const TEMPERATURE_NOISE: f64 = 0.5;
pub const HUMIDITY_NOISE: f64 = 2.0;
pub const GAS_NOISE: f64 = 10.0;

const TEMPERATURE_AMPLITUDE: f64 = 3.0;
const HUMIDITY_AMPLITUDE: f64 = 5.0;

const TEMPERATURE_RANGE: (f64, f64) = (-10.0, 40.0);
const HUMIDITY_RANGE: (f64, f64) = (0.0, 100.0);
const GAS_FLOOR: f64 = 0.0;

/// Resting value of each channel before periodic and noise components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    // ---
    pub temperature: f64,
    pub humidity: f64,
    pub gas_level: f64,
}

impl Default for Baseline {
    fn default() -> Self {
        Self {
            temperature: 22.0,
            humidity: 45.0,
            gas_level: 400.0,
        }
    }
}

/// Mutable generator state, owned by exactly one sensor.
#[derive(Debug, Clone)]
pub struct SimulationState {
    // ---
    tick: u64,
    baseline: Baseline,
    day_period_ticks: u64,
}

impl SimulationState {
    // ---
    pub fn new(baseline: Baseline) -> Self {
        Self::with_period(baseline, DEFAULT_DAY_PERIOD_TICKS)
    }

    /// A zero period is treated as one tick so the phase stays finite.
    pub fn with_period(baseline: Baseline, day_period_ticks: u64) -> Self {
        Self {
            tick: 0,
            baseline,
            day_period_ticks: day_period_ticks.max(1),
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    /// Position in the daily cycle for the current tick, in `[-1, 1]`.
    pub fn daily_variation(&self) -> f64 {
        // ---
        let phase = (self.tick % self.day_period_ticks) as f64 / self.day_period_ticks as f64;
        (2.0 * PI * phase).sin()
    }

    /// Move to the next tick. Wraps instead of overflowing.
    pub fn advance(&mut self) {
        self.tick = self.tick.wrapping_add(1);
    }

    #[cfg(test)]
    pub(crate) fn set_tick(&mut self, tick: u64) {
        self.tick = tick;
    }
}

/// Capability to produce one reading from simulation state.
pub trait ReadingSource: Send {
    /// Produce a reading for the current tick and advance the counter by one.
    fn generate(&mut self, state: &mut SimulationState) -> Reading;
}

/// Source of bounded noise.
pub trait NoiseSource: Send {
    /// A value in `[-bound, bound]`.
    fn sample(&mut self, bound: f64) -> f64;
}

/// Uniform noise from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomNoise;

impl NoiseSource for RandomNoise {
    fn sample(&mut self, bound: f64) -> f64 {
        rand::rng().random_range(-bound..=bound)
    }
}

/// No noise at all; makes generation deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroNoise;

impl NoiseSource for ZeroNoise {
    fn sample(&mut self, _bound: f64) -> f64 {
        0.0
    }
}

/// Temperature, humidity and gas level around a baseline.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentalSource<N = RandomNoise> {
    noise: N,
}

impl EnvironmentalSource {
    pub fn new() -> Self {
        Self { noise: RandomNoise }
    }
}

impl<N: NoiseSource> EnvironmentalSource<N> {
    pub fn with_noise(noise: N) -> Self {
        Self { noise }
    }
}

impl<N: NoiseSource> ReadingSource for EnvironmentalSource<N> {
    fn generate(&mut self, state: &mut SimulationState) -> Reading {
        // ---
        let daily = state.daily_variation();
        let base = *state.baseline();

        let temperature = base.temperature
            + daily * TEMPERATURE_AMPLITUDE
            + self.noise.sample(TEMPERATURE_NOISE);
        let humidity =
            base.humidity + daily * HUMIDITY_AMPLITUDE + self.noise.sample(HUMIDITY_NOISE);
        let gas_level = base.gas_level + self.noise.sample(GAS_NOISE);

        let temperature = round2(temperature.clamp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1));
        let humidity = round2(humidity.clamp(HUMIDITY_RANGE.0, HUMIDITY_RANGE.1));
        let gas_level = round2(gas_level.max(GAS_FLOOR));

        state.advance();

        Reading::new()
            .with_channel(TEMPERATURE, temperature, "celsius")
            .with_channel(HUMIDITY, humidity, "percent")
            .with_channel(GAS_LEVEL, gas_level, "ppm")
    }
}

/// Round to two decimal digits, the canonical output precision. Exact
/// ties go to the even digit.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    /// Always returns the extreme of the allowed range.
    struct MaxNoise(f64);

    impl NoiseSource for MaxNoise {
        fn sample(&mut self, bound: f64) -> f64 {
            bound * self.0
        }
    }

    fn has_two_decimals(v: f64) -> bool {
        // ---
        (v * 100.0 - (v * 100.0).round()).abs() < 1e-6
    }

    fn assert_in_range(reading: &Reading) {
        // ---
        let t = reading.value(TEMPERATURE).unwrap();
        let h = reading.value(HUMIDITY).unwrap();
        let g = reading.value(GAS_LEVEL).unwrap();

        assert!((-10.0..=40.0).contains(&t), "temperature {} out of range", t);
        assert!((0.0..=100.0).contains(&h), "humidity {} out of range", h);
        assert!(g >= 0.0, "gas level {} below zero", g);
        for v in [t, h, g] {
            assert!(has_two_decimals(v), "{} not rounded to 2 decimals", v);
        }
    }

    #[test]
    fn test_outputs_stay_in_range_over_full_days() {
        // ---
        let baselines = [
            Baseline::default(),
            Baseline {
                temperature: 39.0,
                humidity: 99.0,
                gas_level: 3.0,
            },
            Baseline {
                temperature: -9.5,
                humidity: 1.0,
                gas_level: 0.0,
            },
            Baseline {
                temperature: 500.0,
                humidity: -500.0,
                gas_level: -500.0,
            },
        ];

        for baseline in baselines {
            let mut state = SimulationState::new(baseline);
            let mut source = EnvironmentalSource::new();
            for _ in 0..(3 * DEFAULT_DAY_PERIOD_TICKS) {
                assert_in_range(&source.generate(&mut state));
            }
        }
    }

    #[test]
    fn test_extreme_noise_is_clamped() {
        // ---
        for sign in [-1.0, 1.0] {
            let mut state = SimulationState::new(Baseline {
                temperature: 40.0 * sign,
                humidity: 50.0 + 50.0 * sign,
                gas_level: 5.0,
            });
            let mut source = EnvironmentalSource::with_noise(MaxNoise(sign));
            for _ in 0..DEFAULT_DAY_PERIOD_TICKS {
                assert_in_range(&source.generate(&mut state));
            }
        }
    }

    #[test]
    fn test_gas_level_has_no_upper_bound() {
        // ---
        let mut state = SimulationState::new(Baseline {
            gas_level: 25_000.0,
            ..Baseline::default()
        });
        let reading = EnvironmentalSource::with_noise(ZeroNoise).generate(&mut state);
        assert_eq!(reading.value(GAS_LEVEL), Some(25_000.0));
    }

    #[test]
    fn test_noise_bounds_are_observable() {
        // ---
        let mut state = SimulationState::new(Baseline::default());
        let reading = EnvironmentalSource::with_noise(MaxNoise(1.0)).generate(&mut state);

        // Tick 0 has no periodic component
        assert_eq!(reading.value(TEMPERATURE), Some(22.5));
        assert_eq!(reading.value(HUMIDITY), Some(47.0));
        assert_eq!(reading.value(GAS_LEVEL), Some(410.0));
    }

    #[test]
    fn test_counter_advances_by_one_per_call() {
        // ---
        let mut state = SimulationState::new(Baseline::default());
        let mut source = EnvironmentalSource::new();

        for expected in 0..100u64 {
            assert_eq!(state.tick(), expected);
            source.generate(&mut state);
            assert_eq!(state.tick(), expected + 1);
        }
    }

    #[test]
    fn test_counter_wraps_instead_of_panicking() {
        // ---
        let mut state = SimulationState::new(Baseline::default());
        state.set_tick(u64::MAX);

        let reading = EnvironmentalSource::new().generate(&mut state);
        assert_eq!(state.tick(), 0);
        assert_in_range(&reading);
    }

    #[test]
    fn test_zero_noise_is_deterministic() {
        // ---
        for tick in [0, 1, 359, 360, 720, 1439, 123_456] {
            let mut a = SimulationState::new(Baseline::default());
            let mut b = SimulationState::new(Baseline::default());
            a.set_tick(tick);
            b.set_tick(tick);

            let ra = EnvironmentalSource::with_noise(ZeroNoise).generate(&mut a);
            let rb = EnvironmentalSource::with_noise(ZeroNoise).generate(&mut b);

            assert_eq!(ra, rb);
            assert_eq!(
                serde_json::to_vec(&ra).unwrap(),
                serde_json::to_vec(&rb).unwrap()
            );
        }
    }

    #[test]
    fn test_base_temperature_at_tick_zero() {
        // ---
        let mut state = SimulationState::new(Baseline {
            temperature: 22.0,
            humidity: 45.0,
            gas_level: 400.0,
        });
        let reading = EnvironmentalSource::with_noise(ZeroNoise).generate(&mut state);

        assert_eq!(reading.value(TEMPERATURE), Some(22.0));
        assert_eq!(reading.value(HUMIDITY), Some(45.0));
        assert_eq!(reading.value(GAS_LEVEL), Some(400.0));
    }

    #[test]
    fn test_daily_cycle_peaks_at_quarter_day() {
        // ---
        let mut state = SimulationState::new(Baseline::default());
        state.set_tick(DEFAULT_DAY_PERIOD_TICKS / 4);
        let reading = EnvironmentalSource::with_noise(ZeroNoise).generate(&mut state);

        assert_eq!(reading.value(TEMPERATURE), Some(25.0));
        assert_eq!(reading.value(HUMIDITY), Some(50.0));
        // Gas has no periodic component
        assert_eq!(reading.value(GAS_LEVEL), Some(400.0));
    }

    #[test]
    fn test_units() {
        // ---
        let mut state = SimulationState::new(Baseline::default());
        let reading = EnvironmentalSource::new().generate(&mut state);

        assert_eq!(reading.unit(TEMPERATURE), Some("celsius"));
        assert_eq!(reading.unit(HUMIDITY), Some("percent"));
        assert_eq!(reading.unit(GAS_LEVEL), Some("ppm"));
    }

    #[test]
    fn test_round2() {
        // ---
        assert_eq!(round2(22.0), 22.0);
        assert_eq!(round2(21.456), 21.46);
        assert_eq!(round2(-3.334), -3.33);

        // Exact ties
        assert_eq!(round2(22.125), 22.12);
        assert_eq!(round2(22.375), 22.38);
        assert_eq!(round2(-0.125), -0.12);
    }

    #[test]
    fn test_ties_round_to_even_in_readings() {
        // ---
        let mut state = SimulationState::new(Baseline {
            temperature: 22.125,
            humidity: 45.125,
            gas_level: 400.375,
        });
        let reading = EnvironmentalSource::with_noise(ZeroNoise).generate(&mut state);

        assert_eq!(reading.value(TEMPERATURE), Some(22.12));
        assert_eq!(reading.value(HUMIDITY), Some(45.12));
        assert_eq!(reading.value(GAS_LEVEL), Some(400.38));
    }
}
