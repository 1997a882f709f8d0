//! Random-walk flight simulator.
//!
//! Produces a plausible stream of position, attitude, battery, GPS and
//! heartbeat events without any vehicle attached, starting over Atlanta.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use telemhub_core::{category, Event, EventSource};
use telemhub_types::now_ms;
use tokio::time::{self, Interval, MissedTickBehavior};

const START_LAT: f64 = 33.7490;
const START_LON: f64 = -84.3880;

/// Largest per-tick step of latitude and longitude, in degrees.
const POSITION_STEP: f64 = 0.00005;
const ALTITUDE_STEP: f64 = 0.5;
const YAW_STEP: f64 = 2.0;
const MAX_TILT: f64 = 5.0;

/// GPS fix type reported by the simulator (RTK fixed).
const RTK_FIXED: i64 = 6;

/// Simulated vehicle state.
#[derive(Debug)]
pub struct Simulator {
    rng: StdRng,
    lat: f64,
    lon: f64,
    alt: f64,
    yaw: f64,
}

impl Simulator {
    /// Create a simulator; a fixed `seed` makes the walk reproducible.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            lat: START_LAT,
            lon: START_LON,
            alt: 0.0,
            yaw: 0.0,
        }
    }

    /// Advance one tick and return one event per category, stamped `now_ms`.
    pub fn step(&mut self, now_ms: u64) -> Vec<Event> {
        self.lat += self.rng.gen_range(-POSITION_STEP..=POSITION_STEP);
        self.lon += self.rng.gen_range(-POSITION_STEP..=POSITION_STEP);
        self.alt = (self.alt + self.rng.gen_range(-ALTITUDE_STEP..=ALTITUDE_STEP)).max(0.0);
        self.yaw = (self.yaw + self.rng.gen_range(-YAW_STEP..=YAW_STEP)).rem_euclid(360.0);

        let position = Event::builder(category::POSITION)
            .field("lat", self.lat)
            .field("lon", self.lon)
            .field("alt", self.alt)
            .received_at_ms(now_ms)
            .build();

        let attitude = Event::builder(category::ATTITUDE)
            .field("roll", self.rng.gen_range(-MAX_TILT..=MAX_TILT))
            .field("pitch", self.rng.gen_range(-MAX_TILT..=MAX_TILT))
            .field("yaw", self.yaw)
            .received_at_ms(now_ms)
            .build();

        let battery = Event::builder(category::BATTERY)
            .field("voltage", round2(self.rng.gen_range(11.8..=12.6)))
            .field("current", round2(self.rng.gen_range(7.0..=15.0)))
            .field("remaining", battery_remaining(now_ms))
            .received_at_ms(now_ms)
            .build();

        let gps = Event::builder(category::GPS_STATUS)
            .field("fix_type", RTK_FIXED)
            .field("satellites_visible", self.rng.gen_range(10_i64..=15))
            .received_at_ms(now_ms)
            .build();

        let heartbeat = Event::builder(category::HEARTBEAT)
            .field("armed", true)
            .field("mode", "GUIDED")
            .received_at_ms(now_ms)
            .build();

        vec![position, attitude, battery, gps, heartbeat]
    }
}

/// Battery percentage draining from 90 to 31 over each ten-minute cycle.
fn battery_remaining(now_ms: u64) -> i64 {
    let cycle_secs = (now_ms % 600_000) as f64 / 1000.0;
    (90.0 - cycle_secs / 10.0) as i64
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// [`EventSource`] emitting one simulator step per tick.
///
/// Events of a step are handed out one at a time; the next step is only
/// computed once the previous one is exhausted and the tick has elapsed.
#[derive(Debug)]
pub struct SimulatedSource {
    simulator: Simulator,
    ticker: Interval,
    pending: VecDeque<Event>,
}

impl SimulatedSource {
    pub fn new(tick: Duration, seed: Option<u64>) -> Self {
        let mut ticker = time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            simulator: Simulator::new(seed),
            ticker,
            pending: VecDeque::new(),
        }
    }
}

#[async_trait]
impl EventSource for SimulatedSource {
    async fn next_event(&mut self) -> Option<Event> {
        if self.pending.is_empty() {
            self.ticker.tick().await;
            self.pending.extend(self.simulator.step(now_ms()));
        }
        self.pending.pop_front()
    }
}
