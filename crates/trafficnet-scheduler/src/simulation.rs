// TRAFFIC SIMULATION
// Seeded generators for batch telemetry and live monitoring
//
// SAFETY INVARIANTS:
// 1. Same seed => same observations, same schedule
// 2. Inactive nodes always report zero volume and Down health
// 3. Outage and DDoS events only strike active nodes

use chrono::{Duration, NaiveDateTime, Timelike};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use trafficnet_core::block::is_peak_hour;
use trafficnet_core::{EventKind, HealthLayer, HealthStatus, TrafficKind, TrafficLayer};

/// Event probability multiplier for batch telemetry.
const CONGESTION_PROBABILITY: f64 = 0.15;
const OUTAGE_PROBABILITY: f64 = 0.05;
const DDOS_PROBABILITY: f64 = 0.02;
const STEP_SECONDS: i64 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub traffic: TrafficLayer,
    pub health: HealthLayer,
    pub event: EventKind,
}

impl Observation {
    fn silent(kind: TrafficKind, event: EventKind) -> Self {
        Observation {
            traffic: TrafficLayer { kind, volume: 0.0 },
            health: HealthLayer { status: HealthStatus::Down, latency: 0.0 },
            event,
        }
    }
}

pub fn peak_probability(timestamp: &NaiveDateTime) -> f64 {
    let hour = timestamp.hour() as f64 + timestamp.minute() as f64 / 60.0;
    if is_peak_hour(hour) {
        0.3
    } else {
        0.05
    }
}

fn delayed_or_down<R: Rng>(rng: &mut R) -> HealthStatus {
    if rng.gen::<f64>() < 0.5 {
        HealthStatus::Delayed
    } else {
        HealthStatus::Down
    }
}

fn simulated_kind<R: Rng>(rng: &mut R) -> TrafficKind {
    *TrafficKind::SIMULATED.choose(rng).unwrap_or(&TrafficKind::Data)
}

/// Batch telemetry generator: fixed time steps from a start time.
pub struct TrafficSimulator {
    rng: StdRng,
    start: NaiveDateTime,
}

impl TrafficSimulator {
    pub fn new(seed: u64, start: NaiveDateTime) -> Self {
        TrafficSimulator {
            rng: StdRng::seed_from_u64(seed ^ 0x7e1e_3e7a),
            start,
        }
    }

    /// (timestamp, node) pairs: every node once per step, shuffled within the step.
    pub fn schedule(&mut self, node_ids: &[String], time_steps: usize) -> Vec<(NaiveDateTime, String)> {
        let mut tasks = Vec::with_capacity(node_ids.len() * time_steps);
        for step in 0..time_steps {
            let timestamp = self.start + Duration::seconds(step as i64 * STEP_SECONDS);
            let mut order: Vec<&String> = node_ids.iter().collect();
            order.shuffle(&mut self.rng);
            tasks.extend(order.into_iter().map(|id| (timestamp, id.clone())));
        }
        tasks
    }

    pub fn observe(&mut self, timestamp: &NaiveDateTime) -> Observation {
        let kind = simulated_kind(&mut self.rng);
        let (volume, status) = if self.rng.gen::<f64>() < CONGESTION_PROBABILITY * peak_probability(timestamp) {
            (self.rng.gen_range(80.0..150.0), delayed_or_down(&mut self.rng))
        } else {
            (self.rng.gen_range(1.0..60.0), HealthStatus::Normal)
        };
        let latency = self.rng.gen_range(0.1..10.0);
        Observation {
            traffic: TrafficLayer { kind, volume },
            health: HealthLayer { status, latency },
            event: EventKind::Normal,
        }
    }
}

/// Live generator with outage and DDoS scenarios.
pub struct LiveSimulator {
    rng: StdRng,
}

impl LiveSimulator {
    pub fn new(seed: u64) -> Self {
        LiveSimulator {
            rng: StdRng::seed_from_u64(seed ^ 0x11fe_5eed),
        }
    }

    pub fn pick_node<'a>(&mut self, node_ids: &'a [String]) -> Option<&'a String> {
        node_ids.choose(&mut self.rng)
    }

    /// Roll for an outage or DDoS on an active node.
    fn roll_event(&mut self, active: bool, kind: TrafficKind) -> Option<Observation> {
        if !active {
            return None;
        }
        if self.rng.gen::<f64>() < OUTAGE_PROBABILITY {
            return Some(Observation::silent(kind, EventKind::Outage));
        }
        if self.rng.gen::<f64>() < DDOS_PROBABILITY {
            return Some(Observation {
                traffic: TrafficLayer { kind, volume: self.rng.gen_range(300.0..500.0) },
                health: HealthLayer {
                    status: HealthStatus::Delayed,
                    latency: self.rng.gen_range(20.0..50.0),
                },
                event: EventKind::Ddos,
            });
        }
        None
    }

    /// Fresh live observation for a node.
    pub fn observe(&mut self, active: bool, timestamp: &NaiveDateTime) -> Observation {
        let kind = simulated_kind(&mut self.rng);
        if let Some(event) = self.roll_event(active, kind) {
            return event;
        }
        if !active {
            return Observation::silent(kind, EventKind::Normal);
        }
        if self.rng.gen::<f64>() < peak_probability(timestamp) {
            Observation {
                traffic: TrafficLayer { kind, volume: self.rng.gen_range(80.0..200.0) },
                health: HealthLayer {
                    status: delayed_or_down(&mut self.rng),
                    latency: self.rng.gen_range(5.0..30.0),
                },
                event: EventKind::Normal,
            }
        } else {
            Observation {
                traffic: TrafficLayer { kind, volume: self.rng.gen_range(0.0..60.0) },
                health: HealthLayer {
                    status: HealthStatus::Normal,
                    latency: self.rng.gen_range(0.0..10.0),
                },
                event: EventKind::Normal,
            }
        }
    }

    /// Apply live scenarios on top of a recorded observation.
    pub fn overlay(&mut self, active: bool, recorded: Observation) -> Observation {
        if let Some(event) = self.roll_event(active, recorded.traffic.kind) {
            return event;
        }
        if active {
            recorded
        } else {
            Observation::silent(recorded.traffic.kind, recorded.event)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trafficnet_core::block::genesis_timestamp;

    fn ids(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("Node_{}", i)).collect()
    }

    #[test]
    fn test_schedule_visits_every_node_each_step() {
        let mut sim = TrafficSimulator::new(42, genesis_timestamp());
        let tasks = sim.schedule(&ids(10), 3);
        assert_eq!(tasks.len(), 30);
        for step in tasks.chunks(10) {
            let mut nodes: Vec<&String> = step.iter().map(|(_, n)| n).collect();
            nodes.sort();
            nodes.dedup();
            assert_eq!(nodes.len(), 10);
            assert!(step.iter().all(|(t, _)| *t == step[0].0));
        }
        assert_eq!(tasks[10].0 - tasks[0].0, Duration::seconds(5));
    }

    #[test]
    fn test_batch_observation_ranges() {
        let mut sim = TrafficSimulator::new(7, genesis_timestamp());
        let noon = genesis_timestamp() + Duration::hours(5);
        for _ in 0..500 {
            let obs = sim.observe(&noon);
            assert!((0.1..10.0).contains(&obs.health.latency));
            assert_ne!(obs.traffic.kind, TrafficKind::Priority);
            match obs.health.status {
                HealthStatus::Normal => assert!((1.0..60.0).contains(&obs.traffic.volume)),
                _ => assert!((80.0..150.0).contains(&obs.traffic.volume)),
            }
        }
    }

    #[test]
    fn test_inactive_nodes_are_silent() {
        let mut sim = LiveSimulator::new(3);
        for _ in 0..100 {
            let obs = sim.observe(false, &genesis_timestamp());
            assert_eq!(obs.traffic.volume, 0.0);
            assert_eq!(obs.health.status, HealthStatus::Down);
            assert_eq!(obs.event, EventKind::Normal);
        }
    }

    #[test]
    fn test_live_events_occur() {
        let mut sim = LiveSimulator::new(11);
        let mut outages = 0;
        let mut ddos = 0;
        for _ in 0..4000 {
            match sim.observe(true, &genesis_timestamp()).event {
                EventKind::Outage => outages += 1,
                EventKind::Ddos => ddos += 1,
                EventKind::Normal => {}
            }
        }
        assert!((120..280).contains(&outages), "outages {}", outages);
        assert!((30..130).contains(&ddos), "ddos {}", ddos);
    }

    #[test]
    fn test_peak_hours() {
        let seven = genesis_timestamp();
        assert_eq!(peak_probability(&seven), 0.05);
        assert_eq!(peak_probability(&(seven + Duration::hours(1))), 0.3);
        assert_eq!(peak_probability(&(seven + Duration::hours(11))), 0.05);
    }
}
