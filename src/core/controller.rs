use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::event::{Event, EventQueue, Priority};
use super::resource::Resource;
use super::types::{ResourceId, UnitId};
use super::unit::{ProductionUnit, ThrottleCell, ThrottleState};

/// Condition that ends the whole run. Any firing rule terminates every unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationRule {
    /// A resource has been drained to zero.
    ResourceEmpty(ResourceId),
    /// A resource has reached its maximum capacity.
    ResourceFull(ResourceId),
    /// Wall-clock limit on the run.
    MaxRuntime { ms: u64 },
}

/// Tunable knobs for the controller's feedback loop. Thresholds are scenario
/// parameters, not core contracts, so they live in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerPolicy {
    /// How long a single empty-queue wait lasts before termination rules are
    /// rechecked.
    pub poll_interval_ms: u64,
    /// With no events for this long, every live unit drifts back to
    /// `Standard`.
    pub quiet_window_ms: u64,
    /// On a shortage, speed up the unit *producing* the scarce resource
    /// when one exists; otherwise the starving unit itself is boosted.
    pub boost_upstream: bool,
    pub termination: Vec<TerminationRule>,
}

impl Default for ControllerPolicy {
    fn default() -> Self {
        Self {
            poll_interval_ms: 20,
            quiet_window_ms: 500,
            boost_upstream: true,
            termination: Vec::new(),
        }
    }
}

/// Observer hooks for simulation activity. Reporting and printing live
/// outside the core; implementations receive the raw values and decide how
/// to present them.
pub trait SimulationObserver: Send {
    /// Called for every event the controller drains from the queue.
    fn on_event(&mut self, _event: &Event) {}

    /// Called when the controller changes a unit's throttle state.
    fn on_throttle_change(&mut self, _unit: &str, _state: ThrottleState) {}

    /// Called once when a termination rule fires.
    fn on_shutdown(&mut self, _rule: &TerminationRule) {}
}

/// Per-unit record the controller steers: the shared throttle handle plus
/// the resource wiring needed to route shortage events upstream.
struct Governor {
    name: UnitId,
    throttle: Arc<ThrottleCell>,
    produces: Option<ResourceId>,
}

/// The supervising actor: drains the event queue and adapts unit throttle
/// states to restore balance, until a termination rule fires.
///
/// The controller is the sole writer of throttle state; units only read it.
pub struct Controller {
    resources: Vec<Arc<Resource>>,
    governors: Vec<Governor>,
    queue: Arc<EventQueue>,
    policy: ControllerPolicy,
    observers: Vec<Box<dyn SimulationObserver>>,
}

impl Controller {
    pub fn new(
        resources: Vec<Arc<Resource>>,
        units: &[ProductionUnit],
        queue: Arc<EventQueue>,
        policy: ControllerPolicy,
    ) -> Self {
        let governors = units
            .iter()
            .map(|unit| Governor {
                name: unit.name().to_string(),
                throttle: unit.throttle(),
                produces: unit.produced().map(|ra| ra.resource().name().to_string()),
            })
            .collect();
        Self {
            resources,
            governors,
            queue,
            policy,
            observers: Vec::new(),
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn SimulationObserver>) {
        self.observers.push(observer);
    }

    pub fn resources(&self) -> &[Arc<Resource>] {
        &self.resources
    }

    /// Blocking entry point: apply policy to drained events until a
    /// termination rule fires, then set every unit to `Terminate` and exit.
    pub fn run(&mut self) {
        let started = Instant::now();
        let poll = Duration::from_millis(self.policy.poll_interval_ms);
        let quiet = Duration::from_millis(self.policy.quiet_window_ms);
        let mut last_event = Instant::now();

        info!("controller started ({} units)", self.governors.len());
        loop {
            if let Some(rule) = self.fired_termination(started) {
                self.shutdown(&rule);
                return;
            }

            match self.queue.pop_timeout(poll) {
                Some(event) => {
                    last_event = Instant::now();
                    self.handle_event(&event);
                }
                None => {
                    if last_event.elapsed() >= quiet {
                        self.restore_standard();
                        last_event = Instant::now();
                    }
                }
            }
        }
    }

    /// Apply the feedback policy to one event: shortages speed up supply,
    /// overflow slows the producer down.
    pub fn handle_event(&mut self, event: &Event) {
        debug!(
            "event from {}: {:?} on {} (amount {})",
            event.source, event.status, event.resource, event.amount
        );
        for observer in &mut self.observers {
            observer.on_event(event);
        }

        let source = self
            .governors
            .iter()
            .position(|g| g.name == event.source);

        let target = match event.priority {
            Priority::High => {
                let upstream = if self.policy.boost_upstream {
                    self.governors
                        .iter()
                        .position(|g| g.produces.as_deref() == Some(event.resource.as_str()))
                } else {
                    None
                };
                upstream.or(source).map(|idx| (idx, ThrottleState::Fast))
            }
            Priority::Low => source.map(|idx| (idx, ThrottleState::Slow)),
        };

        if let Some((idx, state)) = target {
            self.steer(idx, state);
        }
    }

    /// Move one step toward `desired` along the throttle state machine.
    /// `Slow` and `Fast` are only reachable from `Standard`, so an
    /// opposite-direction adjustment lands on `Standard` first.
    fn steer(&mut self, idx: usize, desired: ThrottleState) {
        let current = self.governors[idx].throttle.get();
        let next = match (current, desired) {
            (ThrottleState::Fast, ThrottleState::Slow)
            | (ThrottleState::Slow, ThrottleState::Fast) => ThrottleState::Standard,
            _ => desired,
        };
        self.set_throttle(idx, next);
    }

    /// Check the termination rules, returning the first that fires.
    pub fn fired_termination(&self, started: Instant) -> Option<TerminationRule> {
        self.policy
            .termination
            .iter()
            .find(|rule| match rule {
                TerminationRule::ResourceEmpty(id) => {
                    self.resource(id).map_or(false, |r| r.amount() == 0)
                }
                TerminationRule::ResourceFull(id) => {
                    self.resource(id).map_or(false, |r| r.amount() >= r.capacity())
                }
                TerminationRule::MaxRuntime { ms } => {
                    started.elapsed() >= Duration::from_millis(*ms)
                }
            })
            .cloned()
    }

    fn resource(&self, id: &str) -> Option<&Arc<Resource>> {
        self.resources.iter().find(|r| r.name() == id)
    }

    fn set_throttle(&mut self, idx: usize, state: ThrottleState) {
        let previous = self.governors[idx].throttle.set(state);
        if previous != state && previous != ThrottleState::Terminate {
            let name = self.governors[idx].name.clone();
            debug!("throttle {}: {:?} -> {:?}", name, previous, state);
            for observer in &mut self.observers {
                observer.on_throttle_change(&name, state);
            }
        }
    }

    /// Quiet window elapsed: drift every live unit back to `Standard`.
    fn restore_standard(&mut self) {
        for idx in 0..self.governors.len() {
            self.set_throttle(idx, ThrottleState::Standard);
        }
    }

    fn shutdown(&mut self, rule: &TerminationRule) {
        info!("termination rule fired: {:?}", rule);
        for governor in &self.governors {
            governor.throttle.set(ThrottleState::Terminate);
        }
        for observer in &mut self.observers {
            observer.on_shutdown(rule);
        }
        // remaining events are moot once every unit is stopping
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resource::{ResourceAmount, ResourceStatus};

    struct Rig {
        controller: Controller,
        throttles: Vec<Arc<ThrottleCell>>,
    }

    /// Generator produces Energy; Consumer burns Energy and makes nothing.
    fn feedback_rig(policy: ControllerPolicy) -> Rig {
        let queue = Arc::new(EventQueue::new());
        let energy = Arc::new(Resource::new("Energy", 30, 50));
        let generator = ProductionUnit::new(
            "Generator",
            None,
            Some(ResourceAmount::new(energy.clone(), 10)),
            Duration::ZERO,
            queue.clone(),
        );
        let consumer = ProductionUnit::new(
            "Consumer",
            Some(ResourceAmount::new(energy.clone(), 7)),
            None,
            Duration::ZERO,
            queue.clone(),
        );
        let throttles = vec![generator.throttle(), consumer.throttle()];
        let controller = Controller::new(
            vec![energy],
            &[generator, consumer],
            queue,
            policy,
        );
        Rig {
            controller,
            throttles,
        }
    }

    fn shortage() -> Event {
        Event::new(
            "Consumer",
            "Energy",
            ResourceStatus::Insufficient,
            Priority::High,
            7,
        )
    }

    #[test]
    fn shortage_boosts_upstream_producer() {
        let mut rig = feedback_rig(ControllerPolicy::default());
        rig.controller.handle_event(&shortage());
        assert_eq!(rig.throttles[0].get(), ThrottleState::Fast);
        assert_eq!(rig.throttles[1].get(), ThrottleState::Standard);
    }

    #[test]
    fn shortage_boosts_source_when_upstream_routing_is_off() {
        let policy = ControllerPolicy {
            boost_upstream: false,
            ..ControllerPolicy::default()
        };
        let mut rig = feedback_rig(policy);
        rig.controller.handle_event(&shortage());
        assert_eq!(rig.throttles[0].get(), ThrottleState::Standard);
        assert_eq!(rig.throttles[1].get(), ThrottleState::Fast);
    }

    #[test]
    fn overflow_slows_the_offending_unit() {
        let mut rig = feedback_rig(ControllerPolicy::default());
        rig.controller.handle_event(&Event::new(
            "Generator",
            "Energy",
            ResourceStatus::CapacityFull,
            Priority::Low,
            4,
        ));
        assert_eq!(rig.throttles[0].get(), ThrottleState::Slow);
        assert_eq!(rig.throttles[1].get(), ThrottleState::Standard);
    }

    #[test]
    fn overflow_steps_a_fast_unit_down_through_standard() {
        let mut rig = feedback_rig(ControllerPolicy::default());
        // generator already running fast when its sink overflows
        rig.throttles[0].set(ThrottleState::Fast);
        let overflow = Event::new(
            "Generator",
            "Energy",
            ResourceStatus::CapacityFull,
            Priority::Low,
            4,
        );

        rig.controller.handle_event(&overflow);
        assert_eq!(rig.throttles[0].get(), ThrottleState::Standard);

        // a second overflow completes the step down
        rig.controller.handle_event(&overflow);
        assert_eq!(rig.throttles[0].get(), ThrottleState::Slow);
    }

    #[test]
    fn shortage_steps_a_slow_producer_up_through_standard() {
        let mut rig = feedback_rig(ControllerPolicy::default());
        rig.throttles[0].set(ThrottleState::Slow);

        rig.controller.handle_event(&shortage());
        assert_eq!(rig.throttles[0].get(), ThrottleState::Standard);

        rig.controller.handle_event(&shortage());
        assert_eq!(rig.throttles[0].get(), ThrottleState::Fast);
    }

    #[test]
    fn quiet_window_restores_standard() {
        let mut rig = feedback_rig(ControllerPolicy::default());
        rig.controller.handle_event(&shortage());
        assert_eq!(rig.throttles[0].get(), ThrottleState::Fast);

        rig.controller.restore_standard();
        assert_eq!(rig.throttles[0].get(), ThrottleState::Standard);
        assert_eq!(rig.throttles[1].get(), ThrottleState::Standard);
    }

    #[test]
    fn events_from_unknown_units_are_ignored() {
        let mut rig = feedback_rig(ControllerPolicy::default());
        rig.controller.handle_event(&Event::new(
            "Ghost",
            "Nothing",
            ResourceStatus::CapacityFull,
            Priority::Low,
            1,
        ));
        assert_eq!(rig.throttles[0].get(), ThrottleState::Standard);
        assert_eq!(rig.throttles[1].get(), ThrottleState::Standard);
    }

    #[test]
    fn termination_rules_fire_on_resource_state() {
        let policy = ControllerPolicy {
            termination: vec![
                TerminationRule::ResourceFull("Energy".into()),
                TerminationRule::MaxRuntime { ms: 60_000 },
            ],
            ..ControllerPolicy::default()
        };
        let rig = feedback_rig(policy);
        let started = Instant::now();

        // Energy starts at 30/50: nothing fires yet
        assert_eq!(rig.controller.fired_termination(started), None);

        let _ = rig.controller.resources()[0].try_store(20);
        assert_eq!(
            rig.controller.fired_termination(started),
            Some(TerminationRule::ResourceFull("Energy".into()))
        );
    }

    #[test]
    fn shutdown_terminates_every_unit_and_clears_the_queue() {
        let mut rig = feedback_rig(ControllerPolicy::default());
        rig.controller.queue.push(shortage());
        rig.controller.shutdown(&TerminationRule::MaxRuntime { ms: 0 });
        assert_eq!(rig.throttles[0].get(), ThrottleState::Terminate);
        assert_eq!(rig.throttles[1].get(), ThrottleState::Terminate);
        assert!(rig.controller.queue.is_empty());
    }
}
