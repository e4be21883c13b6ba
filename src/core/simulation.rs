use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::debug;

use super::controller::{Controller, ControllerPolicy, SimulationObserver};
use super::event::EventQueue;
use super::resource::{Resource, ResourceAmount};
use super::types::ResourceId;
use super::unit::{ProductionUnit, ThrottleCell, ThrottleState};

/// Final state of a completed run.
#[derive(Debug)]
pub struct SimulationReport {
    /// Resource levels at shutdown, in registration order.
    pub resource_levels: Vec<(ResourceId, u64)>,
    pub elapsed: Duration,
}

/// Builder and runner for a complete scenario: registers resources and
/// units, validates the wiring, then spawns one thread per unit plus the
/// controller thread and joins them all at shutdown.
pub struct Simulation {
    resources: Vec<Arc<Resource>>,
    units: Vec<ProductionUnit>,
    queue: Arc<EventQueue>,
    policy: ControllerPolicy,
    observers: Vec<Box<dyn SimulationObserver>>,
}

impl Simulation {
    pub fn new(policy: ControllerPolicy) -> Self {
        Self {
            resources: Vec::new(),
            units: Vec::new(),
            queue: Arc::new(EventQueue::new()),
            policy,
            observers: Vec::new(),
        }
    }

    /// Register a resource stock. Names must be unique and the initial
    /// amount must fit within the capacity.
    pub fn add_resource(
        &mut self,
        name: &str,
        initial_amount: u64,
        max_capacity: u64,
    ) -> Result<Arc<Resource>, String> {
        if self.resources.iter().any(|r| r.name() == name) {
            return Err(format!("Resource '{}' is already registered", name));
        }
        if initial_amount > max_capacity {
            return Err(format!(
                "Resource '{}': initial amount {} exceeds capacity {}",
                name, initial_amount, max_capacity
            ));
        }
        let resource = Arc::new(Resource::new(name, initial_amount, max_capacity));
        self.resources.push(resource.clone());
        Ok(resource)
    }

    /// Register a production unit. `consumed`/`produced` name a registered
    /// resource and the per-cycle amount; `None` means no input requirement
    /// or discarded output respectively.
    pub fn add_unit(
        &mut self,
        name: &str,
        consumed: Option<(&str, u64)>,
        produced: Option<(&str, u64)>,
        processing_ms: u64,
    ) -> Result<(), String> {
        if self.units.iter().any(|u| u.name() == name) {
            return Err(format!("Unit '{}' is already registered", name));
        }
        let consumed = self.bind(consumed)?;
        let produced = self.bind(produced)?;
        self.units.push(ProductionUnit::new(
            name,
            consumed,
            produced,
            Duration::from_millis(processing_ms),
            self.queue.clone(),
        ));
        Ok(())
    }

    fn bind(&self, request: Option<(&str, u64)>) -> Result<Option<ResourceAmount>, String> {
        match request {
            None => Ok(None),
            Some((id, amount)) => {
                let resource = self
                    .resources
                    .iter()
                    .find(|r| r.name() == id)
                    .ok_or_else(|| format!("Resource '{}' not found", id))?;
                Ok(Some(ResourceAmount::new(resource.clone(), amount)))
            }
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn SimulationObserver>) {
        self.observers.push(observer);
    }

    /// Shared event queue, for callers wiring units or tests by hand.
    pub fn queue(&self) -> Arc<EventQueue> {
        self.queue.clone()
    }

    /// Run the scenario to completion: spawn one named thread per unit and
    /// one for the controller, then join them all once a termination rule
    /// has fired.
    pub fn run(self) -> Result<SimulationReport, String> {
        let Simulation {
            resources,
            units,
            queue,
            policy,
            observers,
        } = self;

        let started = Instant::now();
        let mut controller = Controller::new(resources.clone(), &units, queue, policy);
        for observer in observers {
            controller.add_observer(observer);
        }

        // kept so a failed spawn can still stop already-running units
        let throttles: Vec<Arc<ThrottleCell>> = units.iter().map(|u| u.throttle()).collect();

        let mut unit_handles = Vec::with_capacity(units.len());
        for mut unit in units {
            let spawn = thread::Builder::new()
                .name(format!("unit-{}", unit.name()))
                .spawn(move || unit.run());
            match spawn {
                Ok(handle) => unit_handles.push(handle),
                Err(e) => {
                    for throttle in &throttles {
                        throttle.set(ThrottleState::Terminate);
                    }
                    return Err(format!("Could not spawn unit thread: {}", e));
                }
            }
        }

        let controller_handle = thread::Builder::new()
            .name("controller".to_string())
            .spawn(move || {
                controller.run();
                controller
            })
            .map_err(|e| {
                for throttle in &throttles {
                    throttle.set(ThrottleState::Terminate);
                }
                format!("Could not spawn controller thread: {}", e)
            })?;

        let controller = match controller_handle.join() {
            Ok(controller) => Some(controller),
            Err(_) => {
                // controller died before shutdown; stop the units here so
                // the joins below return
                for throttle in &throttles {
                    throttle.set(ThrottleState::Terminate);
                }
                None
            }
        };

        let mut unit_panicked = false;
        for handle in unit_handles {
            if handle.join().is_err() {
                unit_panicked = true;
            }
        }
        debug!("all threads joined");

        let controller = controller.ok_or_else(|| "Controller thread panicked".to_string())?;
        if unit_panicked {
            return Err("Unit thread panicked".to_string());
        }

        Ok(SimulationReport {
            resource_levels: controller
                .resources()
                .iter()
                .map(|r| (r.name().to_string(), r.amount()))
                .collect(),
            elapsed: started.elapsed(),
        })
    }
}
