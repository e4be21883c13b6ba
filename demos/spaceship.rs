//! Spaceship scenario: four interdependent systems sharing Fuel, Oxygen,
//! Energy and Distance. The run ends when the destination is reached
//! (Distance full) or a vital stock runs dry.

use prodsim::{
    ControllerPolicy, Event, Simulation, SimulationObserver, TerminationRule, ThrottleState,
};

struct ConsoleReporter;

impl SimulationObserver for ConsoleReporter {
    fn on_event(&mut self, event: &Event) {
        println!(
            "[event] {:<12} {:?} on {} (amount {})",
            event.source, event.status, event.resource, event.amount
        );
    }

    fn on_throttle_change(&mut self, unit: &str, state: ThrottleState) {
        println!("[throttle] {} -> {:?}", unit, state);
    }

    fn on_shutdown(&mut self, rule: &TerminationRule) {
        println!("[shutdown] {:?}", rule);
    }
}

fn main() -> Result<(), String> {
    env_logger::init();

    let policy = ControllerPolicy {
        termination: vec![
            TerminationRule::ResourceFull("Distance".into()),
            TerminationRule::ResourceEmpty("Fuel".into()),
            TerminationRule::ResourceEmpty("Oxygen".into()),
        ],
        ..ControllerPolicy::default()
    };

    let mut sim = Simulation::new(policy);
    sim.add_resource("Fuel", 1000, 1000)?;
    sim.add_resource("Oxygen", 20, 50)?;
    sim.add_resource("Energy", 30, 50)?;
    sim.add_resource("Distance", 0, 5000)?;

    sim.add_unit("Propulsion", Some(("Fuel", 5)), Some(("Distance", 25)), 50)?;
    sim.add_unit("Life Support", Some(("Energy", 7)), Some(("Oxygen", 4)), 10)?;
    sim.add_unit("Crew", Some(("Oxygen", 1)), None, 2)?;
    sim.add_unit("Generator", Some(("Fuel", 5)), Some(("Energy", 10)), 20)?;

    sim.add_observer(Box::new(ConsoleReporter));

    let report = sim.run()?;
    println!(
        "Simulation finished after {:.1}s",
        report.elapsed.as_secs_f64()
    );
    for (name, amount) in &report.resource_levels {
        println!("  {:<10} {}", name, amount);
    }
    Ok(())
}
