pub mod core;

// Re-export commonly used types
pub use crate::core::controller::{Controller, ControllerPolicy, SimulationObserver, TerminationRule};
pub use crate::core::event::{Event, EventId, EventQueue, Priority};
pub use crate::core::resource::{Resource, ResourceAmount, ResourceStatus, StoreOutcome};
pub use crate::core::simulation::{Simulation, SimulationReport};
pub use crate::core::types::{ResourceId, UnitId};
pub use crate::core::unit::{ProductionUnit, ThrottleCell, ThrottleState};
