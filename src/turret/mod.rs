mod actuator;
mod coordinator;
mod driver;

#[cfg(test)]
mod tests;

pub use actuator::{actuator_channel, ActuatorLink, ActuatorPort, ActuatorStatus, RotationActuator};
pub use coordinator::{CoordinatorTransition, RotationState, SyncOutcome, TurretCoordinator};
pub use driver::{Direction, SimulatedDriver, SimulatedDriverState, StepperDriver};
