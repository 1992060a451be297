pub mod failsafe_monitor;
pub mod flight_detector;
pub mod prearm_monitor;
pub mod supervisor;
