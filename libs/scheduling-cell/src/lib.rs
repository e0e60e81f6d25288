pub mod models;
pub mod services;

pub use models::{SchedulingConfig, TimeSlot};
pub use services::availability::{AvailabilityEngine, AvailabilityError, MAX_SLOTS_PER_DAY};
pub use services::dates::ScheduleError;
