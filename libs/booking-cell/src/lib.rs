pub mod models;
pub mod services;

pub use models::{BookingError, DayChoice, Reservation};
pub use services::reservation::ReservationManager;
