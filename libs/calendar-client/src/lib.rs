pub mod client;
pub mod models;

pub use client::{CalendarClient, CalendarError};
pub use models::{BusyInterval, EventTime, InsertedEvent, RemoteEvent};
