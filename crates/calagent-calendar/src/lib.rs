//! Google Calendar v3 REST client.

pub mod client;
pub mod error;
pub mod types;

pub use client::{CalendarClient, CALENDAR_API_BASE};
pub use error::CalendarError;
pub use types::{
    ApiCalendar, ApiEvent, Attendee, EventDateTime, EventListResponse, EventPatch, EventQuery,
    NewEvent, SendUpdates,
};
