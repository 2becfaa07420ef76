//! Google Calendar tools for LLM agents.
//!
//! [`CalendarFacade`] performs the calendar operations and returns
//! [`ToolOutcome`] records; [`Toolbox`] dispatches named tool calls onto it;
//! [`adapters`] publishes the tool definitions to agent frameworks.

pub mod adapters;
pub mod facade;
pub mod outcome;
pub mod time;
pub mod tools;

pub use adapters::{gemini_tools, openai_tools};
pub use facade::{
    AttendeesInvited, CalendarFacade, CalendarList, CalendarSummary, CreateEventRequest,
    DeleteEventRequest, EventDeleted, EventDetails, EventList, EventSummary, InviteRequest,
    ListEventsRequest, SetupError, UpdateEventRequest,
};
pub use outcome::{FailureKind, ToolFailure, ToolOutcome};
pub use time::TimeError;
pub use tools::{definitions, CalendarTool, ToolDefinition, Toolbox};
