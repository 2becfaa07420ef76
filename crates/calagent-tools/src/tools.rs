//! Tool registry: names, descriptions and JSON schemas for the calendar
//! operations, plus dispatch of named calls with JSON arguments.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use calagent_auth::AccessTokenProvider;

use crate::facade::{CalendarFacade, SetupError};
use crate::outcome::{failure_json, ToolFailure};

/// Tool schema for LLM API requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name (e.g. `"list_calendars"`).
    pub name: String,
    /// What the tool does, written for the model.
    pub description: String,
    /// JSON Schema describing the tool's parameters.
    pub parameters: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarTool {
    ListCalendars,
    GetCalendarEvents,
    AddCalendarEvent,
    UpdateCalendarEvent,
    DeleteCalendarEvent,
    InviteToEvent,
}

impl CalendarTool {
    pub const ALL: [CalendarTool; 6] = [
        Self::ListCalendars,
        Self::GetCalendarEvents,
        Self::AddCalendarEvent,
        Self::UpdateCalendarEvent,
        Self::DeleteCalendarEvent,
        Self::InviteToEvent,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::ListCalendars => "list_calendars",
            Self::GetCalendarEvents => "get_calendar_events",
            Self::AddCalendarEvent => "add_calendar_event",
            Self::UpdateCalendarEvent => "update_calendar_event",
            Self::DeleteCalendarEvent => "delete_calendar_event",
            Self::InviteToEvent => "invite_to_event",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    /// Tools that never modify a calendar.
    pub fn is_read_only(self) -> bool {
        matches!(self, Self::ListCalendars | Self::GetCalendarEvents)
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::ListCalendars => {
                "List all calendars accessible to the user, with their IDs, names, \
                 primary flag, description and color. Use the IDs with the other tools."
            }
            Self::GetCalendarEvents => {
                "Retrieve upcoming events from a Google Calendar, ordered by start time. \
                 Returns each event's ID, title, start, end, description, location and link."
            }
            Self::AddCalendarEvent => {
                "Add an event to Google Calendar. Times are ISO 8601 \
                 (e.g. '2025-01-15T10:00:00'). The end defaults to one hour after the start."
            }
            Self::UpdateCalendarEvent => {
                "Change an existing event. Only the fields you pass are modified; \
                 get the event ID from get_calendar_events."
            }
            Self::DeleteCalendarEvent => {
                "Permanently delete an event from Google Calendar. This cannot be undone; \
                 get the event ID from get_calendar_events."
            }
            Self::InviteToEvent => {
                "Invite people to an existing event by e-mail. Addresses already on the \
                 guest list are skipped."
            }
        }
    }

    pub fn schema(self) -> Value {
        let calendar_id = json!({
            "type": "string",
            "description": "Calendar ID (default: 'primary'). Use list_calendars to find others.",
            "default": "primary"
        });
        let timezone = json!({
            "type": "string",
            "description": "IANA timezone such as 'America/New_York' (default: the user's timezone)"
        });
        let event_id = json!({
            "type": "string",
            "description": "The event ID, as returned by get_calendar_events"
        });

        match self {
            Self::ListCalendars => json!({
                "type": "object",
                "properties": {}
            }),
            Self::GetCalendarEvents => json!({
                "type": "object",
                "properties": {
                    "calendar_id": calendar_id,
                    "time_min": {
                        "type": "string",
                        "description": "Start of the range in ISO 8601 (e.g. '2025-01-15T00:00:00'). Defaults to now."
                    },
                    "time_max": {
                        "type": "string",
                        "description": "End of the range in ISO 8601 (e.g. '2025-01-22T23:59:59'). Omit for no upper bound."
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of events to return (1-2500)",
                        "minimum": 1,
                        "maximum": 2500,
                        "default": 10
                    },
                    "timezone": timezone
                }
            }),
            Self::AddCalendarEvent => json!({
                "type": "object",
                "properties": {
                    "summary": {
                        "type": "string",
                        "description": "Event title"
                    },
                    "start_time": {
                        "type": "string",
                        "description": "Start time in ISO 8601 (e.g. '2025-01-15T10:00:00')"
                    },
                    "end_time": {
                        "type": "string",
                        "description": "End time in ISO 8601. Defaults to one hour after start_time."
                    },
                    "description": {
                        "type": "string",
                        "description": "Event description"
                    },
                    "location": {
                        "type": "string",
                        "description": "Event location"
                    },
                    "timezone": timezone,
                    "calendar_id": calendar_id,
                    "attendees": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "E-mail addresses to invite; they are notified"
                    }
                },
                "required": ["summary", "start_time"]
            }),
            Self::UpdateCalendarEvent => json!({
                "type": "object",
                "properties": {
                    "event_id": event_id,
                    "calendar_id": calendar_id,
                    "summary": {
                        "type": "string",
                        "description": "New title"
                    },
                    "start_time": {
                        "type": "string",
                        "description": "New start time in ISO 8601"
                    },
                    "end_time": {
                        "type": "string",
                        "description": "New end time in ISO 8601"
                    },
                    "description": {
                        "type": "string",
                        "description": "New description"
                    },
                    "location": {
                        "type": "string",
                        "description": "New location"
                    },
                    "timezone": timezone
                },
                "required": ["event_id"]
            }),
            Self::DeleteCalendarEvent => json!({
                "type": "object",
                "properties": {
                    "event_id": event_id,
                    "calendar_id": calendar_id
                },
                "required": ["event_id"]
            }),
            Self::InviteToEvent => json!({
                "type": "object",
                "properties": {
                    "event_id": event_id,
                    "attendees": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "E-mail addresses to invite"
                    },
                    "calendar_id": calendar_id,
                    "send_updates": {
                        "type": "boolean",
                        "description": "E-mail the guests about the invitation",
                        "default": true
                    }
                },
                "required": ["event_id", "attendees"]
            }),
        }
    }

    pub fn definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.schema(),
        }
    }
}

/// Definitions for every calendar tool, in a stable order.
pub fn definitions() -> Vec<ToolDefinition> {
    CalendarTool::ALL.into_iter().map(CalendarTool::definition).collect()
}

/// Dispatches named tool calls onto a [`CalendarFacade`].
pub struct Toolbox<P> {
    facade: CalendarFacade<P>,
}

impl<P: AccessTokenProvider> Toolbox<P> {
    pub fn new(facade: CalendarFacade<P>) -> Self {
        Self { facade }
    }

    pub fn facade(&self) -> &CalendarFacade<P> {
        &self.facade
    }

    /// Run one tool and return its JSON record.
    ///
    /// Unknown names and malformed arguments produce `invalid_input` records.
    #[tracing::instrument(skip(self, arguments), level = "info")]
    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<Value, SetupError> {
        let Some(tool) = CalendarTool::from_name(name) else {
            tracing::warn!("Unknown tool requested: {}", name);
            return Ok(failure_json(&ToolFailure::invalid_input(format!(
                "unknown tool '{}'",
                name
            ))));
        };

        // Argument-less calls arrive as null from some frameworks
        let arguments = match arguments {
            Value::Null => json!({}),
            other => other,
        };

        let facade = &self.facade;
        let record = match tool {
            CalendarTool::ListCalendars => facade.list_calendars().await?.to_json(),
            CalendarTool::GetCalendarEvents => match decode(tool, arguments) {
                Ok(request) => facade.list_events(request).await?.to_json(),
                Err(failure) => failure_json(&failure),
            },
            CalendarTool::AddCalendarEvent => match decode(tool, arguments) {
                Ok(request) => facade.create_event(request).await?.to_json(),
                Err(failure) => failure_json(&failure),
            },
            CalendarTool::UpdateCalendarEvent => match decode(tool, arguments) {
                Ok(request) => facade.update_event(request).await?.to_json(),
                Err(failure) => failure_json(&failure),
            },
            CalendarTool::DeleteCalendarEvent => match decode(tool, arguments) {
                Ok(request) => facade.delete_event(request).await?.to_json(),
                Err(failure) => failure_json(&failure),
            },
            CalendarTool::InviteToEvent => match decode(tool, arguments) {
                Ok(request) => facade.invite_to_event(request).await?.to_json(),
                Err(failure) => failure_json(&failure),
            },
        };

        Ok(record)
    }
}

fn decode<T: DeserializeOwned>(tool: CalendarTool, arguments: Value) -> Result<T, ToolFailure> {
    serde_json::from_value(arguments).map_err(|e| {
        tracing::warn!("Bad arguments for {}: {}", tool.name(), e);
        ToolFailure::invalid_input(format!("invalid arguments for {}: {}", tool.name(), e))
    })
}
