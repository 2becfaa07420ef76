//! Calendar operations exposed to agents.
//!
//! Each operation makes one authenticated call (invite makes two) and
//! reduces the response to a small payload. Anything that goes wrong at
//! runtime becomes a [`ToolOutcome::Failure`]; only a missing or broken OAuth
//! client setup escapes as [`SetupError`].

use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use calagent_auth::{AccessTokenProvider, AuthError};
use calagent_calendar::{
    ApiCalendar, ApiEvent, Attendee, CalendarClient, CalendarError, EventDateTime, EventPatch,
    EventQuery, NewEvent, SendUpdates, CALENDAR_API_BASE,
};

use crate::outcome::{ToolFailure, ToolOutcome};
use crate::time::{self, EventTimestamp, TimeError};

pub const DEFAULT_CALENDAR_ID: &str = "primary";
pub const DEFAULT_MAX_RESULTS: i64 = 10;
pub const MAX_RESULTS_LIMIT: i64 = 2500;

/// The tools cannot work until the user fixes their setup.
#[derive(Error, Debug)]
#[error("Calendar access is not configured: {0}")]
pub struct SetupError(#[source] pub AuthError);

fn default_calendar_id() -> String {
    DEFAULT_CALENDAR_ID.to_string()
}

// Function-calling models often send `null` for parameters they leave out.

fn calendar_id_or_primary<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_calendar_id))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ── Requests ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ListEventsRequest {
    #[serde(default = "default_calendar_id", deserialize_with = "calendar_id_or_primary")]
    pub calendar_id: String,
    #[serde(default)]
    pub time_min: Option<String>,
    #[serde(default)]
    pub time_max: Option<String>,
    /// Defaults to [`DEFAULT_MAX_RESULTS`]
    #[serde(default)]
    pub max_results: Option<i64>,
    #[serde(default)]
    pub timezone: Option<String>,
}

impl Default for ListEventsRequest {
    fn default() -> Self {
        Self {
            calendar_id: default_calendar_id(),
            time_min: None,
            time_max: None,
            max_results: None,
            timezone: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEventRequest {
    pub summary: String,
    pub start_time: String,
    #[serde(default = "default_calendar_id", deserialize_with = "calendar_id_or_primary")]
    pub calendar_id: String,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attendees: Vec<String>,
}

impl CreateEventRequest {
    pub fn new(summary: impl Into<String>, start_time: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            start_time: start_time.into(),
            calendar_id: default_calendar_id(),
            end_time: None,
            description: None,
            location: None,
            timezone: None,
            attendees: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateEventRequest {
    pub event_id: String,
    #[serde(default = "default_calendar_id", deserialize_with = "calendar_id_or_primary")]
    pub calendar_id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

impl UpdateEventRequest {
    pub fn new(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            calendar_id: default_calendar_id(),
            summary: None,
            start_time: None,
            end_time: None,
            description: None,
            location: None,
            timezone: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteEventRequest {
    pub event_id: String,
    #[serde(default = "default_calendar_id", deserialize_with = "calendar_id_or_primary")]
    pub calendar_id: String,
}

impl DeleteEventRequest {
    pub fn new(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            calendar_id: default_calendar_id(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InviteRequest {
    pub event_id: String,
    pub attendees: Vec<String>,
    #[serde(default = "default_calendar_id", deserialize_with = "calendar_id_or_primary")]
    pub calendar_id: String,
    /// Defaults to notifying the guests
    #[serde(default)]
    pub send_updates: Option<bool>,
}

// ── Payloads ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarSummary {
    pub id: String,
    pub summary: String,
    pub primary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl From<ApiCalendar> for CalendarSummary {
    fn from(api: ApiCalendar) -> Self {
        Self {
            id: api.id,
            summary: api.summary.unwrap_or_else(|| "No name".to_string()),
            primary: api.primary,
            description: api.description,
            color: api.background_color,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarList {
    pub calendars: Vec<CalendarSummary>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSummary {
    pub id: String,
    pub summary: String,
    pub start: Option<String>,
    pub end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl From<ApiEvent> for EventSummary {
    fn from(api: ApiEvent) -> Self {
        Self {
            start: api.start.preferred().map(String::from),
            end: api.end.preferred().map(String::from),
            id: api.id,
            summary: api.summary.unwrap_or_else(|| "No title".to_string()),
            description: api.description,
            location: api.location,
            link: api.html_link,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventList {
    pub events: Vec<EventSummary>,
    pub count: usize,
    pub calendar_id: String,
}

/// A created or updated event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventDetails {
    pub calendar_id: String,
    pub event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_link: Option<String>,
    pub summary: String,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl EventDetails {
    fn from_api(api: ApiEvent, calendar_id: &str, fallback_summary: &str) -> Self {
        Self {
            calendar_id: calendar_id.to_string(),
            start: api.start.preferred().map(String::from),
            end: api.end.preferred().map(String::from),
            event_id: api.id,
            event_link: api.html_link,
            summary: api.summary.unwrap_or_else(|| fallback_summary.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventDeleted {
    pub event_id: String,
    pub calendar_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendeesInvited {
    pub calendar_id: String,
    pub event_id: String,
    pub added: Vec<String>,
    pub attendees: Vec<String>,
    pub count: usize,
}

// ── Façade ──────────────────────────────────────────────────────────────

/// Ends an operation early: either a setup problem or a failure record.
enum Abort {
    Setup(AuthError),
    Failure(ToolFailure),
}

impl From<AuthError> for Abort {
    fn from(err: AuthError) -> Self {
        if err.is_configuration_error() {
            Self::Setup(err)
        } else {
            Self::Failure(err.into())
        }
    }
}

impl From<CalendarError> for Abort {
    fn from(err: CalendarError) -> Self {
        Self::Failure(err.into())
    }
}

impl From<TimeError> for Abort {
    fn from(err: TimeError) -> Self {
        Self::Failure(err.into())
    }
}

impl From<ToolFailure> for Abort {
    fn from(failure: ToolFailure) -> Self {
        Self::Failure(failure)
    }
}

fn finish<T>(operation: &str, result: Result<T, Abort>) -> Result<ToolOutcome<T>, SetupError> {
    match result {
        Ok(payload) => Ok(ToolOutcome::Success(payload)),
        Err(Abort::Failure(failure)) => {
            tracing::warn!("{} failed ({:?}): {}", operation, failure.kind, failure.message);
            Ok(ToolOutcome::Failure(failure))
        }
        Err(Abort::Setup(err)) => {
            tracing::error!("{} cannot run: {}", operation, err);
            Err(SetupError(err))
        }
    }
}

fn require(value: &str, field: &str) -> Result<String, Abort> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ToolFailure::invalid_input(format!("{} must not be empty", field)).into());
    }
    Ok(trimmed.to_string())
}

fn clean_emails(emails: &[String]) -> Result<Vec<String>, Abort> {
    emails
        .iter()
        .map(|email| require(email, "attendee e-mail"))
        .collect()
}

/// Session object binding an access-token source to the Calendar API.
pub struct CalendarFacade<P> {
    provider: P,
    api_base_url: String,
    default_timezone: Option<String>,
}

impl<P: AccessTokenProvider> CalendarFacade<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            api_base_url: CALENDAR_API_BASE.to_string(),
            default_timezone: None,
        }
    }

    pub fn with_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.api_base_url = api_base_url.into();
        self
    }

    /// Zone used when a call names none; the host zone otherwise.
    pub fn with_default_timezone(mut self, timezone: Option<String>) -> Self {
        self.default_timezone = timezone;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// An API client bound to a freshly obtained access token.
    pub async fn obtain_service(&self) -> Result<CalendarClient, AuthError> {
        let token = self.provider.access_token().await?;
        Ok(CalendarClient::with_base_url(&token, &self.api_base_url))
    }

    fn timezone(&self, explicit: Option<&str>) -> Result<Tz, TimeError> {
        time::resolve_timezone(explicit, self.default_timezone.as_deref())
    }

    #[tracing::instrument(skip(self), level = "info")]
    pub async fn list_calendars(&self) -> Result<ToolOutcome<CalendarList>, SetupError> {
        finish("list_calendars", self.run_list_calendars().await)
    }

    async fn run_list_calendars(&self) -> Result<CalendarList, Abort> {
        let service = self.obtain_service().await?;
        let calendars: Vec<CalendarSummary> = service
            .list_calendars()
            .await?
            .into_iter()
            .map(CalendarSummary::from)
            .collect();

        Ok(CalendarList {
            count: calendars.len(),
            calendars,
        })
    }

    #[tracing::instrument(skip(self), level = "info")]
    pub async fn list_events(
        &self,
        request: ListEventsRequest,
    ) -> Result<ToolOutcome<EventList>, SetupError> {
        finish("list_events", self.run_list_events(request).await)
    }

    async fn run_list_events(&self, request: ListEventsRequest) -> Result<EventList, Abort> {
        let calendar_id = require(&request.calendar_id, "calendar_id")?;
        let tz = self.timezone(request.timezone.as_deref())?;

        let time_min = match request.time_min.as_deref() {
            Some(value) => time::normalize_timestamp(value)?,
            None => time::now_in(tz),
        };
        let time_max = request
            .time_max
            .as_deref()
            .map(time::normalize_timestamp)
            .transpose()?;

        let query = EventQuery {
            time_min: Some(time_min),
            time_max,
            max_results: Some(
                request
                    .max_results
                    .unwrap_or(DEFAULT_MAX_RESULTS)
                    .clamp(1, MAX_RESULTS_LIMIT) as u32,
            ),
            time_zone: Some(tz.name().to_string()),
        };

        let service = self.obtain_service().await?;
        let response = service.list_events(&calendar_id, &query).await?;
        let events: Vec<EventSummary> =
            response.items.into_iter().map(EventSummary::from).collect();

        Ok(EventList {
            count: events.len(),
            events,
            calendar_id,
        })
    }

    #[tracing::instrument(skip(self, request), fields(calendar_id = %request.calendar_id), level = "info")]
    pub async fn create_event(
        &self,
        request: CreateEventRequest,
    ) -> Result<ToolOutcome<EventDetails>, SetupError> {
        finish("create_event", self.run_create_event(request).await)
    }

    async fn run_create_event(&self, request: CreateEventRequest) -> Result<EventDetails, Abort> {
        let summary = require(&request.summary, "summary")?;
        let calendar_id = require(&request.calendar_id, "calendar_id")?;
        let tz = self.timezone(request.timezone.as_deref())?;

        let start = EventTimestamp::parse(&request.start_time)?;
        let end = match request.end_time.as_deref() {
            Some(value) => EventTimestamp::parse(value)?,
            None => start.plus_one_hour()?,
        };
        time::ensure_ordered(&start, &end, tz)?;

        let attendees = clean_emails(&request.attendees)?;
        let send_updates = (!attendees.is_empty()).then_some(SendUpdates::All);

        let zone = Some(tz.name().to_string());
        let body = NewEvent {
            summary: summary.clone(),
            start: EventDateTime::timed(start.render(), zone.clone()),
            end: EventDateTime::timed(end.render(), zone),
            description: request.description,
            location: request.location,
            attendees: attendees.into_iter().map(Attendee::new).collect(),
        };

        let service = self.obtain_service().await?;
        let created = service
            .insert_event(&calendar_id, &body, send_updates)
            .await?;

        tracing::info!("Created event {} on {}", created.id, calendar_id);
        Ok(EventDetails::from_api(created, &calendar_id, &summary))
    }

    #[tracing::instrument(skip(self, request), fields(event_id = %request.event_id), level = "info")]
    pub async fn update_event(
        &self,
        request: UpdateEventRequest,
    ) -> Result<ToolOutcome<EventDetails>, SetupError> {
        finish("update_event", self.run_update_event(request).await)
    }

    async fn run_update_event(&self, request: UpdateEventRequest) -> Result<EventDetails, Abort> {
        let event_id = require(&request.event_id, "event_id")?;
        let calendar_id = require(&request.calendar_id, "calendar_id")?;

        let summary = request
            .summary
            .as_deref()
            .map(|s| require(s, "summary"))
            .transpose()?;

        let start = request
            .start_time
            .as_deref()
            .map(EventTimestamp::parse)
            .transpose()?;
        let end = request
            .end_time
            .as_deref()
            .map(EventTimestamp::parse)
            .transpose()?;

        let zone = if start.is_some() || end.is_some() {
            let tz = self.timezone(request.timezone.as_deref())?;
            if let (Some(start), Some(end)) = (&start, &end) {
                time::ensure_ordered(start, end, tz)?;
            }
            Some(tz.name().to_string())
        } else {
            None
        };

        let patch = EventPatch {
            summary: summary.clone(),
            start: start.map(|s| EventDateTime::timed(s.render(), zone.clone())),
            end: end.map(|e| EventDateTime::timed(e.render(), zone.clone())),
            description: request.description,
            location: request.location,
            attendees: None,
        };

        if patch.is_empty() {
            return Err(ToolFailure::invalid_input(
                "nothing to update: give at least one of summary, start_time, end_time, \
                 description, location",
            )
            .into());
        }

        let service = self.obtain_service().await?;
        let updated = service
            .patch_event(&calendar_id, &event_id, &patch, None)
            .await?;

        tracing::info!("Updated event {} on {}", event_id, calendar_id);
        Ok(EventDetails::from_api(
            updated,
            &calendar_id,
            summary.as_deref().unwrap_or("No title"),
        ))
    }

    #[tracing::instrument(skip(self), level = "info")]
    pub async fn delete_event(
        &self,
        request: DeleteEventRequest,
    ) -> Result<ToolOutcome<EventDeleted>, SetupError> {
        finish("delete_event", self.run_delete_event(request).await)
    }

    async fn run_delete_event(&self, request: DeleteEventRequest) -> Result<EventDeleted, Abort> {
        let event_id = require(&request.event_id, "event_id")?;
        let calendar_id = require(&request.calendar_id, "calendar_id")?;

        let service = self.obtain_service().await?;
        service.delete_event(&calendar_id, &event_id).await?;

        tracing::info!("Deleted event {} from {}", event_id, calendar_id);
        Ok(EventDeleted {
            event_id,
            calendar_id,
            message: "Event successfully deleted from calendar".to_string(),
        })
    }

    #[tracing::instrument(skip(self), level = "info")]
    pub async fn invite_to_event(
        &self,
        request: InviteRequest,
    ) -> Result<ToolOutcome<AttendeesInvited>, SetupError> {
        finish("invite_to_event", self.run_invite(request).await)
    }

    async fn run_invite(&self, request: InviteRequest) -> Result<AttendeesInvited, Abort> {
        let event_id = require(&request.event_id, "event_id")?;
        let calendar_id = require(&request.calendar_id, "calendar_id")?;
        if request.attendees.is_empty() {
            return Err(ToolFailure::invalid_input("attendees must not be empty").into());
        }
        let requested = clean_emails(&request.attendees)?;

        let service = self.obtain_service().await?;
        let event = service.get_event(&calendar_id, &event_id).await?;

        let mut seen: HashSet<String> = event
            .attendees
            .iter()
            .map(|a| a.email.to_lowercase())
            .collect();
        let added: Vec<String> = requested
            .into_iter()
            .filter(|email| seen.insert(email.to_lowercase()))
            .collect();

        if added.is_empty() {
            tracing::debug!("Every attendee is already invited to {}", event_id);
            return Ok(invited(calendar_id, event_id, added, &event.attendees));
        }

        let mut merged = event.attendees;
        merged.extend(added.iter().cloned().map(Attendee::new));

        let patch = EventPatch {
            attendees: Some(merged.clone()),
            ..Default::default()
        };
        let send_updates = if request.send_updates.unwrap_or(true) {
            SendUpdates::All
        } else {
            SendUpdates::None
        };

        let updated = service
            .patch_event(&calendar_id, &event_id, &patch, Some(send_updates))
            .await?;

        tracing::info!("Invited {} attendee(s) to {}", added.len(), event_id);
        let attendees = if updated.attendees.is_empty() {
            merged
        } else {
            updated.attendees
        };
        Ok(invited(calendar_id, event_id, added, &attendees))
    }
}

fn invited(
    calendar_id: String,
    event_id: String,
    added: Vec<String>,
    attendees: &[Attendee],
) -> AttendeesInvited {
    let attendees: Vec<String> = attendees.iter().map(|a| a.email.clone()).collect();
    AttendeesInvited {
        calendar_id,
        event_id,
        added,
        count: attendees.len(),
        attendees,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_list_events_request_defaults() {
        let request: ListEventsRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.calendar_id, "primary");
        assert!(request.max_results.is_none());
        assert!(request.time_min.is_none());
    }

    #[test]
    fn test_null_arguments_mean_omitted() {
        let request: ListEventsRequest = serde_json::from_value(serde_json::json!({
            "calendar_id": null,
            "time_min": null,
            "max_results": null,
            "timezone": null
        }))
        .unwrap();
        assert_eq!(request.calendar_id, "primary");
        assert!(request.max_results.is_none());

        let request: CreateEventRequest = serde_json::from_value(serde_json::json!({
            "summary": "Lunch",
            "start_time": "2025-01-15T12:00:00",
            "calendar_id": null,
            "attendees": null
        }))
        .unwrap();
        assert_eq!(request.calendar_id, "primary");
        assert!(request.attendees.is_empty());

        let request: InviteRequest = serde_json::from_value(serde_json::json!({
            "event_id": "e1",
            "attendees": ["a@example.com"],
            "send_updates": null
        }))
        .unwrap();
        assert!(request.send_updates.is_none());
    }

    #[test]
    fn test_create_request_requires_summary_and_start() {
        let missing = serde_json::from_str::<CreateEventRequest>(r#"{"summary": "x"}"#);
        assert!(missing.is_err());

        let request: CreateEventRequest =
            serde_json::from_str(r#"{"summary": "x", "start_time": "2025-01-15T10:00:00"}"#)
                .unwrap();
        assert_eq!(request.calendar_id, "primary");
        assert!(request.attendees.is_empty());
    }

    #[test]
    fn test_invite_request_defaults() {
        let request: InviteRequest =
            serde_json::from_str(r#"{"event_id": "e1", "attendees": ["a@example.com"]}"#)
                .unwrap();
        assert!(request.send_updates.is_none());
        assert_eq!(request.calendar_id, "primary");
    }

    #[test]
    fn test_summaries_apply_defaults() {
        let calendar: ApiCalendar = serde_json::from_str(r#"{"id": "c1"}"#).unwrap();
        let summary = CalendarSummary::from(calendar);
        assert_eq!(summary.summary, "No name");
        assert!(!summary.primary);
        assert_eq!(
            serde_json::to_value(&summary).unwrap(),
            serde_json::json!({"id": "c1", "summary": "No name", "primary": false})
        );

        let event: ApiEvent = serde_json::from_str(
            r#"{"id": "e1", "start": {"date": "2025-01-15"}, "end": {"date": "2025-01-16"}}"#,
        )
        .unwrap();
        let summary = EventSummary::from(event);
        assert_eq!(summary.summary, "No title");
        assert_eq!(summary.start.as_deref(), Some("2025-01-15"));
    }

    #[test]
    fn test_require_trims() {
        assert_eq!(require("  primary ", "calendar_id").ok(), Some("primary".to_string()));
        assert!(require("   ", "summary").is_err());
    }
}
