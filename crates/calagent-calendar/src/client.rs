//! Google Calendar API client.

use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::error::CalendarError;
use crate::types::*;

pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Calendar list pages are requested at the service maximum.
const CALENDAR_PAGE_SIZE: u32 = 250;

/// A client bound to one access token.
pub struct CalendarClient {
    client: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl CalendarClient {
    pub fn new(access_token: &str) -> Self {
        Self::with_base_url(access_token, CALENDAR_API_BASE)
    }

    pub fn with_base_url(access_token: &str, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token: access_token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id),
        )
    }

    fn event_url(&self, calendar_id: &str, event_id: &str) -> String {
        format!(
            "{}/{}",
            self.events_url(calendar_id),
            urlencoding::encode(event_id),
        )
    }

    /// List every calendar on the user's calendar list, following pagination.
    #[instrument(skip(self), level = "info")]
    pub async fn list_calendars(&self) -> Result<Vec<ApiCalendar>, CalendarError> {
        let url = format!("{}/users/me/calendarList", self.base_url);
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![("maxResults", CALENDAR_PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let response = self
                .client
                .get(&url)
                .header("Authorization", self.auth_header())
                .query(&params)
                .send()
                .await?;

            let page: CalendarListResponse = self.handle_response(response).await?;
            calendars.extend(page.items);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!("Fetched {} calendars", calendars.len());
        Ok(calendars)
    }

    /// List one page of events from a calendar.
    #[instrument(skip(self), level = "info")]
    pub async fn list_events(
        &self,
        calendar_id: &str,
        query: &EventQuery,
    ) -> Result<EventListResponse, CalendarError> {
        let response = self
            .client
            .get(self.events_url(calendar_id))
            .header("Authorization", self.auth_header())
            .query(&query.to_params())
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get a single event.
    #[instrument(skip(self), level = "info")]
    pub async fn get_event(
        &self,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<ApiEvent, CalendarError> {
        let response = self
            .client
            .get(self.event_url(calendar_id, event_id))
            .header("Authorization", self.auth_header())
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Create a new event.
    #[instrument(skip(self, event), fields(summary = %event.summary), level = "info")]
    pub async fn insert_event(
        &self,
        calendar_id: &str,
        event: &NewEvent,
        send_updates: Option<SendUpdates>,
    ) -> Result<ApiEvent, CalendarError> {
        let mut request = self
            .client
            .post(self.events_url(calendar_id))
            .header("Authorization", self.auth_header())
            .json(event);

        if let Some(updates) = send_updates {
            request = request.query(&[("sendUpdates", updates.as_str())]);
        }

        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// Change only the fields set in `patch`.
    #[instrument(skip(self, patch), level = "info")]
    pub async fn patch_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
        send_updates: Option<SendUpdates>,
    ) -> Result<ApiEvent, CalendarError> {
        let mut request = self
            .client
            .patch(self.event_url(calendar_id, event_id))
            .header("Authorization", self.auth_header())
            .json(patch);

        if let Some(updates) = send_updates {
            request = request.query(&[("sendUpdates", updates.as_str())]);
        }

        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// Delete an event. There is no undo.
    #[instrument(skip(self), level = "info")]
    pub async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), CalendarError> {
        let response = self
            .client
            .delete(self.event_url(calendar_id, event_id))
            .header("Authorization", self.auth_header())
            .send()
            .await?;

        // 204 No Content on success
        Self::check_status(response).await.map(|_| ())
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, CalendarError> {
        Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| CalendarError::Decode(e.to_string()))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CalendarError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok());

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .map(|body| body.error.message)
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                if text.is_empty() {
                    status.to_string()
                } else {
                    text
                }
            });

        tracing::debug!("Calendar API returned {}: {}", status, message);
        Err(CalendarError::from_status(status.as_u16(), message, retry_after))
    }
}
