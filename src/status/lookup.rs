//! Status endpoint calls, each run through the dispatcher so a stale credential is
//! renewed and the call retried once.

use crate::{client::AppError, dispatch::Dispatcher};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::instrument;

pub const STATUS_PATH: &str = "/status";
pub const STATUS_BATCH_PATH: &str = "/status/batch";
pub const TOGGLE_PATH: &str = "/toggle";

#[derive(Deserialize)]
struct StatusResponse {
    marked: bool,
}

#[derive(Serialize)]
struct ToggleRequest {
    resource_id: i64,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    resource_ids: &'a [i64],
}

#[derive(Deserialize)]
struct BatchResponse {
    #[serde(default)]
    statuses: HashMap<i64, bool>,
}

#[derive(Clone)]
pub struct StatusLookup {
    dispatcher: Dispatcher,
}

impl StatusLookup {
    #[must_use]
    pub const fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// `GET /status/{id}`.
    ///
    /// # Errors
    /// Returns the dispatcher's error for the call.
    #[instrument(skip(self))]
    pub async fn status(&self, resource_id: i64) -> Result<bool, AppError> {
        let api = self.dispatcher.session().api();
        let path = format!("{STATUS_PATH}/{resource_id}");

        let response: StatusResponse = self
            .dispatcher
            .dispatch(|credential| {
                let path = path.clone();
                async move { api.get_json(&path, credential.as_ref()).await }
            })
            .await?;

        Ok(response.marked)
    }

    /// `POST /status/batch`. Ids the server leaves out are absent from the map.
    ///
    /// # Errors
    /// Returns the dispatcher's error for the call.
    #[instrument(skip(self))]
    pub async fn statuses(&self, resource_ids: &[i64]) -> Result<HashMap<i64, bool>, AppError> {
        let api = self.dispatcher.session().api();
        let body = BatchRequest { resource_ids };

        let response: BatchResponse = self
            .dispatcher
            .dispatch(|credential| {
                let body = &body;
                async move {
                    api.post_json(STATUS_BATCH_PATH, body, credential.as_ref())
                        .await
                }
            })
            .await?;

        Ok(response.statuses)
    }

    /// `POST /toggle`.
    ///
    /// # Errors
    /// Returns the dispatcher's error for the call.
    #[instrument(skip(self))]
    pub async fn toggle(&self, resource_id: i64) -> Result<(), AppError> {
        let api = self.dispatcher.session().api();
        let body = ToggleRequest { resource_id };

        self.dispatcher
            .dispatch(|credential| {
                let body = &body;
                async move {
                    api.post_json_empty(TOGGLE_PATH, body, credential.as_ref())
                        .await
                }
            })
            .await
    }
}
