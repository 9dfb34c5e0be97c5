//! Coordinator program lookup

use crate::client::{is_absent, BackendClient};
use async_trait::async_trait;
use mentorlens_core::{CoordinatorId, FetchError, ProgramDirectory};
use mentorlens_filter::ProgramId;
use serde_json::Value;
use std::sync::Arc;

/// Placeholder substituted with the coordinator id
pub const USER_ID_PLACEHOLDER: &str = "{user_id}";

/// Program directory backed by the scope-resolution endpoint
///
/// The endpoint answers with an array whose first element names the
/// coordinator's program. An empty array, `null` or a 404 mean "no program".
#[derive(Debug, Clone)]
pub struct HttpProgramDirectory {
    client: Arc<BackendClient>,
    route: String,
}

impl HttpProgramDirectory {
    #[must_use]
    pub fn new(client: Arc<BackendClient>, route: impl Into<String>) -> Self {
        Self {
            client,
            route: route.into(),
        }
    }

    fn path_for(&self, coordinator: &CoordinatorId) -> String {
        self.route.replace(USER_ID_PLACEHOLDER, &coordinator.0)
    }
}

#[async_trait]
impl ProgramDirectory for HttpProgramDirectory {
    async fn program_for(
        &self,
        coordinator: &CoordinatorId,
    ) -> Result<Option<ProgramId>, FetchError> {
        let path = self.path_for(coordinator);
        match self.client.get_json(&path, &[]).await {
            Ok(body) => first_program(&body),
            Err(e) if is_absent(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Program id of the first array element
pub fn first_program(body: &Value) -> Result<Option<ProgramId>, FetchError> {
    match body {
        Value::Null => Ok(None),
        Value::Array(items) => Ok(items.first().and_then(program_id_of)),
        other => Err(FetchError::Decode(format!("expected an array of programs, got {other}"))),
    }
}

fn program_id_of(item: &Value) -> Option<ProgramId> {
    let id = match item {
        Value::Object(fields) => fields.get("program_id").or_else(|| fields.get("id"))?,
        scalar => scalar,
    };
    match id {
        Value::String(s) if !s.trim().is_empty() => Some(ProgramId::new(s.trim())),
        Value::Number(n) => Some(ProgramId::new(n.to_string())),
        _ => None,
    }
}
