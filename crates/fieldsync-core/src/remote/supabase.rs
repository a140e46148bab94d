//! Supabase (PostgREST) implementation of `RemoteStore`

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::rows::{
    CropInsert, CropRow, FarmInsert, FarmRow, FieldErrorRow, FieldPatch, FieldRow,
    FullFieldInsert, MinimalFieldInsert, OwnershipMismatchRow,
};
use super::{InsertShape, RemoteError, RemoteErrorKind, RemoteResult, RemoteStore};
use crate::config::RemoteConfig;
use crate::error::Result;
use crate::models::{AuditEvent, AuditKind, Farm, FarmId, Field, FieldCrop, NewFarm, OwnerId, RemoteId};
use crate::util::compact_text;

const FIELDS_TABLE: &str = "fields";
const FARMS_TABLE: &str = "farms";
const CROPS_TABLE: &str = "field_crops";
const FIELD_ERRORS_TABLE: &str = "field_errors";
const OWNERSHIP_MISMATCHES_TABLE: &str = "ownership_mismatches";

#[derive(Clone)]
pub struct SupabaseRemoteStore {
    rest_url: String,
    anon_key: String,
    access_token: Option<String>,
    client: Client,
}

impl SupabaseRemoteStore {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|error| crate::Error::Config(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            rest_url: config.rest_url(),
            anon_key: config.anon_key.clone(),
            access_token: config.access_token.clone(),
            client,
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        self.client
            .request(method, format!("{}/{table}", self.rest_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    fn returning(builder: RequestBuilder) -> RequestBuilder {
        builder.header("Prefer", "return=representation")
    }

    async fn send(request: RequestBuilder) -> RemoteResult<reqwest::Response> {
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(parse_api_error(status, &body))
    }

    async fn fetch<T: DeserializeOwned>(request: RequestBuilder) -> RemoteResult<Vec<T>> {
        let response = Self::send(request).await?;
        response
            .json::<Vec<T>>()
            .await
            .map_err(|error| RemoteError::new(RemoteErrorKind::Server, error.to_string()))
    }

    async fn fetch_one<T: DeserializeOwned>(request: RequestBuilder) -> RemoteResult<Option<T>> {
        Ok(Self::fetch::<T>(request).await?.into_iter().next())
    }

    async fn insert_returning<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        body: &B,
    ) -> RemoteResult<T> {
        let request = Self::returning(self.request(Method::POST, table)).json(body);
        Self::fetch_one(request).await?.ok_or_else(|| {
            RemoteError::new(
                RemoteErrorKind::Server,
                format!("insert into {table} returned no row"),
            )
        })
    }
}

impl RemoteStore for SupabaseRemoteStore {
    async fn insert_field(&self, field: &Field, shape: InsertShape) -> RemoteResult<Field> {
        let row: FieldRow = match shape {
            InsertShape::Full => {
                self.insert_returning(FIELDS_TABLE, &FullFieldInsert::from_field(field))
                    .await?
            }
            InsertShape::Minimal => {
                self.insert_returning(FIELDS_TABLE, &MinimalFieldInsert::from_field(field))
                    .await?
            }
        };
        Ok(row.into())
    }

    async fn list_fields(&self, owner: &OwnerId) -> RemoteResult<Vec<Field>> {
        let request = self
            .request(Method::GET, FIELDS_TABLE)
            .query(&[
                ("select", "*".to_string()),
                ("user_id", format!("eq.{owner}")),
                ("order", "created_at.asc".to_string()),
            ]);
        let rows = Self::fetch::<FieldRow>(request).await?;
        Ok(rows.into_iter().map(Field::from).collect())
    }

    async fn get_field(&self, id: &RemoteId) -> RemoteResult<Option<Field>> {
        let request = self
            .request(Method::GET, FIELDS_TABLE)
            .query(&[("select", "*".to_string()), ("id", format!("eq.{id}"))]);
        Ok(Self::fetch_one::<FieldRow>(request).await?.map(Field::from))
    }

    async fn update_field(&self, field: &Field) -> RemoteResult<Field> {
        let id = field
            .id
            .as_ref()
            .ok_or_else(|| RemoteError::validation("cannot update a field without a remote id"))?;
        let request = Self::returning(self.request(Method::PATCH, FIELDS_TABLE))
            .query(&[("id", format!("eq.{id}"))])
            .json(&FieldPatch::from_field(field));

        Self::fetch_one::<FieldRow>(request)
            .await?
            .map(Field::from)
            .ok_or_else(|| RemoteError::not_found(format!("field {id} does not exist")))
    }

    async fn delete_field(&self, id: &RemoteId) -> RemoteResult<()> {
        let request = self
            .request(Method::DELETE, FIELDS_TABLE)
            .query(&[("id", format!("eq.{id}"))]);
        Self::send(request).await?;
        Ok(())
    }

    async fn list_farms(&self, owner: &OwnerId) -> RemoteResult<Vec<Farm>> {
        let request = self.request(Method::GET, FARMS_TABLE).query(&[
            ("select", "id,user_id,name,size_unit".to_string()),
            ("user_id", format!("eq.{owner}")),
            ("order", "created_at.asc".to_string()),
        ]);
        let rows = Self::fetch::<FarmRow>(request).await?;
        Ok(rows.into_iter().map(Farm::from).collect())
    }

    async fn get_farm(&self, id: &FarmId) -> RemoteResult<Option<Farm>> {
        let request = self.request(Method::GET, FARMS_TABLE).query(&[
            ("select", "id,user_id,name,size_unit".to_string()),
            ("id", format!("eq.{id}")),
        ]);
        Ok(Self::fetch_one::<FarmRow>(request).await?.map(Farm::from))
    }

    async fn insert_farm(&self, farm: &NewFarm) -> RemoteResult<Farm> {
        let row: FarmRow = self
            .insert_returning(FARMS_TABLE, &FarmInsert::from_new(farm))
            .await?;
        Ok(row.into())
    }

    async fn insert_crop(&self, crop: &FieldCrop) -> RemoteResult<FieldCrop> {
        let body = CropInsert::from_crop(crop)
            .ok_or_else(|| RemoteError::validation("crop has no remote field id"))?;
        let row: CropRow = self.insert_returning(CROPS_TABLE, &body).await?;
        Ok(row.into())
    }

    async fn list_crops(&self, field_id: &RemoteId) -> RemoteResult<Vec<FieldCrop>> {
        let request = self.request(Method::GET, CROPS_TABLE).query(&[
            ("select", "*".to_string()),
            ("field_id", format!("eq.{field_id}")),
        ]);
        let rows = Self::fetch::<CropRow>(request).await?;
        Ok(rows.into_iter().map(FieldCrop::from).collect())
    }

    async fn record_audit(&self, event: &AuditEvent) -> RemoteResult<()> {
        let request = if event.kind == AuditKind::OwnershipMismatch {
            let row = OwnershipMismatchRow::from_event(event).ok_or_else(|| {
                RemoteError::validation("ownership mismatch needs a farm and its owner")
            })?;
            self.request(Method::POST, OWNERSHIP_MISMATCHES_TABLE)
                .json(&[row])
        } else {
            self.request(Method::POST, FIELD_ERRORS_TABLE)
                .json(&[FieldErrorRow::from(event)])
        };
        Self::send(request).await?;
        Ok(())
    }

    async fn list_audit(&self, owner: &OwnerId) -> RemoteResult<Vec<AuditEvent>> {
        let errors = self.request(Method::GET, FIELD_ERRORS_TABLE).query(&[
            ("select", "user_id,error_type,farm_id,details,created_at".to_string()),
            ("user_id", format!("eq.{owner}")),
        ]);
        let mismatches = self
            .request(Method::GET, OWNERSHIP_MISMATCHES_TABLE)
            .query(&[
                ("select", "attempted_user,farm_id,owner_id,created_at".to_string()),
                ("attempted_user", format!("eq.{owner}")),
            ]);

        let mut events: Vec<AuditEvent> = Self::fetch::<FieldErrorRow>(errors)
            .await?
            .into_iter()
            .map(AuditEvent::from)
            .collect();
        events.extend(
            Self::fetch::<OwnershipMismatchRow>(mismatches)
                .await?
                .into_iter()
                .map(AuditEvent::from),
        );
        events.sort_by_key(|event| event.created_at);
        Ok(events)
    }
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

fn map_transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::timeout(error.to_string())
    } else {
        RemoteError::network(error.to_string())
    }
}

fn classify_status(status: StatusCode) -> RemoteErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteErrorKind::Auth,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => RemoteErrorKind::Network,
        StatusCode::NOT_FOUND => RemoteErrorKind::NotFound,
        status if status.is_server_error() => RemoteErrorKind::Server,
        _ => RemoteErrorKind::Validation,
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> RemoteError {
    let kind = classify_status(status);

    if let Ok(payload) = serde_json::from_str::<PostgrestErrorBody>(body) {
        if let Some(message) = payload.message {
            let mut text = format!("{} ({})", message.trim(), status.as_u16());
            if let Some(details) = payload.details.filter(|value| !value.trim().is_empty()) {
                text.push_str(&format!(": {}", details.trim()));
            }
            if let Some(hint) = payload.hint.filter(|value| !value.trim().is_empty()) {
                text.push_str(&format!(" hint: {}", hint.trim()));
            }
            let error = RemoteError::new(kind, text);
            return match payload.code {
                Some(code) => error.with_code(code),
                None => error,
            };
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        RemoteError::new(kind, format!("HTTP {}", status.as_u16()))
    } else {
        RemoteError::new(kind, format!("{} ({})", trimmed, status.as_u16()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_status_maps_postgrest_responses() {
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), RemoteErrorKind::Validation);
        assert_eq!(classify_status(StatusCode::CONFLICT), RemoteErrorKind::Validation);
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), RemoteErrorKind::Auth);
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), RemoteErrorKind::Network);
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), RemoteErrorKind::Server);
    }

    #[test]
    fn parse_api_error_reads_postgrest_body() {
        let body = r#"{"code":"23503","message":"insert or update on table \"fields\" violates foreign key constraint","details":"Key (farm_id) is not present in table \"farms\".","hint":null}"#;
        let error = parse_api_error(StatusCode::CONFLICT, body);

        assert!(error.is_validation());
        assert_eq!(error.code.as_deref(), Some("23503"));
        assert!(error.message.contains("foreign key"));
        assert!(error.message.contains("(409)"));
        assert!(error.message.contains("farm_id"));
    }

    #[test]
    fn parse_api_error_falls_back_to_raw_body() {
        let error = parse_api_error(StatusCode::SERVICE_UNAVAILABLE, "  upstream down  ");
        assert_eq!(error.kind, RemoteErrorKind::Server);
        assert_eq!(error.message, "upstream down (503)");

        let empty = parse_api_error(StatusCode::BAD_GATEWAY, "");
        assert_eq!(empty.message, "HTTP 502");
    }

    #[test]
    fn new_uses_rest_endpoint() {
        let config = RemoteConfig::new("https://project.supabase.co/", "anon", None).unwrap();
        let store = SupabaseRemoteStore::new(&config).unwrap();
        assert_eq!(store.rest_url, "https://project.supabase.co/rest/v1");
    }
}
