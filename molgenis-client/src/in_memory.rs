//! In-memory implementation of [`HttpTransport`] that behaves like a MOLGENIS server, for
//! testing.
//!
//! Row ids are matched verbatim against the request path, so tests should stick to ids that
//! need no percent-encoding.

use std::collections::HashMap;
use std::future::{self, Future};
use std::sync::Mutex;

use reqwest::header::{HeaderValue, LOCATION};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use crate::error::Result;
use crate::http::{HttpRequest, HttpResponse, HttpTransport, RequestBody};
use crate::models::metadata::{AttributeMetadata, EntityMetadata, FieldType};
use crate::models::query::{Operator, Query};
use crate::models::rows::{value_text, Row};
use crate::session::TOKEN_HEADER;

const API_PREFIX: &str = "/api/v1/";
pub const DEFAULT_PAGE_SIZE: u64 = 100;

// ============================================================================
// EntityData
// ============================================================================

/// Schema and rows of one entity.
pub struct EntityData {
    pub metadata: EntityMetadata,
    pub rows: Vec<Row>,
}

impl EntityData {
    fn attribute(&self, column: &str) -> Option<&AttributeMetadata> {
        self.metadata.attributes.get(column)
    }

    fn id_is_auto(&self) -> bool {
        self.attribute(&self.metadata.id_attribute)
            .is_some_and(|attribute| attribute.auto)
    }

    fn position(&self, row_id: &str) -> Option<usize> {
        let id_attribute = &self.metadata.id_attribute;
        self.rows
            .iter()
            .position(|row| row.get(id_attribute).and_then(value_text).as_deref() == Some(row_id))
    }

    /// Server-side validation of a written row.
    fn check_row(&self, entity: &str, row: &Row) -> std::result::Result<(), String> {
        for (column, value) in row {
            let Some(attribute) = self.attribute(column) else {
                return Err(format!(
                    "Unknown attribute '{}' of entity '{}'",
                    column, entity
                ));
            };
            if attribute.field_type == Some(FieldType::Enum) {
                let text = value_text(value).unwrap_or_default();
                if !attribute.enum_options.contains(&text) {
                    return Err(format!(
                        "Invalid enum value '{}' for attribute '{}' of entity '{}'. Value must \
                         be less than or equal to 255 characters",
                        text, column, entity
                    ));
                }
            }
        }
        Ok(())
    }

    fn matches(row: &Row, query: &Query) -> std::result::Result<bool, String> {
        for rule in &query.rules {
            let field = rule.field.as_deref().unwrap_or_default();
            let actual = row.get(field).and_then(value_text);
            let expected = rule.value.as_ref().and_then(value_text);
            let matched = match rule.operator {
                Operator::And => continue,
                Operator::Equals => actual.is_some() && actual == expected,
                Operator::Like => match (actual, expected) {
                    (Some(actual), Some(expected)) => actual.contains(&expected),
                    _ => false,
                },
                other => return Err(format!("Unsupported query operator {:?}", other)),
            };
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

// ============================================================================
// RecordedRequest
// ============================================================================

/// A request as seen by the fake server. `path` is relative to the REST api root.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub body: RequestBody,
}

#[derive(Default)]
struct ServiceState {
    users: HashMap<String, String>,
    token: Option<String>,
    issued_tokens: u64,
    next_id: u64,
    page_size: u64,
    entities: HashMap<String, EntityData>,
    overrides: HashMap<(Method, String), HttpResponse>,
    requests: Vec<RecordedRequest>,
}

// ============================================================================
// InMemoryMolgenis
// ============================================================================

/// An in-memory MOLGENIS server reachable through [`HttpTransport`].
pub struct InMemoryMolgenis {
    state: Mutex<ServiceState>,
}

impl InMemoryMolgenis {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServiceState {
                page_size: DEFAULT_PAGE_SIZE,
                ..Default::default()
            }),
        }
    }

    pub fn with_user(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.state
            .lock()
            .unwrap()
            .users
            .insert(username.into(), password.into());
        self
    }

    /// Maximum number of rows returned per page (`num`).
    pub fn with_page_size(self, page_size: u64) -> Self {
        self.state.lock().unwrap().page_size = page_size;
        self
    }

    /// Registers an entity. `metadata` should describe every attribute fully; the entity
    /// metadata endpoint serves the attributes collapsed to their `href`.
    pub fn with_entity(self, name: impl Into<String>, metadata: EntityMetadata) -> Self {
        self.state.lock().unwrap().entities.insert(
            name.into(),
            EntityData {
                metadata,
                rows: Vec::new(),
            },
        );
        self
    }

    /// Inserts rows without any validation.
    pub fn insert_rows(&self, entity: &str, rows: impl IntoIterator<Item = Row>) {
        let mut state = self.state.lock().unwrap();
        let data = state
            .entities
            .get_mut(entity)
            .unwrap_or_else(|| panic!("unknown entity {entity}"));
        data.rows.extend(rows);
    }

    pub fn rows(&self, entity: &str) -> Vec<Row> {
        let state = self.state.lock().unwrap();
        state
            .entities
            .get(entity)
            .map(|data| data.rows.clone())
            .unwrap_or_default()
    }

    /// Answer `method` on `path` (relative to the api root, e.g. `Person/p1/`) with
    /// `response` instead of handling it.
    pub fn respond_with(&self, method: Method, path: impl Into<String>, response: HttpResponse) {
        self.state
            .lock()
            .unwrap()
            .overrides
            .insert((method, path.into()), response);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn request_count(&self, method: &Method, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.method == *method && r.path == path)
            .count()
    }

    /// Number of requests that could have changed data.
    pub fn write_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| {
                (r.method == Method::POST && r.query.is_none() && r.path != "login/")
                    || r.method == Method::PUT
                    || r.method == Method::DELETE
            })
            .count()
    }
}

impl Default for InMemoryMolgenis {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport for InMemoryMolgenis {
    fn send(&self, request: HttpRequest) -> impl Future<Output = Result<HttpResponse>> + Send {
        future::ready(Ok(self.serve(&request)))
    }
}

impl InMemoryMolgenis {
    fn serve(&self, request: &HttpRequest) -> HttpResponse {
        let mut state = self.state.lock().unwrap();
        let path = request
            .url
            .path()
            .strip_prefix(API_PREFIX)
            .unwrap_or(request.url.path())
            .to_string();
        state.requests.push(RecordedRequest {
            method: request.method.clone(),
            path: path.clone(),
            query: request.url.query().map(str::to_string),
            body: request.body.clone(),
        });

        if let Some(response) = state.overrides.get(&(request.method.clone(), path.clone())) {
            return response.clone();
        }
        state.handle(request, &path)
    }
}

fn errors(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    HttpResponse::new(status).with_json(&json!({"errors": [{"message": message.into()}]}))
}

fn created(entity: &str, id: &str) -> HttpResponse {
    let mut response = HttpResponse::new(StatusCode::CREATED);
    if let Ok(location) = HeaderValue::from_str(&format!("{}{}/{}", API_PREFIX, entity, id)) {
        response.headers.insert(LOCATION, location);
    }
    response
}

fn json_object(body: &RequestBody) -> Option<Row> {
    match body {
        RequestBody::Json(Value::Object(row)) => Some(row.clone()),
        _ => None,
    }
}

impl ServiceState {
    fn handle(&mut self, request: &HttpRequest, path: &str) -> HttpResponse {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let emulated_get = request
            .url
            .query_pairs()
            .any(|(k, v)| k == "_method" && v == "GET");

        if request.method == Method::POST && segments == ["login"] {
            return self.login(&request.body);
        }
        let token = request
            .headers
            .get(TOKEN_HEADER)
            .and_then(|t| t.to_str().ok());
        if token.is_none() || token != self.token.as_deref() {
            return errors(StatusCode::UNAUTHORIZED, "No authentication token found");
        }

        match (request.method.as_str(), segments.as_slice()) {
            ("GET", ["logout"]) => {
                self.token = None;
                HttpResponse::new(StatusCode::OK)
            }
            ("POST", ["File"]) => self.upload(&request.body),
            ("GET", [entity, "meta"]) => self.entity_meta(entity),
            ("GET", [entity, "meta", column]) => self.column_meta(entity, column),
            ("POST", [entity]) if emulated_get => self.query(entity, &request.body),
            ("GET", [entity]) => self.query(entity, &RequestBody::Empty),
            ("POST", [entity]) => self.add(entity, &request.body),
            ("PUT", [entity, id]) => self.update(entity, id, &request.body),
            ("DELETE", [entity, id]) => self.delete(entity, id),
            _ => errors(StatusCode::NOT_FOUND, format!("No handler for {}", path)),
        }
    }

    fn login(&mut self, body: &RequestBody) -> HttpResponse {
        let credentials = json_object(body).unwrap_or_default();
        let username = credentials.get("username").and_then(Value::as_str);
        let password = credentials.get("password").and_then(Value::as_str);
        match username.zip(password) {
            Some((username, password))
                if self.users.get(username).map(String::as_str) == Some(password) =>
            {
                self.issued_tokens += 1;
                let token = format!("token-{}", self.issued_tokens);
                self.token = Some(token.clone());
                HttpResponse::new(StatusCode::OK)
                    .with_json(&json!({"token": token, "username": username}))
            }
            _ => errors(StatusCode::UNAUTHORIZED, "Bad credentials"),
        }
    }

    fn entity(&self, entity: &str) -> std::result::Result<&EntityData, HttpResponse> {
        self.entities
            .get(entity)
            .ok_or_else(|| errors(StatusCode::NOT_FOUND, format!("Unknown entity [{}]", entity)))
    }

    fn entity_mut(&mut self, entity: &str) -> std::result::Result<&mut EntityData, HttpResponse> {
        self.entities
            .get_mut(entity)
            .ok_or_else(|| errors(StatusCode::NOT_FOUND, format!("Unknown entity [{}]", entity)))
    }

    fn entity_meta(&self, entity: &str) -> HttpResponse {
        let data = match self.entity(entity) {
            Ok(data) => data,
            Err(response) => return response,
        };
        let attributes: serde_json::Map<String, Value> = data
            .metadata
            .attributes
            .keys()
            .map(|column| {
                let href = format!("{}{}/meta/{}", API_PREFIX, entity, column);
                (column.clone(), json!({ "href": href }))
            })
            .collect();
        HttpResponse::new(StatusCode::OK).with_json(&json!({
            "href": format!("{}{}/meta", API_PREFIX, entity),
            "name": entity,
            "idAttribute": data.metadata.id_attribute,
            "attributes": attributes,
        }))
    }

    fn column_meta(&self, entity: &str, column: &str) -> HttpResponse {
        let data = match self.entity(entity) {
            Ok(data) => data,
            Err(response) => return response,
        };
        match data.attribute(column) {
            Some(attribute) => {
                let mut attribute = attribute.clone();
                attribute.name.get_or_insert_with(|| column.to_string());
                match serde_json::to_value(&attribute) {
                    Ok(body) => HttpResponse::new(StatusCode::OK).with_json(&body),
                    Err(e) => errors(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
                }
            }
            None => errors(
                StatusCode::NOT_FOUND,
                format!("Unknown attribute [{}] of entity [{}]", column, entity),
            ),
        }
    }

    fn query(&self, entity: &str, body: &RequestBody) -> HttpResponse {
        let data = match self.entity(entity) {
            Ok(data) => data,
            Err(response) => return response,
        };
        let query = match body {
            RequestBody::Json(body) => match serde_json::from_value::<Query>(body.clone()) {
                Ok(query) => query,
                Err(e) => return errors(StatusCode::BAD_REQUEST, e.to_string()),
            },
            _ => Query::new(),
        };

        let mut matched = Vec::new();
        for row in &data.rows {
            match EntityData::matches(row, &query) {
                Ok(true) => matched.push(row),
                Ok(false) => {}
                Err(message) => return errors(StatusCode::BAD_REQUEST, message),
            }
        }

        let id_attribute = &data.metadata.id_attribute;
        let items: Vec<Value> = matched
            .iter()
            .take(self.page_size as usize)
            .map(|row| {
                let mut item = (*row).clone();
                if let Some(id) = row.get(id_attribute).and_then(value_text) {
                    let href = format!("{}{}/{}", API_PREFIX, entity, id);
                    item.insert("href".to_string(), Value::String(href));
                }
                Value::Object(item)
            })
            .collect();
        HttpResponse::new(StatusCode::OK).with_json(&json!({
            "href": format!("{}{}", API_PREFIX, entity),
            "start": 0,
            "num": self.page_size,
            "total": matched.len(),
            "items": items,
        }))
    }

    fn add(&mut self, entity: &str, body: &RequestBody) -> HttpResponse {
        let Some(mut row) = json_object(body) else {
            return errors(StatusCode::BAD_REQUEST, "Expected a JSON object");
        };
        self.next_id += 1;
        let generated = format!("AAAA{:04}", self.next_id);

        let data = match self.entity_mut(entity) {
            Ok(data) => data,
            Err(response) => return response,
        };
        if let Err(message) = data.check_row(entity, &row) {
            return errors(StatusCode::BAD_REQUEST, message);
        }
        let id_attribute = data.metadata.id_attribute.clone();
        let id = if data.id_is_auto() {
            generated
        } else {
            match row.get(&id_attribute).and_then(value_text) {
                Some(id) => id,
                None => {
                    return errors(
                        StatusCode::BAD_REQUEST,
                        format!("The attribute '{}' of entity '{}' can not be null.", id_attribute, entity),
                    )
                }
            }
        };
        if data.position(&id).is_some() {
            return errors(
                StatusCode::BAD_REQUEST,
                format!("Duplicate value '{}' for unique attribute '{}' from entity '{}'", id, id_attribute, entity),
            );
        }
        row.insert(id_attribute, Value::String(id.clone()));
        data.rows.push(row);
        created(entity, &id)
    }

    fn update(&mut self, entity: &str, id: &str, body: &RequestBody) -> HttpResponse {
        let Some(mut row) = json_object(body) else {
            return errors(StatusCode::BAD_REQUEST, "Expected a JSON object");
        };
        let data = match self.entity_mut(entity) {
            Ok(data) => data,
            Err(response) => return response,
        };
        if let Err(message) = data.check_row(entity, &row) {
            return errors(StatusCode::BAD_REQUEST, message);
        }
        let Some(position) = data.position(id) else {
            return errors(StatusCode::NOT_FOUND, format!("Unknown entity with id [{}]", id));
        };
        // columns missing from the payload are nulled
        row.insert(
            data.metadata.id_attribute.clone(),
            Value::String(id.to_string()),
        );
        data.rows[position] = row;
        HttpResponse::new(StatusCode::OK)
    }

    fn delete(&mut self, entity: &str, id: &str) -> HttpResponse {
        let data = match self.entity_mut(entity) {
            Ok(data) => data,
            Err(response) => return response,
        };
        match data.position(id) {
            Some(position) => {
                data.rows.remove(position);
                HttpResponse::new(StatusCode::NO_CONTENT)
            }
            None => errors(StatusCode::NOT_FOUND, format!("Unknown entity with id [{}]", id)),
        }
    }

    fn upload(&mut self, body: &RequestBody) -> HttpResponse {
        let RequestBody::Multipart(form) = body else {
            return errors(StatusCode::BAD_REQUEST, "Expected a multipart body");
        };
        let Some(file) = form.files.first() else {
            return errors(StatusCode::BAD_REQUEST, "No file attached");
        };
        self.next_id += 1;
        let id = format!("FILE{:04}", self.next_id);

        let mut row = Row::new();
        row.insert("id".to_string(), Value::String(id.clone()));
        row.insert(
            "filename".to_string(),
            Value::String(file.file_name.clone()),
        );
        row.insert("size".to_string(), Value::from(file.content.len()));
        if let Some(description) = form.field("description") {
            row.insert(
                "description".to_string(),
                Value::String(description.to_string()),
            );
        }
        self.entities
            .entry("File".to_string())
            .or_insert_with(|| EntityData {
                metadata: EntityMetadata::new("id"),
                rows: Vec::new(),
            })
            .rows
            .push(row);
        created("File", &id)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use url::Url;

    fn request(method: Method, path: &str) -> HttpRequest {
        let url = Url::parse("http://localhost/api/v1/").unwrap().join(path).unwrap();
        HttpRequest::new(method, url)
    }

    fn service() -> InMemoryMolgenis {
        InMemoryMolgenis::new().with_user("admin", "admin").with_entity(
            "Person",
            EntityMetadata::new("id")
                .with_attribute("id", AttributeMetadata::new(FieldType::String).with_auto(true))
                .with_attribute("gender", AttributeMetadata::enumeration(["Male", "Female"])),
        )
    }

    #[tokio::test]
    async fn test_requests_need_token() {
        let service = service();
        let response = service
            .send(request(Method::GET, "Person/meta"))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(service.requests().len(), 1);
        assert_eq!(service.requests()[0].path, "Person/meta");
    }

    #[tokio::test]
    async fn test_login() {
        let service = service();
        let good = request(Method::POST, "login/")
            .with_json(json!({"username": "admin", "password": "admin"}));
        let response = service.send(good).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json::<Value>().unwrap()["token"], "token-1");

        let bad = request(Method::POST, "login/")
            .with_json(json!({"username": "admin", "password": "wrong"}));
        let response = service.send(bad).await.unwrap();
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_override() {
        let service = service();
        service.respond_with(
            Method::GET,
            "Person",
            HttpResponse::new(StatusCode::SERVICE_UNAVAILABLE),
        );
        let response = service.send(request(Method::GET, "Person")).await.unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_query_matching() {
        let row = json!({"id": "p1", "gender": "Male", "age": 26});
        let row = row.as_object().unwrap();

        let query = Query::equals("gender", "Male").and(crate::models::QueryRule::equals("age", 26));
        assert_eq!(EntityData::matches(row, &query), Ok(true));
        assert_eq!(EntityData::matches(row, &Query::equals("gender", "Female")), Ok(false));
        assert!(EntityData::matches(
            row,
            &Query::new().with_rule(crate::models::QueryRule::new("age", Operator::Range, 1))
        )
        .is_err());
    }
}
