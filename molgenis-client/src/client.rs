use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ColumnList, Error, Result};
use crate::http::{FilePart, HttpRequest, HttpResponse, HttpTransport, MultipartForm, ReqwestTransport};
use crate::models::auth::{LoginRequest, LoginResponse};
use crate::models::metadata::{AttributeMetadata, EntityMetadata, FieldType};
use crate::models::query::Query;
use crate::models::rows::{normalize_row, value_text, Row, RowOutcome, RowsResponse};
use crate::response::{self, Classification, ErrorContext, Remediation, ResponseOutcome};
use crate::session::{self, Session};

/// Entity that stores uploaded files.
pub const FILE_ENTITY: &str = "File";

/// The calls the client makes, named the way they show up in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    RetrieveToken,
    Logout,
    AddRow,
    AddFile,
    GetRows,
    UpdateRow,
    DeleteRow,
    EntityMetadata,
    ColumnMetadata,
}

impl Operation {
    fn adds_row(self) -> bool {
        matches!(self, Operation::AddRow | Operation::AddFile)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            Operation::RetrieveToken => "Retrieve token",
            Operation::Logout => "Logout",
            Operation::AddRow => "Add row to entity",
            Operation::AddFile => "Add file",
            Operation::GetRows => "Get rows from entity",
            Operation::UpdateRow => "Update entity row",
            Operation::DeleteRow => "Delete entity row",
            Operation::EntityMetadata => "Get meta data of entity",
            Operation::ColumnMetadata => "Get meta data of column",
        };
        f.write_str(description)
    }
}

/// An authenticated connection to a MOLGENIS server.
///
/// Entity and column metadata are fetched on first use and cached for the lifetime of the
/// client; the cache is never invalidated. All operations run one request at a time.
pub struct MolgenisClient<T: HttpTransport = ReqwestTransport> {
    transport: T,
    session: Session,
    merge_exclusions: Vec<String>,
    entity_metadata: HashMap<String, Arc<EntityMetadata>>,
    column_metadata: HashMap<(String, String), Arc<AttributeMetadata>>,
}

impl MolgenisClient<ReqwestTransport> {
    /// Log in to the server described by `config`.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Self::connect_with_transport(config, transport).await
    }
}

impl<T: HttpTransport> MolgenisClient<T> {
    /// Log in through `transport` and build the session headers from the returned token.
    #[instrument(skip_all, fields(api_url = %config.api_url, user = %config.username))]
    pub async fn connect_with_transport(config: ClientConfig, transport: T) -> Result<Self> {
        let url = session::endpoint(&config.api_url, &["login"], true)?;
        let login = LoginRequest::new(&config.username, &config.password);
        let request = HttpRequest::new(Method::POST, url)
            .with_headers(session::login_headers())
            .with_json(serde_json::to_value(&login)?);
        let response = transport.send(request).await?;

        if !response.status.is_success() {
            let details = response::error_messages(&response)
                .map(|messages| messages.join("\n"))
                .unwrap_or_else(|| response.text());
            return Err(Error::AuthenticationFailed(format!(
                "{} -> {}: {}",
                response.status.as_u16(),
                response.reason(),
                details
            )));
        }

        let login: LoginResponse = response.json().map_err(|e| {
            Error::AuthenticationFailed(format!("unreadable login response: {}", e))
        })?;
        let token = login.usable_token().ok_or_else(|| {
            Error::AuthenticationFailed("login response contains no token".to_string())
        })?;

        if config.verbose {
            info!(
                "{} -> {} {}",
                Operation::RetrieveToken,
                response.status.as_u16(),
                response.reason()
            );
        }

        let session = Session::new(config.api_url, token, config.verbose, config.warnings)?;
        Ok(Self {
            transport,
            session,
            merge_exclusions: config.merge_exclusions,
            entity_metadata: HashMap::new(),
            column_metadata: HashMap::new(),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn verbose(&self) -> bool {
        self.session.verbose
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.session.verbose = verbose;
    }

    pub fn warnings(&self) -> bool {
        self.session.warnings
    }

    pub fn set_warnings(&mut self, warnings: bool) {
        self.session.warnings = warnings;
    }

    /// Number of rows (and files) added through this client.
    pub fn added_rows(&self) -> u64 {
        self.session.added_rows
    }

    /// Id of the most recently added row or file.
    pub fn last_added_id(&self) -> Option<&str> {
        self.session.last_added_id.as_deref()
    }

    /// Invalidate the session server-side. The client keeps its headers; later calls are
    /// rejected by the server, not by the client.
    #[instrument(skip(self))]
    pub async fn logout(&mut self) -> Result<ResponseOutcome> {
        let url = self.session.endpoint(&["logout"], true)?;
        let response = self.send(Method::GET, url, None).await?;
        self.check_response(&response, Operation::Logout, ErrorContext::default())
            .await
    }

    // ------------------------------------------------------------------------
    // metadata
    // ------------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn entity_metadata(&mut self, entity: &str) -> Result<Arc<EntityMetadata>> {
        if let Some(metadata) = self.entity_metadata.get(entity) {
            return Ok(metadata.clone());
        }

        let url = self.session.endpoint(&[entity, "meta"], false)?;
        let response = self.send(Method::GET, url, None).await?;
        let outcome = self.check_plain_response(
            &response,
            Operation::EntityMetadata,
            &ErrorContext::entity(entity),
        )?;
        let metadata: Arc<EntityMetadata> = Arc::new(decode(&response, outcome)?);
        self.entity_metadata
            .insert(entity.to_string(), metadata.clone());
        Ok(metadata)
    }

    /// Column names of `entity`, in no particular order.
    pub async fn column_names(&mut self, entity: &str) -> Result<Vec<String>> {
        Ok(self.entity_metadata(entity).await?.column_names())
    }

    pub async fn id_attribute(&mut self, entity: &str) -> Result<String> {
        Ok(self.entity_metadata(entity).await?.id_attribute.clone())
    }

    #[instrument(skip(self))]
    pub async fn column_metadata(
        &mut self,
        entity: &str,
        column: &str,
    ) -> Result<Arc<AttributeMetadata>> {
        let key = (entity.to_string(), column.to_string());
        if let Some(metadata) = self.column_metadata.get(&key) {
            return Ok(metadata.clone());
        }

        let url = self.session.endpoint(&[entity, "meta", column], false)?;
        let response = self.send(Method::GET, url, None).await?;
        let outcome = self.check_plain_response(
            &response,
            Operation::ColumnMetadata,
            &ErrorContext::entity(entity).with_column(column),
        )?;
        let metadata: Arc<AttributeMetadata> = Arc::new(decode(&response, outcome)?);
        self.column_metadata.insert(key, metadata.clone());
        Ok(metadata)
    }

    pub async fn column_type(&mut self, entity: &str, column: &str) -> Result<FieldType> {
        self.column_metadata(entity, column)
            .await?
            .field_type
            .ok_or_else(|| {
                Error::InvalidResponse(format!(
                    "no fieldType in metadata of column '{}' of entity '{}'",
                    column, entity
                ))
            })
    }

    // ------------------------------------------------------------------------
    // validation
    // ------------------------------------------------------------------------

    /// Check that every key of `row` is a column of `entity`. Only names are checked; value
    /// types are left to the server.
    pub async fn validate_row(&mut self, entity: &str, row: &Row) -> Result<()> {
        let metadata = self.entity_metadata(entity).await?;
        let unknown: ColumnList = row
            .keys()
            .filter(|column| !metadata.has_column(column))
            .collect();
        if !unknown.0.is_empty() {
            return Err(Error::InvalidColumns {
                entity: entity.to_string(),
                unknown,
                row: Value::Object(row.clone()).to_string(),
                valid: ColumnList(metadata.column_names()),
            });
        }

        let id_attribute = &metadata.id_attribute;
        if let Some(id_value) = row.get(id_attribute) {
            if self.session.warnings && self.column_metadata(entity, id_attribute).await?.auto {
                warn!(
                    "The ID attribute ({}) of the entity ({}) you are adding a row to is set to \
                     `auto`. The value you gave for id ({}) will not be used. Instead, the ID \
                     will be a random string.",
                    id_attribute,
                    entity,
                    value_text(id_value).unwrap_or_default()
                );
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // rows
    // ------------------------------------------------------------------------

    /// Add `row` to `entity` and return the id the server assigned to it.
    #[instrument(skip(self, row))]
    pub async fn add_row(&mut self, entity: &str, row: &Row, validate: bool) -> Result<String> {
        if validate {
            self.validate_row(entity, row).await?;
        }

        let payload = normalize_row(row);
        let url = self.session.endpoint(&[entity], true)?;
        let response = self
            .send(Method::POST, url, Some(serde_json::to_value(&payload)?))
            .await?;
        self.check_response(
            &response,
            Operation::AddRow,
            ErrorContext::entity(entity).with_data(&payload),
        )
        .await?;
        self.created_id(&response, entity)
    }

    /// Upload the file at `path` to the `File` entity and return its id. `name` defaults to
    /// the file name of `path`.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn add_file(&mut self, path: impl AsRef<Path>, name: Option<&str>) -> Result<String> {
        let path = path.as_ref();
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::FileNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let name = match name {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| Error::FileNotFound(path.to_path_buf()))?,
        };

        let form = MultipartForm::new()
            .text("description", name.as_str())
            .file(FilePart::new("file", name.as_str(), content));
        let url = self.session.endpoint(&[FILE_ENTITY], false)?;
        debug!(%url, "uploading file");
        let request = HttpRequest::new(Method::POST, url)
            .with_headers(self.session.upload_headers())
            .with_multipart(form);
        let response = self.transport.send(request).await?;
        self.check_response(
            &response,
            Operation::AddFile,
            ErrorContext::entity(FILE_ENTITY).with_data(&name),
        )
        .await?;
        self.created_id(&response, FILE_ENTITY)
    }

    /// Rows of `entity` matching `query`, capped at the server's page size.
    #[instrument(skip(self, query))]
    pub async fn query_rows(&mut self, entity: &str, query: &Query) -> Result<RowsResponse> {
        if query.is_empty() {
            return Err(Error::InvalidArgument(
                "Can't search with empty query".to_string(),
            ));
        }

        let mut url = self.session.endpoint(&[entity], false)?;
        url.query_pairs_mut().append_pair("_method", "GET");
        let response = self
            .send(Method::POST, url, Some(serde_json::to_value(query)?))
            .await?;
        let outcome = self
            .check_response(
                &response,
                Operation::GetRows,
                ErrorContext::entity(entity).with_query(query),
            )
            .await?;
        let rows = decode(&response, outcome)?;
        self.report_page(&rows);
        Ok(rows)
    }

    /// The first page of rows of `entity`.
    #[instrument(skip(self))]
    pub async fn get_all_rows(&mut self, entity: &str) -> Result<RowsResponse> {
        let url = self.session.endpoint(&[entity], false)?;
        let response = self.send(Method::GET, url, None).await?;
        let outcome = self
            .check_response(&response, Operation::GetRows, ErrorContext::entity(entity))
            .await?;
        let rows = decode(&response, outcome)?;
        self.report_page(&rows);
        Ok(rows)
    }

    /// Set the columns in `data` on every row matching `query`.
    ///
    /// The update endpoint nulls every column missing from the payload, so the existing values
    /// of the other columns are carried forward. Rows are updated independently: a failure is
    /// reported in that row's [`RowOutcome`] and the remaining rows are still updated.
    #[instrument(skip(self, query, data))]
    pub async fn update_rows(
        &mut self,
        entity: &str,
        query: &Query,
        data: &Row,
    ) -> Result<Vec<RowOutcome>> {
        self.validate_row(entity, data).await?;
        let rows = self.query_rows(entity, query).await?;
        if rows.items.is_empty() {
            return Err(Error::NoMatch {
                entity: entity.to_string(),
                action: "update",
            });
        }

        let metadata = self.entity_metadata(entity).await?;
        let mut outcomes = Vec::with_capacity(rows.items.len());
        for existing in &rows.items {
            let Some(row_id) = row_id(&metadata, existing) else {
                outcomes.push(missing_id(&metadata));
                continue;
            };
            let payload = normalize_row(&self.merge_existing(&metadata, data, existing));
            let result = self.put_row(entity, &row_id, &payload, query).await;
            outcomes.push(RowOutcome { row_id, result });
        }
        Ok(outcomes)
    }

    /// Delete every row matching `query`, each independently of the others.
    #[instrument(skip(self, query))]
    pub async fn delete_rows(&mut self, entity: &str, query: &Query) -> Result<Vec<RowOutcome>> {
        let rows = self.query_rows(entity, query).await?;
        if rows.items.is_empty() {
            return Err(Error::NoMatch {
                entity: entity.to_string(),
                action: "delete",
            });
        }
        self.delete_page(entity, &rows, Some(query)).await
    }

    /// Delete all rows of `entity`, one page at a time, until the entity reports no rows.
    #[instrument(skip(self))]
    pub async fn delete_all_rows(&mut self, entity: &str) -> Result<Vec<RowOutcome>> {
        let mut outcomes = Vec::new();
        let mut previous_total = None;
        loop {
            let rows = self.get_all_rows(entity).await?;
            if rows.items.is_empty() || rows.total == 0 {
                break;
            }
            if previous_total.is_some_and(|previous| rows.total >= previous) {
                if self.session.warnings {
                    warn!(
                        "No rows of entity '{}' were deleted in the last cycle, {} rows remain",
                        entity, rows.total
                    );
                }
                break;
            }
            previous_total = Some(rows.total);
            outcomes.extend(self.delete_page(entity, &rows, None).await?);
        }
        Ok(outcomes)
    }

    async fn delete_page(
        &mut self,
        entity: &str,
        rows: &RowsResponse,
        query: Option<&Query>,
    ) -> Result<Vec<RowOutcome>> {
        let metadata = self.entity_metadata(entity).await?;
        let mut outcomes = Vec::with_capacity(rows.items.len());
        for existing in &rows.items {
            let Some(row_id) = row_id(&metadata, existing) else {
                outcomes.push(missing_id(&metadata));
                continue;
            };
            let result = self.delete_row(entity, &row_id, query).await;
            outcomes.push(RowOutcome { row_id, result });
        }
        Ok(outcomes)
    }

    async fn put_row(
        &mut self,
        entity: &str,
        row_id: &str,
        payload: &BTreeMap<String, String>,
        query: &Query,
    ) -> Result<ResponseOutcome> {
        let url = self.session.endpoint(&[entity, row_id], true)?;
        let response = self
            .send(Method::PUT, url, Some(serde_json::to_value(payload)?))
            .await?;
        self.check_response(
            &response,
            Operation::UpdateRow,
            ErrorContext::entity(entity)
                .with_query(query)
                .with_data(payload),
        )
        .await
    }

    async fn delete_row(
        &mut self,
        entity: &str,
        row_id: &str,
        query: Option<&Query>,
    ) -> Result<ResponseOutcome> {
        let url = self.session.endpoint(&[entity, row_id], true)?;
        let response = self.send(Method::DELETE, url, None).await?;
        let mut context = ErrorContext::entity(entity);
        if let Some(query) = query {
            context = context.with_query(query);
        }
        self.check_response(&response, Operation::DeleteRow, context)
            .await
    }

    /// `data` plus the values of `existing` for every other regular column.
    fn merge_existing(&self, metadata: &EntityMetadata, data: &Row, existing: &Row) -> Row {
        let mut merged = data.clone();
        for (column, value) in existing {
            let carry = *column != metadata.id_attribute
                && !merged.contains_key(column)
                && metadata.has_column(column)
                && !self.merge_exclusions.contains(column);
            if carry {
                merged.insert(column.clone(), value.clone());
            }
        }
        merged
    }

    fn created_id(&mut self, response: &HttpResponse, entity: &str) -> Result<String> {
        let id = response.location_id().ok_or_else(|| {
            Error::InvalidResponse(format!(
                "no location header in {} response for entity '{}'",
                response.status, entity
            ))
        })?;
        self.session.last_added_id = Some(id.clone());
        Ok(id)
    }

    fn report_page(&self, rows: &RowsResponse) {
        if rows.at_page_cap() && self.session.warnings {
            warn!(
                "{} number of rows selected. Max number of rows to retrieve data for is set to \
                 {}. {} rows will not be in the results.",
                rows.total,
                rows.num,
                rows.total.saturating_sub(rows.num)
            );
        }
        if self.session.verbose {
            info!("Selected {} row(s).", rows.total);
        }
    }

    // ------------------------------------------------------------------------
    // requests and responses
    // ------------------------------------------------------------------------

    async fn send(&self, method: Method, url: Url, body: Option<Value>) -> Result<HttpResponse> {
        debug!(%method, %url, "sending request");
        let mut request =
            HttpRequest::new(method, url).with_headers(self.session.headers().clone());
        if let Some(body) = body {
            request = request.with_json(body);
        }
        self.transport.send(request).await
    }

    /// Classify `response`, raising server-reported errors with `context`. Only the server's
    /// own messages are searched for known problems, never the context lines.
    async fn check_response(
        &mut self,
        response: &HttpResponse,
        operation: Operation,
        context: ErrorContext<'_>,
    ) -> Result<ResponseOutcome> {
        match response::classify(response) {
            Classification::Failed { messages } => {
                let mut remediated = Vec::with_capacity(messages.len());
                for message in &messages {
                    remediated.push(match response::enum_remediation(message) {
                        Some(remediation) => self.remediate(message, &remediation).await,
                        None => message.clone(),
                    });
                }
                let mut message =
                    response::compose_error_message(response.status, &remediated, &context);
                if let Some(entity) = context.entity {
                    if response::lists_columns(response.status, &messages) {
                        let remediation = Remediation::ListColumns {
                            entity: entity.to_string(),
                        };
                        message = self.remediate(&message, &remediation).await;
                    }
                }
                Err(Error::Request {
                    status: response.status,
                    message,
                })
            }
            classification => Ok(self.settle(classification, response, operation)),
        }
    }

    /// Like [`Self::check_response`] without remediation lookups. Used by the metadata
    /// fetches those lookups are built on.
    fn check_plain_response(
        &mut self,
        response: &HttpResponse,
        operation: Operation,
        context: &ErrorContext<'_>,
    ) -> Result<ResponseOutcome> {
        match response::classify(response) {
            Classification::Failed { messages } => Err(Error::Request {
                status: response.status,
                message: response::compose_error_message(response.status, &messages, context),
            }),
            classification => Ok(self.settle(classification, response, operation)),
        }
    }

    fn settle(
        &mut self,
        classification: Classification,
        response: &HttpResponse,
        operation: Operation,
    ) -> ResponseOutcome {
        let status = response.status;
        match classification {
            Classification::Success => {
                if operation.adds_row() {
                    self.session.added_rows += 1;
                    if self.session.verbose {
                        info!(
                            "{} -> {} {} ({} rows added this session)",
                            operation,
                            status.as_u16(),
                            response.reason(),
                            self.session.added_rows
                        );
                    }
                } else if self.session.verbose {
                    info!("{} -> {} {}", operation, status.as_u16(), response.reason());
                }
                ResponseOutcome::Success
            }
            Classification::ClientErrorWithoutDetails => {
                debug!("{} -> {} without error details", operation, status);
                ResponseOutcome::Unconfirmed { status }
            }
            Classification::Unexpected | Classification::Failed { .. } => {
                if self.session.warnings {
                    warn!(
                        "{}: expected 200, 201 or 204, got {}. Reason: {}",
                        operation,
                        status.as_u16(),
                        response.reason()
                    );
                }
                ResponseOutcome::Unconfirmed { status }
            }
        }
    }

    /// `message` rewritten for `remediation`, or unchanged when the lookup fails.
    async fn remediate(&mut self, message: &str, remediation: &Remediation) -> String {
        let values = match remediation {
            Remediation::ListColumns { entity } => self.column_names(entity).await,
            Remediation::EnumOptions { entity, attribute } => self
                .column_metadata(entity, attribute)
                .await
                .map(|metadata| metadata.enum_options.clone()),
        };
        match values {
            Ok(values) => response::apply_remediation(message, remediation, &values),
            Err(e) => {
                debug!("lookup for {:?} failed: {}", remediation, e);
                message.to_string()
            }
        }
    }
}

/// Decode the body of a response that was classified as a success.
fn decode<R: DeserializeOwned>(response: &HttpResponse, outcome: ResponseOutcome) -> Result<R> {
    match outcome {
        ResponseOutcome::Success => response.json(),
        ResponseOutcome::Unconfirmed { status } => Err(Error::InvalidResponse(format!(
            "expected a success response with a body, got {}",
            status
        ))),
    }
}

fn row_id(metadata: &EntityMetadata, row: &Row) -> Option<String> {
    row.get(&metadata.id_attribute).and_then(value_text)
}

fn missing_id(metadata: &EntityMetadata) -> RowOutcome {
    RowOutcome {
        row_id: String::new(),
        result: Err(Error::InvalidResponse(format!(
            "row without id attribute '{}'",
            metadata.id_attribute
        ))),
    }
}
