//! MOLGENIS Client for Rust
//!
//! This crate provides a Rust client for the MOLGENIS REST API: it logs in once and then
//! adds, queries, updates and deletes rows of entities, using the entity and column metadata
//! endpoints to validate rows and to make server errors actionable.
//!
//! # Example
//!
//! ```no_run
//! use molgenis_client::{ClientConfig, MolgenisClient, Row};
//! use molgenis_client::models::Query;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder("http://localhost:8080", "admin", "admin").build()?;
//!     let mut client = MolgenisClient::connect(config).await?;
//!
//!     let row: Row = json!({"age": "26", "gender": "Male"})
//!         .as_object()
//!         .cloned()
//!         .unwrap_or_default();
//!     let id = client.add_row("Person", &row, true).await?;
//!
//!     let rows = client.query_rows("Person", &Query::equals("id", id.as_str())).await?;
//!     println!("{:?}", rows.items);
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod response;
pub mod session;

#[cfg(any(test, feature = "test-utils"))]
pub mod in_memory;


pub use client::MolgenisClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{Error, Result};
pub use http::{HttpTransport, ReqwestTransport};
pub use models::{Row, RowOutcome, RowsResponse};
pub use response::ResponseOutcome;

#[doc(hidden)]
pub mod prelude {
    pub use crate::client::MolgenisClient;
    pub use crate::models::{
        metadata::{AttributeMetadata, EntityMetadata, FieldType},
        query::{Operator, Query, QueryRule},
        rows::{Row, RowOutcome, RowsResponse},
    };
    pub use crate::response::ResponseOutcome;
}
