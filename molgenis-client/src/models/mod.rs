pub mod auth;
pub mod metadata;
pub mod query;
pub mod rows;

pub use auth::{LoginRequest, LoginResponse};
pub use metadata::{AttributeMetadata, EntityMetadata, FieldType};
pub use query::{Operator, Query, QueryRule};
pub use rows::{Row, RowOutcome, RowsResponse};
