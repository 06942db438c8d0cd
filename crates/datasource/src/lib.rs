//! # Datasource
//!
//! Host-facing surface of the MQTT stream.
//!
//! - `query_data`: apply query payloads (rule swap + retopic)
//! - `check_health`: broker connectivity
//! - `subscribe_stream` / `run_stream` / `publish_stream`: live stream lifecycle
//! - `dispose`: release the subscription
//!
//! ```no_run
//! use std::sync::Arc;
//! use contracts::{DataQuery, DatasourceSettings, QueryDataRequest, StreamSettings};
//! use datasource::MqttDatasource;
//! use ingestion::InMemoryBroker;
//!
//! let settings = DatasourceSettings::new("localhost:1883");
//! let broker = Arc::new(InMemoryBroker::connect(&settings).unwrap());
//! let ds = MqttDatasource::new(settings, StreamSettings::default(), broker);
//!
//! let response = ds.query_data(QueryDataRequest {
//!     queries: vec![DataQuery::new("A", r#"{"topic":"sensors/a"}"#)],
//! });
//! assert!(response.responses["A"].is_ok());
//! ```

mod datasource;
mod error;

pub use datasource::MqttDatasource;
pub use error::{DatasourceError, Result};
