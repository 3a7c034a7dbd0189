pub mod cluster;
pub mod config;
pub mod error;
pub mod params;
pub mod schema;
pub mod validators;
pub mod value;

pub use cluster::ClusterInfo;
pub use config::{ExternalSource, FamilyConfig, LogFormat, ServerConfig};
pub use error::{BackendError, BackendErrorKind, ConfigError, ValidationError};
pub use params::{parse, render, EnvSource, MapSource, NoSource, RequestParams, ValueSource};
pub use schema::{
    CommandDescription, ParamAction, ParamType, ParameterDescription, ParameterSchema,
    Transformer, Validator,
};
pub use value::{ParamMap, ParamValue};
