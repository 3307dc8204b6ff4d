pub mod configuration;
pub mod environment;
pub mod error;
pub mod to_runtime_configuration;
pub mod values;
pub mod version1;

pub use configuration::{Configuration, EngineSettings};
pub use values::uri::ConnectionUri;
pub use version1::{
    parse_configuration, write_parsed_configuration, ParsedConfiguration,
    DEFAULT_CONNECTION_URI_VARIABLE,
};

pub use to_runtime_configuration::make_runtime_configuration;
