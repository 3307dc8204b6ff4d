//! Convert a parsed configuration into the runtime configuration.

use crate::configuration::Configuration;
use crate::environment::Environment;
use crate::error::MakeRuntimeConfigurationError;
use crate::values::{ConnectionUri, PoolSettings, Secret};
use crate::version1::ParsedConfiguration;

/// Resolve every secret against `environment` and check the pool settings.
pub fn make_runtime_configuration(
    parsed_config: ParsedConfiguration,
    environment: impl Environment,
) -> Result<Configuration, MakeRuntimeConfigurationError> {
    let connection_uri = match &parsed_config.connection_uri {
        ConnectionUri(Secret::Plain(uri)) => uri.clone(),
        ConnectionUri(Secret::FromEnvironment { variable }) => {
            environment.read(variable).map_err(|error| {
                MakeRuntimeConfigurationError::MissingEnvironmentVariable {
                    attribute: "connectionUri".into(),
                    source: error,
                }
            })?
        }
    };

    validate_pool_settings(&parsed_config.pool_settings)?;

    Ok(Configuration {
        connection_uri,
        pool_settings: parsed_config.pool_settings,
        engine: parsed_config.engine,
    })
}

fn validate_pool_settings(settings: &PoolSettings) -> Result<(), MakeRuntimeConfigurationError> {
    if settings.max_connections == 0 {
        return Err(MakeRuntimeConfigurationError::InvalidPoolSettings(
            "maxConnections must be at least 1".into(),
        ));
    }
    Ok(())
}
