//! Environment access, abstracted so configuration resolution can be tested.

use std::env;
use std::path::PathBuf;

use log::debug;

use crate::error::ConfigurationError;

/// Environment variable holding the API token.
pub const TOKEN_ENV: &str = "FLAGSWEEP_API_TOKEN";

/// Environment variable naming a file that holds the API token.
pub const TOKEN_FILE_ENV: &str = "FLAGSWEEP_API_TOKEN_FILE";

/// Environment variable overriding the API base URL.
pub const BASE_URL_ENV: &str = "FLAGSWEEP_BASE_URL";

#[cfg_attr(test, mockall::automock)]
pub trait Environment: Send + Sync {
    fn var(&self, key: &str) -> Result<String, env::VarError>;
}

/// Reads from the process environment.
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    #[tracing::instrument(skip(self))]
    fn var(&self, key: &str) -> Result<String, env::VarError> {
        env::var(key)
    }
}

/// Finds the API token: `FLAGSWEEP_API_TOKEN` if it is set and not blank,
/// otherwise the trimmed contents of the file named by
/// `FLAGSWEEP_API_TOKEN_FILE`. `Ok(None)` when neither is set.
pub async fn resolve_token<E>(env: &E) -> Result<Option<String>, ConfigurationError>
where
    E: Environment + ?Sized,
{
    if let Ok(token) = env.var(TOKEN_ENV) {
        if !token.trim().is_empty() {
            return Ok(Some(token));
        }
    }

    let Ok(path) = env.var(TOKEN_FILE_ENV) else {
        return Ok(None);
    };
    let path = PathBuf::from(path);
    debug!("Reading API token from {}", path.display());
    let contents = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| ConfigurationError::TokenSource { path, source })?;
    Ok(Some(contents.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use std::io::Write;

    #[test]
    fn test_system_environment_reads_process_env() {
        // PATH exists on every platform the tests run on
        assert!(SystemEnvironment.var("PATH").is_ok());
        assert!(
            SystemEnvironment
                .var("FLAGSWEEP_SURELY_UNSET_VARIABLE")
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_resolve_token_prefers_variable() {
        let mut env = MockEnvironment::new();
        env.expect_var()
            .with(eq(TOKEN_ENV))
            .returning(|_| Ok("api-from-variable".to_string()));
        env.expect_var().with(eq(TOKEN_FILE_ENV)).never();

        let token = resolve_token(&env).await.unwrap();
        assert_eq!(token.as_deref(), Some("api-from-variable"));
    }

    #[tokio::test]
    async fn test_resolve_token_falls_back_to_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  api-from-file  ").unwrap();
        let path = file.path().display().to_string();

        let mut env = MockEnvironment::new();
        env.expect_var()
            .with(eq(TOKEN_ENV))
            .returning(|_| Ok("   ".to_string()));
        env.expect_var()
            .with(eq(TOKEN_FILE_ENV))
            .returning(move |_| Ok(path.clone()));

        let token = resolve_token(&env).await.unwrap();
        assert_eq!(token.as_deref(), Some("api-from-file"));
    }

    #[tokio::test]
    async fn test_resolve_token_none_when_unset() {
        let mut env = MockEnvironment::new();
        env.expect_var()
            .returning(|_| Err(std::env::VarError::NotPresent));

        assert_eq!(resolve_token(&env).await.unwrap(), None);
    }
}
