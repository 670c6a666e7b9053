use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_bedrockruntime::config::Region;
use aws_sdk_bedrockruntime::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::Client;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::{
    Connector, CredentialRefresher, InvokeFailure, ModelConnection, ModelError, SessionTarget,
};

/// Loads the shared AWS config for a profile and region and builds a
/// Bedrock runtime client from it.
#[derive(Debug, Clone, Copy, Default)]
pub struct BedrockConnector;

pub struct BedrockConnection {
    client: Client,
}

#[async_trait]
impl Connector for BedrockConnector {
    type Handle = BedrockConnection;

    #[instrument(skip(self), fields(profile = ?target.profile, region = %target.region))]
    async fn connect(&self, target: &SessionTarget) -> Result<BedrockConnection, ModelError> {
        if target.region.trim().is_empty() {
            return Err(ModelError::Connect("AWS region is empty".to_string()));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(target.region.clone()));
        if let Some(profile) = &target.profile {
            loader = loader.profile_name(profile);
        }
        let sdk_config = loader.load().await;
        debug!("loaded AWS config");

        Ok(BedrockConnection {
            client: Client::new(&sdk_config),
        })
    }
}

#[async_trait]
impl ModelConnection for BedrockConnection {
    async fn invoke(&self, model_id: &str, body: &[u8]) -> Result<Vec<u8>, InvokeFailure> {
        let output = self
            .client
            .invoke_model()
            .model_id(model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body.to_vec()))
            .send()
            .await
            .map_err(|err| {
                let code = err.code().map(str::to_string);
                InvokeFailure::classified(code.as_deref(), DisplayErrorContext(&err).to_string())
            })?;

        Ok(output.body.into_inner())
    }
}

/// Re-authenticates with `aws sso login`, inheriting the terminal so the
/// user can complete the browser/device flow.
#[derive(Debug, Clone)]
pub struct SsoLogin {
    program: String,
}

impl Default for SsoLogin {
    fn default() -> Self {
        SsoLogin {
            program: "aws".to_string(),
        }
    }
}

impl SsoLogin {
    #[cfg(test)]
    pub fn with_program(program: impl Into<String>) -> SsoLogin {
        SsoLogin {
            program: program.into(),
        }
    }

    fn args(profile: Option<&str>) -> Vec<&str> {
        let mut args = vec!["sso", "login"];
        if let Some(profile) = profile {
            args.extend(["--profile", profile]);
        }
        args
    }
}

#[async_trait]
impl CredentialRefresher for SsoLogin {
    #[instrument(skip(self))]
    async fn refresh(&self, profile: Option<&str>) -> Result<(), ModelError> {
        eprintln!("AWS session expired. Logging in...");
        let status = Command::new(&self.program)
            .args(Self::args(profile))
            .status()
            .await
            .map_err(|e| ModelError::Login(format!("could not run {}: {}", self.program, e)))?;

        if !status.success() {
            return Err(ModelError::Login(format!(
                "{} sso login exited with {}",
                self.program, status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_args() {
        assert_eq!(SsoLogin::args(None), vec!["sso", "login"]);
        assert_eq!(
            SsoLogin::args(Some("tooling")),
            vec!["sso", "login", "--profile", "tooling"]
        );
    }

    #[tokio::test]
    async fn test_empty_region_rejected() {
        let target = SessionTarget {
            profile: None,
            region: String::new(),
            model: "m".to_string(),
        };
        assert!(matches!(
            BedrockConnector.connect(&target).await,
            Err(ModelError::Connect(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_login_success_from_exit_status() {
        let login = SsoLogin::with_program("true");
        assert!(login.refresh(Some("tooling")).await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_login_failure_from_exit_status() {
        let login = SsoLogin::with_program("false");
        let err = login.refresh(None).await.unwrap_err();
        assert!(err.to_string().contains("false sso login exited with"));
    }

    #[tokio::test]
    async fn test_login_missing_program() {
        let login = SsoLogin::with_program("plantir-no-such-binary");
        let err = login.refresh(None).await.unwrap_err();
        assert!(matches!(err, ModelError::Login(ref m) if m.starts_with("could not run")));
    }
}
