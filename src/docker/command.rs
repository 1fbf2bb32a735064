#![allow(clippy::module_name_repetitions)]
//! Typed `docker …` argv construction with per-field validation.
//!
//! Commands are executed as argv vectors, never through a shell; the preview string is only
//! for logs and dry runs.

use crate::errors::ProvisionError;
use crate::util::{reject_newlines, shell_join};

/// One docker CLI invocation (arguments after the `docker` binary).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DockerCommand {
    args: Vec<String>,
}

impl DockerCommand {
    /// Start a command from fixed subcommand words, e.g. `["container", "stop"]`.
    pub fn new<I, S>(subcommand: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: subcommand.into_iter().map(Into::into).collect(),
        }
    }

    /// Append a fixed argument (flags and literals chosen by this crate).
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append `--option value` after screening the value.
    pub fn option(mut self, option: &str, value: &str) -> Result<Self, ProvisionError> {
        reject_newlines(value, option).map_err(|r| ProvisionError::invalid("argument value", r))?;
        self.args.push(option.to_string());
        self.args.push(value.to_string());
        Ok(self)
    }

    /// Append a container or network name as a positional argument.
    pub fn name(mut self, what: &'static str, name: &str) -> Result<Self, ProvisionError> {
        validate_object_name(what, name)?;
        self.args.push(name.to_string());
        Ok(self)
    }

    /// Append an image reference as a positional argument.
    pub fn image(mut self, image: &str) -> Result<Self, ProvisionError> {
        validate_image_ref(image)?;
        self.args.push(image.to_string());
        Ok(self)
    }

    /// Append a caller-supplied runtime flag rendered as a single `--name=value` argument.
    pub fn extra_flag(mut self, name: &str, value: &str) -> Result<Self, ProvisionError> {
        validate_flag_name(name)?;
        reject_newlines(value, "runtime flag value")
            .map_err(|r| ProvisionError::invalid("runtime flag value", r))?;
        self.args.push(format!("--{name}={value}"));
        Ok(self)
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Shell-escaped single line (`docker …`) for logs and dry runs.
    pub fn preview(&self) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push("docker".to_string());
        words.extend(self.args.iter().cloned());
        shell_join(&words)
    }
}

/// Container and network names: `[A-Za-z0-9][A-Za-z0-9_.-]*`.
pub fn validate_object_name(what: &'static str, name: &str) -> Result<(), ProvisionError> {
    let mut chars = name.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    if !first_ok {
        return Err(ProvisionError::invalid(
            what,
            format!("{name:?} must start with an ASCII letter or digit"),
        ));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')) {
        return Err(ProvisionError::invalid(
            what,
            format!("{name:?} may only contain letters, digits, '_', '.', '-'"),
        ));
    }
    Ok(())
}

/// Image references: non-empty, no whitespace or control characters, not option-like.
pub fn validate_image_ref(image: &str) -> Result<(), ProvisionError> {
    if image.is_empty() {
        return Err(ProvisionError::invalid("image reference", "empty"));
    }
    if image.starts_with('-') {
        return Err(ProvisionError::invalid(
            "image reference",
            format!("{image:?} must not start with '-'"),
        ));
    }
    if image.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ProvisionError::invalid(
            "image reference",
            format!("{image:?} contains whitespace or control characters"),
        ));
    }
    Ok(())
}

/// Runtime flag names: `[A-Za-z0-9][A-Za-z0-9-]*` (the leading `--` is added by the builder).
pub fn validate_flag_name(name: &str) -> Result<(), ProvisionError> {
    let mut chars = name.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ProvisionError::invalid(
            "runtime flag name",
            format!("{name:?} must match [A-Za-z0-9][A-Za-z0-9-]*"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_produces_argv_not_shell_text() {
        let cmd = DockerCommand::new(["container", "rm"])
            .arg("--force")
            .name("container name", "clone_6000")
            .expect("name");
        assert_eq!(cmd.args(), ["container", "rm", "--force", "clone_6000"]);
        assert_eq!(cmd.preview(), "docker container rm --force clone_6000");
    }

    #[test]
    fn test_name_rejects_injection_attempts() {
        for bad in ["", "-rm", "a b", "c1;rm -rf /", "c1$(id)", "c1\n", "x/y"] {
            assert!(
                validate_object_name("container name", bad).is_err(),
                "accepted {bad:?}"
            );
        }
        for ok in ["c1", "dblab_clone_6000", "Clone.1-a"] {
            assert!(validate_object_name("container name", ok).is_ok(), "rejected {ok:?}");
        }
    }

    #[test]
    fn test_image_ref_validation() {
        assert!(validate_image_ref("postgresai/extended-postgres:16-0.5.1").is_ok());
        assert!(validate_image_ref("registry:5000/pg@sha256:abcd").is_ok());
        assert!(validate_image_ref("").is_err());
        assert!(validate_image_ref("--privileged").is_err());
        assert!(validate_image_ref("pg 16").is_err());
        assert!(validate_image_ref("pg\t16").is_err());
    }

    #[test]
    fn test_extra_flag_is_single_argument() {
        let cmd = DockerCommand::new(["run"])
            .extra_flag("shm-size", "1g")
            .expect("flag")
            .extra_flag("ulimit", "nofile=1024:2048 --privileged")
            .expect("flag with spaces");
        assert_eq!(
            cmd.args(),
            ["run", "--shm-size=1g", "--ulimit=nofile=1024:2048 --privileged"]
        );
        assert!(DockerCommand::new(["run"]).extra_flag("-x", "1").is_err());
        assert!(DockerCommand::new(["run"]).extra_flag("a=b", "1").is_err());
        assert!(DockerCommand::new(["run"]).extra_flag("ok", "bad\nvalue").is_err());
    }

    #[test]
    fn test_option_rejects_newlines() {
        assert!(DockerCommand::new(["run"]).option("--env", "A=1").is_ok());
        assert!(DockerCommand::new(["run"]).option("--env", "A=1\nB=2").is_err());
    }

    #[test]
    fn test_preview_quotes_templates() {
        let cmd = DockerCommand::new(["container", "ls"])
            .option("--format", "{{.Names}}")
            .expect("format");
        assert_eq!(cmd.preview(), "docker container ls --format '{{.Names}}'");
    }
}
