use super::defaults::{
    MAX_ENGINE_ARGS, MAX_ENGINE_ARG_BYTES, MAX_FRAME_DECODE_WORKERS, MAX_READY_TIMEOUT_MS,
    MAX_RECONNECT_ATTEMPTS, MAX_RECONNECT_BACKOFF_MS,
};
use super::AppConfig;
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::{fs, path::Path};

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize the engine command.
    pub fn validate(&mut self) -> Result<()> {
        if self.port == 0 {
            bail!("--port must be between 1 and 65535, got 0");
        }

        if self.ready_marker.trim().is_empty() {
            bail!("--ready-marker must not be empty");
        }
        if self.ready_marker.contains(['\n', '\r']) {
            bail!("--ready-marker must be a single line");
        }
        if self.ready_timeout_ms == 0 || self.ready_timeout_ms > MAX_READY_TIMEOUT_MS {
            bail!(
                "--ready-timeout-ms must be between 1 and {MAX_READY_TIMEOUT_MS}, got {}",
                self.ready_timeout_ms
            );
        }
        if !(100..=10_000).contains(&self.gesture_dwell_ms) {
            bail!(
                "--gesture-dwell-ms must be between 100 and 10000, got {}",
                self.gesture_dwell_ms
            );
        }
        if !(50..=30_000).contains(&self.connect_timeout_ms) {
            bail!(
                "--connect-timeout-ms must be between 50 and 30000, got {}",
                self.connect_timeout_ms
            );
        }
        if self.reconnect_attempts > MAX_RECONNECT_ATTEMPTS {
            bail!(
                "--reconnect-attempts must be at most {MAX_RECONNECT_ATTEMPTS}, got {}",
                self.reconnect_attempts
            );
        }
        if self.reconnect_backoff_ms == 0 || self.reconnect_backoff_ms > MAX_RECONNECT_BACKOFF_MS
        {
            bail!(
                "--reconnect-backoff-ms must be between 1 and {MAX_RECONNECT_BACKOFF_MS}, got {}",
                self.reconnect_backoff_ms
            );
        }
        if !(1..=MAX_FRAME_DECODE_WORKERS).contains(&self.frame_decode_workers) {
            bail!(
                "--frame-decode-workers must be between 1 and {MAX_FRAME_DECODE_WORKERS}, got {}",
                self.frame_decode_workers
            );
        }
        if !(16..=4096).contains(&self.canvas_width) || !(16..=4096).contains(&self.canvas_height)
        {
            bail!(
                "canvas size must be between 16x16 and 4096x4096, got {}x{}",
                self.canvas_width,
                self.canvas_height
            );
        }
        // The widget is pinned 100px from the right edge, so the display must fit it.
        if self.display_width < 200 || self.display_height < 120 {
            bail!(
                "display area must be at least 200x120, got {}x{}",
                self.display_width,
                self.display_height
            );
        }

        // Keep the engine argv small; it is forwarded verbatim.
        if self.engine_args.len() > MAX_ENGINE_ARGS {
            bail!(
                "--engine-arg repeated too many times (max {MAX_ENGINE_ARGS}, got {})",
                self.engine_args.len()
            );
        }
        let total_arg_bytes: usize = self.engine_args.iter().map(|arg| arg.len()).sum();
        if total_arg_bytes > MAX_ENGINE_ARG_BYTES {
            bail!("combined --engine-arg length exceeds {MAX_ENGINE_ARG_BYTES} bytes");
        }
        if self.engine_args.iter().any(|arg| arg.contains('\0')) {
            bail!("--engine-arg must not contain NUL bytes");
        }

        self.engine_cmd =
            sanitize_binary(&self.engine_cmd, "--engine-cmd", &["python3", "python"])?;

        Ok(())
    }
}

/// Allow either a known binary name or an absolute path.
pub(super) fn sanitize_binary(value: &str, flag: &str, allowlist: &[&str]) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{flag} cannot be empty");
    }
    if let Some(allowed) = allowlist
        .iter()
        .find(|candidate| candidate.eq_ignore_ascii_case(trimmed))
    {
        return Ok((*allowed).to_string());
    }

    let path = Path::new(trimmed);
    if path.is_absolute() || trimmed.contains(std::path::MAIN_SEPARATOR) {
        let canonical = path
            .canonicalize()
            .with_context(|| format!("failed to canonicalize {flag} '{trimmed}'"))?;
        let metadata = fs::metadata(&canonical)
            .with_context(|| format!("failed to inspect {flag} '{}'", canonical.display()))?;
        if !metadata.is_file() {
            bail!("{flag} '{}' is not a file", canonical.display());
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = metadata.permissions().mode();
            if mode & 0o111 == 0 {
                bail!(
                    "{flag} '{}' exists but is not executable (mode {:o})",
                    canonical.display(),
                    mode
                );
            }
        }
        return canonical
            .to_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("{flag} must be valid UTF-8"));
    }

    bail!("{flag} must be one of {allowlist:?} or an existing binary path");
}
