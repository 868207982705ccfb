//! Apt repository resource - sources.list.d entries with signing keys

use anyhow::{Context, Result, bail};
use converge::{Applied, AttrValue, Provider, Resource, ResourceKind, RunContext, State};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::{fetch_bytes, required_str};
use crate::runner;

/// Signing keys run a few hundred KB at most.
const MAX_KEY_SIZE: u64 = 4 * 1024 * 1024;

/// Manages one `deb` source list plus its signing keyring.
pub struct AptRepositoryProvider {
    sources_dir: PathBuf,
    keyrings_dir: PathBuf,
    refresh: bool,
}

impl AptRepositoryProvider {
    pub fn new() -> Self {
        Self {
            sources_dir: PathBuf::from("/etc/apt/sources.list.d"),
            keyrings_dir: PathBuf::from("/usr/share/keyrings"),
            refresh: true,
        }
    }

    /// Provider rooted at custom directories, with the apt index refresh
    /// disabled (for testing).
    pub fn with_dirs(sources_dir: impl Into<PathBuf>, keyrings_dir: impl Into<PathBuf>) -> Self {
        Self {
            sources_dir: sources_dir.into(),
            keyrings_dir: keyrings_dir.into(),
            refresh: false,
        }
    }

    fn list_file(&self, resource: &Resource) -> PathBuf {
        self.sources_dir.join(format!("{}.list", slug(resource.name())))
    }

    fn keyring_file(&self, resource: &Resource) -> PathBuf {
        self.keyrings_dir.join(format!("{}.gpg", slug(resource.name())))
    }

    fn wants_key(&self, resource: &Resource) -> bool {
        resource.attr_str("key").is_some() || resource.attr_str("keyserver").is_some()
    }

    /// The `deb` line this resource converges to.
    fn source_line(&self, resource: &Resource) -> Result<String> {
        let uri = required_str(resource, "uri")?;

        let mut line = String::from("deb ");
        if self.wants_key(resource) {
            line.push_str(&format!(
                "[signed-by={}] ",
                self.keyring_file(resource).display()
            ));
        }
        line.push_str(uri);
        line.push(' ');
        // Flat repositories have no distribution
        line.push_str(resource.attr_str("distribution").unwrap_or("./"));
        if let Some(components) = resource.attr("components").and_then(AttrValue::as_list) {
            for component in components {
                line.push(' ');
                line.push_str(component);
            }
        }
        Ok(line)
    }

    fn install_key(&self, resource: &Resource) -> Result<()> {
        let keyring = self.keyring_file(resource);
        fs::create_dir_all(&self.keyrings_dir).with_context(|| {
            format!("Failed to create {}", self.keyrings_dir.display())
        })?;

        if let Some(keyserver) = resource.attr_str("keyserver") {
            if !runner::command_exists("gpg") {
                bail!("gpg is required to fetch signing keys from a keyserver");
            }
            let id = required_str(resource, "key")?;
            let keyring_str = keyring.to_string_lossy();
            runner::run_capture(
                "gpg",
                &[
                    "--batch",
                    "--yes",
                    "--no-default-keyring",
                    "--keyring",
                    &keyring_str,
                    "--keyserver",
                    keyserver,
                    "--recv-keys",
                    id,
                ],
            )
            .with_context(|| format!("Failed to fetch key {id} from {keyserver}"))?;
            return Ok(());
        }

        let source = required_str(resource, "key")?;
        let bytes = fetch_bytes(source, MAX_KEY_SIZE)?;
        if bytes.starts_with(b"-----BEGIN") {
            dearmor_into(&keyring, &bytes)
        } else {
            fs::write(&keyring, bytes)
                .with_context(|| format!("Failed to write {}", keyring.display()))
        }
    }
}

impl Default for AptRepositoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Resource names become filenames; keep them shell- and apt-safe.
fn slug(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Convert an ASCII-armored key to the binary keyring format apt expects.
fn dearmor_into(keyring: &std::path::Path, armored: &[u8]) -> Result<()> {
    if !runner::command_exists("gpg") {
        bail!("gpg is required to install armored signing keys");
    }
    let keyring_str = keyring.to_string_lossy();
    let mut child = Command::new("gpg")
        .args(["--batch", "--yes", "--dearmor", "-o", &keyring_str])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .context("Failed to run gpg --dearmor")?;

    if let Some(stdin) = child.stdin.as_mut() {
        stdin
            .write_all(armored)
            .context("Failed to stream key to gpg")?;
    }
    let output = child
        .wait_with_output()
        .context("Failed to wait for gpg --dearmor")?;
    if !output.status.success() {
        bail!(
            "gpg --dearmor failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

impl Provider for AptRepositoryProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::AptRepository
    }

    fn current_state(&self, resource: &Resource, _ctx: &RunContext) -> Result<State> {
        let want = self.source_line(resource)?;
        let path = self.list_file(resource);

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(State::Absent),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        if content.trim() != want {
            return Ok(State::Modified {
                from: content.trim().to_string(),
                to: want,
            });
        }
        if self.wants_key(resource) && !self.keyring_file(resource).exists() {
            return Ok(State::Modified {
                from: "signing key missing".to_string(),
                to: want,
            });
        }
        Ok(State::present_with(want))
    }

    fn desired_state(&self, resource: &Resource, _ctx: &RunContext) -> Result<State> {
        Ok(State::present_with(self.source_line(resource)?))
    }

    fn apply(&self, resource: &Resource, _ctx: &RunContext) -> Result<Applied> {
        let mut changed = false;

        if self.wants_key(resource) && !self.keyring_file(resource).exists() {
            self.install_key(resource)?;
            changed = true;
        }

        let want = self.source_line(resource)?;
        let path = self.list_file(resource);
        let current = fs::read_to_string(&path).ok();
        if current.as_deref().map(str::trim) != Some(want.as_str()) {
            fs::create_dir_all(&self.sources_dir).with_context(|| {
                format!("Failed to create {}", self.sources_dir.display())
            })?;
            fs::write(&path, format!("{want}\n"))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            changed = true;
        }

        if changed && self.refresh {
            runner::run_capture_env(
                "apt-get",
                &["update"],
                &[("DEBIAN_FRONTEND", "noninteractive")],
            )
            .context("Failed to refresh apt index")?;
        }

        Ok(if changed {
            Applied::changed()
        } else {
            Applied::unchanged()
        })
    }
}
