//! Cypress end-to-end test wiring for example apps.
//!
//! [`add_cypress`] copies the test tooling pins from the monorepo root into an
//! app's manifest, and [`run_cypress`] launches the suite against a dev server
//! or a deployed URL.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde_json::Value;

use crate::config::DeployTestConfig;
use crate::error::{Error, Result};
use crate::manifest::{self, object_entry, Manifest};

/// Dependencies copied from the root manifest into the app's devDependencies.
pub const CYPRESS_DEPENDENCIES: [&str; 3] =
    ["start-server-and-test", "cypress", "@testing-library/cypress"];

/// Script that runs Cypress headless against whatever is at the base URL.
pub const SCRIPT_CY_RUN: &str = "cy:run";
/// Script that opens the interactive Cypress runner.
pub const SCRIPT_CY_OPEN: &str = "cy:open";
/// Script that boots the dev server and opens Cypress against it.
pub const SCRIPT_E2E_DEV: &str = "test:e2e:dev";
/// Script that boots the dev server and runs Cypress headless against it.
pub const SCRIPT_E2E_RUN: &str = "test:e2e:run";

/// Copies the Cypress tooling into the manifest in `directory`, sourcing
/// versions from the manifest in the current working directory.
pub fn add_cypress(directory: impl AsRef<Path>, url: &str) -> Result<()> {
    let root = manifest::read_root_package_json()?;
    add_cypress_from(&root, directory, url)
}

/// Copies the Cypress tooling into the manifest in `directory`, sourcing
/// versions from `root`.
///
/// Fails with [`Error::MissingDependency`] before touching the target if
/// `root` does not pin every entry of [`CYPRESS_DEPENDENCIES`].
pub fn add_cypress_from(root: &Manifest, directory: impl AsRef<Path>, url: &str) -> Result<()> {
    let pins = cypress_pins(root)?;
    let directory = directory.as_ref();

    manifest::update_package_config(directory, |config| inject_cypress(config, &pins, url))?;

    tracing::info!(
        directory = %directory.display(),
        url = %url,
        "added cypress to app manifest"
    );
    Ok(())
}

/// Looks up the pinned versions of [`CYPRESS_DEPENDENCIES`] in `root`.
pub fn cypress_pins(root: &Manifest) -> Result<Vec<(String, Value)>> {
    let dependencies = root.get("dependencies").and_then(Value::as_object);

    CYPRESS_DEPENDENCIES
        .iter()
        .map(|name| {
            dependencies
                .and_then(|deps| deps.get(*name))
                .map(|version| (name.to_string(), version.clone()))
                .ok_or_else(|| Error::MissingDependency(name.to_string()))
        })
        .collect()
}

/// Returns `config` with the given dependency pins and the e2e scripts added.
pub fn inject_cypress(mut config: Manifest, pins: &[(String, Value)], url: &str) -> Result<Manifest> {
    let dev_dependencies = object_entry(&mut config, "devDependencies")?;
    for (name, version) in pins {
        dev_dependencies.insert(name.clone(), version.clone());
    }

    let scripts = object_entry(&mut config, "scripts")?;
    scripts.insert(SCRIPT_CY_RUN.to_string(), Value::from("cypress run"));
    scripts.insert(SCRIPT_CY_OPEN.to_string(), Value::from("cypress open"));
    scripts.insert(
        SCRIPT_E2E_DEV.to_string(),
        Value::from(format!("start-server-and-test dev {} {}", url, SCRIPT_CY_OPEN)),
    );
    scripts.insert(
        SCRIPT_E2E_RUN.to_string(),
        Value::from(format!("start-server-and-test dev {} {}", url, SCRIPT_CY_RUN)),
    );

    Ok(config)
}

/// Which server the e2e suite runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum E2eMode {
    /// A local dev server started by `start-server-and-test`.
    Dev,
    /// An already deployed instance.
    Deployed,
}

impl E2eMode {
    /// Package script that runs the suite in this mode.
    pub fn script(&self) -> &'static str {
        match self {
            Self::Dev => SCRIPT_E2E_RUN,
            Self::Deployed => SCRIPT_CY_RUN,
        }
    }
}

impl From<bool> for E2eMode {
    fn from(dev: bool) -> Self {
        if dev {
            Self::Dev
        } else {
            Self::Deployed
        }
    }
}

impl fmt::Display for E2eMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dev => write!(f, "dev server"),
            Self::Deployed => write!(f, "deployed server"),
        }
    }
}

/// How the child's standard streams are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdioMode {
    /// Share the parent's stdin, stdout and stderr.
    #[default]
    Inherit,
    /// Discard all child IO, for callers that want a quiet run (e.g. a
    /// smoke check whose output would clutter the deploy log).
    Null,
}

impl StdioMode {
    fn stdio(&self) -> Stdio {
        match self {
            Self::Inherit => Stdio::inherit(),
            Self::Null => Stdio::null(),
        }
    }
}

/// Options for launching a child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOptions {
    /// Working directory of the child.
    pub cwd: PathBuf,
    /// Stream wiring.
    pub stdio: StdioMode,
    /// Variables added on top of the parent's environment.
    pub env: HashMap<String, String>,
}

impl SpawnOptions {
    /// Adds an environment variable for the child.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Default spawn options for running a tool inside `dir`.
pub fn spawn_options(dir: impl Into<PathBuf>) -> SpawnOptions {
    SpawnOptions {
        cwd: dir.into(),
        stdio: StdioMode::Inherit,
        env: HashMap::new(),
    }
}

/// Starts a child process and blocks until it exits.
pub trait ProcessLauncher {
    /// Runs `program` with `args` and returns its exit code.
    ///
    /// `None` means the child was terminated by a signal.
    fn run(&self, program: &str, args: &[&str], options: &SpawnOptions) -> Result<Option<i32>>;
}

/// Launches real processes via [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn run(&self, program: &str, args: &[&str], options: &SpawnOptions) -> Result<Option<i32>> {
        let status = Command::new(program)
            .args(args)
            .current_dir(&options.cwd)
            .envs(&options.env)
            .stdin(options.stdio.stdio())
            .stdout(options.stdio.stdio())
            .stderr(options.stdio.stdio())
            .status()?;

        Ok(status.code())
    }
}

/// Runs the Cypress suite in `dir` against `url`.
pub fn run_cypress(dir: impl AsRef<Path>, mode: E2eMode, url: &str) -> Result<()> {
    CypressRunner::new(SystemLauncher, DeployTestConfig::default()).run(dir, mode, url)
}

/// Runs the e2e suite through the configured package manager.
pub struct CypressRunner<L: ProcessLauncher> {
    launcher: L,
    config: DeployTestConfig,
}

impl<L: ProcessLauncher> CypressRunner<L> {
    /// Creates a runner using `launcher` for child processes.
    pub fn new(launcher: L, config: DeployTestConfig) -> Self {
        Self { launcher, config }
    }

    /// Builds the spawn options for running the suite in `dir` against `url`.
    pub fn options(&self, dir: &Path, url: &str) -> SpawnOptions {
        spawn_options(dir).with_env(&self.config.base_url_env, url)
    }

    /// Runs the suite and blocks until it finishes.
    ///
    /// Fails with [`Error::ChildProcess`] naming `mode` if the suite does not
    /// exit cleanly.
    pub fn run(&self, dir: impl AsRef<Path>, mode: E2eMode, url: &str) -> Result<()> {
        let dir = dir.as_ref();
        let options = self.options(dir, url);
        let script = mode.script();

        tracing::info!(
            dir = %dir.display(),
            url = %url,
            mode = %mode,
            script = %script,
            "running cypress"
        );

        let code = self
            .launcher
            .run(&self.config.package_manager, &["run", script], &options)?;

        if code != Some(0) {
            tracing::error!(mode = %mode, code = ?code, "cypress run failed");
            return Err(Error::ChildProcess { mode, code });
        }

        Ok(())
    }
}
