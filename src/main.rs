//! Remix deployment-test CLI
//!
//! Exposes the deployment-test helpers to shell-based deploy scripts.

use std::path::PathBuf;

use remix_deploy_test::{
    cypress, manifest, AppNamer, AvailabilityPoller, CypressRunner, DeployTestConfig, E2eMode,
    Result, Revision, SystemLauncher,
};

const USAGE: &str = "\
Usage:
  remix-deploy-test app-name <target>
  remix-deploy-test add-cypress <dir> <url> [--root <dir>]
  remix-deploy-test check-up <url>
  remix-deploy-test run-cypress <dir> <url> [--dev]

Environment variables:
  DEPLOY_TEST_CONFIG=<path>  TOML or YAML config file";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    if let Err(e) = run(&args).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: &[String]) -> Result<()> {
    let config = DeployTestConfig::from_env()?;
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match args.as_slice() {
        ["app-name", target] => {
            let cwd = std::env::current_dir()?;
            let namer = AppNamer::new(&config.app_prefix, Revision::from_git(cwd)?);
            println!("{}", namer.app_name(target));
        }
        ["add-cypress", dir, url] => cypress::add_cypress(dir, url)?,
        ["add-cypress", dir, url, "--root", root] => {
            let root = manifest::read_package_json(root)?;
            cypress::add_cypress_from(&root, dir, url)?;
        }
        ["check-up", url] => {
            AvailabilityPoller::system(config.poll.clone())
                .check_up(*url)
                .await?;
        }
        ["run-cypress", dir, url, rest @ ..] if rest.is_empty() || rest == ["--dev"] => {
            let mode = E2eMode::from(!rest.is_empty());
            let dir = PathBuf::from(dir);
            let url = url.to_string();
            let runner = CypressRunner::new(SystemLauncher, config);

            // The suite inherits our stdio and can run for minutes.
            tokio::task::spawn_blocking(move || runner.run(dir, mode, &url))
                .await
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}
