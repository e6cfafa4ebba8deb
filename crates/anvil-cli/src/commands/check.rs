use std::fmt;
use std::path::Path;

use anvil::config::{CONFIG_FILE, validate_buildpack_url};
use anvil::env::parse_build_env;
use anvil::{AnvilConfig, Workspace};

use super::{Overrides, api_key, report};

#[derive(Debug, Clone)]
struct CheckResult {
    passed: bool,
    detail: String,
}

impl CheckResult {
    fn ok(detail: &str) -> Self {
        Self {
            passed: true,
            detail: detail.to_owned(),
        }
    }

    fn fail(detail: &str) -> Self {
        Self {
            passed: false,
            detail: detail.to_owned(),
        }
    }

    fn skipped() -> Self {
        Self::fail("not checked, configuration did not load")
    }

    fn icon(&self) -> &'static str {
        if self.passed { "OK" } else { "NG" }
    }
}

#[derive(Debug, Clone)]
struct CheckReport {
    config_file: CheckResult,
    app_name: CheckResult,
    api_key: CheckResult,
    buildpack: CheckResult,
    build_env: CheckResult,
    globs: CheckResult,
    base_dir: CheckResult,
}

impl CheckReport {
    fn all_passed(&self) -> bool {
        self.rows().iter().all(|(_, result)| result.passed)
    }

    fn rows(&self) -> [(&'static str, &CheckResult); 7] {
        [
            ("Config file", &self.config_file),
            ("App name", &self.app_name),
            ("API key", &self.api_key),
            ("Buildpack", &self.buildpack),
            ("Build env", &self.build_env),
            ("File globs", &self.globs),
            ("Base dir", &self.base_dir),
        ]
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "anvil check")?;
        writeln!(f, "{}", "-".repeat(40))?;
        for (label, result) in self.rows() {
            writeln!(f, "  {:<12} {}  {}", label, result.icon(), result.detail)?;
        }
        Ok(())
    }
}

/// Validate configuration offline, reporting each item as OK or NG.
pub fn check(dir: &Path, overrides: &Overrides) -> anyhow::Result<()> {
    let report = inspect(dir, overrides);

    println!();
    println!("{report}");

    if !report.all_passed() {
        anyhow::bail!("some checks failed — see above for details");
    }

    Ok(())
}

fn inspect(dir: &Path, overrides: &Overrides) -> CheckReport {
    let config_path = dir.join(CONFIG_FILE);
    let mut config = match AnvilConfig::load(dir) {
        Ok(config) => config,
        Err(e) => {
            return CheckReport {
                config_file: CheckResult::fail(&format!("{:#}", anyhow::Error::new(e))),
                app_name: CheckResult::skipped(),
                api_key: CheckResult::skipped(),
                buildpack: CheckResult::skipped(),
                build_env: CheckResult::skipped(),
                globs: CheckResult::skipped(),
                base_dir: CheckResult::skipped(),
            };
        }
    };
    overrides.apply(&mut config);

    let config_file = if config_path.exists() {
        CheckResult::ok(&format!("Found {}", config_path.display()))
    } else {
        CheckResult::ok("Not found, using defaults")
    };

    let app_name = match config.app_name() {
        Ok(name) => CheckResult::ok(name),
        Err(e) => CheckResult::fail(&e.to_string()),
    };

    let api_key = match api_key(&config.platform) {
        Ok(_) => CheckResult::ok(&format!("{} is set", config.platform.api_key_env)),
        Err(e) => CheckResult::fail(&e.to_string()),
    };

    let buildpack = match config.buildpack_url() {
        None => CheckResult::ok("Not set, detected by the build service"),
        Some(url) => match validate_buildpack_url(url) {
            Ok(()) => CheckResult::ok(url),
            Err(e) => CheckResult::fail(&e.to_string()),
        },
    };

    let build_env = match parse_build_env(&config.build.env) {
        Ok(vars) => CheckResult::ok(&report::amt(vars.len(), "variable")),
        Err(e) => CheckResult::fail(&e.to_string()),
    };

    let workspace = Workspace::from_config(dir, &config.files);
    let globs = match workspace.filter() {
        Ok(_) => CheckResult::ok(&format!(
            "include {:?}, exclude {:?}",
            workspace.includes, workspace.excludes
        )),
        Err(e) => CheckResult::fail(&e.to_string()),
    };

    let base_dir = if workspace.base_dir.is_dir() {
        CheckResult::ok(&workspace.base_dir.display().to_string())
    } else {
        CheckResult::fail(&format!(
            "{} is not a directory",
            workspace.base_dir.display()
        ))
    };

    CheckReport {
        config_file,
        app_name,
        api_key,
        buildpack,
        build_env,
        globs,
        base_dir,
    }
}
