use std::path::Path;

use anvil::cloud::{AnvilClient, Endpoints};
use anvil::{AnvilConfig, BuildConfig, Pipeline, Platform, ProcessEnv, Workspace};

use super::{
    Overrides, api_key, cancel_on_ctrl_c, load_config, report, reported_failure, setup_failure,
};

struct Target {
    config: AnvilConfig,
    client: AnvilClient,
    build_config: BuildConfig,
}

/// Deploy the workspace incrementally and release it.
pub async fn push(dir: &Path, overrides: &Overrides, json: bool) -> anyhow::Result<()> {
    let bus = report::event_bus(json);
    let Target {
        config,
        client,
        build_config,
    } = prepare(dir, overrides)
        .await
        .map_err(|e| setup_failure("push", &bus, e))?;
    let workspace = Workspace::from_config(dir, &config.files);

    Pipeline::new(&client, &client, &bus)
        .with_cancellation(cancel_on_ctrl_c())
        .upload_concurrency(config.files.upload_concurrency)
        .deploy(
            &workspace,
            &build_config,
            None,
            config.app.release_description.as_deref(),
        )
        .await
        .map_err(|e| reported_failure("push", &e))?;

    Ok(())
}

async fn prepare(dir: &Path, overrides: &Overrides) -> anyhow::Result<Target> {
    let config = load_config(dir, overrides)?;
    let app_name = config.app_name()?.to_owned();
    let key = api_key(&config.platform)?;

    let client = AnvilClient::new(
        Endpoints::from_config(&config.platform),
        key.clone(),
        &app_name,
    );
    let user = client.user_info().await?;
    tracing::debug!(app = %app_name, user = %user.email, "authenticated");

    let build_config = BuildConfig::new(&config, key, &user.email, &ProcessEnv::capture())?;
    Ok(Target {
        config,
        client,
        build_config,
    })
}
