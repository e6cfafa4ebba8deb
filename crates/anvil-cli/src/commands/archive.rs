use std::io::Write;
use std::path::Path;

use anvil::cloud::{AnvilClient, Endpoints};
use anvil::{AnvilConfig, Pipeline, Workspace};

use super::{
    Overrides, api_key, cancel_on_ctrl_c, load_config, report, reported_failure, setup_failure,
};

/// Bundle the whole workspace into one archive, upload it, and release it.
pub async fn archive(dir: &Path, overrides: &Overrides, json: bool) -> anyhow::Result<()> {
    let bus = report::event_bus(json);
    let (config, app_name, client) =
        prepare(dir, overrides).map_err(|e| setup_failure("archive", &bus, e))?;
    let workspace = Workspace::from_config(dir, &config.files);
    let pipeline = Pipeline::new(&client, &client, &bus).with_cancellation(cancel_on_ctrl_c());

    if !json {
        print!("Bundling workspace...");
        std::io::stdout().flush()?;
    }
    let staged = pipeline.stage(&workspace).map_err(|e| {
        if !json {
            println!();
        }
        reported_failure("archive", &e)
    })?;
    if !json {
        println!("done | {} MB", staged.size_mb());
    }

    pipeline
        .release_archive(
            staged,
            &app_name,
            config.app.release_description.as_deref(),
        )
        .await
        .map_err(|e| reported_failure("archive", &e))?;

    Ok(())
}

fn prepare(
    dir: &Path,
    overrides: &Overrides,
) -> anyhow::Result<(AnvilConfig, String, AnvilClient)> {
    let config = load_config(dir, overrides)?;
    let app_name = config.app_name()?.to_owned();
    let key = api_key(&config.platform)?;
    let client = AnvilClient::new(Endpoints::from_config(&config.platform), key, &app_name);
    Ok((config, app_name, client))
}
