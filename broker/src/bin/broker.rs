// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use clap::Parser;
use std::path::PathBuf;

use broker::auth::AuthManager;
use broker::config::Config;
use broker::error::{Error, ErrorKind};
use broker::Broker;

#[derive(Parser, Debug)]
#[command(name = "broker", version, about = "MQTT v3.1.1 broker")]
struct Cli {
    /// Path to the broker's TOML config file.
    #[arg(short, long, value_name = "FILE", default_value = "/etc/broker/broker.toml")]
    config: PathBuf,

    /// Parse and validate the config file, then exit without starting.
    #[arg(short, long)]
    test: bool,
}

fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    config.validate()?;
    init_log(&config);

    if cli.test {
        println!("The configuration file {} syntax is Ok", cli.config.display());
        return Ok(());
    }

    let auth = AuthManager::from_config(config.security())?;
    let broker = Broker::new(config, auth);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(broker.run())
}

/// Seed `RUST_LOG` from the config's `[log]` section when the user has not
/// already set it, then initialize `env_logger` (spec 6).
fn init_log(config: &Config) {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", config.log().log_level().as_str());
    }
    env_logger::init();
}

fn load_config(path: &PathBuf) -> Result<Config, Error> {
    if !path.exists() {
        log::warn!(
            "broker: config file {} not found, using defaults",
            path.display()
        );
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|err| Error::from_string(ErrorKind::ConfigError, format!("invalid config: {err}")))
}
