//! Core of the satchel task manager: a durable JSON-backed store of
//! tasks and categories, lenient validation of whatever is on disk,
//! derived views (filtering, sorting, statistics) and the command
//! layer driving it all.

pub mod category;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod render;
pub mod storage;
pub mod store;
pub mod task;
pub mod validate;
pub mod views;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;

use crate::cli::GlobalCli;
use crate::config::Config;
use crate::render::Renderer;
use crate::store::TaskStore;

pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let cli = GlobalCli::parse_from(raw_args);
    cli::init_tracing(cli.verbose, cli.quiet)?;

    let mut cfg = Config::load(cli.rcfile.as_deref())?;
    cfg.apply_overrides(
        cli.rc_overrides
            .iter()
            .map(|kv| (kv.key.clone(), kv.value.clone())),
    );

    datetime::configure_timezone(cfg.get("timezone").as_deref());

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())?;
    let now = Utc::now();

    let mut store = TaskStore::open(&data_dir, now)
        .with_context(|| format!("failed opening data directory {}", data_dir.display()))?;
    let mut renderer = Renderer::new(&cfg)?;

    commands::dispatch(&mut store, &mut renderer, cli.command, now)
}
