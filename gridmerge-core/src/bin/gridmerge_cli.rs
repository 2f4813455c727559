//! GridMerge CLI
//!
//! Commands: plan
//! Outputs JSON to stdout, writes nothing to disk
//! Returns 2 when no layout exists for the input

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use gridmerge_core::validation::Validator;
use gridmerge_core::{plan, GridSpec, MergeError};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gridmerge-cli")]
#[command(about = "GridMerge CLI - inspect how images would be tiled")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the grid layout and cell rectangles for an image count (no network)
    Plan {
        #[arg(long)]
        width: u32,

        #[arg(long)]
        height: u32,

        /// Number of images
        #[arg(short = 'n', long)]
        count: usize,
    },
}

fn emit(value: &Value) {
    println!("{:#}", value);
}

fn failure(err: &MergeError) -> Value {
    json!({
        "success": false,
        "kind": err.kind(),
        "error": err.to_string(),
    })
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Plan { width, height, count } => {
            let layout = match plan(count, width, height) {
                Ok(layout) => layout,
                Err(e) => {
                    emit(&failure(&e));
                    return ExitCode::from(2);
                }
            };

            // Same warnings a merge would log, without touching the network
            let placeholder = GridSpec::new(
                width,
                height,
                (0..count).map(|i| format!("https://placeholder.invalid/{}", i)).collect(),
            );
            let warnings: Vec<String> = Validator::new()
                .validate(&placeholder)
                .warnings()
                .map(|w| w.message.clone())
                .collect();

            let cells: Vec<_> = (0..count).map(|i| layout.cell(i)).collect();
            emit(&json!({
                "success": true,
                "layout": layout,
                "cells": cells,
                "warnings": warnings,
            }));
            ExitCode::SUCCESS
        }
    }
}
