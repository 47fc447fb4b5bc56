// smartquery -- an embeddable expression language
// Copyright (C) 2021  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! `sq` evaluates expression scripts, or starts an interactive session.

use std::path::PathBuf;

use structopt::StructOpt;

use smartquery::repl;
use smartquery_lang::Engine;

#[derive(Debug, StructOpt)]
#[structopt(name = "sq", about = "Evaluate SmartQuery expressions")]
struct Opt {
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: usize,

    /// Node budget for a single evaluation.
    #[structopt(long = "max-ops", default_value = "100")]
    max_ops: usize,

    /// Script to evaluate. Without it, an interactive session starts.
    #[structopt(parse(from_os_str))]
    script: Option<PathBuf>,
}

fn main() -> Result<(), repl::AppError> {
    let opt = Opt::from_args();

    let level = match opt.verbose {
        0 => log::Level::Warn,
        1 => log::Level::Info,
        _ => log::Level::Trace,
    };
    simple_logger::init_with_level(level).unwrap();

    let engine = Engine::with_cache();
    match opt.script {
        Some(path) => repl::run_script(&engine, &path, opt.max_ops),
        None => repl::repl(&engine, opt.max_ops),
    }
}
