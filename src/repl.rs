// smartquery -- an embeddable expression language
// Copyright (C) 2021  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Script evaluation and the interactive read-eval-print loop.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use snafu::{ResultExt, Snafu};

use smartquery_lang::{Engine, Value};

#[derive(Debug, Snafu)]
pub enum AppError {
    #[snafu(display("could not read script {}: {}", path.display(), source))]
    ReadScript { path: PathBuf, source: io::Error },
    #[snafu(display("{}", source))]
    Eval { source: smartquery_lang::Error },
    #[snafu(display("i/o error: {}", source))]
    Io { source: io::Error },
}

/// Evaluate a script file and print its result, unless it is null.
pub fn run_script(engine: &Engine, path: &Path, max_ops: usize) -> Result<(), AppError> {
    let source = std::fs::read_to_string(path).context(ReadScript { path })?;
    log::info!("evaluating {}", path.display());
    let mut names = HashMap::new();
    let value = engine
        .evaluate_with(&source, &mut names, &HashMap::new(), max_ops)
        .context(Eval)?;
    if value != Value::Null {
        println!("{}", value.repr());
    }
    Ok(())
}

/// Interactive loop: one statement per line, names persisting across
/// lines. Errors are printed and the session keeps going.
pub fn repl(engine: &Engine, max_ops: usize) -> Result<(), AppError> {
    let stdin = io::stdin();
    let mut names: HashMap<String, Value> = HashMap::new();
    let mut line = String::new();
    loop {
        print!(">>> ");
        io::stdout().flush().context(Io)?;
        line.clear();
        if stdin.lock().read_line(&mut line).context(Io)? == 0 {
            println!();
            return Ok(());
        }
        let source = line.trim();
        if source.is_empty() {
            continue;
        }
        match engine.evaluate_with(source, &mut names, &HashMap::new(), max_ops) {
            Ok(Value::Null) => {}
            Ok(value) => println!("{}", value.repr()),
            Err(err) => println!("{}", err),
        }
    }
}
