//! Minimal CLI design-space analyzer
//!
//! Reads a kinetic model (one GMA equation per line, `#` comments allowed),
//! builds its design space, enumerates the valid cases, optionally resolves
//! cyclical cases, and prints a JSON summary:
//!
//! ```text
//! dsanalyze --equations model.txt [--constraints constraints.txt]
//!           [--endianness big|little] [--cyclical] [--non-strict]
//!           [--out summary.json]
//! ```

#![forbid(unsafe_code)]

use std::{env, fs, path::Path};

use anyhow::{bail, Context, Result};
use designspace::{set_endianness, DesignSpace, Endianness};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

fn parse_flag(args: &[String], key: &str) -> Option<String> {
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == key {
            return it.next().cloned();
        }
    }
    None
}

fn has_switch(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

/// Load non-empty, non-comment lines from a file.
fn load_lines(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

#[derive(Serialize)]
struct CaseSummary {
    case_number: usize,
    identifier: String,
    signature: Vec<usize>,
    conditions: Vec<String>,
    solution: Vec<String>,
}

#[derive(Serialize)]
struct CyclicalSummary {
    case_number: usize,
    identifier: String,
    subcases: usize,
    valid: bool,
}

#[derive(Serialize)]
struct Summary {
    digest: String,
    equations: Vec<String>,
    number_of_cases: usize,
    valid_cases: Vec<CaseSummary>,
    cyclical_cases: Vec<CyclicalSummary>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let equations_path = match parse_flag(&args, "--equations") {
        Some(path) => path,
        None => bail!("usage: dsanalyze --equations <file> [--constraints <file>] [--endianness big|little] [--cyclical] [--non-strict] [--out <file>]"),
    };

    if let Some(endianness) = parse_flag(&args, "--endianness") {
        let requested = match endianness.as_str() {
            "big" => Endianness::Big,
            "little" => Endianness::Little,
            other => bail!("unknown endianness {other:?} (expected big or little)"),
        };
        set_endianness(requested).context("fixing case-number endianness")?;
    }

    let equations = load_lines(Path::new(&equations_path))?;
    if equations.is_empty() {
        bail!("{equations_path} contains no equations");
    }
    let refs: Vec<&str> = equations.iter().map(String::as_str).collect();
    let mut ds = DesignSpace::from_strings(&refs).context("lowering equations")?;

    if let Some(constraints_path) = parse_flag(&args, "--constraints") {
        let constraints = load_lines(Path::new(&constraints_path))?;
        let refs: Vec<&str> = constraints.iter().map(String::as_str).collect();
        ds.add_constraints(&refs).context("parsing constraints")?;
    }

    let strict = !has_switch(&args, "--non-strict");
    let valid_cases = ds
        .valid_cases(strict)
        .into_iter()
        .map(|case| CaseSummary {
            case_number: case.case_number(),
            identifier: case.identifier().to_string(),
            signature: case.signature().to_vec(),
            conditions: case.conditions().iter().map(ToString::to_string).collect(),
            solution: case
                .ssystem()
                .solution()
                .map(|exprs| exprs.iter().map(ToString::to_string).collect())
                .unwrap_or_default(),
        })
        .collect();

    let mut cyclical_cases = Vec::new();
    if has_switch(&args, "--cyclical") {
        ds.calculate_cyclical_cases();
        for number in ds.cyclical_case_numbers() {
            if let Some(cyclical) = ds.cyclical_case(number) {
                cyclical_cases.push(CyclicalSummary {
                    case_number: number,
                    identifier: cyclical.original_case().identifier().to_string(),
                    subcases: cyclical.number_of_subcases(),
                    valid: cyclical.is_valid(strict),
                });
            }
        }
    }

    // Cheap slice sanity: warn when a case validates non-strictly only.
    for number in ds.valid_case_numbers(false) {
        if !ds.valid_case_numbers(true).contains(&number) {
            tracing::warn!(number, "case is valid only on its boundary");
        }
    }

    let summary = Summary {
        digest: hex::encode(ds.digest()),
        equations,
        number_of_cases: ds.number_of_cases(),
        valid_cases,
        cyclical_cases,
    };
    let rendered = serde_json::to_string_pretty(&summary)?;
    match parse_flag(&args, "--out") {
        Some(path) => {
            fs::write(&path, rendered).with_context(|| format!("writing {path}"))?;
            eprintln!(
                "wrote summary for {} cases ({} valid) to {path}",
                summary.number_of_cases,
                summary.valid_cases.len()
            );
        }
        None => println!("{rendered}"),
    }
    Ok(())
}
