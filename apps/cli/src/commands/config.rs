//! `config` command: show the parameter table and resolved values.

use crate::commands::types::TrainArgs;
use anyhow::Result;
use colored::Colorize;
use ferrule_training::{
    declarations, EnvironmentSource, ExecutionContext, ParamSpec, RunConfiguration,
};
use serde_json::json;

pub fn execute(args: &TrainArgs, json_output: bool) -> Result<()> {
    let context = ExecutionContext::detect(&EnvironmentSource::from_process());
    let specs = declarations(context);
    let resolved = args.resolve();
    let config = resolved.as_ref().map(|ep| &ep.config).ok();

    if json_output {
        let params: Vec<_> = specs
            .iter()
            .map(|spec| {
                let entry = config.and_then(|c| c.get(spec.name));
                json!({
                    "name": spec.name,
                    "flag": format!("--{}", spec.flag),
                    "env": spec.env,
                    "default": spec.default,
                    "required": spec.required,
                    "value": entry.map(|r| &r.value),
                    "origin": entry.map(|r| &r.origin),
                })
            })
            .collect();
        let out = json!({
            "context": context.to_string(),
            "parameters": params,
            "error": resolved.as_ref().err().map(ToString::to_string),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_table(context, &specs, config);
    }

    resolved.map(|_| ()).map_err(Into::into)
}

fn print_table(context: ExecutionContext, specs: &[ParamSpec], config: Option<&RunConfiguration>) {
    println!();
    println!("{}", format!("Parameters ({context} context)").bold().cyan());
    println!();
    println!("{:<16} {:<22} {:<24} {}", "Name", "Flag", "Environment", "Value");
    println!("{}", "─".repeat(90));

    for spec in specs {
        let value = match config.and_then(|c| c.get(spec.name)) {
            Some(r) => format!("{} {}", r.value, format!("({})", r.origin).dimmed()),
            None if spec.required => "unresolved".red().to_string(),
            None => "-".dimmed().to_string(),
        };
        println!(
            "{:<16} {:<22} {:<24} {}",
            spec.name,
            format!("--{}", spec.flag),
            spec.env.unwrap_or("-"),
            value
        );
    }
    println!();
}
