//! RCG Driver
//!
//! Command-line front end for the toolkit: builds the bundled demo modules,
//! prints their IR, runs functions through the interpreter and moves
//! modules to and from bitcode files.

mod demos;

use clap::{ArgAction, Parser, Subcommand};
use log::{info, LevelFilter};
use rcg_common::{CodegenError, Result};
use rcg_engine::{read_bitcode, target, write_bitcode, ExecutionEngine, GenericValue, Interpreter, PassManager};
use rcg_ir::{Function, Module, TypeData};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "rcg")]
#[command(about = "RCG IR construction toolkit")]
#[command(version = "0.1.0")]
struct Cli {
    /// Target architecture to initialize before running anything
    #[arg(long, global = true, default_value = "x86-64")]
    target: String,

    /// Raise the log level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the bundled demo programs
    List,

    /// Print the IR of a demo
    Show {
        demo: String,
    },

    /// Build a demo and run one of its functions
    Run {
        demo: String,

        /// Function to call
        function: String,

        /// Arguments, parsed according to the parameter types
        #[arg(allow_negative_numbers = true)]
        args: Vec<String>,

        /// Pass to run before executing (repeatable)
        #[arg(long = "pass")]
        passes: Vec<String>,
    },

    /// Write a demo module as bitcode
    Emit {
        demo: String,

        /// Output bitcode file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Read a bitcode file and run one of its functions
    Exec {
        input: PathBuf,

        function: String,

        #[arg(allow_negative_numbers = true)]
        args: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let outcome = match cli.command {
        Commands::List => {
            list_demos();
            Ok(())
        }
        Commands::Show { demo } => show_demo(&demo),
        Commands::Run { demo, function, args, passes } => {
            run_demo(&cli.target, &demo, &function, &args, &passes)
        }
        Commands::Emit { demo, output } => emit_demo(&demo, &output),
        Commands::Exec { input, function, args } => exec_bitcode(&cli.target, &input, &function, &args),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.as_str()))
        .format_timestamp(None)
        .init();
}

fn list_demos() {
    for demo in demos::DEMOS {
        println!("{:<12} {}", demo.name, demo.description);
    }
}

fn show_demo(name: &str) -> Result<()> {
    let module = demos::find(name)?.module()?;
    print!("{}", module.display());
    Ok(())
}

fn run_demo(arch: &str, name: &str, function: &str, args: &[String], passes: &[String]) -> Result<()> {
    let mut module = demos::find(name)?.module()?;

    if !passes.is_empty() {
        let mut manager = PassManager::new();
        for pass in passes {
            manager.add_named(pass)?;
        }
        let changed = manager.run(&mut module)?;
        info!("Passes {} the module", if changed { "changed" } else { "did not change" });
        module.verify()?;
    }

    execute(arch, &module, function, args)
}

fn emit_demo(name: &str, output: &Path) -> Result<()> {
    let module = demos::find(name)?.module()?;
    write_bitcode(&module, output)?;
    println!("Bitcode written to: {}", output.display());
    Ok(())
}

fn exec_bitcode(arch: &str, input: &Path, function: &str, args: &[String]) -> Result<()> {
    let module = read_bitcode(input)?;
    module.verify()?;
    execute(arch, &module, function, args)
}

fn execute(arch: &str, module: &Module, name: &str, args: &[String]) -> Result<()> {
    target::init_named(arch)?;
    let function = module
        .function(name)
        .ok_or_else(|| CodegenError::argument(format!("no function named '{name}' in '{}'", module.name())))?;
    let args = parse_args(module, function, args)?;
    let result = Interpreter::new()?.run_function(module, function, &args)?;
    println!("{}", result);
    Ok(())
}

/// Convert command-line text into boxed arguments matching the parameters of `function`
fn parse_args(module: &Module, function: Function, args: &[String]) -> Result<Vec<GenericValue>> {
    let params = module.params(function);
    if args.len() != params.len() {
        return Err(CodegenError::argument(format!(
            "'{}' takes {} argument(s), got {}",
            module.function_name(function),
            params.len(),
            args.len()
        )));
    }

    params
        .iter()
        .zip(args)
        .map(|(&param, text)| {
            let ty = module.type_of(param);
            let invalid = || {
                CodegenError::argument(format!("'{text}' is not a valid {}", module.types.display(ty)))
            };
            match *module.types.data(ty) {
                TypeData::Int(bits) => match text.parse::<i64>() {
                    Ok(value) => Ok(GenericValue::from_int(value, bits)),
                    Err(_) => text
                        .parse::<u64>()
                        .map(|value| GenericValue::from_uint(value, bits))
                        .map_err(|_| invalid()),
                },
                TypeData::F32 => text.parse().map(GenericValue::Float).map_err(|_| invalid()),
                TypeData::F64 => text.parse().map(GenericValue::Double).map_err(|_| invalid()),
                _ => Err(CodegenError::argument(format!(
                    "parameters of type {} cannot be passed from the command line",
                    module.types.display(ty)
                ))),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rcg_common::ErrorKind;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from(["rcg", "-vv", "run", "max", "max", "-3", "4", "--pass", "dce"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.target, "x86-64");
        match cli.command {
            Commands::Run { demo, function, args, passes } => {
                assert_eq!(demo, "max");
                assert_eq!(function, "max");
                assert_eq!(args, vec!["-3", "4"]);
                assert_eq!(passes, vec!["dce"]);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_args_follow_parameter_types() {
        let module = demos::find("struct-sum").unwrap().module().unwrap();
        let function = module.function("pair_sum").unwrap();
        let parsed = parse_args(&module, function, &args(&["-2", "0.25"])).unwrap();
        assert_eq!(parsed, vec![GenericValue::from_int(-2, 32), GenericValue::Double(0.25)]);

        let err = parse_args(&module, function, &args(&["x", "1"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);
        let err = parse_args(&module, function, &args(&["1"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);
    }

    #[test]
    fn test_emit_then_exec() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fib.bc");
        emit_demo("fib", &path).unwrap();
        exec_bitcode("x86-64", &path, "fib", &args(&["12"])).unwrap();
        assert_eq!(exec_bitcode("x86-64", &path, "missing", &[]).unwrap_err().kind(), ErrorKind::Argument);
    }
}
