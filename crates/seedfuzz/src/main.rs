use seedfuzz::{
    load_or_default, parse_corpus, read_config, render, split_signature, BranchRegistry,
    CommandSeedGenerator, HarnessExecutor, JsonAnalysis, MethodDescriptor, Runner, RustcCompiler,
    SeedfuzzError, SeedfuzzToml, DEFAULT_TEMPLATE,
};
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), SeedfuzzError> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_help();
        return Ok(());
    };
    let rest: Vec<String> = args.collect();

    match command.as_str() {
        "-h" | "--help" => {
            print_help();
            Ok(())
        }
        "parse" => cmd_parse(&rest),
        "render" => cmd_render(&rest),
        "run" => cmd_run(&rest),
        other => Err(SeedfuzzError::InvalidCommand(format!(
            "unknown command {other}"
        ))),
    }
}

fn cmd_parse(args: &[String]) -> Result<(), SeedfuzzError> {
    let Some(target) = args.first() else {
        print_help();
        return Ok(());
    };
    let raw = std::fs::read_to_string(target)?;
    let (cases, imports) = parse_corpus(&raw);
    let summary = serde_json::json!({
        "cases": cases,
        "imports": imports,
    });
    let output = serde_json::to_string_pretty(&summary)
        .map_err(|err| SeedfuzzError::Io(std::io::Error::other(err)))?;
    println!("{output}");
    Ok(())
}

fn cmd_render(args: &[String]) -> Result<(), SeedfuzzError> {
    let (descriptor_path, corpus_path) = match args {
        [descriptor, corpus, ..] => (descriptor, corpus),
        _ => {
            return Err(SeedfuzzError::InvalidCommand(
                "render expects <descriptor.json> <corpus-file>".to_string(),
            ))
        }
    };
    let descriptor: MethodDescriptor = serde_json::from_str(&std::fs::read_to_string(
        descriptor_path,
    )?)
    .map_err(|err| SeedfuzzError::Analysis(format!("cannot parse {descriptor_path}: {err}")))?;
    let raw = std::fs::read_to_string(corpus_path)?;
    let (cases, mut imports) = parse_corpus(&raw);
    if cases.is_empty() {
        return Err(SeedfuzzError::SeedUnusable);
    }
    imports.insert(format!("use {};", descriptor.type_path));
    let driver_name = format!("{}0", descriptor.method);
    let rendered = render(&descriptor, &cases, &imports, DEFAULT_TEMPLATE, &driver_name)?;
    print!("{}", rendered.source);
    Ok(())
}

fn cmd_run(args: &[String]) -> Result<(), SeedfuzzError> {
    let mut signature = None;
    let mut descriptor_path = None;
    let mut input_file = None;
    let mut registry_path = None;
    let mut config_path = None;
    let mut lib_name = "default".to_string();
    let mut log_external = false;

    let mut iter = args.iter().cloned();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--descriptor" => descriptor_path = Some(expect_value(&mut iter, "--descriptor")?),
            "--input-file" => input_file = Some(expect_value(&mut iter, "--input-file")?),
            "--registry" => registry_path = Some(expect_value(&mut iter, "--registry")?),
            "--config" => config_path = Some(expect_value(&mut iter, "--config")?),
            "--lib" => lib_name = expect_value(&mut iter, "--lib")?,
            "--log-external" => log_external = true,
            _ if arg.starts_with('-') => {
                return Err(SeedfuzzError::InvalidCommand(format!("unknown flag {arg}")))
            }
            _ => {
                if signature.is_some() {
                    return Err(SeedfuzzError::InvalidCommand(format!(
                        "unexpected argument {arg}"
                    )));
                }
                signature = Some(arg);
            }
        }
    }

    if log_external {
        env::set_var("SEEDFUZZ_LOG_EXTERNAL", "1");
    }

    let signatures = match (&signature, &input_file) {
        (_, Some(path)) => std::fs::read_to_string(path)?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>(),
        (Some(sig), None) => vec![sig.clone()],
        (None, None) => {
            return Err(SeedfuzzError::InvalidCommand(
                "run expects <signature> or --input-file".to_string(),
            ))
        }
    };
    for sig in &signatures {
        split_signature(sig).map_err(|err| SeedfuzzError::InvalidCommand(err.to_string()))?;
    }

    let Some(descriptor_path) = descriptor_path else {
        return Err(SeedfuzzError::InvalidCommand(
            "run expects --descriptor <json>".to_string(),
        ));
    };

    let config = load_run_config(config_path.as_deref())?;
    let analysis = JsonAnalysis {
        path: PathBuf::from(descriptor_path),
    };
    let generator = CommandSeedGenerator {
        command: config.generator.command.clone(),
        corpus_file: PathBuf::from(&config.generator.corpus_file),
    };
    let compiler = RustcCompiler {
        extra_args: config.build.rustc_args.clone(),
    };
    let registry = match registry_path {
        Some(path) => BranchRegistry::from_json_file(Path::new(&path))?,
        None => BranchRegistry::default(),
    };

    let runner = Runner {
        config: &config,
        analysis: &analysis,
        generator: &generator,
        compiler: &compiler,
        lib_name,
    };
    let mut executor = HarnessExecutor;
    runner.run_batch(&signatures, &mut executor, &registry)
}

fn load_run_config(path: Option<&str>) -> Result<SeedfuzzToml, SeedfuzzError> {
    match path {
        Some(path) => read_config(Path::new(path)),
        None => load_or_default(Path::new(".")),
    }
}

fn expect_value(
    iter: &mut impl Iterator<Item = String>,
    flag: &str,
) -> Result<String, SeedfuzzError> {
    iter.next()
        .ok_or_else(|| SeedfuzzError::InvalidCommand(format!("{flag} expects a value")))
}

fn print_help() {
    println!("seedfuzz - feedback-driven fuzz-test orchestrator");
    println!();
    println!("Usage:");
    println!("  seedfuzz parse <corpus-file>");
    println!("      Print the parsed case sequence and import set as JSON.");
    println!("  seedfuzz render <descriptor.json> <corpus-file>");
    println!("      Print the driver a corpus would synthesize, without compiling.");
    println!("  seedfuzz run [<signature>] [flags]");
    println!("      Synthesize, repair, execute and report for each signature.");
    println!();
    println!("Run flags:");
    println!("  --descriptor <json>   method descriptor from the analysis service (required)");
    println!("  --input-file <path>   newline-separated signature list");
    println!("  --registry <json>     instrumented-branch totals per function");
    println!("  --config <path>       seedfuzz.toml (default: ./seedfuzz.toml)");
    println!("  --lib <name>          result file name (default: default)");
    println!("  --log-external        surface generator/compiler subprocess output");
}
