//! The `mml` binary: read a source file, compile it, report diagnostics,
//! write the `.ll` output.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use mml_diagnostic::{user_visible, TerminalEmitter};
use mml_ir::pretty;
use tracing_subscriber::EnvFilter;

use mmlc::{compile, module_name_from_stem, Config, DriverError};

struct Args {
    input: PathBuf,
    config: Config,
    dump_ast: bool,
    dump_ir: bool,
}

fn parse_args(mut argv: impl Iterator<Item = String>) -> Result<Args, DriverError> {
    let mut input = None;
    let mut config = Config::default();
    let mut dump_ast = false;
    let mut dump_ir = false;

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--lib" => config.mode = mml_llvm::CompileMode::Library,
            "--no-tco" => config.no_tco = true,
            "--timings" => config.verbose_timings = true,
            "--dump-ast" => dump_ast = true,
            "--dump-ir" => dump_ir = true,
            "--triple" => {
                let triple = argv.next().ok_or(DriverError::Usage)?;
                config = config.with_triple(&triple);
            }
            "--out" => {
                let dir = argv.next().ok_or(DriverError::Usage)?;
                config.output_dir = Some(PathBuf::from(dir));
            }
            other if other.starts_with("--") => {
                return Err(DriverError::UnknownOption(other.to_string()))
            }
            path => {
                if input.replace(PathBuf::from(path)).is_some() {
                    return Err(DriverError::Usage);
                }
            }
        }
    }
    Ok(Args {
        input: input.ok_or(DriverError::Usage)?,
        config,
        dump_ast,
        dump_ir,
    })
}

fn run() -> Result<(), DriverError> {
    let args = parse_args(std::env::args().skip(1))?;
    let text = std::fs::read_to_string(&args.input).map_err(|source| DriverError::Read {
        path: args.input.clone(),
        source,
    })?;

    let stem = args
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Main".to_string());
    let module_name = module_name_from_stem(&stem);

    let state = compile(&text, &module_name, args.config.clone());

    let filename = args.input.to_string_lossy();
    let emitter = TerminalEmitter::new(&filename, &state.source).with_colors(true);
    for warning in user_visible(&state.warnings) {
        eprint!("{}", emitter.render(warning));
    }
    let visible_errors = user_visible(&state.errors);
    for error in &visible_errors {
        eprint!("{}", emitter.render(error));
    }
    if args.config.verbose_timings {
        eprint!("{}", state.timings.render());
    }
    if state.has_errors() {
        return Err(DriverError::Failed(state.errors.len()));
    }

    if args.dump_ast {
        println!("{}", pretty::module(&state.module));
    }
    let Some(ir) = &state.llvm_ir else {
        return Ok(());
    };
    if args.dump_ir {
        println!("{ir}");
        return Ok(());
    }

    let out_dir = args
        .config
        .output_dir
        .clone()
        .or_else(|| args.input.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    let out_path = out_dir.join(format!("{stem}.ll"));
    std::fs::write(&out_path, ir).map_err(|source| DriverError::Write {
        path: out_path.clone(),
        source,
    })?;
    eprintln!("wrote {}", out_path.display());
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("mml: {err}");
            ExitCode::FAILURE
        }
    }
}
