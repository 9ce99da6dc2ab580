use clap::Parser as ClapParser;
use std::{
    fs,
    io::{self, IsTerminal, Write},
    process,
};

use log::{debug, info};

use lamb::{
    Context, ContextSettings, Environment, EvalMode, GC_INITIAL_THRESHOLD, GcSettings, Node,
    format::{self, ObjectDisplay},
    lexer, parse_program,
};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input source files to evaluate in order
    #[arg(required = false, help = "The source files to evaluate")]
    files: Vec<String>,

    /// Start REPL after evaluating files (default if no files)
    #[arg(long, help = "Force REPL mode after file evaluation")]
    repl: bool,

    #[arg(long, help = "Pass arguments as lazily forced thunks")]
    lazy: bool,

    #[arg(short, long, help = "Print the syntax tree of every form")]
    debug: bool,

    #[arg(long, help = "Print the token stream of every input")]
    tokens: bool,

    #[arg(long, help = "Print the global environment after every form")]
    dump_env: bool,

    #[arg(long, help = "Print every live heap object after every form")]
    dump_heap: bool,

    #[arg(
        long,
        value_name = "N",
        default_value_t = GC_INITIAL_THRESHOLD,
        help = "Initial live-object count that triggers a collection"
    )]
    gc_threshold: usize,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let settings = ContextSettings {
        mode: if cli.lazy {
            EvalMode::Lazy
        } else {
            EvalMode::Strict
        },
        gc: GcSettings {
            initial_threshold: cli.gc_threshold,
        },
    };
    let mut cx = match Context::new(settings) {
        Ok(cx) => cx,
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(2);
        }
    };
    info!("starting in {:?} mode", cx.mode());

    let mut failures = 0;
    for filename in &cli.files {
        let source = match fs::read_to_string(filename) {
            Ok(content) => content,
            Err(err) => {
                eprintln!("error: reading file '{filename}': {err}");
                process::exit(1);
            }
        };
        failures += run_source(&mut cx, &cli, &source);
    }

    if cli.repl || cli.files.is_empty() {
        run_repl(&mut cx, &cli);
    }

    let stats = cx.destroy();
    debug!(
        "{} collections, {} skipped, {} objects freed",
        stats.collections, stats.skipped, stats.freed
    );

    if failures > 0 {
        process::exit(1);
    }
}

fn run_repl(cx: &mut Context, cli: &Cli) {
    let stdin = io::stdin();
    let interactive = stdin.is_terminal();
    let mut stdout = io::stdout();
    let mut input_buffer = String::new();

    loop {
        if interactive {
            print!("> ");
            if let Err(err) = stdout.flush() {
                eprintln!("error: flushing stdout: {err}");
                break;
            }
        }

        input_buffer.clear();
        match stdin.read_line(&mut input_buffer) {
            Ok(0) => break,
            Ok(_) => {
                if input_buffer.trim().is_empty() {
                    continue;
                }
                run_source(cx, cli, &input_buffer);
            }
            Err(err) => {
                eprintln!("error: reading input: {err}");
                break;
            }
        }
    }
}

/// Evaluates every form of `source`, printing results and diagnostics.
/// Returns the number of forms that failed.
fn run_source(cx: &mut Context, cli: &Cli, source: &str) -> usize {
    if cli.tokens {
        for token in lexer::Lexer::new(source) {
            println!("{}", format::token(&token));
        }
    }

    let mut failures = 0;
    for form in parse_program(source) {
        let outcome = form
            .map_err(|err| err.to_string())
            .and_then(|node| run_form(cx, cli, &node));
        if let Err(message) = outcome {
            eprintln!("error: {message}");
            failures += 1;
        }
    }
    failures
}

fn run_form(cx: &mut Context, cli: &Cli, node: &Node) -> Result<(), String> {
    if cli.debug {
        print!("{}", format::tree(node));
    }

    let value = cx.eval(node).map_err(|err| err.to_string())?;
    println!("{}", ObjectDisplay::new(cx.heap(), value));

    if cli.dump_env {
        print!("{}", Environment::dump(cx.heap(), cx.root_env()));
    }
    if cli.dump_heap {
        let mut stdout = io::stdout().lock();
        cx.heap()
            .dump_objects(&mut stdout)
            .map_err(|err| format!("writing heap dump: {err}"))?;
    }
    Ok(())
}
