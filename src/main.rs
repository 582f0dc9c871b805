//! contty - run a command under a Windows pseudo console
//!
//! contty attaches a child process to a ConPTY instance, mirrors everything
//! it writes to stdout, and forwards stdin to the child. The mirrored
//! stream can be shown raw, stripped of escape sequences, or humanized into
//! readable tags; the untouched byte stream can additionally be captured to
//! a file.
//!
//! # Quick Start
//!
//! ```text
//! contty cmd.exe                        # interactive shell
//! contty --strip -- ping localhost      # readable ping output
//! contty --humanize -- git status       # escape sequences as tags
//! contty --capture out.bin -- dir       # raw bytes teed to out.bin
//! ```

use std::env;
use std::path::PathBuf;

use contty::config::OutputMode;

/// Command-line options; unset fields fall back to the config file.
#[cfg_attr(not(windows), allow(dead_code))]
struct CliOptions {
    /// Output transform for mirrored chunks
    mode: Option<OutputMode>,
    /// Console grid size
    size: Option<(i16, i16)>,
    /// Working directory for the child
    dir: Option<PathBuf>,
    /// KEY=VALUE environment overrides
    env_overrides: Vec<(String, String)>,
    /// Raw byte capture file
    capture: Option<PathBuf>,
    /// Command line to run under the console
    command: Vec<String>,
}

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    eprintln!("contty {}", VERSION);
}

fn print_help() {
    eprintln!("contty {} - run a command under a Windows pseudo console", VERSION);
    eprintln!();
    eprintln!("Usage: contty [OPTIONS] [--] COMMAND...");
    eprintln!();
    eprintln!("Output options:");
    eprintln!("  (default)             Mirror the raw byte stream");
    eprintln!("  --raw                 Mirror the raw byte stream");
    eprintln!("  --strip               Remove escape sequences from mirrored output");
    eprintln!("  --humanize            Replace escape sequences with readable tags");
    eprintln!("  --capture <FILE>      Tee the untransformed bytes to FILE");
    eprintln!();
    eprintln!("Session options:");
    eprintln!("  -s, --size <WxH>      Console grid size (default 80x24)");
    eprintln!("  -d, --dir <PATH>      Working directory for the child");
    eprintln!("  -e, --env <KEY=VAL>   Environment override (repeatable)");
    eprintln!();
    eprintln!("Other options:");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  contty cmd.exe                      Interactive shell");
    eprintln!("  contty --strip -- ping localhost    Plain-text ping output");
    eprintln!("  contty -e FOO=bar -- cmd /c set     Child sees FOO=bar");
    eprintln!();
    eprintln!("Configuration: ~/.contty/config.toml");
    eprintln!("Log file:      ~/.contty/contty.log");
    eprintln!();
    eprintln!("contty exits with the child's exit code.");
}

fn parse_args() -> Result<CliOptions, String> {
    let args: Vec<String> = env::args().collect();
    let mut options = CliOptions {
        mode: None,
        size: None,
        dir: None,
        env_overrides: Vec::new(),
        capture: None,
        command: Vec::new(),
    };
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "--raw" => {
                options.mode = Some(OutputMode::Raw);
            }
            "--strip" => {
                options.mode = Some(OutputMode::Strip);
            }
            "--humanize" => {
                options.mode = Some(OutputMode::Humanize);
            }
            "--capture" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing file argument for --capture".to_string());
                }
                options.capture = Some(PathBuf::from(&args[i]));
            }
            "-s" | "--size" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing size argument".to_string());
                }
                options.size = Some(parse_size(&args[i])?);
            }
            "-d" | "--dir" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing directory argument".to_string());
                }
                options.dir = Some(PathBuf::from(&args[i]));
            }
            "-e" | "--env" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing KEY=VALUE argument".to_string());
                }
                match args[i].split_once('=') {
                    Some((key, value)) if !key.is_empty() => {
                        options.env_overrides.push((key.to_string(), value.to_string()));
                    }
                    _ => return Err(format!("Invalid environment override: {}", args[i])),
                }
            }
            "--" => {
                options.command.extend(args[i + 1..].iter().cloned());
                break;
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
            _ => {
                // First bare token starts the command; everything after it
                // belongs to the child.
                options.command.extend(args[i..].iter().cloned());
                break;
            }
        }
        i += 1;
    }

    if options.command.is_empty() {
        return Err("No command given. Use -h for help.".to_string());
    }

    Ok(options)
}

fn parse_size(value: &str) -> Result<(i16, i16), String> {
    let (w, h) = value
        .split_once('x')
        .or_else(|| value.split_once('X'))
        .ok_or_else(|| format!("Invalid size (expected WxH): {}", value))?;
    let width: i16 = w.trim().parse().map_err(|_| format!("Invalid width: {}", w))?;
    let height: i16 = h.trim().parse().map_err(|_| format!("Invalid height: {}", h))?;
    Ok((width, height))
}

/// Initialize logging to `~/.contty/contty.log` (append mode).
fn init_logging() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let log_path = contty::config::dot_dir()
        .map(|dir| dir.join("contty.log"))
        .unwrap_or_else(|| PathBuf::from("contty.log"));

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() {
    let options = match parse_args() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    init_logging();

    #[cfg(not(windows))]
    {
        let _ = options;
        eprintln!("contty requires Windows with ConPTY support.");
        std::process::exit(1);
    }

    #[cfg(windows)]
    match run(options) {
        Ok(code) => std::process::exit(code as i32),
        Err(e) => {
            tracing::error!("session failed: {e:#}");
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(windows)]
fn run(cli: CliOptions) -> anyhow::Result<u32> {
    use std::io::{Read, Write};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;

    use tracing::{info, warn};

    use contty::config::Config;
    use contty::{StartOptions, TerminalSession};

    let config = Config::load();
    let mode = cli.mode.unwrap_or(config.mode);
    let (width, height) = cli.size.unwrap_or((config.width, config.height));
    let capture_path = cli.capture.or(config.capture);

    // Without VT processing the mirrored sequences print literally; harmless
    // when stdout is redirected, so a failure is only logged.
    if let Err(e) = contty::pty::enable_virtual_terminal() {
        tracing::debug!("could not enable VT processing on stdout: {e}");
    }

    let start = StartOptions {
        command_line: cli.command.join(" "),
        application: None,
        working_directory: cli.dir,
        env_overrides: cli.env_overrides,
        width,
        height,
    };

    info!(command = %start.command_line, width, height, "starting session");
    let mut session = TerminalSession::start(&start)?;

    let running = Arc::new(AtomicBool::new(true));
    let (tx, rx) = mpsc::channel::<Vec<u8>>();

    // Reader thread: pump output chunks to the main loop. End-of-stream and
    // disposal both surface as Ok(0); anything else is a real fault.
    let reader_running = running.clone();
    let mut output = session.output();
    let reader_thread = thread::spawn(move || {
        let mut buffer = vec![0u8; 4096];
        loop {
            if !reader_running.load(Ordering::SeqCst) {
                break;
            }
            match output.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buffer[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("output stream fault: {e}");
                    break;
                }
            }
        }
        reader_running.store(false, Ordering::SeqCst);
    });

    // Stdin thread: forward caller keystrokes to the child. Never joined;
    // it parks in a blocking stdin read and dies with the process.
    let mut input = session.input();
    let _stdin_thread = thread::spawn(move || {
        let mut stdin = std::io::stdin();
        let mut buffer = [0u8; 1024];
        loop {
            match stdin.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    if input.write_all(&buffer[..n]).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let mut capture_file = match &capture_path {
        Some(path) => Some(std::fs::File::create(path)?),
        None => None,
    };

    let stdout = std::io::stdout();
    let mut pending: Vec<u8> = Vec::new();

    while let Ok(chunk) = rx.recv() {
        if let Some(file) = capture_file.as_mut() {
            file.write_all(&chunk)?;
        }

        if mode == OutputMode::Raw {
            let mut out = stdout.lock();
            out.write_all(&chunk)?;
            out.flush()?;
            continue;
        }

        // Hold back an unterminated trailing escape sequence and any
        // partial UTF-8 tail so neither is ever transformed in halves.
        pending.extend_from_slice(&chunk);
        let (transformed, consumed) = transform_pending(&pending, mode);
        pending.drain(..consumed);
        if !transformed.is_empty() {
            let mut out = stdout.lock();
            out.write_all(transformed.as_bytes())?;
            out.flush()?;
        }
    }

    // Flush whatever tail the stream closed on, held-back bytes included.
    if !pending.is_empty() && mode != OutputMode::Raw {
        let tail = String::from_utf8_lossy(&pending);
        let transformed = apply_transform(mode, &tail);
        let mut out = stdout.lock();
        out.write_all(transformed.as_bytes())?;
        out.flush()?;
    }

    running.store(false, Ordering::SeqCst);
    let _ = reader_thread.join();

    session.wait_for_exit(None)?;
    let code = session.exit_code()?;
    info!(code, "child exited");
    session.close()?;

    Ok(code)
}

/// Transform as much of `pending` as can safely be consumed, returning the
/// rendered text and how many bytes to drop from the front.
#[cfg(windows)]
fn transform_pending(pending: &[u8], mode: OutputMode) -> (String, usize) {
    use contty::escape;

    match std::str::from_utf8(pending) {
        Ok(text) => {
            let split = escape::incomplete_suffix(text);
            (apply_transform(mode, &text[..split]), split)
        }
        // A clean prefix with a partial multibyte character at the end:
        // consume the prefix, keep the tail for the next chunk.
        Err(e) if e.error_len().is_none() => {
            let valid = e.valid_up_to();
            match std::str::from_utf8(&pending[..valid]) {
                Ok(text) => {
                    let split = escape::incomplete_suffix(text);
                    (apply_transform(mode, &text[..split]), split)
                }
                Err(_) => (String::new(), 0),
            }
        }
        // Invalid bytes mid-stream: render lossily, hold nothing back so
        // the loop cannot wedge on garbage.
        Err(_) => (
            apply_transform(mode, &String::from_utf8_lossy(pending)),
            pending.len(),
        ),
    }
}

#[cfg(windows)]
fn apply_transform(mode: OutputMode, text: &str) -> String {
    use contty::escape;

    match mode {
        OutputMode::Raw => text.to_string(),
        OutputMode::Strip => escape::strip(text),
        OutputMode::Humanize => escape::humanize(text),
    }
}
