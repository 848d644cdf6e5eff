use std::io;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{error::ErrorKind, CommandFactory, Parser};
use tracing::{debug, error, Level};

use randseed::{
    config::{Paths, RunConfig, MAX_BYTES},
    fs::Persistence,
};

fn parse_bytes(s: &str) -> Result<usize, String> {
    let bytes: usize = s
        .parse()
        .map_err(|e| format!("`{}` is not a number of bytes: {}", s, e))?;

    if bytes == 0 || bytes > MAX_BYTES {
        return Err(format!("must be between 1 and {}, found {}", MAX_BYTES, bytes));
    }

    Ok(bytes)
}

/// Output pseudo-random bytes, carrying the PRNG state between runs in
/// `~/.rand.seed`.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Print the bytes as lower-case hexadecimal, followed by a newline.
    #[arg(short = 'x', long)]
    hex: bool,

    /// Describe every seed, generate and save step on stderr.
    #[arg(short, long)]
    verbose: bool,

    /// Number of bytes to output, between 1 and 1024.
    #[arg(value_parser = parse_bytes)]
    bytes: usize,
}

fn init_logger(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::WARN };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .try_init()
        .map_err(|e| anyhow!("cannot init logger: {}", e))
}

fn run(cli: &Cli) -> Result<()> {
    let config = RunConfig::new(cli.hex, cli.verbose, cli.bytes)?;
    let paths = Paths::for_current_user().context("cannot locate the seed file")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let persistence =
        randseed::run(&config, &paths, &mut out).context("cannot generate random bytes")?;
    if let Persistence::Failed(_) = persistence {
        // already reported, the bytes are out and that is what counts
        debug!("exiting without a saved seed");
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // help and version go to stdout, usage errors to stderr
            let _ = e.print();
            if !e.use_stderr() {
                return ExitCode::SUCCESS;
            }
            if e.kind() == ErrorKind::ValueValidation {
                eprintln!("\n{}", Cli::command().render_usage());
            }
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logger(cli.verbose) {
        eprintln!("{:#}", e);
    }

    if let Err(e) = run(&cli) {
        error!("{:#}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use clap::{error::ErrorKind, Parser};

    use super::{parse_bytes, Cli};

    #[test]
    fn bytes_argument() {
        assert_eq!(parse_bytes("1"), Ok(1));
        assert_eq!(parse_bytes("1024"), Ok(1024));

        for s in ["0", "1025", "-5", "12abc", "", "0x10", "99999999999999999999999"] {
            assert!(parse_bytes(s).is_err(), "`{}` should be rejected", s);
        }
    }

    #[test]
    fn command_line() {
        let cli = Cli::try_parse_from(["randseed", "--hex", "-v", "16"]).unwrap();
        assert!(cli.hex);
        assert!(cli.verbose);
        assert_eq!(cli.bytes, 16);

        let cli = Cli::try_parse_from(["randseed", "-x", "1024"]).unwrap();
        assert!(cli.hex);
        assert!(!cli.verbose);

        let cli = Cli::try_parse_from(["randseed", "8"]).unwrap();
        assert!(!cli.hex);

        assert_eq!(
            Cli::try_parse_from(["randseed", "--help"]).err().map(|e| e.kind()),
            Some(ErrorKind::DisplayHelp)
        );
        for args in [
            vec!["randseed"],
            vec!["randseed", "1", "2"],
            vec!["randseed", "0"],
            vec!["randseed", "--hex", "1025"],
            vec!["randseed", "-5"],
            vec!["randseed", "--unknown", "5"],
        ] {
            let e = Cli::try_parse_from(args.clone()).err();
            assert!(
                e.as_ref().map(|e| e.use_stderr()).unwrap_or(false),
                "{:?} should be a usage error",
                args
            );
        }
    }
}
