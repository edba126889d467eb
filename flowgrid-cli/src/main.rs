mod commands;

use std::process::ExitCode;

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    // Diagnostics go to stderr so stdout stays clean for piped JSON.
    if let Err(e) = TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("flowgrid: logging disabled: {e}");
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    let result = commands::parse(&args).and_then(|command| {
        log::debug!("running {:?}", command);
        let stdout = std::io::stdout();
        commands::run(&command, &mut stdout.lock())
    });
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(commands::CliError::Usage(text)) => {
            eprintln!("{text}");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("flowgrid: {e}");
            ExitCode::FAILURE
        }
    }
}
