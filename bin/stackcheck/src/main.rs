mod error;

use clap::{value_parser, Arg, ArgAction, Command};
use error::{CheckError, CheckOutcome};
use stackweave::analysis::{analyze_method, Settings};
use stackweave::cil::{parse_listing, Metadata, MetadataArenas};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::exit;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use walkdir::WalkDir;

fn main() -> io::Result<()> {
    env_logger::init();

    let matches = Command::new("Stack consistency checker")
        .version("0.1.0")
        .author("Alec Theriault <alec.theriault@gmail.com>")
        .about("Verify stack depths and locate call arguments in CIL-style listings")
        .arg(
            Arg::new("method")
                .long("method")
                .value_name("NAME")
                .required(false)
                .help("Only check methods with this name"),
        )
        .arg(
            Arg::new("no-arguments")
                .long("no-arguments")
                .action(ArgAction::SetTrue)
                .help("Skip locating the arguments of calls"),
        )
        .arg(
            Arg::new("same-block")
                .long("same-block")
                .action(ArgAction::SetTrue)
                .help("Require call arguments to be produced in the same basic block as the call"),
        )
        .arg(
            Arg::new("INPUT")
                .help("Sets the input listing or folder of listings")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .index(1),
        )
        .get_matches();

    let input_path: PathBuf = match matches.get_one::<PathBuf>("INPUT") {
        Some(path) => path.clone(),
        None => return Err(io::Error::new(io::ErrorKind::InvalidInput, "missing INPUT")),
    };
    let method_filter: Option<&String> = matches.get_one::<String>("method");

    let mut settings = Settings::new();
    settings.locate_call_arguments = !matches.get_flag("no-arguments");
    settings.require_same_block_arguments = matches.get_flag("same-block");

    // Find all of the listings
    let listings: Vec<PathBuf> = if input_path.is_file() {
        vec![input_path]
    } else {
        WalkDir::new(input_path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|e| e.is_file() && e.extension().map_or(false, |ex| ex == "il"))
            .collect()
    };

    let mut _count_ok = 0;
    let mut count_unlocated = 0;
    let mut count_invalid = 0;
    let mut count_error = 0;
    let stdout = StandardStream::stdout(ColorChoice::Auto);
    for listing in listings {
        log::debug!("Checking {:?}", listing);

        let outcomes: Vec<(String, CheckOutcome)> =
            match check_listing(&listing, &settings, method_filter) {
                Ok(outcomes) => outcomes,
                Err(err) => vec![(listing.to_string_lossy().into_owned(), err.into())],
            };

        for (name, outcome) in outcomes {
            let (color, summary, message) = match outcome {
                CheckOutcome::Ok => {
                    _count_ok += 1;
                    (Color::Green, b"OK".as_ref(), None)
                }
                CheckOutcome::Unlocated(msg) => {
                    count_unlocated += 1;
                    (Color::Yellow, b"UNLOCATED".as_ref(), Some(msg))
                }
                CheckOutcome::Invalid(msg) => {
                    count_invalid += 1;
                    (Color::Red, b"INVALID".as_ref(), Some(msg))
                }
                CheckOutcome::Error(msg) => {
                    count_error += 1;
                    (Color::Magenta, b"ERROR".as_ref(), Some(msg))
                }
            };

            if let Some(message) = message {
                log::error!("{}", message);
            }

            // Print out the method result
            let mut s = stdout.lock();
            s.write_all(b" - ")?;
            s.set_color(ColorSpec::new().set_bold(true))?;
            s.write_all(name.as_bytes())?;
            s.set_color(ColorSpec::new().set_dimmed(true))?;
            s.write_all(b" [")?;
            s.set_color(ColorSpec::new().set_fg(Some(color)))?;
            s.write_all(summary)?;
            s.set_color(ColorSpec::new().set_dimmed(true))?;
            s.write_all(b"]\n")?;
            s.reset()?;
        }
    }

    log::info!(
        "{} invalid, {} with unlocated arguments, {} listings with errors",
        count_invalid,
        count_unlocated,
        count_error
    );

    // Exit code
    exit(if count_invalid > 0 || count_error > 0 {
        1
    } else {
        0
    })
}

/// Load one listing and analyse its methods
fn check_listing(
    path: &Path,
    settings: &Settings,
    method_filter: Option<&String>,
) -> Result<Vec<(String, CheckOutcome)>, CheckError> {
    let source = fs::read_to_string(path)?;

    let arenas = MetadataArenas::new();
    let metadata = Metadata::new(&arenas);
    let listing = parse_listing(&metadata, &source)?;

    let outcomes = listing
        .methods
        .iter()
        .filter(|body| method_filter.map_or(true, |name| &body.name == name))
        .map(|body| {
            let name = format!("{}: {}", path.to_string_lossy(), body.name);
            (name, CheckOutcome::from(analyze_method(settings, body)))
        })
        .collect();
    Ok(outcomes)
}
