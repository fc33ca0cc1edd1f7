#[macro_use]
extern crate clap;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Arg, ArgMatches, SubCommand};

use mpl::ExitCode;
use mplc::Encoding;

fn main() {
    let matches = app_from_crate!()
        .subcommand(
            SubCommand::with_name("pack")
                .about("Compiles a source program into a binary module")
                .arg(
                    Arg::with_name("INPUT")
                        .help("Sets the source file to compile")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("output")
                        .short("o")
                        .long("output")
                        .takes_value(true)
                        .value_name("OUTPUT")
                        .help("Sets the module file to write"),
                )
                .arg(
                    Arg::with_name("encoding")
                        .short("e")
                        .long("encoding")
                        .takes_value(true)
                        .value_name("ENCODING")
                        .default_value("utf-8")
                        .help("Sets the source text encoding"),
                ),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Loads and executes a binary module")
                .arg(
                    Arg::with_name("PROGRAM")
                        .help("Sets the module file to run")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("root")
                        .short("r")
                        .long("root")
                        .takes_value(true)
                        .value_name("ROOT")
                        .help("Sets the search root for includes"),
                ),
        )
        .get_matches();

    let code = match matches.subcommand() {
        ("pack", Some(sub)) => pack(sub),
        ("run", Some(sub)) => run(sub),
        _ => {
            eprintln!("{}", matches.usage());
            2
        }
    };
    process::exit(code);
}

fn pack(matches: &ArgMatches) -> i32 {
    let input = Path::new(matches.value_of("INPUT").unwrap());
    let output = matches
        .value_of("output")
        .map(PathBuf::from)
        .unwrap_or_else(|| input.with_extension("bin"));
    let encoding = match matches.value_of("encoding").unwrap().parse::<Encoding>() {
        Ok(encoding) => encoding,
        Err(err) => {
            eprintln!("{}", err);
            return 2;
        }
    };

    match mplrun::pack_file(input, &output, encoding) {
        Ok(report) => {
            for diagnostic in &report.diagnostics {
                eprintln!("{}", diagnostic);
            }
            if report.is_clean() {
                0
            } else {
                1
            }
        }
        Err(err) => {
            eprintln!("{}", err);
            1
        }
    }
}

fn run(matches: &ArgMatches) -> i32 {
    let program = Path::new(matches.value_of("PROGRAM").unwrap());
    let root = matches.value_of("root").map(Path::new);

    match mplrun::run_file(program, root) {
        Ok(ExitCode::Halted) => 0,
        Ok(code) => {
            eprintln!("Execution stopped: {:?}", code);
            1
        }
        Err(err) => {
            eprintln!("{}", err);
            1
        }
    }
}
