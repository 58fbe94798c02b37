// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    clap::{Arg, ArgMatches, Command},
    log::{info, warn, LevelFilter},
    native_resign::{ExitOutcome, ResignError, ResignSettings, DEFAULT_CACHE_DIR},
    std::{io::Read, path::PathBuf, time::Duration},
};

/// Exit code when processing failed.
const EXIT_ERROR: i32 = 2;

fn settings_from_args(args: &ArgMatches) -> Result<ResignSettings, ResignError> {
    let mut settings = ResignSettings::default();

    if let Some(cache_dir) = args.value_of_os("cache_dir") {
        settings.cache_dir = PathBuf::from(cache_dir);
    }

    if let Some(url) = args.value_of("release_url") {
        settings.toolchain.release_url = url.to_string();
    }

    if let Some(timeout) = args.value_of("http_timeout") {
        let seconds = timeout.parse::<u64>().map_err(|e| {
            ResignError::InvalidArgument(format!("invalid --http-timeout {}: {}", timeout, e))
        })?;
        settings.toolchain.http_timeout = Some(Duration::from_secs(seconds));
    }

    settings.require_signing_success = args.is_present("require_signing_success");

    Ok(settings)
}

fn main_impl() -> Result<i32, ResignError> {
    let app = Command::new("native-resign")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Remove code signatures from a binary read from stdin and re-sign Mach-O output")
        .long_about(
            "Reads a binary from stdin and writes it to OUTPUT.\n\n\
             Mach-O binaries have their embedded code signature removed and are then \
             signed again with rcodesign, which is downloaded into the cache directory \
             on first use. Other binaries are written unchanged.\n\n\
             A Mach-O binary with data following its code signature is rejected: \
             the command exits 2 and OUTPUT is not written.\n\n\
             Exits 1 without writing anything if the input is not a recognized binary.",
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .multiple_occurrences(true)
                .help("Increase logging verbosity. Can be specified multiple times."),
        )
        .arg(
            Arg::new("cache_dir")
                .long("cache-dir")
                .takes_value(true)
                .allow_invalid_utf8(true)
                .env("NATIVE_RESIGN_CACHE_DIR")
                .default_value(DEFAULT_CACHE_DIR)
                .help("Directory to cache the rcodesign toolchain in"),
        )
        .arg(
            Arg::new("release_url")
                .long("release-url")
                .takes_value(true)
                .env("NATIVE_RESIGN_RELEASE_URL")
                .help("API URL describing the latest rcodesign release"),
        )
        .arg(
            Arg::new("http_timeout")
                .long("http-timeout")
                .takes_value(true)
                .value_name("SECONDS")
                .help("Timeout for each HTTP request made while downloading rcodesign"),
        )
        .arg(
            Arg::new("require_signing_success")
                .long("require-signing-success")
                .help("Fail if rcodesign exits unsuccessfully"),
        )
        .arg(
            Arg::new("output")
                .required(true)
                .allow_invalid_utf8(true)
                .value_name("OUTPUT")
                .help("Path to write the processed binary to"),
        );

    let matches = app.get_matches();

    let log_level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    if log_level == LevelFilter::Info {
        builder.filter_module("rustls", LevelFilter::Error);
    }

    builder.init();

    let settings = settings_from_args(&matches)?;
    let output_path = PathBuf::from(
        matches
            .value_of_os("output")
            .ok_or_else(|| ResignError::InvalidArgument("OUTPUT is required".into()))?,
    );

    let mut data = vec![];
    std::io::stdin().lock().read_to_end(&mut data)?;

    let outcome = settings.orchestrator().process(data, &output_path)?;

    match &outcome {
        ExitOutcome::Skipped { .. } => {}
        ExitOutcome::Done { .. } => {}
        ExitOutcome::Signed { report } => {
            if report.success {
                info!("signed {}", output_path.display());
            } else {
                warn!("signing {} failed; output left unsigned", output_path.display());
            }
        }
    }

    Ok(outcome.exit_code())
}

fn main() {
    let exit_code = match main_impl() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {}", err);
            EXIT_ERROR
        }
    };

    std::process::exit(exit_code)
}
