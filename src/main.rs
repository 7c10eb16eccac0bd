use std::{error::Error, io::Write, process};

use clap::Parser;
use log::{debug, error, warn, LevelFilter};

use fmrelay::{
    config::Config,
    daemon::{self, Daemon},
    events::{PlaybackStatus, PlayerEvent},
    format,
    scrobbler::{Scrobbler, API_KEY, API_SECRET},
};

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
///
/// The media player invokes this binary with `key value` argument
/// pairs (`status playing artist ... title ... duration ...`). The
/// player's initial call carries no file or url and starts the daemon.
#[derive(Clone, Debug, Default, PartialEq, Eq, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,

    /// `init`, or the `key value` pairs the player passes
    #[arg(trailing_var_arg = true)]
    event: Vec<String>,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence
/// from highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
fn init_logger(args: &Args) {
    let mut logger = env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if args.quiet || args.verbose > 0 {
        let level = match args.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

/// Builds a playback event from the player's `key value` pairs.
///
/// Returns `None` for the player's initial call, which carries neither
/// a file nor a url and is the cue to start the daemon.
fn parse_event(config: &Config, pairs: &[String]) -> Result<Option<PlayerEvent>, Box<dyn Error>> {
    let mut status = None;
    let mut file = String::new();
    let mut url = String::new();
    let mut event = PlayerEvent {
        status: PlaybackStatus::Stopped,
        radio: false,
        artist: String::new(),
        album: String::new(),
        album_artist: String::new(),
        title: String::new(),
        track_number: 0,
        duration: 0,
        mbid: String::new(),
        location: String::new(),
    };

    for pair in pairs.chunks_exact(2) {
        let (key, value) = (pair[0].as_str(), pair[1].as_str());
        match key {
            "status" => {
                status = match value {
                    "playing" => Some(PlaybackStatus::Playing),
                    "paused" => Some(PlaybackStatus::Paused),
                    "stopped" => Some(PlaybackStatus::Stopped),
                    _ => None,
                };
            }
            "file" => file = value.to_owned(),
            "url" => url = value.to_owned(),
            "artist" => event.artist = value.to_owned(),
            "album" => event.album = value.to_owned(),
            "albumartist" => event.album_artist = value.to_owned(),
            "title" => event.title = value.to_owned(),
            "tracknumber" => event.track_number = value.parse().unwrap_or(0),
            "duration" => event.duration = value.parse().unwrap_or(0),
            "musicbrainz_trackid" => event.mbid = value.to_owned(),
            _ => debug!("ignoring player argument: {key}"),
        }
    }

    // The player always passes the status.
    let Some(status) = status else {
        return Err("player arguments carry no valid status".into());
    };
    event.status = status;

    if file.is_empty() && url.is_empty() {
        // Initial call from the player.
        return Ok(None);
    }

    event.radio = !url.is_empty();
    event.location = if event.radio { url } else { file };

    // Streams report everything in the title; local files without any
    // tags fall back to the file stem. Recover the fields via the
    // configured patterns. A local file carrying a title tag keeps it
    // even when the artist tag is missing.
    let recover = if event.radio {
        event.artist.is_empty()
    } else {
        event.artist.is_empty() && event.title.is_empty()
    };
    if recover {
        let (pattern, input) = if event.radio {
            (config.format_shoutcast.as_str(), event.title.clone())
        } else {
            let stem = std::path::Path::new(&event.location)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            (config.format_localfile.as_str(), stem)
        };

        match format::extract(pattern, &input) {
            Ok(meta) => {
                event.artist = meta.artist;
                if !meta.album.is_empty() {
                    event.album = meta.album;
                }
                event.title = meta.title;
            }
            Err(e) => warn!("metadata extraction failed: {e}"),
        }
    }

    // If no duration time assume 3 min.
    if event.duration == 0 {
        event.duration = 180;
    }

    Ok(Some(event))
}

/// First-time authorization flow.
///
/// Checks any previously stored session, then walks the user through
/// the out-of-band authorization and stores the obtained session key.
async fn init_session() -> Result<(), Box<dyn Error>> {
    let mut config = Config::load()?;
    let mut scrobbler = Scrobbler::new(API_KEY, API_SECRET)?;

    if !config.session_key.is_empty() {
        scrobbler.set_session_key_hex(&config.session_key);
        print!("Checking previous session (user: {}) ... ", config.user_name);
        std::io::stdout().flush()?;

        use fmrelay::scrobbler::ScrobbleService;
        match scrobbler.validate_session().await {
            Ok(()) => println!("OK."),
            Err(e) => println!("failed ({e})."),
        }

        print!("Fetch new session key [yes/NO]: ");
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !answer.trim().eq_ignore_ascii_case("yes") {
            return Ok(());
        }
    }

    scrobbler
        .authenticate(|url| {
            println!("Open this URL in your web browser and press ENTER afterwards:\n  {url}");
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).is_ok()
        })
        .await?;

    config.session_key = scrobbler.session_key_hex();
    config.user_name = scrobbler.user_name().to_owned();
    config.save()?;
    println!("Session stored for {}.", config.user_name);

    Ok(())
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    if args.event.len() == 1 && args.event[0] == "init" {
        return init_session().await;
    }

    let config = Config::load()?;

    match parse_event(&config, &args.event)? {
        Some(event) => daemon::send_event(&event).await?,
        None => Daemon::new(config)?.run().await?,
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(&args);
    debug!("Command {args:#?}");

    if args.event.is_empty() {
        println!(
            "usage: fmrelay [init] [KEY VALUE]...\n\n\
             Run `fmrelay init` once to authorize with the scrobbler service,\n\
             then set fmrelay as your player's status display program."
        );
        return;
    }

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
