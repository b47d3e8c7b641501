//! Text commands read from stdin
//!
//! Decks are addressed by their display number (1 or 2), the same number
//! shown in status lines.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use otodeck_core::types::NUM_DECKS;

pub const HELP: &str = "\
Commands:
  load <deck> <path>      decode a track and load it (starts playing forward)
  play <deck>             play forward (same as fwd)
  fwd <deck>              play forward from the mirrored position
  rev <deck>              play in reverse from the mirrored position
  stop <deck>             pause the active direction
  gain <deck> <g>         linear gain, 0 and up
  speed <deck> <r>        speed ratio, 0.05 to 4.0
  seek <deck> <seconds>   jump to a time in the track
  pos <deck> <0..1>       jump to a fraction of the track
  rec start [path]        record the master output to WAV
  rec stop                finish the recording
  analyze <path>...       detect BPM and key in the background
  tracks                  list known tracks with BPM and key
  suggest <n>             closest-BPM track to track #n
  devices                 list audio output devices
  status                  show both decks
  help                    show this text
  quit                    exit";

/// A parsed control command
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Load { deck: usize, path: PathBuf },
    Play { deck: usize },
    Forward { deck: usize },
    Reverse { deck: usize },
    Stop { deck: usize },
    Gain { deck: usize, gain: f32 },
    Speed { deck: usize, ratio: f64 },
    Seek { deck: usize, seconds: f64 },
    Position { deck: usize, position: f64 },
    RecordStart { path: Option<PathBuf> },
    RecordStop,
    Analyze { paths: Vec<PathBuf> },
    Tracks,
    Suggest { track: usize },
    Devices,
    Status,
    Help,
    Quit,
}

/// Parse one input line
///
/// Returns `Ok(None)` for blank lines.
pub fn parse_command(line: &str) -> Result<Option<ControlCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let mut args = rest.split_whitespace();

    let command = match word.to_ascii_lowercase().as_str() {
        "load" => {
            let deck = parse_deck(args.next())?;
            // The path is everything after the deck number, spaces included
            let path = rest
                .split_once(char::is_whitespace)
                .map(|(_, path)| path.trim())
                .filter(|path| !path.is_empty())
                .ok_or_else(|| anyhow!("usage: load <deck> <path>"))?;
            ControlCommand::Load {
                deck,
                path: PathBuf::from(path),
            }
        }
        "play" | "start" => ControlCommand::Play {
            deck: parse_deck(args.next())?,
        },
        "fwd" | "forward" => ControlCommand::Forward {
            deck: parse_deck(args.next())?,
        },
        "rev" | "reverse" => ControlCommand::Reverse {
            deck: parse_deck(args.next())?,
        },
        "stop" | "pause" => ControlCommand::Stop {
            deck: parse_deck(args.next())?,
        },
        "gain" => ControlCommand::Gain {
            deck: parse_deck(args.next())?,
            gain: parse_value(args.next(), "gain")?,
        },
        "speed" => ControlCommand::Speed {
            deck: parse_deck(args.next())?,
            ratio: parse_value(args.next(), "speed ratio")?,
        },
        "seek" => ControlCommand::Seek {
            deck: parse_deck(args.next())?,
            seconds: parse_value(args.next(), "seconds")?,
        },
        "pos" => ControlCommand::Position {
            deck: parse_deck(args.next())?,
            position: parse_value(args.next(), "position")?,
        },
        "rec" => match args.next() {
            Some("start") => {
                let path = rest
                    .strip_prefix("start")
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from);
                ControlCommand::RecordStart { path }
            }
            Some("stop") => ControlCommand::RecordStop,
            _ => bail!("usage: rec start [path] | rec stop"),
        },
        "analyze" => {
            let paths: Vec<PathBuf> = args.map(PathBuf::from).collect();
            if paths.is_empty() {
                bail!("usage: analyze <path>...");
            }
            ControlCommand::Analyze { paths }
        }
        "tracks" => ControlCommand::Tracks,
        "suggest" => {
            let number: usize = parse_value(args.next(), "track number")?;
            if number == 0 {
                bail!("Track numbers start at 1");
            }
            ControlCommand::Suggest { track: number - 1 }
        }
        "devices" => ControlCommand::Devices,
        "status" => ControlCommand::Status,
        "help" | "?" => ControlCommand::Help,
        "quit" | "exit" | "q" => ControlCommand::Quit,
        other => bail!("Unknown command {:?} (try 'help')", other),
    };

    Ok(Some(command))
}

/// Deck display number (1-based) to engine index
fn parse_deck(arg: Option<&str>) -> Result<usize> {
    let arg = arg.ok_or_else(|| anyhow!("Missing deck number"))?;
    let number: usize = arg
        .parse()
        .with_context(|| format!("Invalid deck number {:?}", arg))?;
    if number == 0 || number > NUM_DECKS {
        bail!("Deck must be 1-{}", NUM_DECKS);
    }
    Ok(number - 1)
}

fn parse_value<T>(arg: Option<&str>, name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let arg = arg.ok_or_else(|| anyhow!("Missing {}", name))?;
    arg.parse::<T>()
        .with_context(|| format!("Invalid {} {:?}", name, arg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transport_commands() {
        assert_eq!(
            parse_command("rev 2").unwrap(),
            Some(ControlCommand::Reverse { deck: 1 })
        );
        assert_eq!(
            parse_command("  PLAY 1 ").unwrap(),
            Some(ControlCommand::Play { deck: 0 })
        );
        assert_eq!(
            parse_command("pos 1 0.25").unwrap(),
            Some(ControlCommand::Position {
                deck: 0,
                position: 0.25
            })
        );
        assert_eq!(parse_command("").unwrap(), None);
    }

    #[test]
    fn test_load_keeps_spaces_in_path() {
        assert_eq!(
            parse_command("load 2 /music/My Track.flac").unwrap(),
            Some(ControlCommand::Load {
                deck: 1,
                path: PathBuf::from("/music/My Track.flac")
            })
        );
        assert!(parse_command("load 1").is_err());
    }

    #[test]
    fn test_rejects_bad_decks_and_values() {
        assert!(parse_command("play 0").is_err());
        assert!(parse_command("play 3").is_err());
        assert!(parse_command("gain 1 loud").is_err());
        assert!(parse_command("speed 1").is_err());
        assert!(parse_command("scratch 1").is_err());
    }

    #[test]
    fn test_parse_recording() {
        assert_eq!(
            parse_command("rec start").unwrap(),
            Some(ControlCommand::RecordStart { path: None })
        );
        assert_eq!(
            parse_command("rec start /tmp/set one.wav").unwrap(),
            Some(ControlCommand::RecordStart {
                path: Some(PathBuf::from("/tmp/set one.wav"))
            })
        );
        assert_eq!(parse_command("rec stop").unwrap(), Some(ControlCommand::RecordStop));
        assert!(parse_command("rec").is_err());
    }

    #[test]
    fn test_parse_library_commands() {
        assert_eq!(
            parse_command("suggest 3").unwrap(),
            Some(ControlCommand::Suggest { track: 2 })
        );
        assert!(parse_command("suggest 0").is_err());
        assert_eq!(
            parse_command("analyze a.wav b.mp3").unwrap(),
            Some(ControlCommand::Analyze {
                paths: vec![PathBuf::from("a.wav"), PathBuf::from("b.mp3")]
            })
        );
    }
}
