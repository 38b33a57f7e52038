//! Filter titlemap input, omitting titles whose output exists somewhere
//! under the given destination roots.
//!
//! Blank and comment-only lines pass through unchanged.

use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, warn};

use titlemap::{DestinationIndex, Error, ParseOutcome};

/// Flush roughly this often so output keeps pace with slow input.
const FLUSH_EVERY: usize = 20;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Print remaining titles as JSON lines instead of echoing them
    #[arg(long)]
    json: bool,
    /// Dirs searched recursively for transcoded videos
    #[arg(default_value = ".")]
    roots: Vec<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_target(false)
        .init();
    let cli = Cli::parse();

    match run(&cli, io::stdin().lock(), io::stdout().lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, input: impl BufRead, output: impl Write) -> Result<(), Error> {
    let index = DestinationIndex::new();
    // a root that cannot be walked is searched no further
    let roots: Vec<&PathBuf> = cli
        .roots
        .iter()
        .filter(|root| match index.ensure_scanned(root) {
            Ok(()) => true,
            Err(e) => {
                warn!("{}", e);
                false
            }
        })
        .collect();

    let stdout_error = |source: io::Error| Error::Io {
        path: PathBuf::from("<stdout>"),
        source,
    };
    let mut out = BufWriter::new(output);
    let mut since_flush = 0;

    for line in input.lines() {
        let line = line.map_err(|source| Error::Io {
            path: PathBuf::from("<stdin>"),
            source,
        })?;
        let (title, outcome) = titlemap::parse(&line);

        if outcome == ParseOutcome::Title
            && roots
                .iter()
                .any(|root| index.exists_under(root, &title.output_base_name))
        {
            continue;
        }

        if cli.json {
            if outcome == ParseOutcome::Blank {
                continue;
            }
            serde_json::to_writer(&mut out, &title).map_err(|e| stdout_error(e.into()))?;
            out.write_all(b"\n").map_err(stdout_error)?;
        } else {
            writeln!(out, "{}", line).map_err(stdout_error)?;
        }

        since_flush += 1;
        if since_flush >= FLUSH_EVERY {
            out.flush().map_err(stdout_error)?;
            since_flush = 0;
        }
    }
    out.flush().map_err(stdout_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn filter(cli: &Cli, input: &str) -> String {
        let mut out = Vec::new();
        run(cli, input.as_bytes(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_omits_titles_with_existing_output() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("Movies/Heat")).unwrap();
        fs::write(root.path().join("Movies/Heat/Heat (1995).m4v"), b"").unwrap();

        let cli = Cli {
            json: false,
            roots: vec![root.path().to_path_buf()],
        };
        let input = "disc1 | 1 | Heat (1995)\n# header\n\ndisc1 | 2 | Heat Extras\n";
        assert_eq!(filter(&cli, input), "# header\n\ndisc1 | 2 | Heat Extras\n");
    }

    #[test]
    fn test_missing_root_keeps_everything() {
        let root = tempfile::tempdir().unwrap();
        let cli = Cli {
            json: false,
            roots: vec![root.path().join("missing")],
        };
        assert_eq!(filter(&cli, "a|1|b\n"), "a|1|b\n");
    }

    #[test]
    fn test_json_output_skips_blank_lines() {
        let root = tempfile::tempdir().unwrap();
        let cli = Cli {
            json: true,
            roots: vec![root.path().to_path_buf()],
        };
        let out = filter(&cli, "# note\ndisc|3|Movie\n");
        let value: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(value["source_base_name"], "disc");
        assert_eq!(value["raw_transcode_args"], "3");
        assert_eq!(value["output_base_name"], "Movie");
        assert!(value.get("raw_comment").is_none());
    }
}
