use clap::Parser;

use crate::error::Error;

/// The popular HandBrakeCLI options.
///
/// Used twice: flattened into the `titlemap` command line as defaults for
/// every title, and applied to each title's own argument column on top of a
/// copy of those defaults, so "last setting wins".
#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
#[command(next_help_heading = "HandBrake options")]
pub struct TranscodeArgs {
    /// HandBrake preset
    #[arg(long)]
    pub preset: Option<String>,
    /// HandBrake title
    #[arg(long)]
    pub title: Option<u32>,
    /// HandBrake chapters
    #[arg(long)]
    pub chapters: Option<String>,
    /// HandBrake start-at offset
    #[arg(long)]
    pub start_at: Option<String>,
    /// HandBrake stop-at duration after start-at
    #[arg(long)]
    pub stop_at: Option<String>,
    /// HandBrake video encoder
    #[arg(long)]
    pub encoder: Option<String>,
    /// HandBrake subtitle track
    #[arg(long)]
    pub subtitle: Option<String>,
    /// HandBrake video denoise filter
    #[arg(long)]
    pub nlmeans: Option<String>,
    /// HandBrake picture cropping
    #[arg(long)]
    pub crop: Option<String>,
    /// HandBrake audio
    #[arg(long)]
    pub audio: Option<String>,
    /// HandBrake audio encoder
    #[arg(long)]
    pub aencoder: Option<String>,
}

impl TranscodeArgs {
    /// Applies `--flag value` / `--flag=value` tokens over the current
    /// settings. Flags that are not given keep their current value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTranscodeFlags` for unknown flags, missing or
    /// malformed values, and stray positional words.
    pub fn apply<I, S>(&mut self, tokens: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv = std::iter::once("HandBrakeCLI".to_string())
            .chain(tokens.into_iter().map(Into::into));
        self.try_update_from(argv)
            .map_err(|e| Error::InvalidTranscodeFlags {
                reason: e
                    .to_string()
                    .lines()
                    .next()
                    .unwrap_or_default()
                    .trim_start_matches("error: ")
                    .to_string(),
            })
    }

    /// Returns a copy with `tokens` applied.
    pub fn with<I, S>(&self, tokens: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = self.clone();
        args.apply(tokens)?;
        Ok(args)
    }

    /// Builds the HandBrakeCLI arguments for every option that is set.
    pub fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();

        if let Some(p) = &self.preset {
            args.extend(["--preset".into(), p.clone()]);
        }
        if let Some(t) = &self.title {
            args.extend(["--title".into(), t.to_string()]);
        }
        let strings = [
            ("--chapters", &self.chapters),
            ("--start-at", &self.start_at),
            ("--stop-at", &self.stop_at),
            ("--encoder", &self.encoder),
            ("--subtitle", &self.subtitle),
            ("--nlmeans", &self.nlmeans),
            ("--crop", &self.crop),
            ("--audio", &self.audio),
            ("--aencoder", &self.aencoder),
        ];
        for (flag, value) in strings {
            if let Some(v) = value {
                args.extend([flag.to_string(), v.clone()]);
            }
        }

        args
    }
}
