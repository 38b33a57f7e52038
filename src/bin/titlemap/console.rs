//! Status lines, one per titlemap line, optionally colourised.

use std::time::Duration;

use titlemap::TitleRecord;

#[derive(Debug, Clone, Copy)]
pub struct Console {
    pub color: bool,
}

impl Console {
    fn sgr(&self, attr: &str, s: &str) -> String {
        if self.color {
            format!("\x1b[{attr}m{s}\x1b[m")
        } else {
            s.to_string()
        }
    }

    pub fn clear_to_end_of_line(&self) -> &'static str {
        if self.color { "\x1b[K" } else { "" }
    }

    fn red(&self, s: &str) -> String {
        self.sgr("31", s)
    }

    fn green(&self, s: &str) -> String {
        self.sgr("32", s)
    }

    fn yellow(&self, s: &str) -> String {
        self.sgr("33", s)
    }

    fn magenta(&self, s: &str) -> String {
        self.sgr("35", s)
    }

    fn gray(&self, s: &str) -> String {
        self.sgr("37", s)
    }

    fn line(&self, source: String, args: String, output: String, t: &TitleRecord) -> String {
        format!(
            "{}|{}|{}|{}{}",
            source,
            args,
            output,
            t.raw_metadata,
            self.gray(&t.raw_comment)
        )
    }

    /// Output already exists.
    pub fn processed(&self, t: &TitleRecord) -> String {
        self.line(
            t.source_base_name.clone(),
            t.raw_transcode_args.clone(),
            self.green(&t.output_base_name),
            t,
        )
    }

    /// Source media not found.
    pub fn offline(&self, t: &TitleRecord) -> String {
        self.line(
            self.red(&t.source_base_name),
            t.raw_transcode_args.clone(),
            t.output_base_name.clone(),
            t,
        )
    }

    /// Would be transcoded, but no output directory was given.
    pub fn todo(&self, t: &TitleRecord) -> String {
        self.line(
            t.source_base_name.clone(),
            t.raw_transcode_args.clone(),
            self.yellow(&t.output_base_name),
            t,
        )
    }

    pub fn processing(&self, t: &TitleRecord, args: &[String]) -> String {
        self.line(
            self.yellow(&t.source_base_name),
            self.yellow(&shell_words::join(args)),
            self.yellow(&t.output_base_name),
            t,
        )
    }

    pub fn just_processed(&self, t: &TitleRecord, elapsed: Duration) -> String {
        format!(
            "{} # {}",
            self.processed(t),
            self.magenta(&format!("{}s", elapsed.as_secs()))
        )
    }
}
