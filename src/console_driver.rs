use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use codespan_reporting::term::{self, Config, DisplayStyle};
use mirc_backend::AllocError;
use mirc_common::mir::parse::ParseError;

pub struct ConsoleDriver {
    files: SimpleFiles<String, String>,
    writer: StandardStream,
    config: Config,
}

impl ConsoleDriver {
    pub fn new(files: SimpleFiles<String, String>) -> Self {
        Self {
            files,
            writer: StandardStream::stderr(ColorChoice::Auto),
            config: Config {
                display_style: DisplayStyle::Rich,
                ..Default::default()
            },
        }
    }

    pub fn report_parse_error(&mut self, file: usize, error: &ParseError) -> anyhow::Result<()> {
        let diagnostic = Diagnostic::error()
            .with_message(&error.message)
            .with_labels(vec![Label::primary(file, self.clamp(file, error.span.clone()))]);

        self.emit(&diagnostic)
    }

    pub fn report_alloc_error(&mut self, error: &AllocError) -> anyhow::Result<()> {
        let diagnostic = Diagnostic::error()
            .with_message("register allocation failed")
            .with_notes(vec![error.to_string()]);

        self.emit(&diagnostic)
    }

    fn emit(&mut self, diagnostic: &Diagnostic<usize>) -> anyhow::Result<()> {
        term::emit(&mut self.writer, &self.config, &self.files, diagnostic)?;
        Ok(())
    }

    /// Keep an end-of-file span inside the source so it can be rendered.
    fn clamp(&self, file: usize, span: Range<usize>) -> Range<usize> {
        let len = self
            .files
            .get(file)
            .map(|file| file.source().len())
            .unwrap_or(0);

        span.start.min(len)..span.end.min(len)
    }
}
