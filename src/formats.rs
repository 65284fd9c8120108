use crate::error::{ConvertError, FormatRole};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every document format the service will hand to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Markdown,
    Html,
    Docx,
    Odt,
    Epub,
    Latex,
    Rst,
    Textile,
    Org,
    Mediawiki,
    Rtf,
    Json,
    Plain,
    Pdf,
}

impl Format {
    pub const ALL: [Format; 14] = [
        Format::Markdown,
        Format::Html,
        Format::Docx,
        Format::Odt,
        Format::Epub,
        Format::Latex,
        Format::Rst,
        Format::Textile,
        Format::Org,
        Format::Mediawiki,
        Format::Rtf,
        Format::Json,
        Format::Plain,
        Format::Pdf,
    ];

    /// Name understood by the engine's `-f`/`-t` flags.
    pub fn name(self) -> &'static str {
        match self {
            Format::Markdown => "markdown",
            Format::Html => "html",
            Format::Docx => "docx",
            Format::Odt => "odt",
            Format::Epub => "epub",
            Format::Latex => "latex",
            Format::Rst => "rst",
            Format::Textile => "textile",
            Format::Org => "org",
            Format::Mediawiki => "mediawiki",
            Format::Rtf => "rtf",
            Format::Json => "json",
            Format::Plain => "plain",
            Format::Pdf => "pdf",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Format::Markdown => "Markdown",
            Format::Html => "HTML",
            Format::Docx => "Microsoft Word (DOCX)",
            Format::Odt => "OpenDocument Text (ODT)",
            Format::Epub => "EPUB",
            Format::Latex => "LaTeX",
            Format::Rst => "reStructuredText",
            Format::Textile => "Textile",
            Format::Org => "Emacs Org mode",
            Format::Mediawiki => "MediaWiki markup",
            Format::Rtf => "Rich Text Format",
            Format::Json => "Pandoc JSON AST",
            Format::Plain => "Plain text",
            Format::Pdf => "PDF",
        }
    }

    /// File extensions accepted for uploads, with the leading dot. The first
    /// one is used for generated files.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Format::Markdown => &[".md", ".markdown"],
            Format::Html => &[".html", ".htm"],
            Format::Docx => &[".docx"],
            Format::Odt => &[".odt"],
            Format::Epub => &[".epub"],
            Format::Latex => &[".tex", ".latex"],
            Format::Rst => &[".rst"],
            Format::Textile => &[".textile"],
            Format::Org => &[".org"],
            Format::Mediawiki => &[".wiki", ".mediawiki"],
            Format::Rtf => &[".rtf"],
            Format::Json => &[".json"],
            Format::Plain => &[".txt"],
            Format::Pdf => &[".pdf"],
        }
    }

    pub fn extension(self) -> &'static str {
        self.extensions()[0]
    }

    /// Extension without the leading dot, for building file names.
    pub fn file_extension(self) -> &'static str {
        self.extension().trim_start_matches('.')
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Format::Markdown => "text/markdown; charset=utf-8",
            Format::Html => "text/html; charset=utf-8",
            Format::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Format::Odt => "application/vnd.oasis.opendocument.text",
            Format::Epub => "application/epub+zip",
            Format::Latex => "application/x-latex",
            Format::Rst => "text/x-rst; charset=utf-8",
            Format::Textile | Format::Org | Format::Mediawiki | Format::Plain => {
                "text/plain; charset=utf-8"
            }
            Format::Rtf => "application/rtf",
            Format::Json => "application/json",
            Format::Pdf => "application/pdf",
        }
    }

    /// Plain text and PDF can be written but never read.
    pub fn is_readable(self) -> bool {
        !matches!(self, Format::Plain | Format::Pdf)
    }

    /// Targets that need a complete document wrapper rather than a fragment.
    pub fn needs_standalone(self) -> bool {
        matches!(
            self,
            Format::Html | Format::Docx | Format::Odt | Format::Epub | Format::Pdf
        )
    }

    pub fn supports_toc(self) -> bool {
        matches!(
            self,
            Format::Html | Format::Pdf | Format::Docx | Format::Epub
        )
    }

    /// Compound sources whose embedded images get extracted to disk.
    pub fn carries_media(self) -> bool {
        matches!(self, Format::Docx | Format::Odt | Format::Epub)
    }

    /// Readers that accept the `smart` extension.
    pub fn supports_smart(self) -> bool {
        matches!(
            self,
            Format::Markdown
                | Format::Html
                | Format::Latex
                | Format::Rst
                | Format::Org
                | Format::Mediawiki
        )
    }

    pub fn parse_input(raw: &str) -> Result<Format, ConvertError> {
        match raw.parse::<Format>() {
            Ok(f) if f.is_readable() => Ok(f),
            _ => Err(ConvertError::UnsupportedFormat {
                role: FormatRole::Source,
                value: raw.to_string(),
            }),
        }
    }

    pub fn parse_output(raw: &str) -> Result<Format, ConvertError> {
        raw.parse::<Format>()
            .map_err(|_| ConvertError::UnsupportedFormat {
                role: FormatRole::Target,
                value: raw.to_string(),
            })
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = ();

    /// Exact, case-insensitive match against the catalog. Anything else,
    /// including extension syntax like `markdown+smart`, is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Format::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub input: Vec<InputEntry>,
    pub output: Vec<OutputEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputEntry {
    pub value: Format,
    pub label: String,
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputEntry {
    pub value: Format,
    pub label: String,
    pub extension: String,
}

pub fn catalog() -> Catalog {
    let input = Format::ALL
        .into_iter()
        .filter(|f| f.is_readable())
        .map(|f| InputEntry {
            value: f,
            label: f.label().to_string(),
            extensions: f.extensions().iter().map(|e| e.to_string()).collect(),
        })
        .collect();
    let output = Format::ALL
        .into_iter()
        .map(|f| OutputEntry {
            value: f,
            label: f.label().to_string(),
            extension: f.extension().to_string(),
        })
        .collect();
    Catalog { input, output }
}
