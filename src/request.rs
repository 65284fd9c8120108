use crate::{error::ConvertError, formats::Format};
use serde::{Deserialize, Serialize};

/// Rendering toggles forwarded from the browser form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptionSet {
    pub toc: bool,
    pub number_sections: bool,
    #[serde(alias = "citeproc")]
    pub bibliography: bool,
    #[serde(alias = "includeCss")]
    pub css: bool,
}

impl OptionSet {
    /// An absent or blank field means defaults. `null` does too.
    pub fn from_json(raw: Option<&str>) -> Result<Self, ConvertError> {
        let raw = match raw.map(str::trim) {
            None | Some("") => return Ok(Self::default()),
            Some(raw) => raw,
        };
        let parsed: Option<OptionSet> = serde_json::from_str(raw)
            .map_err(|e| ConvertError::InvalidOptions(e.to_string()))?;
        Ok(parsed.unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConversionRequest {
    pub from: Format,
    pub to: Format,
    pub options: OptionSet,
}

impl ConversionRequest {
    pub fn new(from: Format, to: Format, options: OptionSet) -> Self {
        Self { from, to, options }
    }

    /// Validates raw form values against the catalog.
    pub fn parse(from: &str, to: &str, options: Option<&str>) -> Result<Self, ConvertError> {
        Ok(Self {
            from: Format::parse_input(from)?,
            to: Format::parse_output(to)?,
            options: OptionSet::from_json(options)?,
        })
    }
}
