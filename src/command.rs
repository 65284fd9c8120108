use crate::{config::EngineSettings, engine::ConversionJob, formats::Format};
use std::ffi::OsString;

pub const TOC_DEPTH: u8 = 6;
pub const PDF_MARGIN: &str = "geometry:margin=1in";

/// Builds the engine's argument vector for one job. Each value is its own
/// argument; nothing here is ever joined into a shell string.
pub fn build_args(job: &ConversionJob, settings: &EngineSettings) -> Vec<OsString> {
    let req = &job.request;
    let mut args: Vec<OsString> = Vec::with_capacity(24);

    args.push("-f".into());
    args.push(reader_spec(req.from).into());
    args.push("-t".into());
    args.push(req.to.name().into());
    args.push(job.input.clone().into_os_string());
    args.push("-o".into());
    args.push(job.output.clone().into_os_string());

    if req.to.needs_standalone() {
        args.push("--standalone".into());
    }

    if req.options.toc && req.to.supports_toc() {
        args.push("--toc".into());
        args.push(format!("--toc-depth={TOC_DEPTH}").into());
    }

    if req.options.number_sections {
        args.push("--number-sections".into());
    }

    args.push("--preserve-tabs".into());

    if req.from.carries_media() {
        let mut flag = OsString::from("--extract-media=");
        flag.push(job.media_dir.as_os_str());
        args.push(flag);
    }

    match req.to {
        Format::Html => {
            args.push("--self-contained".into());
            args.push("--mathjax".into());
            if req.options.css && !settings.css_href.is_empty() {
                args.push(format!("--css={}", settings.css_href).into());
            }
        }
        Format::Pdf => {
            args.push(format!("--pdf-engine={}", settings.pdf_engine).into());
            args.push("-V".into());
            args.push(PDF_MARGIN.into());
        }
        Format::Docx if !settings.reference_doc.is_empty() => {
            args.push(format!("--reference-doc={}", settings.reference_doc).into());
        }
        _ => {}
    }

    args.push(format!("--highlight-style={}", settings.highlight_style).into());
    args.push("--wrap=preserve".into());

    if req.options.bibliography {
        args.push("--citeproc".into());
    }

    args
}

// Smart quotes/dashes are a reader extension; binary readers reject it.
fn reader_spec(from: Format) -> String {
    if from.supports_smart() {
        format!("{}+smart", from.name())
    } else {
        from.name().to_string()
    }
}
