//! Text extraction for corpus documents.
//!
//! Turns the raw bytes of a corpus file into plain UTF-8 text, dispatching
//! on the lowercase file extension. Failures are returned, never panicked;
//! the corpus loader logs and skips the file.

use std::io::Read;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Shortest printable run kept when scraping legacy `.doc` files.
const DOC_MIN_RUN: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// Extracts plain text from `bytes` according to `extension`.
///
/// | Extension | Strategy |
/// |-----------|----------|
/// | `pdf` | `pdf-extract` |
/// | `docx` | `w:t` runs from `word/document.xml` |
/// | `rtf` | control words and groups stripped |
/// | `doc` | printable text runs |
/// | anything else | lossy UTF-8 |
pub fn extract_text(bytes: &[u8], extension: &str) -> Result<String, ExtractError> {
    match extension.to_ascii_lowercase().as_str() {
        "pdf" => extract_pdf(bytes),
        "docx" => extract_docx(bytes),
        "rtf" => Ok(extract_rtf(&String::from_utf8_lossy(bytes))),
        "doc" => Ok(extract_doc(bytes)),
        _ => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    extract_w_t_elements(&doc_xml)
}

/// Concatenates `w:t` text, breaking paragraphs at each closing `w:p`.
fn extract_w_t_elements(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Docx(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push_str("\n\n"),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim().to_string())
}

/// Strips RTF markup.
///
/// Groups that start with an ignorable destination (`{\*...}`) and the
/// font/colour/stylesheet/info tables are dropped whole. `\par` and `\line`
/// become newlines, `\'hh` escapes are decoded as Latin-1.
fn extract_rtf(input: &str) -> String {
    const SKIP_DESTINATIONS: &[&str] = &["fonttbl", "colortbl", "stylesheet", "info", "pict"];

    let chars: Vec<char> = input.chars().collect();
    let mut out = String::new();
    // One entry per open group: whether its content is skipped.
    let mut skip_stack: Vec<bool> = Vec::new();
    let mut skipping = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '{' => {
                skip_stack.push(skipping);
                i += 1;
            }
            '}' => {
                skipping = skip_stack.pop().unwrap_or(false);
                i += 1;
            }
            '\\' => {
                i += 1;
                let Some(&next) = chars.get(i) else { break };
                if next == '*' {
                    skipping = true;
                    i += 1;
                } else if next == '\'' {
                    let hex: String = chars.iter().skip(i + 1).take(2).collect();
                    if let Ok(code) = u8::from_str_radix(&hex, 16) {
                        if !skipping {
                            out.push(code as char);
                        }
                    }
                    i += 3;
                } else if next.is_ascii_alphabetic() {
                    let start = i;
                    while i < chars.len() && chars[i].is_ascii_alphabetic() {
                        i += 1;
                    }
                    let word: String = chars[start..i].iter().collect();
                    let param_start = i;
                    if i < chars.len() && (chars[i] == '-' || chars[i].is_ascii_digit()) {
                        i += 1;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                    let param: Option<i32> =
                        chars[param_start..i].iter().collect::<String>().parse().ok();
                    // A single space delimits the control word and is not content.
                    if i < chars.len() && chars[i] == ' ' {
                        i += 1;
                    }
                    if SKIP_DESTINATIONS.contains(&word.as_str()) {
                        skipping = true;
                    } else if word == "u" {
                        if let Some(ch) = param.and_then(decode_rtf_unicode) {
                            if !skipping {
                                out.push(ch);
                            }
                        }
                        i = skip_rtf_fallback(&chars, i);
                    } else if !skipping {
                        match word.as_str() {
                            "par" | "line" => out.push('\n'),
                            "tab" => out.push('\t'),
                            _ => {}
                        }
                    }
                } else {
                    // Escaped literal: \\ \{ \}
                    if !skipping {
                        out.push(next);
                    }
                    i += 1;
                }
            }
            '\r' | '\n' => i += 1,
            _ => {
                if !skipping {
                    out.push(c);
                }
                i += 1;
            }
        }
    }
    out.trim().to_string()
}

/// `\uN` carries a signed 16-bit value; negative values wrap to the upper
/// half of the BMP.
fn decode_rtf_unicode(param: i32) -> Option<char> {
    let code = if param < 0 { param + 0x1_0000 } else { param };
    u32::try_from(code).ok().and_then(char::from_u32)
}

/// Skips the single fallback character that follows a `\uN` escape. The
/// fallback may itself be a `\'hh` escape.
fn skip_rtf_fallback(chars: &[char], i: usize) -> usize {
    match chars.get(i) {
        Some('\\') if chars.get(i + 1) == Some(&'\'') => (i + 4).min(chars.len()),
        Some('\\') | Some('{') | Some('}') | None => i,
        Some(_) => i + 1,
    }
}

/// Recovers readable text from a legacy binary Word file by keeping runs of
/// printable ASCII at least [`DOC_MIN_RUN`] characters long.
fn extract_doc(bytes: &[u8]) -> String {
    let mut runs = Vec::new();
    let mut current = String::new();
    for &b in bytes {
        if b.is_ascii_graphic() || b == b' ' {
            current.push(b as char);
        } else {
            if current.trim().len() >= DOC_MIN_RUN {
                runs.push(current.trim().to_string());
            }
            current.clear();
        }
    }
    if current.trim().len() >= DOC_MIN_RUN {
        runs.push(current.trim().to_string());
    }
    runs.join("\n")
}
