// Markdown to PDF
//
// A small renderer: headings, paragraphs, list items, tables
// and code blocks become lines of Helvetica text on A4 pages. Every page
// gets the brand footer and a diagonal watermark. Lines with characters
// outside WinAnsi (Chinese labels) are set in the Adobe-GB1 STSong-Light
// CID font with UCS-2 codes.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};

use super::ReportError;
use crate::config::ReportConfig;

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const FOOTER_Y: f32 = 30.0;
const BODY_SIZE: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Style {
    Title,
    Heading,
    Body,
    Mono,
}

impl Style {
    fn size(self) -> f32 {
        match self {
            Style::Title => 18.0,
            Style::Heading => 13.0,
            Style::Body => BODY_SIZE,
            Style::Mono => 8.0,
        }
    }

    fn font(self) -> &'static str {
        match self {
            Style::Title | Style::Heading => "F2",
            Style::Body => "F1",
            Style::Mono => "F3",
        }
    }

    /// Rough characters per line; Helvetica averages half an em per glyph
    fn max_chars(self) -> usize {
        let em = match self {
            Style::Mono => 0.6,
            _ => 0.5,
        };
        ((PAGE_WIDTH - 2.0 * MARGIN) / (self.size() * em)) as usize
    }
}

/// Font resource used for CJK lines
const CJK_FONT: &str = "F4";

/// WinAnsiEncoding code of `c`, if the standard fonts have a glyph for it
fn winansi(c: char) -> Option<u8> {
    let code = match c {
        '\t' => b' ',
        ' '..='~' => c as u8,
        '\u{A0}'..='\u{FF}' => c as u32 as u8,
        '€' => 0x80,
        '‚' => 0x82,
        'ƒ' => 0x83,
        '„' => 0x84,
        '…' => 0x85,
        '†' => 0x86,
        '‡' => 0x87,
        'ˆ' => 0x88,
        '‰' => 0x89,
        'Š' => 0x8A,
        '‹' => 0x8B,
        'Œ' => 0x8C,
        'Ž' => 0x8E,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        '˜' => 0x98,
        '™' => 0x99,
        'š' => 0x9A,
        '›' => 0x9B,
        'œ' => 0x9C,
        'ž' => 0x9E,
        'Ÿ' => 0x9F,
        _ => return None,
    };
    Some(code)
}

/// A text run ready for a `Tj` operator
#[derive(Debug, PartialEq)]
pub(crate) enum Encoded {
    WinAnsi(Vec<u8>),
    /// UCS-2 big-endian codes for the `UniGB-UCS2-H` CMap
    Cjk(Vec<u8>),
}

pub(crate) fn encode_text(text: &str) -> Encoded {
    let bytes: Option<Vec<u8>> = text.chars().map(winansi).collect();
    match bytes {
        Some(bytes) => Encoded::WinAnsi(bytes),
        None => {
            let mut codes = Vec::with_capacity(text.len() * 2);
            for c in text.chars() {
                let unit = u16::try_from(c as u32).unwrap_or(u16::from(b'?'));
                codes.extend_from_slice(&unit.to_be_bytes());
            }
            Encoded::Cjk(codes)
        }
    }
}

/// Width in half-em units: WinAnsi glyphs are narrow, CJK glyphs full width
fn char_units(c: char) -> usize {
    if winansi(c).is_some() {
        1
    } else {
        2
    }
}

fn units(text: &str) -> usize {
    text.chars().map(char_units).sum()
}

/// Remove inline Markdown: `**bold**`, `_em_`, backticks and `[text](url)`
fn strip_inline(line: &str) -> String {
    let mut out = line.replace("**", "").replace('`', "");
    while let Some(open) = out.find('[') {
        let Some(mid) = out[open..].find("](").map(|i| open + i) else {
            break;
        };
        let Some(close) = out[mid..].find(')').map(|i| mid + i) else {
            break;
        };
        let text = out[open + 1..mid].to_string();
        let url = out[mid + 2..close].to_string();
        out.replace_range(open..=close, &format!("{} ({})", text, url));
    }
    if out.len() > 2 && out.starts_with('_') && out.ends_with('_') {
        out = out[1..out.len() - 1].to_string();
    }
    out
}

/// Split off the longest prefix of `word` that fits in `width` units (at least one char)
fn split_word(word: &str, width: usize) -> (String, String) {
    let mut used = 0;
    let mut cut = 0;
    for (idx, c) in word.char_indices() {
        used += char_units(c);
        if used > width && idx > 0 {
            break;
        }
        cut = idx + c.len_utf8();
    }
    (word[..cut].to_string(), word[cut..].to_string())
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split(' ') {
        let mut word = word.to_string();
        while units(&word) > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let (head, rest) = split_word(&word, width);
            lines.push(head);
            word = rest;
        }
        if units(&current) + units(&word) + 1 > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Flatten Markdown into styled lines; `None` is vertical space
fn layout(markdown: &str) -> Vec<Option<(Style, String)>> {
    let mut out = Vec::new();
    let mut in_code = false;

    for raw in markdown.lines() {
        let line = raw.trim_end();
        if line.trim_start().starts_with("```") {
            in_code = !in_code;
            continue;
        }
        if in_code {
            for chunk in wrap(line, Style::Mono.max_chars()) {
                out.push(Some((Style::Mono, chunk)));
            }
            continue;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            out.push(None);
            continue;
        }
        if trimmed == "---" || (trimmed.starts_with('|') && trimmed.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))) {
            continue;
        }

        let (style, text) = if let Some(rest) = trimmed.strip_prefix("# ") {
            (Style::Title, rest.to_string())
        } else if let Some(rest) = trimmed.strip_prefix("## ").or_else(|| trimmed.strip_prefix("### ")) {
            (Style::Heading, rest.to_string())
        } else if trimmed.starts_with('|') {
            let cells: Vec<&str> = trimmed.trim_matches('|').split('|').map(str::trim).collect();
            (Style::Body, cells.join("  |  "))
        } else {
            (Style::Body, trimmed.to_string())
        };

        for chunk in wrap(&strip_inline(&text), style.max_chars()) {
            out.push(Some((style, chunk)));
        }
    }
    out
}

/// Font resource and string operand for `text`, switching to the CJK font when needed
fn font_and_string<'a>(font: &'a str, text: &str) -> (&'a str, Object) {
    match encode_text(text) {
        Encoded::WinAnsi(bytes) => (font, Object::string_literal(bytes)),
        Encoded::Cjk(codes) => (CJK_FONT, Object::String(codes, StringFormat::Hexadecimal)),
    }
}

fn text_op(font: &str, size: f32, x: f32, y: f32, text: &str) -> Vec<Operation> {
    let (font, string) = font_and_string(font, text);
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![font.into(), Object::Real(size as _)]),
        Operation::new("Td", vec![Object::Real(x as _), Object::Real(y as _)]),
        Operation::new("Tj", vec![string]),
        Operation::new("ET", vec![]),
    ]
}

fn watermark_ops(text: &str) -> Vec<Operation> {
    // 45 degrees, centred on the page
    let (cos, sin) = (0.7071_f32, 0.7071_f32);
    let (font, string) = font_and_string("F2", text);
    vec![
        Operation::new("q", vec![]),
        Operation::new("gs", vec!["GS1".into()]),
        Operation::new("rg", vec![Object::Real(0.75), Object::Real(0.75), Object::Real(0.75)]),
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![font.into(), Object::Real(48.0)]),
        Operation::new(
            "Tm",
            vec![
                Object::Real(cos as _),
                Object::Real(sin as _),
                Object::Real(-sin as _),
                Object::Real(cos as _),
                Object::Real(150.0),
                Object::Real(250.0),
            ],
        ),
        Operation::new("Tj", vec![string]),
        Operation::new("ET", vec![]),
        Operation::new("Q", vec![]),
    ]
}

fn footer_ops(brand: &str, page: usize, total: usize) -> Vec<Operation> {
    let mut ops = vec![Operation::new("rg", vec![Object::Real(0.4), Object::Real(0.4), Object::Real(0.4)])];
    ops.extend(text_op("F1", 8.0, MARGIN, FOOTER_Y, brand));
    ops.extend(text_op(
        "F1",
        8.0,
        PAGE_WIDTH - MARGIN - 40.0,
        FOOTER_Y,
        &format!("{} / {}", page, total),
    ));
    ops
}

fn paginate(lines: Vec<Option<(Style, String)>>) -> Vec<Vec<(Style, f32, String)>> {
    let mut pages = vec![Vec::new()];
    let mut y = PAGE_HEIGHT - MARGIN;

    for line in lines {
        let (style, text) = match line {
            Some(line) => line,
            None => {
                y -= BODY_SIZE * 0.6;
                continue;
            }
        };
        let height = style.size() * 1.4 + if style == Style::Heading { 4.0 } else { 0.0 };
        if y - height < MARGIN + FOOTER_Y {
            pages.push(Vec::new());
            y = PAGE_HEIGHT - MARGIN;
        }
        y -= height;
        if let Some(page) = pages.last_mut() {
            page.push((style, y, text));
        }
    }
    pages
}

/// Non-embedded STSong-Light, one of the standard Adobe-GB1 CJK fonts
fn cjk_font(doc: &mut Document) -> lopdf::ObjectId {
    let descriptor = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => "STSong-Light",
        "Flags" => Object::Integer(6),
        "FontBBox" => vec![
            Object::Integer(-25),
            Object::Integer(-254),
            Object::Integer(1000),
            Object::Integer(880),
        ],
        "ItalicAngle" => Object::Integer(0),
        "Ascent" => Object::Integer(880),
        "Descent" => Object::Integer(-120),
        "CapHeight" => Object::Integer(880),
        "StemV" => Object::Integer(80),
    });
    let descendant = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType0",
        "BaseFont" => "STSong-Light",
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("GB1"),
            "Supplement" => Object::Integer(4),
        },
        "FontDescriptor" => descriptor,
        "DW" => Object::Integer(1000),
    });
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => "STSong-Light-UniGB-UCS2-H",
        "Encoding" => "UniGB-UCS2-H",
        "DescendantFonts" => vec![Object::Reference(descendant)],
    })
}

/// Render a Markdown report to an A4 PDF
pub fn render_pdf(markdown: &str, config: &ReportConfig) -> Result<Vec<u8>, ReportError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font = |doc: &mut Document, base: &str| {
        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => Object::Name(base.as_bytes().to_vec()),
            "Encoding" => "WinAnsiEncoding",
        })
    };
    let regular = font(&mut doc, "Helvetica");
    let bold = font(&mut doc, "Helvetica-Bold");
    let mono = font(&mut doc, "Courier");
    let cjk = cjk_font(&mut doc);
    let translucent = doc.add_object(dictionary! {
        "Type" => "ExtGState",
        "ca" => Object::Real(0.25),
        "CA" => Object::Real(0.25),
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular,
            "F2" => bold,
            "F3" => mono,
            CJK_FONT => cjk,
        },
        "ExtGState" => dictionary! {
            "GS1" => translucent,
        },
    });

    let pages = paginate(layout(markdown));
    let total = pages.len();
    let mut kids: Vec<Object> = Vec::with_capacity(total);

    for (idx, lines) in pages.into_iter().enumerate() {
        let mut operations = Vec::new();
        if !config.watermark.is_empty() {
            operations.extend(watermark_ops(&config.watermark));
        }
        operations.push(Operation::new("rg", vec![Object::Real(0.0), Object::Real(0.0), Object::Real(0.0)]));
        for (style, y, text) in lines {
            operations.extend(text_op(style.font(), style.size(), MARGIN, y, &text));
        }
        operations.extend(footer_ops(&config.brand, idx + 1, total));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => total as i64,
            "Resources" => resources_id,
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Real(PAGE_WIDTH as _), Object::Real(PAGE_HEIGHT as _)],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| ReportError::Pdf(e.to_string()))?;
    Ok(buf)
}
